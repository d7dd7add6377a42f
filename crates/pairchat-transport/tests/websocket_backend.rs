//! Transport manager against a real WebSocket backend.

use std::{net::SocketAddr, time::Duration};

use axum::{
    Router,
    extract::{
        WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use pairchat_core::{ConnectionEndpoint, ConnectionState, TransportEvent};
use pairchat_transport::{TransportManager, WsConnector};
use tokio::{net::TcpListener, time::timeout};

async fn ws_handler(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(handle_socket)
}

/// Replies to each text frame with a bracketed echo split in two fragments,
/// and closes when asked to.
async fn handle_socket(socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else { continue };
        if text.as_str() == "bye" {
            let _ = sender.send(Message::Close(None)).await;
            break;
        }
        let reply = format!("echo: {}", text.as_str());
        let (head, tail) = reply.split_at(reply.len() / 2);
        for frame in ["[START]", head, tail, "[END]"] {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                return;
            }
        }
    }
}

async fn spawn_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().route("/ws", get(ws_handler));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn next(manager: &mut TransportManager<WsConnector>) -> TransportEvent {
    timeout(Duration::from_secs(5), manager.next_event())
        .await
        .expect("timed out waiting for transport event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_round_trip_over_websocket() {
    let addr = spawn_backend().await;
    let endpoint = ConnectionEndpoint::new("127.0.0.1", addr.port(), "/ws");
    let mut manager = TransportManager::new(endpoint, WsConnector::new());

    manager.connect();
    assert_eq!(next(&mut manager).await, TransportEvent::Opened);
    assert_eq!(manager.state(), ConnectionState::Open);

    manager.send("hi").unwrap();
    let mut frames = Vec::new();
    loop {
        match next(&mut manager).await {
            TransportEvent::FrameReceived(frame) => {
                let end = frame == "[END]";
                frames.push(frame);
                if end {
                    break;
                }
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(frames, ["[START]", "echo", ": hi", "[END]"]);

    manager.close();
    manager.close();
    assert_eq!(manager.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_server_close_and_reconnect() {
    let addr = spawn_backend().await;
    let endpoint = ConnectionEndpoint::new("127.0.0.1", addr.port(), "/ws");
    let mut manager = TransportManager::new(endpoint, WsConnector::new());

    manager.connect();
    assert_eq!(next(&mut manager).await, TransportEvent::Opened);
    manager.send("bye").unwrap();
    assert_eq!(next(&mut manager).await, TransportEvent::Closed);
    assert_eq!(manager.state(), ConnectionState::Closed);
    assert!(manager.send("again").is_err());

    manager.connect();
    assert_eq!(manager.state(), ConnectionState::Connecting);
    assert_eq!(next(&mut manager).await, TransportEvent::Opened);
    assert!(manager.send("again").is_ok());
}

#[tokio::test]
async fn test_refused_connection_closes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let endpoint = ConnectionEndpoint::new("127.0.0.1", port, "/ws");
    let mut manager = TransportManager::new(endpoint, WsConnector::new());
    manager.connect();

    assert!(matches!(next(&mut manager).await, TransportEvent::Errored(_)));
    assert_eq!(manager.state(), ConnectionState::Closed);
}
