//! WebSocket transport.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use pairchat_core::TransportEvent;
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Message, protocol::CloseFrame},
};

use crate::{Connector, EventSink, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connector speaking plain WebSocket text frames.
///
/// Frames are delivered verbatim, one event per frame. Binary frames are
/// accepted when they hold valid UTF-8. Ping/pong is answered by the
/// library and never surfaces as an event.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    /// Create a WebSocket connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

async fn open(url: &str) -> Result<WsStream, TransportError> {
    let (ws, response) = connect_async(url)
        .await
        .map_err(|e| TransportError::Connection(e.to_string()))?;
    tracing::debug!(status = %response.status(), "websocket handshake complete");
    Ok(ws)
}

/// Decode one inbound message.
///
/// `Ok(None)` means the message carries nothing for the session.
fn inbound_frame(msg: Message) -> Result<Option<String>, Option<CloseFrame>> {
    match msg {
        Message::Text(text) => Ok(Some(text.as_str().to_owned())),
        Message::Binary(data) => match String::from_utf8(data.to_vec()) {
            Ok(text) => Ok(Some(text)),
            Err(_) => {
                tracing::warn!(len = data.len(), "dropping non UTF-8 binary frame");
                Ok(None)
            }
        },
        Message::Close(frame) => Err(frame),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Ok(None),
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn run(
        &self,
        url: String,
        mut outbound: mpsc::UnboundedReceiver<String>,
        events: EventSink,
    ) {
        let ws = match open(&url).await {
            Ok(ws) => ws,
            Err(e) => {
                tracing::warn!(%url, "{e}");
                let _ = events.emit(TransportEvent::Errored(e.to_string()));
                return;
            }
        };
        if events.emit(TransportEvent::Opened).is_err() {
            return;
        }

        let (mut sender, mut receiver) = ws.split();

        loop {
            tokio::select! {
                outgoing = outbound.recv() => {
                    let Some(text) = outgoing else {
                        // Released by the manager.
                        let _ = sender.send(Message::Close(None)).await;
                        return;
                    };
                    if let Err(e) = sender.send(Message::Text(text.into())).await {
                        let e = TransportError::Stream(e.to_string());
                        tracing::error!("WebSocket send failed: {e}");
                        let _ = events.emit(TransportEvent::Errored(e.to_string()));
                        return;
                    }
                }
                incoming = receiver.next() => {
                    let event = match incoming {
                        Some(Ok(msg)) => match inbound_frame(msg) {
                            Ok(Some(frame)) => TransportEvent::FrameReceived(frame),
                            Ok(None) => continue,
                            Err(frame) => {
                                if let Some(frame) = frame {
                                    tracing::debug!(code = %frame.code, reason = %frame.reason, "close frame");
                                }
                                TransportEvent::Closed
                            }
                        },
                        Some(Err(e)) => {
                            tracing::error!("WebSocket error: {e}");
                            TransportEvent::Errored(e.to_string())
                        }
                        None => TransportEvent::Closed,
                    };
                    let done = !matches!(event, TransportEvent::FrameReceived(_));
                    if events.emit(event).is_err() || done {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_frames_verbatim() {
        assert_eq!(
            inbound_frame(Message::Text(" [START] ".into())),
            Ok(Some(" [START] ".to_string()))
        );
        assert_eq!(inbound_frame(Message::Text("".into())), Ok(Some(String::new())));
    }

    #[test]
    fn test_binary_frames() {
        assert_eq!(
            inbound_frame(Message::Binary(b"hello".to_vec().into())),
            Ok(Some("hello".to_string()))
        );
        assert_eq!(inbound_frame(Message::Binary(vec![0xff, 0xfe].into())), Ok(None));
    }

    #[test]
    fn test_control_frames() {
        assert_eq!(inbound_frame(Message::Ping(Vec::new().into())), Ok(None));
        assert_eq!(inbound_frame(Message::Close(None)), Err(None));
    }
}
