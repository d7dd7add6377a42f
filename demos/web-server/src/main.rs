//! Reference backend for pairchat.
//!
//! Run with: cargo run -p pairchat-web-server
//!
//! Serves the chat page at `/web/`, the pairing link at `/pair` (and as a
//! QR code at `/pair.svg`), and a
//! streaming socket at `/ws` that answers every message with a reply
//! bracketed by `[START]` and `[END]`, one word per frame.

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json, Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use futures::{SinkExt, StreamExt};
use pairchat_core::{
    ClientConfig, ConnectionEndpoint, PairingLink,
    protocol::{END_SENTINEL, START_SENTINEL},
};
use qrcode::{QrCode, render::svg};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Delay between streamed words.
const WORD_DELAY: Duration = Duration::from_millis(40);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = ClientConfig::from_env()?;

    let app = Router::new()
        .route("/", get(|| async { Redirect::permanent("/web/") }))
        .route("/web/", get(index_handler))
        .route("/pair", get(pair_handler))
        .route("/pair.svg", get(pair_code_handler))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(config.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.backend_port));
    tracing::info!("Server listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Resolve the pairing link for the host the caller reached us on.
fn pairing_for(
    headers: &HeaderMap,
    config: &ClientConfig,
) -> Result<(PairingLink, ConnectionEndpoint), Response> {
    let Some(host) = headers.get(header::HOST).and_then(|h| h.to_str().ok()) else {
        return Err((StatusCode::BAD_REQUEST, "missing Host header").into_response());
    };
    let endpoint = ConnectionEndpoint::from_origin(&format!("http://{host}"), config)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()).into_response())?;
    Ok((PairingLink::for_endpoint(&endpoint, config), endpoint))
}

async fn pair_handler(State(config): State<ClientConfig>, headers: HeaderMap) -> Response {
    match pairing_for(&headers, &config) {
        Ok((link, endpoint)) => Json(serde_json::json!({
            "url": link.as_str(),
            "ws_url": endpoint.ws_url(),
        }))
        .into_response(),
        Err(response) => response,
    }
}

async fn pair_code_handler(State(config): State<ClientConfig>, headers: HeaderMap) -> Response {
    let link = match pairing_for(&headers, &config) {
        Ok((link, _)) => link,
        Err(response) => return response,
    };
    match pairing_svg(&link) {
        Ok(image) => ([(header::CONTENT_TYPE, "image/svg+xml")], image).into_response(),
        Err(e) => {
            tracing::error!("cannot encode pairing link: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Pairing link as an SVG QR code.
fn pairing_svg(link: &PairingLink) -> Result<String, qrcode::types::QrError> {
    let code = QrCode::new(link.as_str().as_bytes())?;
    Ok(code
        .render::<svg::Color<'_>>()
        .min_dimensions(256, 256)
        .build())
}

async fn ws_handler(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(handle_socket)
}

async fn handle_socket(socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    tracing::info!("client connected");

    while let Some(msg) = receiver.next().await {
        let prompt = match msg {
            Ok(Message::Text(t)) => t.as_str().to_owned(),
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!("WebSocket error: {e}");
                break;
            }
        };
        tracing::debug!(len = prompt.len(), "prompt received");

        if stream_reply(&mut sender, &prompt).await.is_err() {
            break;
        }
    }

    tracing::info!("client disconnected");
}

/// Stream one bracketed reply.
async fn stream_reply<S>(sender: &mut S, prompt: &str) -> Result<(), axum::Error>
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    sender.send(Message::Text(START_SENTINEL.into())).await?;
    for fragment in reply_fragments(prompt) {
        sender.send(Message::Text(fragment.into())).await?;
        tokio::time::sleep(WORD_DELAY).await;
    }
    sender.send(Message::Text(END_SENTINEL.into())).await
}

/// Split the reply into word fragments that concatenate back exactly.
fn reply_fragments(prompt: &str) -> Vec<String> {
    let reply = format!("You said: {prompt}");
    reply
        .split_inclusive(' ')
        .map(str::to_string)
        .collect()
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Pairchat</title>
    <style>
        body { margin: 0 auto; max-width: 48rem; padding: 20px; font-family: system-ui, sans-serif; }
        #log { height: 60vh; overflow-y: auto; border: 1px solid #ccc; padding: 12px; margin: 10px 0; }
        .entry { margin-bottom: 8px; white-space: pre-wrap; }
        .connected { color: #4a4; }
        .disconnected { color: #a44; }
    </style>
</head>
<body>
    <h1>Pairchat</h1>
    <div id="pair"></div>
    <div id="status" class="disconnected">Disconnected</div>
    <div id="log"></div>
    <input id="input" placeholder="Type your message..." />
    <button id="send" disabled>Send</button>

    <script>
        const log = document.getElementById('log');
        const status = document.getElementById('status');
        const input = document.getElementById('input');
        const button = document.getElementById('send');
        let open = null;

        const params = new URLSearchParams(window.location.search);
        if (params.get('interface') !== 'chat') {
            fetch('/pair').then(r => r.json()).then(p => {
                const pair = document.getElementById('pair');
                pair.textContent = 'Open on your phone: ' + p.url;
                const img = document.createElement('img');
                img.src = '/pair.svg';
                img.alt = p.url;
                pair.appendChild(document.createElement('br'));
                pair.appendChild(img);
            });
        }

        function append(sender, content) {
            const div = document.createElement('div');
            div.className = 'entry';
            div.innerHTML = '<b></b> <span></span>';
            div.querySelector('b').textContent = sender + ':';
            div.querySelector('span').textContent = content;
            log.appendChild(div);
            log.scrollTop = log.scrollHeight;
            return div.querySelector('span');
        }

        const ws = new WebSocket(`ws://${window.location.host}/ws`);
        ws.onopen = () => {
            status.textContent = 'Connected';
            status.className = 'connected';
            button.disabled = false;
        };
        ws.onclose = () => {
            status.textContent = 'Disconnected';
            status.className = 'disconnected';
            button.disabled = true;
        };
        ws.onmessage = (event) => {
            if (event.data === '[START]') {
                open = append('LLM', '');
            } else if (event.data === '[END]') {
                open = null;
            } else {
                if (open === null) open = append('LLM', '');
                open.textContent += event.data;
                log.scrollTop = log.scrollHeight;
            }
        };

        function send() {
            if (!input.value || ws.readyState !== WebSocket.OPEN) return;
            ws.send(input.value);
            append('You', input.value);
            input.value = '';
        }
        button.onclick = send;
        input.onkeydown = (e) => { if (e.key === 'Enter') send(); };
    </script>
</body>
</html>
"#;
