use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use serde_json::json;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::state::AppState;

/// `GET /ws`: notices and state changes. The first frame is a `hello`
/// carrying the current session and contract snapshot.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let rx = state.events.subscribe();
    let session = state.session.current();
    let hello = json!({
        "type": "hello",
        "state": session.state(),
        "session": session,
        "contract": state.reconciler.snapshot(),
    })
    .to_string();
    ws.on_upgrade(move |socket| stream_events(socket, hello, rx))
}

async fn stream_events(mut socket: WebSocket, hello: String, mut rx: broadcast::Receiver<String>) {
    tracing::info!("event stream opened");
    if socket.send(Message::Text(hello.into())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(text) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "event stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Ping(data))) => {
                    if socket.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Clients only listen.
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::info!("event stream closed");
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/ws", get(ws_handler))
}
