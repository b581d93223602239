use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use serde_json::json;
use tracing::debug;

use crate::api::state::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let (id, mut rx) = state.hub.register();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    // Set once a ping goes unanswered; a `pong` (or any inbound frame)
    // clears it. If it elapses before that, the connection is closed.
    let mut pong_deadline: Option<tokio::time::Instant> = None;

    loop {
        let deadline_sleep = async {
            match pong_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            Some(envelope) = rx.recv() => {
                let msg = serde_json::to_string(&envelope).unwrap_or_else(|_| "{}".to_string());
                if socket.send(Message::Text(msg)).await.is_err() {
                    break;
                }
            }
            _ = heartbeat.tick(), if pong_deadline.is_none() => {
                let ping = serde_json::to_string(&json!({ "type": "ping" })).unwrap();
                if socket.send(Message::Text(ping)).await.is_err() {
                    break;
                }
                pong_deadline = Some(tokio::time::Instant::now() + HEARTBEAT_TIMEOUT);
            }
            _ = deadline_sleep => {
                debug!(subscriber = %id, "heartbeat timeout, closing connection");
                break;
            }
            frame = socket.recv() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        pong_deadline = None;
                        handle_inbound(&text, &mut socket).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    state.hub.remove(id);
}

async fn handle_inbound(text: &str, socket: &mut WebSocket) {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        return;
    };
    match value.get("type").and_then(|t| t.as_str()) {
        Some("ping") => {
            let pong = json!({ "type": "pong" });
            let _ = socket.send(Message::Text(pong.to_string())).await;
        }
        Some("pong") | Some("connection_check") => {}
        _ => {}
    }
}
