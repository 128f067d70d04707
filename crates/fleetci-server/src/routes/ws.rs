use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::realtime;
use crate::routes::events::Registration;
use crate::state::AppState;

const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct AuthFrame {
    #[serde(rename = "type")]
    kind: String,
    identity: String,
}

/// GET /ws: push channel. The client must send
/// `{"type": "auth", "identity": "..."}` as its first frame.
pub async fn ws_handler(ws: WebSocketUpgrade, State(app): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(app, socket))
}

async fn reject(mut socket: WebSocket, reason: &str) {
    let frame = serde_json::json!({ "type": "error", "data": { "error": reason } });
    let _ = socket.send(Message::Text(frame.to_string().into())).await;
    let _ = socket.send(Message::Close(None)).await;
}

async fn handle_socket(app: AppState, mut socket: WebSocket) {
    let auth_timeout = app.config.realtime.auth_timeout();
    let received = tokio::time::timeout(auth_timeout, socket.recv()).await;
    let first = match received {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(_))) => return reject(socket, "expected an auth frame").await,
        Ok(_) => return,
        Err(_) => {
            debug!("websocket closed: no auth frame in time");
            return reject(socket, "auth timeout").await;
        }
    };

    let frame: AuthFrame = match serde_json::from_str(first.as_str()) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "malformed websocket auth frame");
            return reject(socket, "malformed auth frame").await;
        }
    };
    if frame.kind != "auth" {
        return reject(socket, "expected an auth frame").await;
    }
    let principal = match app.access.authenticate(&frame.identity) {
        Ok(principal) => principal,
        Err(e) => {
            warn!(identity = %frame.identity, "websocket auth rejected");
            return reject(socket, &e.to_string()).await;
        }
    };

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = realtime::channel();
    let conn_id = app.broadcaster.register(&principal.identity, tx);
    let _registration =
        Registration::new(app.broadcaster.clone(), principal.identity.clone(), conn_id);
    info!(identity = %principal.identity, conn_id, "websocket connected");

    // The writer ends when the registry drops our sender (a newer connection
    // for the same identity replaced this one) or a write stalls.
    let mut write_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&*event) else {
                continue;
            };
            let send = ws_sender.send(Message::Text(text.into()));
            match tokio::time::timeout(WRITE_TIMEOUT, send).await {
                Ok(Ok(())) => {}
                _ => return,
            }
        }
        let _ = tokio::time::timeout(WRITE_TIMEOUT, ws_sender.send(Message::Close(None))).await;
    });

    loop {
        tokio::select! {
            _ = &mut write_task => {
                debug!(identity = %principal.identity, conn_id, "websocket writer finished");
                break;
            }
            next = ws_receiver.next() => match next {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(identity = %principal.identity, error = %e, "websocket read error");
                    break;
                }
            },
        }
    }

    write_task.abort();
    info!(identity = %principal.identity, conn_id, "websocket disconnected");
}
