//! Push channel over websocket.
//!
//! One sender task per connection merges broadcast updates and direct replies;
//! inbound frames are handled on the connection's own task.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use relay_core::Relay;
use relay_core::domain::{ClientMessage, ServerMessage};
use tokio::sync::mpsc;

use crate::http::AppState;

const REPLY_CAPACITY: usize = 16;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.relay))
}

/// `None` for anything that is not a known client message.
pub fn parse_frame(text: &str) -> Option<ClientMessage> {
    match serde_json::from_str(text) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::warn!(error = %e, frame = text, "ignoring unparsable frame");
            None
        }
    }
}

async fn handle_socket(socket: WebSocket, relay: Arc<Relay>) {
    let (subscriber, mut updates) = relay.subscribe().await;
    let (mut sink, mut stream) = socket.split();
    let (reply_tx, mut replies) = mpsc::channel::<ServerMessage>(REPLY_CAPACITY);

    let send_task = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                Some(message) = replies.recv() => message,
                Some(message) = updates.recv() => message,
                else => break,
            };
            let frame = match message.to_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(subscriber = %subscriber, error = %e, "cannot encode frame");
                    continue;
                }
            };
            if sink.send(Message::Text(frame.into())).await.is_err() {
                tracing::debug!(subscriber = %subscriber, "websocket sink closed");
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let Some(message) = parse_frame(text.as_str()) else {
                    continue;
                };
                if let Some(reply) = relay.handle_message(message).await {
                    if reply_tx.send(reply).await.is_err() {
                        break;
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(subscriber = %subscriber, error = %e, "websocket receive error");
                break;
            }
        }
    }

    relay.unsubscribe(subscriber).await;
    send_task.abort();
}
