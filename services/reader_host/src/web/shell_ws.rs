//! services/reader_host/src/web/shell_ws.rs
//!
//! The WebSocket endpoint the native shell connects to. Host commands are
//! forwarded down the socket; SDK signals coming back up are routed to the
//! matching ad gateway.

use crate::web::{protocol::ShellMessage, state::AppState};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

/// The handler for upgrading the shell's HTTP request to a WebSocket connection.
pub async fn shell_ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_shell(socket, app_state))
}

async fn handle_shell(socket: WebSocket, app_state: Arc<AppState>) {
    info!("Native shell connected.");

    let (mut sender, mut receiver) = socket.split();
    let mut commands = app_state.shell.subscribe();

    // --- 1. Host -> shell forwarding ---
    let forward = tokio::spawn(async move {
        loop {
            match commands.recv().await {
                Ok(command) => {
                    let json = match serde_json::to_string(&command) {
                        Ok(json) => json,
                        Err(e) => {
                            error!("Failed to serialize shell command: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        warn!("Failed to send command to shell. Ending forwarder.");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Shell fell behind; commands were dropped.");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // A freshly connected shell can start filling both ad units.
    app_state.preload_ads().await;

    // --- 2. Shell -> host event loop ---
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ShellMessage>(text.as_str()) {
                Ok(shell_msg) => {
                    let (unit, event) = shell_msg.into_ad_event();
                    app_state.dispatch_ad_event(unit, event).await;
                }
                Err(e) => {
                    warn!("Failed to deserialize shell message: {}", e);
                }
            },
            Message::Close(_) => {
                info!("Shell sent close message.");
                break;
            }
            _ => {}
        }
    }

    // --- 3. Cleanup ---
    // Wait for the forwarder so its subscription no longer counts as connected.
    forward.abort();
    let _ = forward.await;
    app_state.shell_disconnected().await;
    info!("Native shell disconnected.");
}
