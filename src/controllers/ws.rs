use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::services::broadcast::ShowEvent;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/ws/shows/{show_id}", get(subscribe_show))
}

/// GET /api/ws/shows/{show_id}
///
/// Streams the broadcaster's seat deltas for one show as JSON text frames.
/// The stream is lossy; a client that lags re-fetches the seat list.
async fn subscribe_show(
    State(state): State<Arc<AppState>>,
    Path(show_id): Path<i64>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    let receiver = state.broadcaster.subscribe(show_id);
    upgrade.on_upgrade(move |socket| forward_events(socket, receiver, show_id))
}

async fn forward_events(
    mut socket: WebSocket,
    mut receiver: broadcast::Receiver<ShowEvent>,
    show_id: i64,
) {
    loop {
        tokio::select! {
            event = receiver.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(show_id, skipped, "viewer lagged behind seat updates");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                let retired = matches!(event, ShowEvent::ShowRetired { .. });
                let Ok(text) = serde_json::to_string(&event) else {
                    continue;
                };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
                if retired {
                    break;
                }
            }
            // Drain (and ignore) anything the client sends; a closed socket
            // ends the task.
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(_)) => continue,
                    _ => break,
                }
            }
        }
    }
    debug!(show_id, "viewer disconnected");
}
