//! WebSocket Event Feed
//!
//! Streams committed protocol events to connected clients as JSON.
//!
//! - WS /ws/events - every event
//! - WS /ws/events/:qc - events concerning one custodian

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use super::middleware::ApiError;
use super::routes::parse_account;
use super::server::SharedApiState;
use crate::events::ProtocolEvent;
use crate::types::AccountId;

/// Route: /ws/events
pub async fn ws_events_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedApiState>,
) -> impl IntoResponse {
    let rx = state.service.subscribe();
    ws.on_upgrade(move |socket| handle_socket(socket, rx, None))
}

/// Route: /ws/events/:qc
pub async fn ws_custodian_events_handler(
    ws: WebSocketUpgrade,
    Path(qc): Path<String>,
    State(state): State<SharedApiState>,
) -> Result<impl IntoResponse, ApiError> {
    let qc = parse_account(&qc)?;
    let rx = state.service.subscribe();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, rx, Some(qc))))
}

/// Whether `event` passes the subscription filter
pub fn matches_filter(event: &ProtocolEvent, filter: Option<AccountId>) -> bool {
    match filter {
        Some(qc) => event.qc() == Some(qc),
        None => true,
    }
}

async fn handle_socket(
    socket: WebSocket,
    mut rx: broadcast::Receiver<ProtocolEvent>,
    filter: Option<AccountId>,
) {
    let (mut sender, mut receiver) = socket.split();

    let send_task = tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "WebSocket subscriber lagging, events dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if !matches_filter(&event, filter) {
                continue;
            }

            let json = match serde_json::to_string(&event) {
                Ok(j) => j,
                Err(_) => continue,
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) | Err(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }
    debug!(filter = ?filter, "WebSocket subscriber disconnected");
}
