//! WebSocket feed for staff dashboards: live complaint events.
//!
//! On connect the client gets a `complaints_sync` with every unresolved
//! complaint, then each `ComplaintEvent` as it happens. A client that
//! falls behind the broadcast is re-synced instead of dropped.

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::model::ComplaintEvent;
use super::service::ComplaintService;
use crate::server::{ApiError, AppState};
use crate::session::Session;

/// Build the router for `/ws/complaints`.
pub fn complaint_ws_routes() -> Router<AppState> {
    Router::new().route("/ws/complaints", get(ws_handler))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    session: Session,
) -> Result<impl IntoResponse, ApiError> {
    session.require_staff("subscribe to the complaint feed")?;
    info!(user = %session.user_id, "Complaint WebSocket client connecting");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, session)))
}

/// Serialize and send one event. Returns false if the client is gone.
async fn send_event(socket: &mut WebSocket, event: &ComplaintEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize complaint event");
            true
        }
    }
}

async fn sync_message(service: &ComplaintService) -> Option<ComplaintEvent> {
    match service.unresolved().await {
        Ok(complaints) => Some(ComplaintEvent::ComplaintsSync { complaints }),
        Err(e) => {
            warn!(error = %e, "Failed to load complaints for sync");
            None
        }
    }
}

async fn handle_socket(mut socket: WebSocket, state: AppState, session: Session) {
    info!(user = %session.user_id, "Complaint WebSocket client connected");

    // Subscribe before the initial sync so nothing slips between the two.
    let mut rx = state.complaints.subscribe();

    if let Some(sync) = sync_message(&state.complaints).await {
        if !send_event(&mut socket, &sync).await {
            warn!("Failed to send initial complaint sync, client disconnected");
            return;
        }
    }

    loop {
        tokio::select! {
            // Forward broadcast events to this client
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if !send_event(&mut socket, &event).await {
                            debug!("Complaint WS client disconnected during send");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, user = %session.user_id, "Complaint WS client lagged behind broadcast");
                        if let Some(sync) = sync_message(&state.complaints).await {
                            if !send_event(&mut socket, &sync).await {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Complaint broadcast channel closed");
                        break;
                    }
                }
            }

            // The feed is read-only; only control frames matter
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(user = %session.user_id, "Complaint WebSocket client disconnected");
                        break;
                    }
                    Some(Ok(Message::Text(text))) => {
                        debug!(text = %text.as_str(), "Ignoring client message on read-only feed");
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Complaint WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("Complaint WebSocket connection closed");
}
