//! Real-time notification channel.
//!
//! One socket per connecting identity. The session registers a connection
//! handle with the coordinator and forwards whatever notifications reach it
//! as JSON text frames.
//!
//! # Architecture
//!
//! ```text
//! Client          Session                 ConnectionRegistry
//!   │                │                            │
//!   ├─ Connect ─────>│                            │
//!   │                ├─ register(identity) ──────>│
//!   │                │                            │
//!   │                │<── Notification (mpsc) ────┤
//!   │<─ JSON text ───┤                            │
//!   │                │                            │
//!   ├─ Close ───────>│                            │
//!   │                ├─ unregister(identity) ────>│
//! ```
//!
//! Inbound frames are logged and otherwise ignored.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use rentwise_core::{Identity, RentalError, UserId};
use rentwise_runtime::Coordinator;

/// Upgrade to a notification session for `user_id`.
///
/// The user's role is read once, here, and fixed for the session.
///
/// # Endpoint
///
/// ```text
/// GET /ws/:user_id
/// ```
///
/// # Errors
///
/// `404` if the user does not exist.
pub async fn connect(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Response, AppError> {
    let user = state
        .users
        .find_by_key(user_id.as_str())
        .await
        .map_err(RentalError::from)?
        .ok_or_else(|| AppError::not_found("User", &user_id))?;

    let identity = user.identity();
    tracing::info!(identity = %identity.id, role = %identity.role, "WebSocket connection requested");
    let coordinator = state.coordinator.clone();
    Ok(ws.on_upgrade(move |socket| session(socket, coordinator, identity)))
}

/// Drive one session until either side closes.
///
/// The handle is unregistered on every exit path.
async fn session(socket: WebSocket, coordinator: Coordinator, identity: Identity) {
    let (handle, mut outbound) = coordinator.open_connection();
    let connection_id = handle.id();
    coordinator.registry().register(&identity, handle).await;

    let (mut sender, mut receiver) = socket.split();
    loop {
        tokio::select! {
            Some(notification) = outbound.recv() => {
                let text = match notification.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to serialize notification");
                        continue;
                    },
                };
                if sender.send(Message::Text(text)).await.is_err() {
                    tracing::debug!(identity = %identity.id, connection_id, "Client gone during send");
                    break;
                }
            },
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!(identity = %identity.id, connection_id, message = %text, "Inbound message");
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {},
                Some(Err(e)) => {
                    tracing::debug!(identity = %identity.id, connection_id, error = %e, "WebSocket error");
                    break;
                },
            },
        }
    }

    coordinator
        .registry()
        .unregister(&identity.id, connection_id)
        .await;
    tracing::info!(identity = %identity.id, connection_id, "WebSocket connection closed");
}
