use inkroom_shared::{ClientMessage, ServerMessage};

use crate::error::RelayError;
use crate::registry::ConnectionId;
use crate::state::AppState;
use crate::storage::{validate_room_id, ChatRecord, ShapeRecord};

/// The authenticated side of one socket.
#[derive(Clone, Debug)]
pub struct Peer {
    pub user_id: String,
    pub connection_id: ConnectionId,
}

pub fn parse_client_message(text: &str) -> Result<ClientMessage, RelayError> {
    serde_json::from_str(text).map_err(|error| RelayError::Validation {
        kind: "unknown",
        reason: error.to_string(),
    })
}

/// Handles one inbound event. Chat and shape events are written to the
/// store before they are fanned out; a failed write means no fan-out.
/// Events from a connection that a newer login replaced are refused before
/// anything is stored.
pub async fn apply_client_message(
    state: &AppState,
    peer: &Peer,
    message: ClientMessage,
) -> Result<(), RelayError> {
    let kind = message.kind();
    if message.room_id().is_empty() {
        return Err(invalid(kind, "missing roomId"));
    }
    validate_room_id(message.room_id()).map_err(|error| invalid(kind, error.to_string()))?;
    if !state
        .router
        .is_current(&peer.user_id, peer.connection_id)
        .await?
    {
        return Err(RelayError::Evicted {
            connection: peer.connection_id,
        });
    }

    match message {
        ClientMessage::JoinRoom { room_id } => {
            state
                .router
                .join_room(&peer.user_id, peer.connection_id, room_id)
        }
        ClientMessage::LeaveRoom { room_id } => {
            state
                .router
                .leave_room(&peer.user_id, peer.connection_id, room_id)
        }
        ClientMessage::Chat {
            room_id, message, ..
        } => {
            if message.trim().is_empty() {
                return Err(invalid(kind, "empty message"));
            }
            state
                .store
                .append_chat(ChatRecord::new(
                    room_id.clone(),
                    &peer.user_id,
                    message.clone(),
                ))
                .await
                .map_err(|source| RelayError::Persistence {
                    kind,
                    room: room_id.to_string(),
                    source,
                })?;
            let delivered = state
                .router
                .broadcast(ServerMessage::Chat {
                    room_id: room_id.clone(),
                    user_id: peer.user_id.clone(),
                    message,
                })
                .await?;
            tracing::debug!(user = %peer.user_id, room = %room_id, delivered, "chat relayed");
            Ok(())
        }
        ClientMessage::ChatShape { room_id, shape, .. } => {
            if shape.is_null() {
                return Err(invalid(kind, "missing shape"));
            }
            state
                .store
                .append_shape(ShapeRecord::new(
                    room_id.clone(),
                    &peer.user_id,
                    shape.clone(),
                ))
                .await
                .map_err(|source| RelayError::Persistence {
                    kind,
                    room: room_id.to_string(),
                    source,
                })?;
            let delivered = state
                .router
                .broadcast(ServerMessage::ChatShape {
                    room_id: room_id.clone(),
                    user_id: peer.user_id.clone(),
                    shape,
                })
                .await?;
            tracing::debug!(user = %peer.user_id, room = %room_id, delivered, "shape relayed");
            Ok(())
        }
    }
}

fn invalid(kind: &'static str, reason: impl Into<String>) -> RelayError {
    RelayError::Validation {
        kind,
        reason: reason.into(),
    }
}
