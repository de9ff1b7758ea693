use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token missing")]
    MissingToken,
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("token has no user id")]
    MissingUserId,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid room id {0:?}")]
    InvalidRoom(String),
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("s3 error: {0}")]
    S3(String),
}

/// Failure kinds of a single inbound socket event. None of them close the
/// connection; the dispatcher logs and moves on.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("dropped {kind} event: {reason}")]
    Validation { kind: &'static str, reason: String },
    #[error("persisting {kind} for room {room} failed: {source}")]
    Persistence {
        kind: &'static str,
        room: String,
        #[source]
        source: StoreError,
    },
    /// One peer's outbound channel is gone; the rest of the room still
    /// receives the event.
    #[error("delivery to connection {connection} in room {room} failed")]
    Delivery { connection: uuid::Uuid, room: String },
    #[error("connection {connection} was replaced by a newer login")]
    Evicted { connection: uuid::Uuid },
    #[error("room router is no longer running")]
    RouterClosed,
}
