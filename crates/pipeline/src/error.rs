use swarmsim_core::error::CoreError;
use swarmsim_core::types::MessageId;

/// Failure talking to the record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Record store unavailable: {0}")]
    Unavailable(String),
}

/// Failure talking to the queue transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The message is no longer held by this consumer (already settled, or
    /// its lease lapsed and it was settled elsewhere).
    #[error("Unknown delivery: {0}")]
    UnknownDelivery(MessageId),

    #[error("Queue transport unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
