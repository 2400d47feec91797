//! Durable queue rows.

use sqlx::FromRow;
use swarmsim_core::types::{MessageId, Timestamp};

/// A row from the `queue_messages` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct QueueMessage {
    pub id: MessageId,
    pub topic: String,
    pub payload: Vec<u8>,
    pub enqueued_at: Timestamp,
    /// Incremented on every lease, so the first delivery reads `1`.
    pub delivery_count: i32,
    pub leased_until: Option<Timestamp>,
}

/// A row from the `queue_dead_letters` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct DeadLetter {
    pub id: MessageId,
    pub topic: String,
    pub payload: Vec<u8>,
    pub enqueued_at: Timestamp,
    pub delivery_count: i32,
    pub reason: String,
    pub rejected_at: Timestamp,
}
