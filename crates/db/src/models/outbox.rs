//! Submission outbox rows.

use sqlx::FromRow;
use swarmsim_core::types::{SimulationId, Timestamp};

/// A row from the `simulation_outbox` table: a message waiting to be
/// published by the relay.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct OutboxEntry {
    pub id: i64,
    pub simulation_id: SimulationId,
    pub topic: String,
    pub payload: Vec<u8>,
    pub created_at: Timestamp,
}
