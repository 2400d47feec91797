//! Queue transport contract.
//!
//! Delivery is at-least-once: a message handed out by
//! [`QueueTransport::receive`] stays leased to the caller until it is
//! acknowledged or rejected. A consumer that disappears without settling
//! leaves the message to be delivered again.

mod memory;
mod postgres;

pub use memory::{InMemoryQueue, RejectedMessage};
pub use postgres::{PgQueueTransport, DEFAULT_LEASE};

use async_trait::async_trait;
use swarmsim_core::types::MessageId;

use crate::error::TransportError;

/// A message leased to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: MessageId,
    pub topic: String,
    pub payload: Vec<u8>,
    /// 1 on first delivery, incremented on every redelivery.
    pub attempt: u32,
}

#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Durably append `payload` to `topic`.
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<MessageId, TransportError>;

    /// Lease the oldest available message on `topic`, if any.
    async fn receive(&self, topic: &str) -> Result<Option<Delivery>, TransportError>;

    /// Remove the message permanently.
    async fn ack(&self, delivery: &Delivery) -> Result<(), TransportError>;

    /// Remove the message without requeue, keeping a dead-letter copy.
    async fn reject(&self, delivery: &Delivery, reason: &str) -> Result<(), TransportError>;

    /// Keep the lease on a message that is still being worked on.
    async fn extend_lease(&self, _delivery: &Delivery) -> Result<(), TransportError> {
        Ok(())
    }

    /// Messages on `topic` not yet acknowledged or rejected.
    async fn depth(&self, topic: &str) -> Result<usize, TransportError>;
}
