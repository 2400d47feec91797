use std::time::Duration;

use async_trait::async_trait;
use swarmsim_core::types::MessageId;
use swarmsim_db::models::queue::{DeadLetter, QueueMessage};
use swarmsim_db::repositories::QueueRepo;
use swarmsim_db::DbPool;

use super::{Delivery, QueueTransport};
use crate::error::TransportError;

/// Default time a received message stays invisible to other consumers.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(60);

/// [`QueueTransport`] backed by the `queue_messages` table.
///
/// A message whose lease lapses without ack or reject becomes receivable
/// again, which is how a crashed consumer's work is redelivered.
#[derive(Clone)]
pub struct PgQueueTransport {
    pool: DbPool,
    lease: Duration,
}

impl PgQueueTransport {
    pub fn new(pool: DbPool, lease: Duration) -> Self {
        Self { pool, lease }
    }

    /// Most recent dead letters on `topic`.
    pub async fn dead_letters(&self, topic: &str, limit: i64) -> Result<Vec<DeadLetter>, TransportError> {
        Ok(QueueRepo::dead_letters(&self.pool, topic, limit).await?)
    }
}

impl From<QueueMessage> for Delivery {
    fn from(message: QueueMessage) -> Self {
        Self {
            id: message.id,
            topic: message.topic,
            payload: message.payload,
            attempt: u32::try_from(message.delivery_count).unwrap_or(0),
        }
    }
}

#[async_trait]
impl QueueTransport for PgQueueTransport {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<MessageId, TransportError> {
        Ok(QueueRepo::publish(&self.pool, topic, payload).await?)
    }

    async fn receive(&self, topic: &str) -> Result<Option<Delivery>, TransportError> {
        let message = QueueRepo::lease_next(&self.pool, topic, self.lease).await?;
        Ok(message.map(Delivery::from))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), TransportError> {
        if !QueueRepo::delete(&self.pool, delivery.id).await? {
            return Err(TransportError::UnknownDelivery(delivery.id));
        }
        Ok(())
    }

    async fn reject(&self, delivery: &Delivery, reason: &str) -> Result<(), TransportError> {
        if !QueueRepo::dead_letter(&self.pool, delivery.id, reason).await? {
            return Err(TransportError::UnknownDelivery(delivery.id));
        }
        Ok(())
    }

    async fn extend_lease(&self, delivery: &Delivery) -> Result<(), TransportError> {
        if !QueueRepo::extend_lease(&self.pool, delivery.id, self.lease).await? {
            return Err(TransportError::UnknownDelivery(delivery.id));
        }
        Ok(())
    }

    async fn depth(&self, topic: &str) -> Result<usize, TransportError> {
        let depth = QueueRepo::depth(&self.pool, topic).await?;
        Ok(usize::try_from(depth).unwrap_or(0))
    }
}
