//! Outbox relay.
//!
//! Moves rows written by the submitter onto the queue. A row is deleted only
//! after its message was published, so a crash in between publishes the
//! message twice; the processor's guarded claim absorbs the duplicate.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::store::RecordStore;
use crate::transport::QueueTransport;

/// Default number of rows published per tick.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default interval between relay ticks.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

/// Shortest accepted interval between ticks.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

pub struct OutboxRelay {
    store: Arc<dyn RecordStore>,
    transport: Arc<dyn QueueTransport>,
    batch_size: usize,
    interval: Duration,
}

impl OutboxRelay {
    pub fn new(store: Arc<dyn RecordStore>, transport: Arc<dyn QueueTransport>) -> Self {
        Self {
            store,
            transport,
            batch_size: DEFAULT_BATCH_SIZE,
            interval: DEFAULT_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_INTERVAL);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Publish up to one batch of pending rows, oldest first. Returns the
    /// number published. Stops at the first publish failure; the remaining
    /// rows are retried on the next call.
    pub async fn relay_batch(&self) -> Result<usize, PipelineError> {
        let pending = self.store.pending_outbox(self.batch_size).await?;
        let mut published = 0;

        for entry in pending {
            let message_id = self.transport.publish(&entry.topic, &entry.payload).await?;
            self.store.delete_outbox(entry.id).await?;

            tracing::debug!(
                simulation_id = %entry.simulation_id,
                message_id = %message_id,
                topic = %entry.topic,
                "Outbox entry published",
            );
            published += 1;
        }

        Ok(published)
    }

    /// Run the relay loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            batch_size = self.batch_size,
            "Outbox relay started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Outbox relay shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.relay_batch().await {
                        Ok(0) => {}
                        Ok(published) => tracing::info!(published, "Outbox relay published messages"),
                        Err(e) => tracing::error!(error = %e, "Outbox relay cycle failed"),
                    }
                }
            }
        }
    }
}
