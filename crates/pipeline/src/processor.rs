//! Job processor: the worker's consumption loop.
//!
//! At most one message is unsettled at any instant. A message is received,
//! decoded, claimed, executed, written to its terminal status, and only then
//! acknowledged. Anything that prevents a confirmed terminal write ends in a
//! reject without requeue, so the transport keeps a dead-letter copy with the
//! reason.

use std::sync::Arc;
use std::time::Duration;

use swarmsim_core::lifecycle::SimulationStatus;
use swarmsim_core::message::{SimulationMessage, SIMULATIONS_TOPIC};
use swarmsim_core::workload::{Workload, WorkloadError, WorkloadOutcome};
use swarmsim_db::models::simulation::ClaimOutcome;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::{PipelineError, StoreError, TransportError};
use crate::store::RecordStore;
use crate::transport::{Delivery, QueueTransport};

/// Default polling interval for the processor loop.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default lease renewal period; a third of the default transport lease.
const DEFAULT_LEASE_RENEWAL: Duration = Duration::from_secs(20);

/// Shortest accepted poll or renewal period. Timers cannot tick at zero.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// How a delivery was handled, and therefore how it is settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Record moved to `done`. Acked.
    Completed,
    /// Record moved to `failed` by the workload. Acked.
    Failed,
    /// Duplicate delivery for a finished or otherwise held record. Acked
    /// without running the workload.
    Skipped,
    /// Dropped without requeue.
    Rejected { reason: String },
}

/// Settings for a [`JobProcessor`].
///
/// Zero periods are raised to one millisecond by [`JobProcessor::new`].
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Topic the processor consumes (default: `simulations`).
    pub topic: String,
    /// Delay between polls of an empty topic.
    pub poll_interval: Duration,
    /// How often the lease of the in-flight message is extended while the
    /// workload runs. Must be shorter than the transport lease.
    pub lease_renewal: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            topic: SIMULATIONS_TOPIC.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            lease_renewal: DEFAULT_LEASE_RENEWAL,
        }
    }
}

/// Single-consumer job processor.
///
/// Pulls one message at a time from the transport, drives the record through
/// `running` to its terminal status, and settles the message only after the
/// terminal write is confirmed.
pub struct JobProcessor {
    store: Arc<dyn RecordStore>,
    transport: Arc<dyn QueueTransport>,
    workload: Arc<dyn Workload>,
    config: ProcessorConfig,
    /// A handled delivery whose ack/reject did not go through. Settled
    /// before anything new is received.
    unsettled: Mutex<Option<(Delivery, Disposition)>>,
}

impl JobProcessor {
    /// Create a processor over the given store, transport and workload.
    pub fn new(
        store: Arc<dyn RecordStore>,
        transport: Arc<dyn QueueTransport>,
        workload: Arc<dyn Workload>,
        mut config: ProcessorConfig,
    ) -> Self {
        if config.poll_interval < MIN_PERIOD || config.lease_renewal < MIN_PERIOD {
            tracing::warn!(
                poll_interval_ms = config.poll_interval.as_millis() as u64,
                lease_renewal_ms = config.lease_renewal.as_millis() as u64,
                "Processor periods below 1 ms raised to 1 ms",
            );
            config.poll_interval = config.poll_interval.max(MIN_PERIOD);
            config.lease_renewal = config.lease_renewal.max(MIN_PERIOD);
        }

        Self {
            store,
            transport,
            workload,
            config,
            unsettled: Mutex::new(None),
        }
    }

    /// Run the processor loop until the cancellation token is triggered.
    ///
    /// A message already being handled is finished before the loop exits.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        tracing::info!(
            topic = %self.config.topic,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Job processor started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Job processor shutting down");
                    break;
                }
                _ = ticker.tick() => self.drain(&cancel).await,
            }
        }
    }

    /// Handle messages one at a time until the topic is empty.
    async fn drain(&self, cancel: &CancellationToken) {
        while !cancel.is_cancelled() {
            match self.process_next().await {
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "Processing cycle failed");
                    break;
                }
            }
        }
    }

    /// Receive and fully handle one message. Returns `None` when the topic
    /// is empty.
    pub async fn process_next(&self) -> Result<Option<Disposition>, PipelineError> {
        let mut unsettled = self.unsettled.lock().await;
        if let Some((delivery, disposition)) = unsettled.take() {
            self.settle_pending(&mut unsettled, delivery, disposition).await?;
        }

        let Some(delivery) = self.transport.receive(&self.config.topic).await? else {
            return Ok(None);
        };

        let disposition = self.handle(&delivery).await;
        self.settle_pending(&mut unsettled, delivery, disposition.clone())
            .await?;
        Ok(Some(disposition))
    }

    /// Settle a handled delivery, parking it in `slot` if the transport
    /// could not be reached.
    async fn settle_pending(
        &self,
        slot: &mut Option<(Delivery, Disposition)>,
        delivery: Delivery,
        disposition: Disposition,
    ) -> Result<(), PipelineError> {
        match self.settle(&delivery, &disposition).await {
            Ok(()) => Ok(()),
            Err(TransportError::UnknownDelivery(id)) => {
                // The lease lapsed and the message was settled by another
                // consumer; nothing is left to settle here.
                tracing::warn!(message_id = %id, "Delivery no longer held, dropping settlement");
                Ok(())
            }
            Err(e) => {
                *slot = Some((delivery, disposition));
                Err(e.into())
            }
        }
    }

    async fn settle(&self, delivery: &Delivery, disposition: &Disposition) -> Result<(), TransportError> {
        match disposition {
            Disposition::Rejected { reason } => {
                tracing::warn!(message_id = %delivery.id, reason = %reason, "Rejecting message");
                self.transport.reject(delivery, reason).await
            }
            _ => self.transport.ack(delivery).await,
        }
    }

    /// Handle one delivery up to, but not including, settlement.
    pub async fn handle(&self, delivery: &Delivery) -> Disposition {
        let message = match SimulationMessage::decode(&delivery.payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(message_id = %delivery.id, error = %e, "Malformed message payload");
                return Disposition::Rejected {
                    reason: format!("malformed payload: {e}"),
                };
            }
        };

        let span = tracing::info_span!(
            "simulation",
            simulation_id = %message.simulation_id,
            message_id = %delivery.id,
            attempt = delivery.attempt,
        );
        self.handle_message(delivery, message).instrument(span).await
    }

    async fn handle_message(&self, delivery: &Delivery, message: SimulationMessage) -> Disposition {
        let id = message.simulation_id;

        match self.store.claim(id, delivery.id).await {
            Ok(ClaimOutcome::Claimed) => {
                tracing::info!("Simulation running");
            }
            Ok(ClaimOutcome::AlreadyTerminal(status)) => {
                tracing::info!(status = %status, "Duplicate delivery for finished simulation");
                return Disposition::Skipped;
            }
            Ok(ClaimOutcome::HeldByOther) => {
                tracing::info!("Simulation is running under another delivery");
                return Disposition::Skipped;
            }
            Ok(ClaimOutcome::Missing) => {
                tracing::warn!("Message references an unknown simulation");
                return Disposition::Rejected {
                    reason: format!("simulation {id} not found"),
                };
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to claim simulation");
                return Disposition::Rejected {
                    reason: format!("claim failed: {e}"),
                };
            }
        }

        let outcome = self.execute_with_lease(delivery, &message).await;

        match outcome {
            Ok(WorkloadOutcome::Completed(result)) => {
                let write = self
                    .store
                    .update_status_and_result(id, SimulationStatus::Done, &result)
                    .await;
                self.confirm_terminal(write, SimulationStatus::Done, Disposition::Completed)
            }
            Ok(WorkloadOutcome::Failed { reason }) => {
                tracing::warn!(reason = %reason, "Workload reported failure");
                let write = self
                    .store
                    .update_status(id, SimulationStatus::Failed, Some(&reason))
                    .await;
                self.confirm_terminal(write, SimulationStatus::Failed, Disposition::Failed)
            }
            Err(e) => {
                // The record stays `running`; the dead letter keeps the cause.
                tracing::error!(error = %e, "Workload errored");
                Disposition::Rejected {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Run the workload, extending the message lease every
    /// `lease_renewal` until it returns.
    async fn execute_with_lease(
        &self,
        delivery: &Delivery,
        message: &SimulationMessage,
    ) -> Result<WorkloadOutcome, WorkloadError> {
        let renewal = self.config.lease_renewal;
        let mut renew = tokio::time::interval_at(Instant::now() + renewal, renewal);
        let work = self.workload.execute(&message.params);
        tokio::pin!(work);

        loop {
            tokio::select! {
                outcome = &mut work => return outcome,
                _ = renew.tick() => {
                    if let Err(e) = self.transport.extend_lease(delivery).await {
                        tracing::warn!(error = %e, "Failed to extend message lease");
                    }
                }
            }
        }
    }

    /// Map the result of a terminal write to a disposition. Only a write
    /// that updated the record lets the message be acknowledged.
    fn confirm_terminal(
        &self,
        write: Result<bool, StoreError>,
        status: SimulationStatus,
        confirmed: Disposition,
    ) -> Disposition {
        match write {
            Ok(true) => {
                tracing::info!(status = %status, "Simulation finished");
                confirmed
            }
            Ok(false) => {
                tracing::error!(status = %status, "Terminal write matched no running record");
                Disposition::Rejected {
                    reason: format!("terminal write to {status} matched no running record"),
                }
            }
            Err(e) => {
                tracing::error!(status = %status, error = %e, "Terminal write failed");
                Disposition::Rejected {
                    reason: format!("terminal write to {status} failed: {e}"),
                }
            }
        }
    }
}
