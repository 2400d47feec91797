//! Job submission.
//!
//! Submission never publishes to the queue directly: the record and an
//! outbox row holding the encoded message are written in one store
//! transaction, and [`OutboxRelay`](crate::outbox::OutboxRelay) publishes it
//! later.

use std::sync::Arc;

use swarmsim_core::message::{SimulationMessage, SIMULATIONS_TOPIC};
use swarmsim_core::simulation::SimulationParams;
use swarmsim_db::models::simulation::Simulation;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::store::RecordStore;

pub struct SimulationSubmitter {
    store: Arc<dyn RecordStore>,
}

impl SimulationSubmitter {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Validate `params` and record a new `queued` simulation.
    ///
    /// Returns as soon as the record is stored; execution happens later in
    /// a worker.
    pub async fn submit(&self, params: SimulationParams) -> Result<Simulation, PipelineError> {
        params.validate_params()?;

        let id = Uuid::now_v7();
        let payload = SimulationMessage::new(id, params.clone()).encode();
        let simulation = self
            .store
            .create_with_outbox(id, &params, SIMULATIONS_TOPIC, &payload)
            .await?;

        tracing::info!(
            simulation_id = %simulation.id,
            name = %simulation.name,
            behavior = %simulation.behavior,
            "Simulation queued",
        );
        Ok(simulation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use swarmsim_core::error::CoreError;
    use swarmsim_core::lifecycle::SimulationStatus;

    use crate::store::InMemoryRecordStore;

    #[tokio::test]
    async fn submit_creates_queued_record_and_outbox_row() {
        let store = Arc::new(InMemoryRecordStore::new());
        let submitter = SimulationSubmitter::new(store.clone());

        let simulation = submitter
            .submit(SimulationParams::new("A", "Random", 5, 50))
            .await
            .unwrap();

        assert_eq!(simulation.status, SimulationStatus::Queued);
        let outbox = store.pending_outbox(10).await.unwrap();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].topic, SIMULATIONS_TOPIC);

        let message = SimulationMessage::decode(&outbox[0].payload).unwrap();
        assert_eq!(message.simulation_id, simulation.id);
        assert_eq!(message.params, SimulationParams::new("A", "Random", 5, 50));
    }

    #[tokio::test]
    async fn invalid_params_are_not_stored() {
        let store = Arc::new(InMemoryRecordStore::new());
        let submitter = SimulationSubmitter::new(store.clone());

        let result = submitter
            .submit(SimulationParams::new("A", "Random", 0, 50))
            .await;

        assert_matches!(result, Err(PipelineError::Core(CoreError::Validation(_))));
        assert_eq!(store.outbox_len().await, 0);
    }
}
