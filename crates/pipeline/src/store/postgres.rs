use async_trait::async_trait;
use swarmsim_core::lifecycle::SimulationStatus;
use swarmsim_core::simulation::SimulationParams;
use swarmsim_core::types::{MessageId, SimulationId};
use swarmsim_db::models::outbox::OutboxEntry;
use swarmsim_db::models::simulation::{ClaimOutcome, Simulation, SimulationListQuery, SimulationPage};
use swarmsim_db::repositories::{OutboxRepo, SimulationRepo};
use swarmsim_db::DbPool;

use super::RecordStore;
use crate::error::StoreError;

/// [`RecordStore`] backed by the `simulations` and `simulation_outbox`
/// tables.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: DbPool,
}

impl PgRecordStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn create_with_outbox(
        &self,
        id: SimulationId,
        params: &SimulationParams,
        topic: &str,
        payload: &[u8],
    ) -> Result<Simulation, StoreError> {
        Ok(SimulationRepo::create_with_outbox(&self.pool, id, params, topic, payload).await?)
    }

    async fn find(&self, id: SimulationId) -> Result<Option<Simulation>, StoreError> {
        Ok(SimulationRepo::find_by_id(&self.pool, id).await?)
    }

    async fn list(&self, query: &SimulationListQuery) -> Result<SimulationPage, StoreError> {
        Ok(SimulationRepo::list(&self.pool, query).await?)
    }

    async fn claim(&self, id: SimulationId, token: MessageId) -> Result<ClaimOutcome, StoreError> {
        Ok(SimulationRepo::claim(&self.pool, id, token).await?)
    }

    async fn update_status(
        &self,
        id: SimulationId,
        status: SimulationStatus,
        error_message: Option<&str>,
    ) -> Result<bool, StoreError> {
        Ok(SimulationRepo::update_status(&self.pool, id, status, error_message).await?)
    }

    async fn update_status_and_result(
        &self,
        id: SimulationId,
        status: SimulationStatus,
        result: &serde_json::Value,
    ) -> Result<bool, StoreError> {
        Ok(SimulationRepo::update_status_and_result(&self.pool, id, status, result).await?)
    }

    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxEntry>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        Ok(OutboxRepo::pending(&self.pool, limit).await?)
    }

    async fn delete_outbox(&self, id: i64) -> Result<(), StoreError> {
        Ok(OutboxRepo::delete(&self.pool, id).await?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(swarmsim_db::health_check(&self.pool).await?)
    }
}
