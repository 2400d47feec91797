//! Record store contract.
//!
//! The pipeline reads and writes simulation records only through
//! [`RecordStore`]. Status writes are atomic and guarded by the lifecycle:
//! `update_*` return `false` instead of overwriting a record whose current
//! status cannot move to the requested one.

mod memory;
mod postgres;

pub use memory::InMemoryRecordStore;
pub use postgres::PgRecordStore;

use async_trait::async_trait;
use swarmsim_core::lifecycle::SimulationStatus;
use swarmsim_core::simulation::SimulationParams;
use swarmsim_core::types::{MessageId, SimulationId};
use swarmsim_db::models::outbox::OutboxEntry;
use swarmsim_db::models::simulation::{ClaimOutcome, Simulation, SimulationListQuery, SimulationPage};

use crate::error::StoreError;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create a `queued` record and an outbox row carrying `payload` for
    /// `topic`, atomically.
    async fn create_with_outbox(
        &self,
        id: SimulationId,
        params: &SimulationParams,
        topic: &str,
        payload: &[u8],
    ) -> Result<Simulation, StoreError>;

    async fn find(&self, id: SimulationId) -> Result<Option<Simulation>, StoreError>;

    async fn list(&self, query: &SimulationListQuery) -> Result<SimulationPage, StoreError>;

    /// Move the record into `running` for the delivery `token`. Only a
    /// `queued` record, or a `running` one already held by `token`, is taken.
    async fn claim(&self, id: SimulationId, token: MessageId) -> Result<ClaimOutcome, StoreError>;

    async fn update_status(
        &self,
        id: SimulationId,
        status: SimulationStatus,
        error_message: Option<&str>,
    ) -> Result<bool, StoreError>;

    async fn update_status_and_result(
        &self,
        id: SimulationId,
        status: SimulationStatus,
        result: &serde_json::Value,
    ) -> Result<bool, StoreError>;

    /// Oldest unpublished outbox rows, at most `limit`.
    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxEntry>, StoreError>;

    async fn delete_outbox(&self, id: i64) -> Result<(), StoreError>;

    /// Confirm the backing store is reachable.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
