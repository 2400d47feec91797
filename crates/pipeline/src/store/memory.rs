use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use swarmsim_core::lifecycle::SimulationStatus;
use swarmsim_core::simulation::SimulationParams;
use swarmsim_core::types::{MessageId, SimulationId};
use swarmsim_db::models::outbox::OutboxEntry;
use swarmsim_db::models::simulation::{
    ClaimOutcome, Simulation, SimulationListQuery, SimulationPage, SimulationSort, SortOrder,
};
use tokio::sync::Mutex;

use super::RecordStore;
use crate::error::StoreError;

#[derive(Default)]
struct StoreState {
    records: HashMap<SimulationId, Simulation>,
    /// Every status each record has held, in order.
    history: HashMap<SimulationId, Vec<SimulationStatus>>,
    outbox: BTreeMap<i64, OutboxEntry>,
    next_outbox_id: i64,
}

impl StoreState {
    /// Apply `status` if the lifecycle allows it from the current status.
    fn transition(&mut self, id: SimulationId, status: SimulationStatus) -> Option<&mut Simulation> {
        let record = self.records.get_mut(&id)?;
        if !record.status.can_transition_to(status) {
            return None;
        }
        record.status = status;
        record.updated_at = Utc::now();
        self.history.entry(id).or_default().push(status);
        Some(record)
    }
}

/// [`RecordStore`] kept in process memory. Used by tests and local runs
/// without a database; applies the same lifecycle guards as
/// [`PgRecordStore`](super::PgRecordStore).
#[derive(Default)]
pub struct InMemoryRecordStore {
    state: Mutex<StoreState>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statuses the record has held since creation, oldest first.
    pub async fn history(&self, id: SimulationId) -> Vec<SimulationStatus> {
        self.state
            .lock()
            .await
            .history
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn outbox_len(&self) -> usize {
        self.state.lock().await.outbox.len()
    }
}

fn compare(a: &Simulation, b: &Simulation, sort: SimulationSort) -> Ordering {
    let primary = match sort {
        SimulationSort::CreatedAt => a.created_at.cmp(&b.created_at),
        SimulationSort::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SimulationSort::Name => a.name.cmp(&b.name),
        SimulationSort::Status => a.status.as_str().cmp(b.status.as_str()),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn create_with_outbox(
        &self,
        id: SimulationId,
        params: &SimulationParams,
        topic: &str,
        payload: &[u8],
    ) -> Result<Simulation, StoreError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let record = Simulation::queued(id, params, now);

        state.records.insert(id, record.clone());
        state.history.insert(id, vec![SimulationStatus::Queued]);

        state.next_outbox_id += 1;
        let outbox_id = state.next_outbox_id;
        state.outbox.insert(
            outbox_id,
            OutboxEntry {
                id: outbox_id,
                simulation_id: id,
                topic: topic.to_string(),
                payload: payload.to_vec(),
                created_at: now,
            },
        );

        Ok(record)
    }

    async fn find(&self, id: SimulationId) -> Result<Option<Simulation>, StoreError> {
        Ok(self.state.lock().await.records.get(&id).cloned())
    }

    async fn list(&self, query: &SimulationListQuery) -> Result<SimulationPage, StoreError> {
        let state = self.state.lock().await;
        let search = query.search().map(str::to_lowercase);
        let behavior = query.behavior_filter();

        let mut matches: Vec<Simulation> = state
            .records
            .values()
            .filter(|r| search.as_deref().map_or(true, |q| r.name.to_lowercase().contains(q)))
            .filter(|r| query.status.map_or(true, |s| r.status == s))
            .filter(|r| behavior.map_or(true, |b| r.behavior == b))
            .cloned()
            .collect();

        let sort = query.sort.unwrap_or_default();
        matches.sort_by(|a, b| compare(a, b, sort));
        if query.order.unwrap_or_default() == SortOrder::Desc {
            matches.reverse();
        }

        let total = matches.len() as i64;
        let items = matches
            .into_iter()
            .skip(usize::try_from(query.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(query.limit()).unwrap_or(usize::MAX))
            .collect();

        Ok(SimulationPage {
            items,
            page: query.page(),
            limit: query.limit(),
            total,
        })
    }

    async fn claim(&self, id: SimulationId, token: MessageId) -> Result<ClaimOutcome, StoreError> {
        let mut state = self.state.lock().await;
        let Some(record) = state.records.get(&id) else {
            return Ok(ClaimOutcome::Missing);
        };

        let outcome = match record.status {
            SimulationStatus::Queued => ClaimOutcome::Claimed,
            SimulationStatus::Running if record.claim_token == Some(token) => ClaimOutcome::Claimed,
            SimulationStatus::Running => ClaimOutcome::HeldByOther,
            terminal => ClaimOutcome::AlreadyTerminal(terminal),
        };

        if outcome == ClaimOutcome::Claimed {
            if let Some(record) = state.transition(id, SimulationStatus::Running) {
                record.claim_token = Some(token);
            }
        }
        Ok(outcome)
    }

    async fn update_status(
        &self,
        id: SimulationId,
        status: SimulationStatus,
        error_message: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.transition(id, status) {
            Some(record) => {
                if let Some(message) = error_message {
                    record.error_message = Some(message.to_string());
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_status_and_result(
        &self,
        id: SimulationId,
        status: SimulationStatus,
        result: &serde_json::Value,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.transition(id, status) {
            Some(record) => {
                record.result = Some(result.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxEntry>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.outbox.values().take(limit).cloned().collect())
    }

    async fn delete_outbox(&self, id: i64) -> Result<(), StoreError> {
        self.state.lock().await.outbox.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use uuid::Uuid;

    async fn seeded(store: &InMemoryRecordStore, name: &str, behavior: &str) -> SimulationId {
        let id = Uuid::now_v7();
        store
            .create_with_outbox(id, &SimulationParams::new(name, behavior, 1, 1), "simulations", b"{}")
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn create_writes_record_and_outbox() {
        let store = InMemoryRecordStore::new();
        let id = seeded(&store, "A", "Random").await;

        let record = store.find(id).await.unwrap().unwrap();
        assert_eq!(record.status, SimulationStatus::Queued);

        let outbox = store.pending_outbox(10).await.unwrap();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].simulation_id, id);
        assert_eq!(outbox[0].topic, "simulations");
    }

    #[tokio::test]
    async fn claim_respects_token() {
        let store = InMemoryRecordStore::new();
        let id = seeded(&store, "A", "Random").await;
        let first = Uuid::now_v7();
        let second = Uuid::now_v7();

        assert_eq!(store.claim(id, first).await.unwrap(), ClaimOutcome::Claimed);
        assert_eq!(store.claim(id, first).await.unwrap(), ClaimOutcome::Claimed);
        assert_eq!(store.claim(id, second).await.unwrap(), ClaimOutcome::HeldByOther);
        assert_eq!(store.claim(Uuid::now_v7(), first).await.unwrap(), ClaimOutcome::Missing);
    }

    #[tokio::test]
    async fn terminal_record_is_never_overwritten() {
        let store = InMemoryRecordStore::new();
        let id = seeded(&store, "A", "Random").await;
        let token = Uuid::now_v7();
        store.claim(id, token).await.unwrap();

        let result = serde_json::json!({"ok": true});
        assert!(store
            .update_status_and_result(id, SimulationStatus::Done, &result)
            .await
            .unwrap());

        assert!(!store
            .update_status(id, SimulationStatus::Failed, Some("late"))
            .await
            .unwrap());
        assert_matches!(
            store.claim(id, token).await.unwrap(),
            ClaimOutcome::AlreadyTerminal(SimulationStatus::Done)
        );

        let record = store.find(id).await.unwrap().unwrap();
        assert_eq!(record.result, Some(result));
        assert_eq!(record.error_message, None);
        assert_eq!(
            store.history(id).await,
            vec![SimulationStatus::Queued, SimulationStatus::Running, SimulationStatus::Done]
        );
    }

    #[tokio::test]
    async fn queued_cannot_jump_to_done() {
        let store = InMemoryRecordStore::new();
        let id = seeded(&store, "A", "Random").await;

        let updated = store
            .update_status_and_result(id, SimulationStatus::Done, &serde_json::json!({}))
            .await
            .unwrap();

        assert!(!updated);
        assert_eq!(store.find(id).await.unwrap().unwrap().status, SimulationStatus::Queued);
    }

    #[tokio::test]
    async fn list_filters_and_paginates() {
        let store = InMemoryRecordStore::new();
        seeded(&store, "Flock one", "Flocking").await;
        seeded(&store, "flock two", "Flocking").await;
        seeded(&store, "Herd", "Herding").await;

        let page = store
            .list(&SimulationListQuery {
                q: Some("FLOCK".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 2);

        let page = store
            .list(&SimulationListQuery {
                behavior: Some("Herding".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].name, "Herd");

        let page = store
            .list(&SimulationListQuery {
                limit: Some(2),
                page: Some(2),
                sort: Some(SimulationSort::Name),
                order: Some(SortOrder::Asc),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].name, "flock two");
    }
}
