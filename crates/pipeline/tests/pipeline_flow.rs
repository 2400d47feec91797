//! End-to-end pipeline scenarios over the in-memory adapters:
//! submit -> outbox relay -> queue -> processor -> record store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use swarmsim_core::lifecycle::SimulationStatus;
use swarmsim_core::message::{SimulationMessage, SIMULATIONS_TOPIC};
use swarmsim_core::simulation::SimulationParams;
use swarmsim_core::types::{MessageId, SimulationId};
use swarmsim_core::workload::{
    EchoResult, EchoWorkload, Workload, WorkloadError, WorkloadOutcome,
};
use swarmsim_db::models::outbox::OutboxEntry;
use swarmsim_db::models::simulation::{
    ClaimOutcome, Simulation, SimulationListQuery, SimulationPage,
};
use swarmsim_pipeline::{
    Disposition, InMemoryQueue, InMemoryRecordStore, JobProcessor, OutboxRelay, ProcessorConfig,
    QueueTransport, RecordStore, SimulationSubmitter, StoreError,
};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

struct Harness {
    store: Arc<InMemoryRecordStore>,
    queue: Arc<InMemoryQueue>,
    submitter: SimulationSubmitter,
    relay: OutboxRelay,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(InMemoryRecordStore::new());
        let queue = Arc::new(InMemoryQueue::new());
        Self {
            submitter: SimulationSubmitter::new(store.clone()),
            relay: OutboxRelay::new(store.clone(), queue.clone()),
            store,
            queue,
        }
    }

    /// Submit and publish one simulation.
    async fn submit(&self, params: SimulationParams) -> SimulationId {
        let simulation = self.submitter.submit(params).await.unwrap();
        self.relay.relay_batch().await.unwrap();
        simulation.id
    }

    fn processor(&self, workload: impl Workload + 'static) -> JobProcessor {
        self.processor_over(self.store.clone(), workload)
    }

    fn processor_over(
        &self,
        store: Arc<dyn RecordStore>,
        workload: impl Workload + 'static,
    ) -> JobProcessor {
        JobProcessor::new(
            store,
            self.queue.clone(),
            Arc::new(workload),
            ProcessorConfig {
                poll_interval: Duration::from_millis(10),
                ..Default::default()
            },
        )
    }

    async fn record(&self, id: SimulationId) -> Simulation {
        self.store.find(id).await.unwrap().unwrap()
    }

    async fn depth(&self) -> usize {
        self.queue.depth(SIMULATIONS_TOPIC).await.unwrap()
    }
}

fn scenario_a() -> SimulationParams {
    SimulationParams::new("A", "Random", 5, 50)
}

/// Parks forever once started, standing in for a worker that dies mid-job.
struct HangingWorkload {
    started: Arc<Notify>,
}

#[async_trait]
impl Workload for HangingWorkload {
    async fn execute(&self, _params: &SimulationParams) -> Result<WorkloadOutcome, WorkloadError> {
        self.started.notify_one();
        std::future::pending().await
    }
}

struct FailingWorkload;

#[async_trait]
impl Workload for FailingWorkload {
    async fn execute(&self, _params: &SimulationParams) -> Result<WorkloadOutcome, WorkloadError> {
        Ok(WorkloadOutcome::Failed {
            reason: "agents diverged".into(),
        })
    }
}

struct BrokenWorkload;

#[async_trait]
impl Workload for BrokenWorkload {
    async fn execute(&self, _params: &SimulationParams) -> Result<WorkloadOutcome, WorkloadError> {
        Err(WorkloadError("index out of bounds".into()))
    }
}

#[derive(Default)]
struct CountingWorkload {
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl Workload for CountingWorkload {
    async fn execute(&self, params: &SimulationParams) -> Result<WorkloadOutcome, WorkloadError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        EchoWorkload::default().execute(params).await
    }
}

/// Record store whose terminal writes always fail.
struct TerminalWriteDown(Arc<InMemoryRecordStore>);

#[async_trait]
impl RecordStore for TerminalWriteDown {
    async fn create_with_outbox(
        &self,
        id: SimulationId,
        params: &SimulationParams,
        topic: &str,
        payload: &[u8],
    ) -> Result<Simulation, StoreError> {
        self.0.create_with_outbox(id, params, topic, payload).await
    }
    async fn find(&self, id: SimulationId) -> Result<Option<Simulation>, StoreError> {
        self.0.find(id).await
    }
    async fn list(&self, query: &SimulationListQuery) -> Result<SimulationPage, StoreError> {
        self.0.list(query).await
    }
    async fn claim(&self, id: SimulationId, token: MessageId) -> Result<ClaimOutcome, StoreError> {
        self.0.claim(id, token).await
    }
    async fn update_status(
        &self,
        _id: SimulationId,
        _status: SimulationStatus,
        _error_message: Option<&str>,
    ) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("connection reset".into()))
    }
    async fn update_status_and_result(
        &self,
        _id: SimulationId,
        _status: SimulationStatus,
        _result: &serde_json::Value,
    ) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("connection reset".into()))
    }
    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxEntry>, StoreError> {
        self.0.pending_outbox(limit).await
    }
    async fn delete_outbox(&self, id: i64) -> Result<(), StoreError> {
        self.0.delete_outbox(id).await
    }
}

#[tokio::test]
async fn scenario_a_runs_to_done() {
    let harness = Harness::new();
    let id = harness.submit(scenario_a()).await;
    assert_eq!(harness.record(id).await.status, SimulationStatus::Queued);
    assert_eq!(harness.depth().await, 1);

    let disposition = harness.processor(EchoWorkload::default()).process_next().await.unwrap();

    assert_eq!(disposition, Some(Disposition::Completed));
    let record = harness.record(id).await;
    assert_eq!(record.status, SimulationStatus::Done);
    assert_eq!(
        record.result.unwrap()["metrics"],
        serde_json::json!({"echoRuns": 5, "echoAgentCount": 50, "advancedProvided": 0})
    );
    assert_eq!(
        harness.store.history(id).await,
        vec![SimulationStatus::Queued, SimulationStatus::Running, SimulationStatus::Done]
    );
    assert_eq!(harness.depth().await, 0);
}

#[tokio::test]
async fn crash_mid_job_is_redelivered_and_completes() {
    let harness = Harness::new();
    let id = harness.submit(scenario_a()).await;

    let started = Arc::new(Notify::new());
    let doomed = Arc::new(harness.processor(HangingWorkload {
        started: started.clone(),
    }));
    let task = tokio::spawn({
        let doomed = doomed.clone();
        async move { doomed.process_next().await }
    });

    started.notified().await;
    assert_eq!(harness.record(id).await.status, SimulationStatus::Running);
    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    // Connection drop: the broker takes the unacked message back.
    assert_eq!(harness.queue.recover_unacked().await, 1);

    let disposition = harness.processor(EchoWorkload::default()).process_next().await.unwrap();

    assert_eq!(disposition, Some(Disposition::Completed));
    let record = harness.record(id).await;
    assert_eq!(record.status, SimulationStatus::Done);
    assert_eq!(
        record.result,
        Some(serde_json::to_value(EchoResult::for_params(&scenario_a())).unwrap())
    );
    assert_eq!(harness.depth().await, 0);
}

#[tokio::test]
async fn malformed_payload_is_dropped_without_requeue() {
    let harness = Harness::new();
    let id = harness.submit(scenario_a()).await;
    harness.queue.publish(SIMULATIONS_TOPIC, b"{not json").await.unwrap();
    let processor = harness.processor(EchoWorkload::default());

    // The valid job is ahead of the garbage.
    assert_eq!(processor.process_next().await.unwrap(), Some(Disposition::Completed));
    let before = harness.depth().await;
    let record_before = harness.record(id).await;

    let disposition = processor.process_next().await.unwrap();

    assert_matches!(disposition, Some(Disposition::Rejected { reason }) if reason.starts_with("malformed payload"));
    assert_eq!(harness.depth().await, before - 1);
    assert_eq!(harness.record(id).await, record_before);
    let dead = harness.queue.dead_letters().await;
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].payload, b"{not json");
}

#[tokio::test]
async fn duplicate_for_done_job_leaves_result_alone() {
    let harness = Harness::new();
    let id = harness.submit(scenario_a()).await;
    let processor = harness.processor(EchoWorkload::default());
    processor.process_next().await.unwrap();
    let done = harness.record(id).await;

    // A relay crash between publish and delete publishes the same body again.
    let body = SimulationMessage::new(id, scenario_a()).encode();
    harness.queue.publish(SIMULATIONS_TOPIC, &body).await.unwrap();

    let runs = Arc::new(AtomicUsize::new(0));
    let disposition = harness
        .processor(CountingWorkload { runs: runs.clone() })
        .process_next()
        .await
        .unwrap();

    assert_eq!(disposition, Some(Disposition::Skipped));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(harness.record(id).await, done);
    assert_eq!(harness.depth().await, 0);
    assert!(harness.queue.dead_letters().await.is_empty());
}

#[tokio::test]
async fn job_held_by_another_delivery_is_skipped() {
    let harness = Harness::new();
    let id = harness.submit(scenario_a()).await;
    let other = uuid::Uuid::now_v7();
    assert_eq!(harness.store.claim(id, other).await.unwrap(), ClaimOutcome::Claimed);

    let runs = Arc::new(AtomicUsize::new(0));
    let disposition = harness
        .processor(CountingWorkload { runs: runs.clone() })
        .process_next()
        .await
        .unwrap();

    assert_eq!(disposition, Some(Disposition::Skipped));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(harness.record(id).await.claim_token, Some(other));
}

#[tokio::test]
async fn explicit_workload_failure_marks_failed() {
    let harness = Harness::new();
    let id = harness.submit(scenario_a()).await;

    let disposition = harness.processor(FailingWorkload).process_next().await.unwrap();

    assert_eq!(disposition, Some(Disposition::Failed));
    let record = harness.record(id).await;
    assert_eq!(record.status, SimulationStatus::Failed);
    assert_eq!(record.error_message.as_deref(), Some("agents diverged"));
    assert_eq!(record.result, None);
    assert_eq!(harness.depth().await, 0);
}

#[tokio::test]
async fn workload_error_rejects_and_leaves_record_running() {
    let harness = Harness::new();
    let id = harness.submit(scenario_a()).await;

    let disposition = harness.processor(BrokenWorkload).process_next().await.unwrap();

    assert_matches!(disposition, Some(Disposition::Rejected { reason }) if reason.contains("index out of bounds"));
    assert_eq!(harness.record(id).await.status, SimulationStatus::Running);
    assert_eq!(harness.depth().await, 0);
    assert_eq!(harness.queue.dead_letters().await.len(), 1);
}

#[tokio::test]
async fn failed_terminal_write_dead_letters_instead_of_acking() {
    let harness = Harness::new();
    let id = harness.submit(scenario_a()).await;
    let store = Arc::new(TerminalWriteDown(harness.store.clone()));

    let disposition = harness
        .processor_over(store, EchoWorkload::default())
        .process_next()
        .await
        .unwrap();

    assert_matches!(disposition, Some(Disposition::Rejected { .. }));
    assert_eq!(harness.record(id).await.status, SimulationStatus::Running);
    let dead = harness.queue.dead_letters().await;
    assert_eq!(dead.len(), 1);
    assert!(dead[0].reason.contains("terminal write to done failed"));
    assert_eq!(harness.queue.unacked_count().await, 0);
}

#[tokio::test]
async fn run_loop_drains_one_message_at_a_time() {
    let harness = Harness::new();
    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(
            harness
                .submit(SimulationParams::new(format!("sim {i}"), "Flocking", i + 1, 10))
                .await,
        );
    }

    let processor = Arc::new(harness.processor(EchoWorkload::default()));
    let cancel = CancellationToken::new();
    let task = tokio::spawn({
        let processor = processor.clone();
        let cancel = cancel.clone();
        async move { processor.run(cancel).await }
    });

    tokio::time::timeout(Duration::from_secs(5), async {
        while harness.depth().await > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("queue drained");
    cancel.cancel();
    task.await.unwrap();

    for id in ids {
        assert_eq!(harness.record(id).await.status, SimulationStatus::Done);
    }
    assert_eq!(harness.queue.max_unacked().await, 1);
}
