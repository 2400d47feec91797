//! The unit of work a worker executes for one simulation.
//!
//! [`Workload`] is the pluggable seam: the worker binary uses
//! [`EchoWorkload`], a deterministic placeholder that echoes the request
//! sizes back instead of running an agent model.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::simulation::SimulationParams;

/// What a workload run produced.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkloadOutcome {
    /// Finished; the value is stored as the simulation result.
    Completed(serde_json::Value),
    /// The workload itself decided the job cannot succeed. This is the only
    /// path that moves a simulation to `failed`.
    Failed { reason: String },
}

/// The workload broke while running (the equivalent of an uncaught
/// exception). The job is not marked `failed`; its message is dropped.
#[derive(Debug, thiserror::Error)]
#[error("Workload error: {0}")]
pub struct WorkloadError(pub String);

#[async_trait]
pub trait Workload: Send + Sync {
    async fn execute(&self, params: &SimulationParams) -> Result<WorkloadOutcome, WorkloadError>;
}

/// Metrics reported by [`EchoWorkload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EchoMetrics {
    pub echo_runs: i32,
    pub echo_agent_count: i32,
    pub advanced_provided: usize,
}

/// Result document written on completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoResult {
    pub ok: bool,
    pub metrics: EchoMetrics,
}

impl EchoResult {
    /// Compute the result for a parameter set. Pure and repeatable, so a
    /// redelivered job always produces the same document.
    pub fn for_params(params: &SimulationParams) -> Self {
        Self {
            ok: true,
            metrics: EchoMetrics {
                echo_runs: params.runs,
                echo_agent_count: params.agent_count,
                advanced_provided: params.advanced_provided(),
            },
        }
    }
}

/// Placeholder workload: waits `duration`, then echoes run and agent counts
/// and how many tuning fields were supplied.
#[derive(Debug, Clone, Default)]
pub struct EchoWorkload {
    duration: Duration,
}

impl EchoWorkload {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

#[async_trait]
impl Workload for EchoWorkload {
    async fn execute(&self, params: &SimulationParams) -> Result<WorkloadOutcome, WorkloadError> {
        if !self.duration.is_zero() {
            tokio::time::sleep(self.duration).await;
        }

        let result = serde_json::to_value(EchoResult::for_params(params))
            .map_err(|e| WorkloadError(e.to_string()))?;
        Ok(WorkloadOutcome::Completed(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_counts() {
        let params = SimulationParams::new("A", "Random", 5, 50);

        let outcome = EchoWorkload::default().execute(&params).await.unwrap();

        assert_eq!(
            outcome,
            WorkloadOutcome::Completed(serde_json::json!({
                "ok": true,
                "metrics": {"echoRuns": 5, "echoAgentCount": 50, "advancedProvided": 0}
            }))
        );
    }

    #[tokio::test]
    async fn counts_supplied_tuning_fields() {
        let mut params = SimulationParams::new("B", "Flocking", 3, 20);
        params.seed = Some(42);
        params.cohesion = Some(0.5);

        let outcome = EchoWorkload::default().execute(&params).await.unwrap();

        let WorkloadOutcome::Completed(result) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(result["metrics"]["advancedProvided"], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_configured_duration() {
        let workload = EchoWorkload::new(Duration::from_secs(2));
        let params = SimulationParams::new("C", "Random", 1, 1);

        let started = tokio::time::Instant::now();
        workload.execute(&params).await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[test]
    fn result_is_deterministic() {
        let params = SimulationParams::new("D", "Herding", 10, 100);
        assert_eq!(EchoResult::for_params(&params), EchoResult::for_params(&params));
    }
}
