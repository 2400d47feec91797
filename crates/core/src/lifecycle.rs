//! Simulation lifecycle state machine.
//!
//! ```text
//! queued ──> running ──> done
//!               │  ↺
//!               └──────> failed
//! ```
//!
//! Status only moves forward. `running -> running` is the redelivery of the
//! same queue message after a worker crash; whether a given redelivery may
//! take the record is decided by the record store using the claim token.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Status of a simulation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationStatus {
    Queued,
    Running,
    Done,
    Failed,
}

/// Terminal statuses: done, failed.
pub const TERMINAL_STATUSES: [SimulationStatus; 2] =
    [SimulationStatus::Done, SimulationStatus::Failed];

impl SimulationStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [SimulationStatus; 4] = [
        SimulationStatus::Queued,
        SimulationStatus::Running,
        SimulationStatus::Done,
        SimulationStatus::Failed,
    ];

    /// The string stored in the `simulations.status` column.
    pub fn as_str(self) -> &'static str {
        match self {
            SimulationStatus::Queued => "queued",
            SimulationStatus::Running => "running",
            SimulationStatus::Done => "done",
            SimulationStatus::Failed => "failed",
        }
    }

    /// `true` for statuses from which no further transition occurs.
    pub fn is_terminal(self) -> bool {
        TERMINAL_STATUSES.contains(&self)
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: SimulationStatus) -> bool {
        use SimulationStatus::*;
        matches!(
            (self, next),
            (Queued, Running) | (Running, Running) | (Running, Done) | (Running, Failed)
        )
    }

    /// Like [`can_transition_to`](Self::can_transition_to) but returns a
    /// `Conflict` error describing the rejected move.
    pub fn check_transition(self, next: SimulationStatus) -> Result<(), CoreError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(CoreError::Conflict(format!(
                "Illegal status transition: {self} -> {next}"
            )))
        }
    }
}

impl fmt::Display for SimulationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimulationStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SimulationStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown simulation status: \"{s}\"")))
    }
}

impl TryFrom<String> for SimulationStatus {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
