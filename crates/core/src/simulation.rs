//! Simulation request parameters and their validation.
//!
//! [`SimulationParams`] is the canonical shape of a job as submitted. It is
//! stored on the simulation record and copied into the queue message, and is
//! never modified after creation.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;

/// Parameters of a simulation request.
///
/// The tuning fields (`seed` through `steps`) are optional; `None` means the
/// client did not provide a value and the workload picks its own default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SimulationParams {
    #[validate(length(min = 1, max = 255, message = "name must be 1-255 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 64, message = "behavior must be 1-64 characters"))]
    pub behavior: String,
    #[validate(range(min = 1, message = "runs must be at least 1"))]
    pub runs: i32,
    #[validate(range(min = 1, message = "agentCount must be at least 1"))]
    pub agent_count: i32,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default)]
    #[validate(range(min = 0.1, max = 10.0, message = "speed must be between 0.1 and 10"))]
    pub speed: Option<f64>,
    #[serde(default)]
    #[validate(range(min = 0.0, max = 2.0, message = "cohesion must be between 0 and 2"))]
    pub cohesion: Option<f64>,
    #[serde(default)]
    #[validate(range(min = 0.0, max = 2.0, message = "separation must be between 0 and 2"))]
    pub separation: Option<f64>,
    #[serde(default)]
    #[validate(range(min = 0.0, max = 2.0, message = "alignment must be between 0 and 2"))]
    pub alignment: Option<f64>,
    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0, message = "noise must be between 0 and 1"))]
    pub noise: Option<f64>,
    #[serde(default)]
    #[validate(range(min = 10, max = 10000, message = "steps must be between 10 and 10,000"))]
    pub steps: Option<i32>,
}

impl SimulationParams {
    /// Create a parameter set with only the required fields.
    pub fn new(name: impl Into<String>, behavior: impl Into<String>, runs: i32, agent_count: i32) -> Self {
        Self {
            name: name.into(),
            behavior: behavior.into(),
            runs,
            agent_count,
            seed: None,
            speed: None,
            cohesion: None,
            separation: None,
            alignment: None,
            noise: None,
            steps: None,
        }
    }

    /// Number of optional tuning fields the client supplied.
    pub fn advanced_provided(&self) -> usize {
        [
            self.seed.is_some(),
            self.speed.is_some(),
            self.cohesion.is_some(),
            self.separation.is_some(),
            self.alignment.is_some(),
            self.noise.is_some(),
            self.steps.is_some(),
        ]
        .into_iter()
        .filter(|provided| *provided)
        .count()
    }

    /// Validate field ranges and reject blank names/behaviors.
    ///
    /// All violations are collected into a single `Validation` error so the
    /// client sees every problem at once.
    pub fn validate_params(&self) -> Result<(), CoreError> {
        let mut problems: Vec<String> = Vec::new();

        if let Err(errors) = self.validate() {
            for (field, field_errors) in errors.field_errors() {
                for error in field_errors {
                    match &error.message {
                        Some(message) => problems.push(message.to_string()),
                        None => problems.push(format!("{field} is invalid")),
                    }
                }
            }
        }

        if !self.name.is_empty() && self.name.trim().is_empty() {
            problems.push("name must not be blank".to_string());
        }
        if !self.behavior.is_empty() && self.behavior.trim().is_empty() {
            problems.push("behavior must not be blank".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            problems.sort();
            Err(CoreError::Validation(problems.join("; ")))
        }
    }
}
