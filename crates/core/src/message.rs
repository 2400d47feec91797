//! Queue message carried on the `simulations` topic.
//!
//! The body is a JSON document with camelCase keys:
//!
//! ```json
//! { "simulationId": "…", "name": "A", "behavior": "Random",
//!   "runs": 5, "agentCount": 50, "seed": null, "steps": 1000 }
//! ```
//!
//! A message is a snapshot taken at submission time; later changes to the
//! simulation record do not affect it.

use serde::{Deserialize, Serialize};

use crate::simulation::SimulationParams;
use crate::types::SimulationId;

/// Durable topic simulation jobs are published to.
pub const SIMULATIONS_TOPIC: &str = "simulations";

/// Error decoding a queue payload. Never retryable: the same bytes fail the
/// same way on every delivery.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Payload is not a valid simulation message: {0}")]
    Json(#[from] serde_json::Error),
}

/// Job snapshot published for the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationMessage {
    pub simulation_id: SimulationId,
    #[serde(flatten)]
    pub params: SimulationParams,
}

impl SimulationMessage {
    pub fn new(simulation_id: SimulationId, params: SimulationParams) -> Self {
        Self {
            simulation_id,
            params,
        }
    }

    /// Serialize to the wire format.
    pub fn encode(&self) -> Vec<u8> {
        // Serializing plain data with string keys cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Parse a payload received from the transport.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(payload)?;
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn wire_format_uses_camel_case_keys() {
        let id = uuid::Uuid::now_v7();
        let mut params = SimulationParams::new("A", "Random", 5, 50);
        params.steps = Some(1000);

        let value: serde_json::Value =
            serde_json::from_slice(&SimulationMessage::new(id, params).encode()).unwrap();

        assert_eq!(value["simulationId"], id.to_string());
        assert_eq!(value["agentCount"], 50);
        assert_eq!(value["steps"], 1000);
        assert!(value["seed"].is_null());
    }

    #[test]
    fn decodes_message_with_absent_optionals() {
        let id = uuid::Uuid::now_v7();
        let body = format!(
            r#"{{"simulationId":"{id}","name":"A","behavior":"Random","runs":5,"agentCount":50}}"#
        );

        let message = SimulationMessage::decode(body.as_bytes()).unwrap();

        assert_eq!(message.simulation_id, id);
        assert_eq!(message.params, SimulationParams::new("A", "Random", 5, 50));
    }

    #[test]
    fn rejects_garbage() {
        assert_matches!(
            SimulationMessage::decode(b"not json at all"),
            Err(DecodeError::Json(_))
        );
        assert_matches!(
            SimulationMessage::decode(&[0xff, 0xfe, 0x00]),
            Err(DecodeError::Utf8(_))
        );
    }

    #[test]
    fn rejects_missing_simulation_id() {
        let body = br#"{"name":"A","behavior":"Random","runs":5,"agentCount":50}"#;
        assert_matches!(SimulationMessage::decode(body), Err(DecodeError::Json(_)));
    }
}
