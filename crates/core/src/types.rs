/// Simulation records are keyed by time-ordered UUIDs (v7).
pub type SimulationId = uuid::Uuid;

/// Queue messages are keyed by UUIDs assigned at publish time.
pub type MessageId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
