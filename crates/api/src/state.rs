use std::sync::Arc;

use swarmsim_pipeline::{RecordStore, SimulationSubmitter};

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone: everything is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Simulation records (reads and health probe).
    pub store: Arc<dyn RecordStore>,
    /// Creates records and their outbox rows.
    pub submitter: Arc<SimulationSubmitter>,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            submitter: Arc::new(SimulationSubmitter::new(Arc::clone(&store))),
            store,
        }
    }
}
