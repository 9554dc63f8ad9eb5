//! Application state shared across HTTP handlers

use std::path::PathBuf;
use std::sync::Arc;

use fleetman_core::{BatchOrchestrator, CommandDispatcher, DeviceStore, LivenessCache};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: BatchOrchestrator,
    pub dispatcher: Arc<CommandDispatcher>,
    pub liveness: LivenessCache,
    pub store: Arc<dyn DeviceStore>,
    /// Where scenario documents are served from; `None` serves none
    pub scenarios_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(
        orchestrator: BatchOrchestrator,
        dispatcher: Arc<CommandDispatcher>,
        liveness: LivenessCache,
        store: Arc<dyn DeviceStore>,
    ) -> Self {
        Self {
            orchestrator,
            dispatcher,
            liveness,
            store,
            scenarios_dir: None,
        }
    }

    #[must_use]
    pub fn with_scenarios_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scenarios_dir = Some(dir.into());
        self
    }
}
