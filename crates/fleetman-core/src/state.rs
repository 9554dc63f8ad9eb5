//! Shared batch status

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use fleetman_api::BatchPhase;
use fleetman_api::responses::BatchStatus;

use crate::error::CoreError;

/// Guarded status of the current (or last) batch
///
/// Only one batch may be active at a time. Clones share the same state.
#[derive(Clone, Default)]
pub struct BatchCoordinator {
    status: Arc<Mutex<BatchStatus>>,
}

impl BatchCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BatchStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the batch slot and reset status with every device pending
    ///
    /// # Errors
    /// Returns `CoreError::BatchActive` if a batch is still running
    pub fn try_begin(&self, device_ids: &[String]) -> Result<(), CoreError> {
        let mut status = self.lock();
        if status.active {
            return Err(CoreError::BatchActive);
        }

        *status = BatchStatus {
            active: true,
            total: device_ids.len(),
            completed: 0,
            robots: device_ids
                .iter()
                .map(|id| (id.clone(), BatchPhase::Pending))
                .collect(),
            errors: Default::default(),
        };
        Ok(())
    }

    pub fn set_phase(&self, device_id: &str, phase: BatchPhase) {
        self.lock().robots.insert(device_id.to_string(), phase);
    }

    /// Mark a device failed; its remaining phases are skipped
    pub fn fail(&self, device_id: &str, message: impl Into<String>) {
        let mut status = self.lock();
        status.robots.insert(device_id.to_string(), BatchPhase::Error);
        status.errors.insert(device_id.to_string(), message.into());
        status.completed += 1;
    }

    pub fn succeed(&self, device_id: &str) {
        let mut status = self.lock();
        status.robots.insert(device_id.to_string(), BatchPhase::Success);
        status.completed += 1;
    }

    /// Release the batch slot
    pub fn finish(&self) {
        self.lock().active = false;
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    /// Deep copy of the current status
    #[must_use]
    pub fn status(&self) -> BatchStatus {
        self.lock().clone()
    }
}
