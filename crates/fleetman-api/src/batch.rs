//! Per-device phase of a provisioning batch

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Phases a device walks through during a batch, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BatchPhase {
    Pending,
    Processing,
    InstallingAgent,
    WaitingForConnection,
    ResettingLogs,
    UpdatingRepo,
    ApplyingScenarios,
    RunningSelfTest,
    Success,
    Error,
}

impl BatchPhase {
    /// Whether the device's fan-out task has finished
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchPhase::Success | BatchPhase::Error)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BatchPhase::Pending => "pending",
            BatchPhase::Processing => "processing",
            BatchPhase::InstallingAgent => "installing_agent",
            BatchPhase::WaitingForConnection => "waiting_for_connection",
            BatchPhase::ResettingLogs => "resetting_logs",
            BatchPhase::UpdatingRepo => "updating_repo",
            BatchPhase::ApplyingScenarios => "applying_scenarios",
            BatchPhase::RunningSelfTest => "running_self_test",
            BatchPhase::Success => "success",
            BatchPhase::Error => "error",
        }
    }
}

impl std::fmt::Display for BatchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
