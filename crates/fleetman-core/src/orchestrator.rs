//! `BatchOrchestrator`: per-device provisioning fan-out
//!
//! A batch runs one task per selected device. Each task walks the phases
//! enabled by the request in a fixed order; the first failing phase moves
//! that device to `error` without affecting its siblings.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fleetman_api::requests::BatchRequest;
use fleetman_api::{
    AgentConfig, ApplyScenarioPayload, BatchPhase, CommandKind, EmptyPayload, UpdateRepoPayload,
};
use fleetman_exec::Provision;
use serde::Serialize;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

use crate::artifacts::ArtifactSource;
use crate::config::BatchConfig;
use crate::credentials::resolve_host_spec;
use crate::dispatch::CommandQueue;
use crate::error::CoreError;
use crate::state::BatchCoordinator;
use crate::store::{Device, DeviceStore};

/// Handle to a batch running in the background
#[derive(Debug)]
pub struct BatchHandle {
    total: usize,
    task: JoinHandle<()>,
}

impl BatchHandle {
    /// Number of distinct devices in the batch
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Wait until every device task has finished
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            error!(error = %e, "batch supervisor failed");
        }
    }
}

struct Inner {
    coordinator: BatchCoordinator,
    store: Arc<dyn DeviceStore>,
    provisioner: Arc<dyn Provision>,
    artifacts: Arc<dyn ArtifactSource>,
    commands: Arc<dyn CommandQueue>,
    config: BatchConfig,
}

/// Runs provisioning batches against the shared `BatchCoordinator`
#[derive(Clone)]
pub struct BatchOrchestrator {
    inner: Arc<Inner>,
}

impl BatchOrchestrator {
    pub fn new(
        coordinator: BatchCoordinator,
        store: Arc<dyn DeviceStore>,
        provisioner: Arc<dyn Provision>,
        artifacts: Arc<dyn ArtifactSource>,
        commands: Arc<dyn CommandQueue>,
        config: BatchConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                coordinator,
                store,
                provisioner,
                artifacts,
                commands,
                config,
            }),
        }
    }

    #[must_use]
    pub fn coordinator(&self) -> &BatchCoordinator {
        &self.inner.coordinator
    }

    /// Validate the request, claim the batch slot and fan out
    ///
    /// Returns as soon as the device tasks are spawned; poll the
    /// coordinator for progress.
    ///
    /// # Errors
    /// Returns `CoreError::InvalidRequest` for an empty selection or a
    /// scenario phase without scenarios, and `CoreError::BatchActive` if
    /// another batch is running
    pub fn start(&self, mut request: BatchRequest) -> Result<BatchHandle, CoreError> {
        let mut device_ids: Vec<String> = Vec::with_capacity(request.robot_ids.len());
        for id in request.robot_ids.drain(..) {
            let id = id.trim().to_string();
            if !id.is_empty() && !device_ids.contains(&id) {
                device_ids.push(id);
            }
        }

        if device_ids.is_empty() {
            return Err(CoreError::InvalidRequest("no devices selected".to_string()));
        }
        if request.apply_scenarios && request.scenario_ids.is_empty() {
            return Err(CoreError::InvalidRequest(
                "apply_scenarios requires at least one scenario id".to_string(),
            ));
        }

        self.inner.coordinator.try_begin(&device_ids)?;

        let total = device_ids.len();
        info!(total, reinstall = request.reinstall, "starting batch");

        let inner = self.inner.clone();
        let request = Arc::new(request);
        let task = tokio::spawn(async move {
            let mut tasks = JoinSet::new();
            for id in device_ids {
                let inner = inner.clone();
                let request = request.clone();
                tasks.spawn(async move { inner.run_device(&id, &request).await });
            }

            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "device task aborted");
                }
            }

            // a device task that panicked never reached a terminal phase
            for (id, phase) in inner.coordinator.status().robots {
                if !phase.is_terminal() {
                    inner.coordinator.fail(&id, "internal error");
                }
            }

            inner.coordinator.finish();
            let status = inner.coordinator.status();
            info!(
                total = status.total,
                failed = status.errors.len(),
                "batch finished"
            );
        });

        Ok(BatchHandle { total, task })
    }
}

impl Inner {
    async fn run_device(&self, id: &str, request: &BatchRequest) {
        match self.drive(id, request).await {
            Ok(()) => {
                self.coordinator.succeed(id);
                info!(device = %id, "device completed");
            }
            Err(e) => {
                let message = e.operator_message();
                warn!(device = %id, error = %message, "device failed");
                self.coordinator.fail(id, message);
            }
        }
    }

    fn phase(&self, id: &str, phase: BatchPhase) {
        self.coordinator.set_phase(id, phase);
        info!(device = %id, phase = %phase, "phase");
    }

    #[instrument(skip(self, request))]
    async fn drive(&self, id: &str, request: &BatchRequest) -> Result<(), CoreError> {
        self.phase(id, BatchPhase::Processing);
        let device = self
            .store
            .get_device(id)
            .await?
            .ok_or_else(|| CoreError::DeviceNotFound(id.to_string()))?;

        if request.reinstall {
            self.phase(id, BatchPhase::InstallingAgent);
            let started = Utc::now();
            let simulated = self.install(&device).await?;

            self.phase(id, BatchPhase::WaitingForConnection);
            if simulated {
                info!(device = %id, "demo mode: simulating reconnect");
                sleep(self.config.demo_delay).await;
            } else {
                self.wait_for_connection(id, started).await?;
            }
        }

        if request.reset_logs {
            self.phase(id, BatchPhase::ResettingLogs);
            self.queue(id, CommandKind::ResetLogs, &EmptyPayload {})
                .await?;
        }

        if request.update_repo {
            self.phase(id, BatchPhase::UpdatingRepo);
            let repo = request.repo_config.clone().unwrap_or_default();
            let payload = UpdateRepoPayload {
                remote: repo.remote,
                branch: repo.branch,
                path: repo.path,
            };
            self.queue(id, CommandKind::UpdateRepo, &payload).await?;
        }

        if request.apply_scenarios {
            self.phase(id, BatchPhase::ApplyingScenarios);
            for scenario_id in &request.scenario_ids {
                let payload = ApplyScenarioPayload {
                    scenario_id: scenario_id.clone(),
                    url: None,
                };
                self.queue(id, CommandKind::ApplyScenario, &payload).await?;
            }
        }

        if request.run_self_test {
            self.phase(id, BatchPhase::RunningSelfTest);
            self.queue(id, CommandKind::SelfTest, &EmptyPayload {})
                .await?;
        }

        Ok(())
    }

    async fn queue<P: Serialize>(
        &self,
        id: &str,
        kind: CommandKind,
        payload: &P,
    ) -> Result<String, CoreError> {
        let data = serde_json::to_value(payload).map_err(|e| CoreError::QueueFailed {
            kind: kind.to_string(),
            message: e.to_string(),
        })?;
        self.commands.queue_command(id, kind.as_str(), data).await
    }

    /// Install the agent; returns `true` when the install was simulated
    async fn install(&self, device: &Device) -> Result<bool, CoreError> {
        let specific = self.store.get_install_credentials(&device.id).await?;
        let fallback = self.store.default_install_credentials().await?;

        let Some(spec) = resolve_host_spec(device, specific.as_ref(), fallback.as_ref()) else {
            if self.config.demo_mode {
                info!(device = %device.id, "demo mode: simulating install");
                sleep(self.config.demo_delay).await;
                return Ok(true);
            }
            return Err(CoreError::MissingCredentials(device.id.clone()));
        };

        let arch = self.provisioner.detect_architecture(&spec).await?;
        let executable = self.artifacts.executable(&arch).await?;
        let config = self.render_agent_config(device)?;

        info!(
            device = %device.id,
            address = %spec.address,
            arch = %arch,
            bytes = executable.len(),
            "installing agent"
        );
        self.provisioner.install(&spec, &config, &executable).await?;
        Ok(false)
    }

    fn render_agent_config(&self, device: &Device) -> Result<String, CoreError> {
        let mut config = AgentConfig::new(&device.id, &device.name);
        config.device_type.clone_from(&device.device_type);
        config.broker = self.config.agent_broker.clone();
        config.coordinator_url.clone_from(&self.config.coordinator_url);

        toml::to_string(&config).map_err(|e| CoreError::ConfigError(e.to_string()))
    }

    /// Poll storage until the device reports after `since`
    async fn wait_for_connection(&self, id: &str, since: DateTime<Utc>) -> Result<(), CoreError> {
        for _ in 0..self.config.reconnect_attempts {
            if let Some(device) = self.store.get_device(id).await?
                && device.last_seen.is_some_and(|seen| seen > since)
            {
                info!(device = %id, "device reconnected");
                return Ok(());
            }
            sleep(self.config.reconnect_poll_interval).await;
        }
        Err(CoreError::ReconnectTimeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendered_config_carries_identity_and_broker() {
        let mut config = BatchConfig::default();
        config.agent_broker.host = "broker.fleet".to_string();
        config.coordinator_url = Some("http://coord:8080".to_string());

        let inner = Inner {
            coordinator: BatchCoordinator::new(),
            store: Arc::new(crate::store::MemoryStore::new()),
            provisioner: Arc::new(fleetman_exec::Provisioner::ssh()),
            artifacts: Arc::new(crate::artifacts::DirArtifactSource::new("/nonexistent")),
            commands: Arc::new(NoQueue),
            config,
        };

        let rendered = inner
            .render_agent_config(&Device::new("r7", "Robot 7"))
            .unwrap();
        let parsed: AgentConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.device_id, "r7");
        assert_eq!(parsed.name, "Robot 7");
        assert_eq!(parsed.broker.host, "broker.fleet");
        assert_eq!(parsed.coordinator_url.as_deref(), Some("http://coord:8080"));
    }

    struct NoQueue;

    #[async_trait::async_trait]
    impl CommandQueue for NoQueue {
        async fn queue_command(
            &self,
            _device_id: &str,
            kind: &str,
            _data: serde_json::Value,
        ) -> Result<String, CoreError> {
            Err(CoreError::QueueFailed {
                kind: kind.to_string(),
                message: "unused".to_string(),
            })
        }
    }
}
