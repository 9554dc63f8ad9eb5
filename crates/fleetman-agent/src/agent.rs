//! Device process assembly

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fleetman_api::{AgentConfig, StatusMessage, topics};
use fleetman_bus::{BusError, LastWill, MqttSettings, Transport};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::behavior::BehaviorNode;
use crate::blackboard::{Blackboard, keys};
use crate::duties::{AddressSource, CheckNetwork, MaintainConnection, ProcessCommands, SendHeartbeat};
use crate::engine::Engine;
use crate::intake::IntakeReceiver;
use crate::job::JobManager;
use crate::registry::CommandRegistry;
use crate::tasks::BackgroundTasks;

/// Broker settings for `config`, with a retained `offline` last will
///
/// # Errors
/// Returns `serde_json::Error` if the will payload cannot be encoded
pub fn mqtt_settings(config: &AgentConfig) -> Result<MqttSettings, serde_json::Error> {
    let will = StatusMessage {
        status: StatusMessage::OFFLINE.to_string(),
        ts: Utc::now(),
        ip: String::new(),
        device_type: config.device_type.clone(),
        name: config.name.clone(),
        job_id: None,
        job_status: None,
        job_error: None,
    };

    Ok(MqttSettings::new(
        &config.broker.host,
        config.broker.port,
        format!("fleetman-{}", config.device_id),
    )
    .with_credentials(config.broker.username.clone(), config.broker.password.clone())
    .with_last_will(LastWill {
        topic: topics::status_topic(&config.device_id),
        payload: serde_json::to_vec(&will)?,
        retain: true,
    }))
}

/// Subscribe to the device's own and the broadcast command topics
///
/// # Errors
/// Returns `BusError` if a subscription is refused
pub async fn subscribe_commands(transport: &dyn Transport, device_id: &str) -> Result<(), BusError> {
    transport.subscribe(&topics::command_topic(device_id)).await?;
    transport.subscribe(topics::BROADCAST_COMMANDS).await
}

/// The device tree: all duties under one `Parallel` root
pub fn device_tree(
    config: &AgentConfig,
    intake: IntakeReceiver,
    registry: CommandRegistry,
    addresses: Arc<dyn AddressSource>,
) -> BehaviorNode {
    BehaviorNode::parallel(vec![
        BehaviorNode::action(CheckNetwork::new(addresses)),
        BehaviorNode::action(MaintainConnection::new(Duration::from_secs(
            config.reconnect_cooldown_secs,
        ))),
        BehaviorNode::action(ProcessCommands::new(intake, registry)),
        BehaviorNode::action(SendHeartbeat::new(Duration::from_secs(config.heartbeat_secs))),
    ])
}

/// One device process
pub struct Agent {
    engine: Engine,
    blackboard: Arc<Blackboard>,
    jobs: JobManager,
    tasks: BackgroundTasks,
}

impl Agent {
    pub fn new(
        config: AgentConfig,
        transport: Arc<dyn Transport>,
        intake: IntakeReceiver,
        registry: CommandRegistry,
        addresses: Arc<dyn AddressSource>,
    ) -> Self {
        let jobs = JobManager::new();
        let tasks = BackgroundTasks::new();
        let root = device_tree(&config, intake, registry, addresses);
        let tick_hz = config.tick_hz;

        let blackboard = Arc::new(Blackboard::new());
        blackboard.set(keys::CONFIG, config);
        blackboard.set(keys::TRANSPORT, transport);
        blackboard.set(keys::JOBS, jobs.clone());
        blackboard.set(keys::TASKS, tasks.clone());

        Self {
            engine: Engine::new(root, blackboard.clone(), tick_hz),
            blackboard,
            jobs,
            tasks,
        }
    }

    #[must_use]
    pub fn blackboard(&self) -> &Arc<Blackboard> {
        &self.blackboard
    }

    #[must_use]
    pub fn jobs(&self) -> &JobManager {
        &self.jobs
    }

    #[must_use]
    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Tick until `shutdown` resolves, then cancel background tasks
    ///
    /// In-flight jobs are left to finish on their own.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let cancel = CancellationToken::new();
        let engine = self.engine.run(cancel.clone());
        tokio::pin!(engine);

        tokio::select! {
            () = &mut engine => {}
            () = shutdown => {
                info!("shutdown requested");
                cancel.cancel();
                engine.await;
            }
        }

        self.tasks.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_will_is_retained_offline_status() {
        let config = AgentConfig::new("r1", "Robot 1");
        let settings = mqtt_settings(&config).unwrap();

        assert_eq!(settings.client_id, "fleetman-r1");
        let will = settings.last_will.unwrap();
        assert_eq!(will.topic, "fleet/status/r1");
        assert!(will.retain);

        let status: StatusMessage = serde_json::from_slice(&will.payload).unwrap();
        assert_eq!(status.status, "offline");
    }
}
