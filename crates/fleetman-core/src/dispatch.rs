//! Single-device command queuing

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use fleetman_api::{Command, JobStatus, topics};
use fleetman_bus::Transport;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::CoreError;
use crate::store::{DeviceStore, JobRecord};

/// Queues a command for one device and returns the job id
#[async_trait]
pub trait CommandQueue: Send + Sync {
    async fn queue_command(
        &self,
        device_id: &str,
        kind: &str,
        data: serde_json::Value,
    ) -> Result<String, CoreError>;
}

/// Persists a job record, then publishes the command to the device topic
pub struct CommandDispatcher {
    store: Arc<dyn DeviceStore>,
    transport: Arc<dyn Transport>,
}

impl CommandDispatcher {
    pub fn new(store: Arc<dyn DeviceStore>, transport: Arc<dyn Transport>) -> Self {
        Self { store, transport }
    }

    async fn publish(&self, topic: &str, command: &Command) -> Result<(), CoreError> {
        let queue_failed = |message: String| CoreError::QueueFailed {
            kind: command.kind.clone(),
            message,
        };
        let payload = command.encode().map_err(|e| queue_failed(e.to_string()))?;
        self.transport
            .publish(topic, payload, false)
            .await
            .map_err(|e| queue_failed(e.to_string()))
    }

    /// Publish a command to every device
    ///
    /// # Errors
    /// Returns `CoreError::QueueFailed` if publishing fails
    #[instrument(skip(self, data))]
    pub async fn broadcast(&self, kind: &str, data: serde_json::Value) -> Result<String, CoreError> {
        let command = Command::new(Uuid::new_v4().to_string(), kind, data);
        self.publish(topics::BROADCAST_COMMANDS, &command).await?;
        info!(job_id = %command.id, kind, "broadcast command");
        Ok(command.id)
    }
}

#[async_trait]
impl CommandQueue for CommandDispatcher {
    #[instrument(skip(self, data))]
    async fn queue_command(
        &self,
        device_id: &str,
        kind: &str,
        data: serde_json::Value,
    ) -> Result<String, CoreError> {
        if kind.trim().is_empty() {
            return Err(CoreError::InvalidRequest("command type is empty".to_string()));
        }
        if self.store.get_device(device_id).await?.is_none() {
            return Err(CoreError::DeviceNotFound(device_id.to_string()));
        }

        let command = Command::new(Uuid::new_v4().to_string(), kind, data);

        self.store
            .record_job(JobRecord {
                id: command.id.clone(),
                device_id: device_id.to_string(),
                kind: command.kind.clone(),
                data: command.data.clone(),
                status: JobStatus::Pending,
                created_at: Utc::now(),
            })
            .await?;

        self.publish(&topics::command_topic(device_id), &command)
            .await?;

        info!(device = %device_id, job_id = %command.id, kind, "queued command");
        Ok(command.id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use fleetman_bus::{InboundMessage, MemoryBroker};
    use serde_json::json;

    use super::*;
    use crate::store::{Device, MemoryStore};

    #[tokio::test]
    async fn test_queue_records_job_and_publishes() {
        let broker = MemoryBroker::new();
        let seen = Arc::new(Mutex::new(Vec::<InboundMessage>::new()));
        let sink = seen.clone();
        let device = broker.connect(Arc::new(move |m: InboundMessage| sink.lock().unwrap().push(m)));
        device.subscribe("fleet/commands/r1").await.unwrap();

        let store = Arc::new(MemoryStore::new());
        store.insert_device(Device::new("r1", "Robot 1")).await;
        let dispatcher =
            CommandDispatcher::new(store.clone(), Arc::new(broker.connect(Arc::new(|_: InboundMessage| {}))));

        let job_id = dispatcher
            .queue_command("r1", "self_test", json!({}))
            .await
            .unwrap();

        let jobs = store.jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, job_id);
        assert_eq!(jobs[0].status, JobStatus::Pending);

        let seen = seen.lock().unwrap();
        let cmd = Command::decode(&seen[0].payload).unwrap();
        assert_eq!(cmd.id, job_id);
        assert_eq!(cmd.kind, "self_test");
    }

    #[tokio::test]
    async fn test_unknown_device_is_rejected() {
        let broker = MemoryBroker::new();
        let dispatcher = CommandDispatcher::new(
            Arc::new(MemoryStore::new()),
            Arc::new(broker.connect(Arc::new(|_: InboundMessage| {}))),
        );

        let err = dispatcher
            .queue_command("ghost", "self_test", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::DeviceNotFound(_)));
    }

    #[tokio::test]
    async fn test_publish_failure_is_queue_failure() {
        let broker = MemoryBroker::new();
        let store = Arc::new(MemoryStore::new());
        store.insert_device(Device::new("r1", "Robot 1")).await;
        let transport = broker.connect(Arc::new(|_: InboundMessage| {}));
        transport.set_connected(false);
        let dispatcher = CommandDispatcher::new(store, Arc::new(transport));

        let err = dispatcher
            .queue_command("r1", "reset_logs", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::QueueFailed { ref kind, .. } if kind == "reset_logs"));
    }
}
