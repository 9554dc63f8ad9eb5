//! Status ingestion from the broker
//!
//! The broker callback only enqueues; a single task applies messages in
//! arrival order so a device's liveness never moves backwards.

use std::sync::Arc;

use fleetman_bus::{BusError, InboundMessage, MessageHandler, Transport};
use fleetman_api::topics;
use fleetman_core::StatusIngest;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Broker handler feeding an ordered ingest queue
pub fn status_channel() -> (MessageHandler, mpsc::UnboundedReceiver<InboundMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler: MessageHandler = Arc::new(move |message: InboundMessage| {
        if tx.send(message).is_err() {
            debug!("status ingest stopped, dropping message");
        }
    });
    (handler, rx)
}

/// Apply queued status messages until the handler side is dropped
pub fn spawn_ingest(
    ingest: StatusIngest,
    mut rx: mpsc::UnboundedReceiver<InboundMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            ingest.handle(&message).await;
        }
        info!("status ingest finished");
    })
}

/// Subscribe the coordinator to every device's status topic
///
/// # Errors
/// Returns `BusError` if the subscription is refused
pub async fn subscribe_status(transport: &dyn Transport) -> Result<(), BusError> {
    transport.subscribe(topics::STATUS_WILDCARD).await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use fleetman_api::StatusMessage;
    use fleetman_bus::MemoryBroker;
    use fleetman_core::{Device, DeviceStore, LivenessCache, MemoryStore};

    use super::*;

    #[tokio::test]
    async fn test_heartbeats_reach_cache_and_store() {
        let store = Arc::new(MemoryStore::new());
        store.insert_device(Device::new("r1", "Robot 1")).await;
        let cache = LivenessCache::new();

        let broker = MemoryBroker::new();
        let (handler, rx) = status_channel();
        let coordinator = broker.connect(handler);
        subscribe_status(&coordinator).await.unwrap();
        spawn_ingest(StatusIngest::new(cache.clone(), store.clone()), rx);

        let publisher = broker.connect(Arc::new(|_: InboundMessage| {}));
        let status = StatusMessage {
            status: StatusMessage::OK.to_string(),
            ts: Utc::now(),
            ip: "10.0.0.7".to_string(),
            device_type: "robot".to_string(),
            name: "Robot 1".to_string(),
            job_id: None,
            job_status: None,
            job_error: None,
        };
        publisher
            .publish(
                &topics::status_topic("r1"),
                serde_json::to_vec(&status).unwrap(),
                true,
            )
            .await
            .unwrap();

        let mut device = store.get_device("r1").await.unwrap().unwrap();
        for _ in 0..50 {
            if device.last_seen.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            device = store.get_device("r1").await.unwrap().unwrap();
        }
        assert!(device.last_seen.is_some());
        assert_eq!(device.last_ip.as_deref(), Some("10.0.0.7"));
        assert_eq!(cache.get("r1").unwrap().ip, "10.0.0.7");
    }
}
