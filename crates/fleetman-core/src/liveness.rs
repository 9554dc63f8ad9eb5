//! Heartbeat ingestion and the liveness cache

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use fleetman_api::responses::DeviceLiveness;
use fleetman_api::{StatusMessage, topics};
use fleetman_bus::InboundMessage;
use tracing::{debug, warn};

use crate::store::DeviceStore;

/// Last status seen per device
#[derive(Clone, Default)]
pub struct LivenessCache {
    inner: Arc<RwLock<HashMap<String, DeviceLiveness>>>,
}

impl LivenessCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest(&self, device_id: &str, msg: &StatusMessage) {
        let entry = DeviceLiveness {
            device_id: device_id.to_string(),
            status: msg.status.clone(),
            ip: msg.ip.clone(),
            last_heartbeat: msg.ts,
            job_id: msg.job_id.clone(),
            job_status: msg.job_status,
            job_error: msg.job_error.clone(),
        };
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device_id.to_string(), entry);
    }

    #[must_use]
    pub fn get(&self, device_id: &str) -> Option<DeviceLiveness> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(device_id)
            .cloned()
    }

    /// All entries sorted by device id
    #[must_use]
    pub fn snapshot(&self) -> Vec<DeviceLiveness> {
        let mut all: Vec<DeviceLiveness> = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        all
    }
}

/// Consumes `fleet/status/+` messages
///
/// Every decodable status updates the cache. Live `ok` heartbeats also
/// refresh the device's last-seen time in storage, stamped with the
/// coordinator's clock; retained replays and last-will `offline` messages
/// do not, so a reconnect wait cannot be satisfied by stale state.
#[derive(Clone)]
pub struct StatusIngest {
    cache: LivenessCache,
    store: Arc<dyn DeviceStore>,
}

impl StatusIngest {
    pub fn new(cache: LivenessCache, store: Arc<dyn DeviceStore>) -> Self {
        Self { cache, store }
    }

    #[must_use]
    pub fn cache(&self) -> &LivenessCache {
        &self.cache
    }

    pub async fn handle(&self, message: &InboundMessage) {
        let Some(device_id) = topics::device_from_status_topic(&message.topic) else {
            debug!(topic = %message.topic, "ignoring non-status topic");
            return;
        };
        if message.payload.is_empty() {
            // cleared retained status
            return;
        }

        let status: StatusMessage = match serde_json::from_slice(&message.payload) {
            Ok(status) => status,
            Err(e) => {
                warn!(device = %device_id, error = %e, "malformed status message");
                return;
            }
        };

        self.cache.ingest(device_id, &status);

        if message.retained || status.status != StatusMessage::OK {
            return;
        }

        let ip = Some(status.ip.as_str()).filter(|ip| !ip.is_empty());
        if let Err(e) = self.store.update_last_seen(device_id, Utc::now(), ip).await {
            debug!(device = %device_id, error = %e, "last-seen not updated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Device, MemoryStore};

    fn status(state: &str) -> Vec<u8> {
        serde_json::to_vec(&StatusMessage {
            status: state.to_string(),
            ts: Utc::now(),
            ip: "10.0.0.7".to_string(),
            device_type: "robot".to_string(),
            name: "Robot 1".to_string(),
            job_id: None,
            job_status: None,
            job_error: None,
        })
        .unwrap()
    }

    async fn ingest() -> (StatusIngest, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.insert_device(Device::new("r1", "Robot 1")).await;
        (StatusIngest::new(LivenessCache::new(), store.clone()), store)
    }

    #[tokio::test]
    async fn test_live_heartbeat_updates_cache_and_last_seen() {
        let (ingest, store) = ingest().await;
        ingest
            .handle(&InboundMessage {
                topic: "fleet/status/r1".to_string(),
                payload: status("ok"),
                retained: false,
            })
            .await;

        assert_eq!(ingest.cache().get("r1").unwrap().ip, "10.0.0.7");
        let device = store.get_device("r1").await.unwrap().unwrap();
        assert!(device.last_seen.is_some());
        assert_eq!(device.last_ip.as_deref(), Some("10.0.0.7"));
    }

    #[tokio::test]
    async fn test_retained_replay_does_not_touch_last_seen() {
        let (ingest, store) = ingest().await;
        ingest
            .handle(&InboundMessage {
                topic: "fleet/status/r1".to_string(),
                payload: status("ok"),
                retained: true,
            })
            .await;

        assert!(ingest.cache().get("r1").is_some());
        assert!(store.get_device("r1").await.unwrap().unwrap().last_seen.is_none());
    }

    #[tokio::test]
    async fn test_offline_will_is_cached_only() {
        let (ingest, store) = ingest().await;
        ingest
            .handle(&InboundMessage {
                topic: "fleet/status/r1".to_string(),
                payload: status("offline"),
                retained: false,
            })
            .await;

        assert_eq!(ingest.cache().get("r1").unwrap().status, "offline");
        assert!(store.get_device("r1").await.unwrap().unwrap().last_seen.is_none());
    }

    #[tokio::test]
    async fn test_garbage_is_ignored() {
        let (ingest, _) = ingest().await;
        ingest
            .handle(&InboundMessage {
                topic: "fleet/status/r1".to_string(),
                payload: b"not json".to_vec(),
                retained: false,
            })
            .await;
        assert!(ingest.cache().snapshot().is_empty());
    }
}
