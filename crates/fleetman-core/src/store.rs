//! Storage collaborator interface
//!
//! The system of record (devices, jobs, install credentials) lives outside
//! this crate. `MemoryStore` backs single-host deployments and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleetman_api::JobStatus;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::CoreError;

/// A managed device as known to storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    #[serde(default = "default_device_type")]
    pub device_type: String,
    /// Last address the device reported
    #[serde(default)]
    pub last_ip: Option<String>,
    /// When the coordinator last heard from the device
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

fn default_device_type() -> String {
    "robot".to_string()
}

impl Device {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            device_type: default_device_type(),
            last_ip: None,
            last_seen: None,
        }
    }
}

/// Stored SSH install credentials; every field may be missing
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstallCredentials {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub use_sudo: bool,
    #[serde(default)]
    pub sudo_password: Option<String>,
}

impl std::fmt::Debug for InstallCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("InstallCredentials")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("private_key", &redact(&self.private_key))
            .field("password", &redact(&self.password))
            .field("use_sudo", &self.use_sudo)
            .field("sudo_password", &redact(&self.sudo_password))
            .finish()
    }
}

/// Persisted record of a queued command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub device_id: String,
    pub kind: String,
    pub data: serde_json::Value,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

/// Storage operations the coordinator depends on
#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn get_device(&self, id: &str) -> Result<Option<Device>, CoreError>;

    /// Record that the device was heard from at `at`
    async fn update_last_seen(
        &self,
        id: &str,
        at: DateTime<Utc>,
        ip: Option<&str>,
    ) -> Result<(), CoreError>;

    /// Device-specific install credentials
    async fn get_install_credentials(&self, id: &str)
    -> Result<Option<InstallCredentials>, CoreError>;

    /// System-wide default install credentials
    async fn default_install_credentials(&self) -> Result<Option<InstallCredentials>, CoreError>;

    async fn record_job(&self, job: JobRecord) -> Result<(), CoreError>;
}

#[derive(Default)]
struct Tables {
    devices: HashMap<String, Device>,
    credentials: HashMap<String, InstallCredentials>,
    default_credentials: Option<InstallCredentials>,
    jobs: Vec<JobRecord>,
}

/// In-memory `DeviceStore`
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_device(&self, device: Device) {
        self.tables
            .write()
            .await
            .devices
            .insert(device.id.clone(), device);
    }

    pub async fn set_install_credentials(&self, id: &str, creds: InstallCredentials) {
        self.tables
            .write()
            .await
            .credentials
            .insert(id.to_string(), creds);
    }

    pub async fn set_default_credentials(&self, creds: Option<InstallCredentials>) {
        self.tables.write().await.default_credentials = creds;
    }

    /// Jobs recorded so far, oldest first
    pub async fn jobs(&self) -> Vec<JobRecord> {
        self.tables.read().await.jobs.clone()
    }

    pub async fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tables.read().await.devices.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl DeviceStore for MemoryStore {
    async fn get_device(&self, id: &str) -> Result<Option<Device>, CoreError> {
        Ok(self.tables.read().await.devices.get(id).cloned())
    }

    async fn update_last_seen(
        &self,
        id: &str,
        at: DateTime<Utc>,
        ip: Option<&str>,
    ) -> Result<(), CoreError> {
        let mut tables = self.tables.write().await;
        let device = tables
            .devices
            .get_mut(id)
            .ok_or_else(|| CoreError::DeviceNotFound(id.to_string()))?;
        device.last_seen = Some(at);
        if let Some(ip) = ip.filter(|ip| !ip.is_empty()) {
            device.last_ip = Some(ip.to_string());
        }
        Ok(())
    }

    async fn get_install_credentials(
        &self,
        id: &str,
    ) -> Result<Option<InstallCredentials>, CoreError> {
        Ok(self.tables.read().await.credentials.get(id).cloned())
    }

    async fn default_install_credentials(&self) -> Result<Option<InstallCredentials>, CoreError> {
        Ok(self.tables.read().await.default_credentials.clone())
    }

    async fn record_job(&self, job: JobRecord) -> Result<(), CoreError> {
        self.tables.write().await.jobs.push(job);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_last_seen_keeps_ip_when_empty() {
        let store = MemoryStore::new();
        let mut device = Device::new("r1", "Robot 1");
        device.last_ip = Some("10.0.0.9".to_string());
        store.insert_device(device).await;

        let at = Utc::now();
        store.update_last_seen("r1", at, Some("")).await.unwrap();

        let device = store.get_device("r1").await.unwrap().unwrap();
        assert_eq!(device.last_seen, Some(at));
        assert_eq!(device.last_ip.as_deref(), Some("10.0.0.9"));
    }

    #[tokio::test]
    async fn test_update_last_seen_unknown_device() {
        let store = MemoryStore::new();
        let err = store.update_last_seen("ghost", Utc::now(), None).await.unwrap_err();
        assert!(matches!(err, CoreError::DeviceNotFound(_)));
    }
}
