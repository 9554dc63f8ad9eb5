//! Agent configuration
//!
//! Loaded by the device process and rendered by the coordinator when it
//! provisions a device.

use serde::{Deserialize, Serialize};

/// Device agent configuration (`agent.toml`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Device id; selects the command and status topics
    pub device_id: String,
    /// Human-readable name reported in heartbeats
    pub name: String,
    /// Device type reported in heartbeats (`robot`, `laptop`, ...)
    #[serde(default = "default_device_type")]
    pub device_type: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
    /// Scheduler frequency
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    #[serde(default = "default_reconnect_cooldown_secs")]
    pub reconnect_cooldown_secs: u64,
    #[serde(default = "default_intake_capacity")]
    pub intake_capacity: usize,
    /// How long a command id is remembered for duplicate suppression
    #[serde(default = "default_dedup_ttl_secs")]
    pub dedup_ttl_secs: u64,
    /// Base URL of the coordinator, used to download scenarios
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinator_url: Option<String>,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_repo_dir")]
    pub repo_dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_test_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identify_command: Option<String>,
    #[serde(default)]
    pub broker: BrokerConfig,
}

/// Broker connection settings
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_host")]
    pub host: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl std::fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_broker_host(),
            port: default_broker_port(),
            username: None,
            password: None,
        }
    }
}

impl AgentConfig {
    /// Minimal config for a device; everything else takes its default
    pub fn new(device_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            name: name.into(),
            device_type: default_device_type(),
            log_level: default_log_level(),
            json_logs: false,
            tick_hz: default_tick_hz(),
            heartbeat_secs: default_heartbeat_secs(),
            reconnect_cooldown_secs: default_reconnect_cooldown_secs(),
            intake_capacity: default_intake_capacity(),
            dedup_ttl_secs: default_dedup_ttl_secs(),
            coordinator_url: None,
            data_dir: default_data_dir(),
            repo_dir: default_repo_dir(),
            self_test_command: None,
            identify_command: None,
            broker: BrokerConfig::default(),
        }
    }
}

fn default_device_type() -> String {
    "robot".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_tick_hz() -> u32 {
    10
}

fn default_heartbeat_secs() -> u64 {
    10
}

fn default_reconnect_cooldown_secs() -> u64 {
    5
}

fn default_intake_capacity() -> usize {
    10
}

fn default_dedup_ttl_secs() -> u64 {
    300
}

fn default_data_dir() -> String {
    "/var/lib/fleetman".to_string()
}

fn default_repo_dir() -> String {
    "/var/lib/fleetman/repo".to_string()
}

fn default_broker_host() -> String {
    "localhost".to_string()
}

fn default_broker_port() -> u16 {
    1883
}
