//! Configuration loading and types

use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::WrapErr;
use fleetman_api::BrokerConfig;
use fleetman_core::{BatchConfig, Device, InstallCredentials, MemoryStore};
use serde::{Deserialize, Serialize};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "FLEETMAN_CONFIG";

/// Top-level configuration for the fleetman daemon
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub batch: BatchSection,
    /// System-wide default install credentials
    #[serde(default)]
    pub credentials: Option<InstallCredentials>,
    /// Devices seeded into the in-memory store
    #[serde(default)]
    pub device: Vec<DeviceSeed>,
}

/// Daemon server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Address and port to bind to
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
    /// Scenario documents served to devices as `<id>.json`
    #[serde(default = "default_scenarios_dir")]
    pub scenarios_dir: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            log_level: default_log_level(),
            json_logs: false,
            scenarios_dir: default_scenarios_dir(),
        }
    }
}

/// Coordinator's own broker connection
#[derive(Clone, Serialize, Deserialize)]
pub struct BrokerSection {
    #[serde(default = "default_broker_host")]
    pub host: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Broker host written into device configs, when devices reach the
    /// broker under a different name than the coordinator does
    #[serde(default)]
    pub device_host: Option<String>,
}

impl std::fmt::Debug for BrokerSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerSection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("device_host", &self.device_host)
            .finish()
    }
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            host: default_broker_host(),
            port: default_broker_port(),
            client_id: default_client_id(),
            username: None,
            password: None,
            device_host: None,
        }
    }
}

/// Batch orchestration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSection {
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
    #[serde(default = "default_reconnect_poll_ms")]
    pub reconnect_poll_ms: u64,
    #[serde(default)]
    pub demo_mode: bool,
    #[serde(default = "default_demo_delay_ms")]
    pub demo_delay_ms: u64,
    /// Directory holding `fleetman-agent-linux-<arch>` executables
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,
    /// Coordinator URL written into device configs
    #[serde(default)]
    pub coordinator_url: Option<String>,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_poll_ms: default_reconnect_poll_ms(),
            demo_mode: false,
            demo_delay_ms: default_demo_delay_ms(),
            artifacts_dir: default_artifacts_dir(),
            coordinator_url: None,
        }
    }
}

/// A device record seeded at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSeed {
    pub id: String,
    pub name: String,
    #[serde(default = "default_device_type")]
    pub device_type: String,
    #[serde(default)]
    pub last_ip: Option<String>,
    #[serde(default)]
    pub credentials: Option<InstallCredentials>,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_scenarios_dir() -> PathBuf {
    PathBuf::from("/var/lib/fleetman/scenarios")
}

fn default_broker_host() -> String {
    "localhost".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "fleetman-coordinator".to_string()
}

fn default_reconnect_attempts() -> u32 {
    60
}

fn default_reconnect_poll_ms() -> u64 {
    1000
}

fn default_demo_delay_ms() -> u64 {
    2000
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("/var/lib/fleetman/artifacts")
}

fn default_device_type() -> String {
    "robot".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).wrap_err_with(|| format!("parsing {}", path.display()))
    }

    /// Load from default paths or use defaults
    ///
    /// # Errors
    /// Returns error if the file named by `FLEETMAN_CONFIG` or a found
    /// default file cannot be loaded
    pub fn load_default() -> eyre::Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load(Path::new(&path));
        }

        let mut paths = vec![
            PathBuf::from("fleetman.toml"),
            PathBuf::from("/etc/fleetman/fleetman.toml"),
        ];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("fleetman/fleetman.toml"));
        }

        for path in paths {
            if path.exists() {
                return Self::load(&path);
            }
        }

        tracing::warn!("no config file found, using defaults");
        Ok(Config::default())
    }

    /// Settings for the batch orchestrator
    #[must_use]
    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            reconnect_attempts: self.batch.reconnect_attempts,
            reconnect_poll_interval: Duration::from_millis(self.batch.reconnect_poll_ms),
            demo_mode: self.batch.demo_mode,
            demo_delay: Duration::from_millis(self.batch.demo_delay_ms),
            agent_broker: BrokerConfig {
                host: self
                    .broker
                    .device_host
                    .clone()
                    .unwrap_or_else(|| self.broker.host.clone()),
                port: self.broker.port,
                username: self.broker.username.clone(),
                password: self.broker.password.clone(),
            },
            coordinator_url: self.batch.coordinator_url.clone(),
        }
    }

    /// Build the in-memory store from the seed records
    pub async fn seed_store(&self) -> MemoryStore {
        let store = MemoryStore::new();
        store.set_default_credentials(self.credentials.clone()).await;

        for seed in &self.device {
            let mut device = Device::new(&seed.id, &seed.name);
            device.device_type = seed.device_type.clone();
            device.last_ip = seed.last_ip.clone();
            store.insert_device(device).await;

            if let Some(creds) = &seed.credentials {
                store.set_install_credentials(&seed.id, creds.clone()).await;
            }
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use fleetman_core::DeviceStore;

    use super::*;

    const SAMPLE: &str = r#"
[daemon]
bind = "0.0.0.0:9000"

[broker]
host = "mosquitto"
device_host = "broker.lan"
password = "hunter2"

[batch]
reconnect_attempts = 5
demo_mode = true
artifacts_dir = "/srv/artifacts"

[credentials]
user = "robot"
password = "fleet"

[[device]]
id = "r1"
name = "Robot 1"
last_ip = "10.0.0.5"

[[device]]
id = "l1"
name = "Laptop"
device_type = "laptop"

[device.credentials]
address = "10.0.0.9"
user = "admin"
"#;

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.daemon.bind, "127.0.0.1:8080");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.batch.reconnect_attempts, 60);
        assert!(!config.batch.demo_mode);
        assert!(config.device.is_empty());

        let batch = config.batch_config();
        assert_eq!(batch.reconnect_poll_interval, Duration::from_secs(1));
        assert_eq!(batch.agent_broker.host, "localhost");
    }

    #[test]
    fn test_parse_sample() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.daemon.bind, "0.0.0.0:9000");
        assert_eq!(config.device.len(), 2);
        assert_eq!(config.device[1].device_type, "laptop");

        let batch = config.batch_config();
        assert_eq!(batch.reconnect_attempts, 5);
        assert!(batch.demo_mode);
        assert_eq!(batch.agent_broker.host, "broker.lan");
        assert_eq!(batch.agent_broker.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn test_broker_password_is_redacted() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        assert!(!format!("{:?}", config.broker).contains("hunter2"));
    }

    #[tokio::test]
    async fn test_seed_store() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        let store = config.seed_store().await;

        assert_eq!(store.device_ids().await, vec!["l1", "r1"]);
        let r1 = store.get_device("r1").await.unwrap().unwrap();
        assert_eq!(r1.last_ip.as_deref(), Some("10.0.0.5"));

        let l1 = store.get_install_credentials("l1").await.unwrap().unwrap();
        assert_eq!(l1.address.as_deref(), Some("10.0.0.9"));
        assert!(store.get_install_credentials("r1").await.unwrap().is_none());

        let defaults = store.default_install_credentials().await.unwrap().unwrap();
        assert_eq!(defaults.user.as_deref(), Some("robot"));
    }
}
