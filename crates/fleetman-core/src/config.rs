//! Batch orchestration settings

use std::time::Duration;

use fleetman_api::BrokerConfig;

/// Settings for `BatchOrchestrator`
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Polls of the device record after an install
    pub reconnect_attempts: u32,
    /// Delay between polls
    pub reconnect_poll_interval: Duration,
    /// Simulate install when credentials are missing instead of failing
    pub demo_mode: bool,
    /// Simulated install duration in demo mode
    pub demo_delay: Duration,
    /// Broker settings written into rendered agent configs
    pub agent_broker: BrokerConfig,
    /// Coordinator URL written into rendered agent configs
    pub coordinator_url: Option<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            reconnect_attempts: 60,
            reconnect_poll_interval: Duration::from_secs(1),
            demo_mode: false,
            demo_delay: Duration::from_secs(2),
            agent_broker: BrokerConfig::default(),
            coordinator_url: None,
        }
    }
}
