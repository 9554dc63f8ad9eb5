//! Agent configuration loading

use std::path::{Path, PathBuf};

use eyre::{WrapErr, eyre};
use fleetman_api::AgentConfig;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "FLEETMAN_AGENT_CONFIG";

/// Load and validate configuration from `path`
///
/// # Errors
/// Returns error if the file cannot be read, parsed or is invalid
pub fn load(path: &Path) -> eyre::Result<AgentConfig> {
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading {}", path.display()))?;
    let config: AgentConfig =
        toml::from_str(&content).wrap_err_with(|| format!("parsing {}", path.display()))?;
    validate(&config)?;
    Ok(config)
}

/// Load from `FLEETMAN_AGENT_CONFIG` or the first existing default path
///
/// # Errors
/// Returns error if no file is found or it is invalid
pub fn load_default() -> eyre::Result<AgentConfig> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return load(Path::new(&path));
    }

    let mut paths = vec![
        PathBuf::from("agent.toml"),
        PathBuf::from("/etc/fleetman/agent.toml"),
    ];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("fleetman/agent.toml"));
    }

    for path in &paths {
        if path.exists() {
            return load(path);
        }
    }

    Err(eyre!(
        "no agent config found (set {CONFIG_ENV} or create /etc/fleetman/agent.toml)"
    ))
}

fn validate(config: &AgentConfig) -> eyre::Result<()> {
    if config.device_id.trim().is_empty() {
        return Err(eyre!("device_id must not be empty"));
    }
    if config.device_id.contains(['/', '+', '#']) {
        return Err(eyre!("device_id must not contain topic separators or wildcards"));
    }
    if config.tick_hz == 0 {
        return Err(eyre!("tick_hz must be positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_file_gets_defaults() {
        let config: AgentConfig = toml::from_str(
            r#"
            device_id = "r1"
            name = "Robot 1"

            [broker]
            host = "broker.fleet"
            "#,
        )
        .unwrap();
        validate(&config).unwrap();

        assert_eq!(config.tick_hz, 10);
        assert_eq!(config.heartbeat_secs, 10);
        assert_eq!(config.intake_capacity, 10);
        assert_eq!(config.broker.host, "broker.fleet");
        assert_eq!(config.broker.port, 1883);
    }

    #[test]
    fn test_wildcard_device_id_is_rejected() {
        let config = AgentConfig::new("r/1", "bad");
        assert!(validate(&config).is_err());
    }
}
