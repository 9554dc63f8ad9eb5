//! Built-in device command handlers
//!
//! Every handler runs inside a job task and may block on process
//! execution or HTTP.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fleetman_api::{
    AgentConfig, ApplyScenarioPayload, CommandKind, EmptyPayload, IdentifyPayload,
    UpdateRepoPayload,
};
use fleetman_exec::{LocalExecutor, RemoteExecutor, shell_quote};
use tracing::{info, instrument};

use crate::error::AgentError;
use crate::registry::CommandRegistry;

/// Timeout for scenario downloads
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

const COMMAND_TIMEOUT: Duration = Duration::from_secs(300);
const SELF_TEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Collaborators shared by the handlers
#[derive(Clone)]
pub struct HandlerContext {
    pub config: Arc<AgentConfig>,
    pub executor: Arc<dyn RemoteExecutor>,
    pub http: reqwest::Client,
}

impl HandlerContext {
    /// Local executor and an HTTP client with the download timeout
    ///
    /// Scripts see the device id as `FLEETMAN_DEVICE_ID`.
    ///
    /// # Errors
    /// Returns `AgentError::Config` if the HTTP client cannot be built
    pub fn local(config: AgentConfig) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .connect_timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| AgentError::Config(e.to_string()))?;

        let executor = LocalExecutor::new().with_env("FLEETMAN_DEVICE_ID", &config.device_id);
        Ok(Self {
            config: Arc::new(config),
            executor: Arc::new(executor),
            http,
        })
    }

    async fn sh(&self, script: &str, timeout: Duration) -> Result<String, AgentError> {
        let result = self.executor.run_with_timeout(script, timeout).await?;
        Ok(result.into_checked()?.stdout)
    }
}

/// Registry with every built-in handler
///
/// # Errors
/// Returns `AgentError` if a registration is rejected
pub fn builtin(ctx: HandlerContext) -> Result<CommandRegistry, AgentError> {
    let mut registry = CommandRegistry::new();

    let c = ctx.clone();
    registry.register(CommandKind::ResetLogs.as_str(), move |_: EmptyPayload| {
        let c = c.clone();
        async move { reset_logs(&c).await }
    })?;

    let c = ctx.clone();
    registry.register(CommandKind::UpdateRepo.as_str(), move |p: UpdateRepoPayload| {
        let c = c.clone();
        async move { update_repo(&c, p).await }
    })?;

    let c = ctx.clone();
    registry.register(
        CommandKind::ApplyScenario.as_str(),
        move |p: ApplyScenarioPayload| {
            let c = c.clone();
            async move { apply_scenario(&c, p).await }
        },
    )?;

    let c = ctx.clone();
    registry.register(CommandKind::SelfTest.as_str(), move |_: EmptyPayload| {
        let c = c.clone();
        async move { self_test(&c).await }
    })?;

    registry.register(CommandKind::Identify.as_str(), move |p: IdentifyPayload| {
        let c = ctx.clone();
        async move { identify(&c, p).await }
    })?;

    Ok(registry)
}

/// Truncate agent logs under the data dir and rotate the journal
#[instrument(skip(ctx))]
async fn reset_logs(ctx: &HandlerContext) -> Result<(), AgentError> {
    let logs = Path::new(&ctx.config.data_dir).join("logs");
    let logs = shell_quote(&logs.to_string_lossy());
    let script = format!(
        "mkdir -p {logs} && find {logs} -type f -name '*.log' -exec truncate -s 0 {{}} + \
         && (journalctl --rotate --vacuum-time=1s >/dev/null 2>&1 || true)"
    );
    ctx.sh(&script, COMMAND_TIMEOUT).await?;
    info!("logs reset");
    Ok(())
}

/// Fetch, check out and fast-forward the working copy
#[instrument(skip(ctx))]
async fn update_repo(ctx: &HandlerContext, payload: UpdateRepoPayload) -> Result<(), AgentError> {
    let path = payload
        .path
        .unwrap_or_else(|| ctx.config.repo_dir.clone());
    let remote = payload.remote.unwrap_or_else(|| "origin".to_string());

    let cd = format!("cd {}", shell_quote(&path));
    let script = match &payload.branch {
        Some(branch) => format!(
            "{cd} && git fetch {remote} && git checkout {branch} && git merge --ff-only {upstream}",
            remote = shell_quote(&remote),
            branch = shell_quote(branch),
            upstream = shell_quote(&format!("{remote}/{branch}")),
        ),
        None => format!("{cd} && git pull --ff-only {}", shell_quote(&remote)),
    };

    ctx.sh(&script, COMMAND_TIMEOUT).await?;
    info!(path = %path, "repository updated");
    Ok(())
}

fn scenario_path(data_dir: &str, scenario_id: &str) -> Result<PathBuf, AgentError> {
    let valid = !scenario_id.is_empty()
        && scenario_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !scenario_id.starts_with('.');
    if !valid {
        return Err(AgentError::InvalidPayload(format!(
            "bad scenario id {scenario_id:?}"
        )));
    }
    Ok(Path::new(data_dir)
        .join("scenarios")
        .join(format!("{scenario_id}.json")))
}

fn scenario_url(config: &AgentConfig, payload: &ApplyScenarioPayload) -> Result<String, AgentError> {
    if let Some(url) = &payload.url {
        return Ok(url.clone());
    }
    let base = config
        .coordinator_url
        .as_deref()
        .ok_or_else(|| AgentError::Config("coordinator_url is not set".to_string()))?;
    Ok(format!(
        "{}/api/scenarios/{}",
        base.trim_end_matches('/'),
        payload.scenario_id
    ))
}

/// Download a scenario document and store it under the data dir
#[instrument(skip(ctx))]
async fn apply_scenario(
    ctx: &HandlerContext,
    payload: ApplyScenarioPayload,
) -> Result<(), AgentError> {
    let target = scenario_path(&ctx.config.data_dir, &payload.scenario_id)?;
    let url = scenario_url(&ctx.config, &payload)?;

    let body = ctx
        .http
        .get(&url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| AgentError::Download(e.to_string()))?
        .bytes()
        .await
        .map_err(|e| AgentError::Download(e.to_string()))?;

    if let Some(dir) = target.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::write(&target, &body).await?;

    info!(
        scenario = %payload.scenario_id,
        path = %target.display(),
        bytes = body.len(),
        "scenario applied"
    );
    Ok(())
}

#[instrument(skip(ctx))]
async fn self_test(ctx: &HandlerContext) -> Result<(), AgentError> {
    let command = ctx
        .config
        .self_test_command
        .as_deref()
        .ok_or_else(|| AgentError::Config("self_test_command is not set".to_string()))?;

    ctx.sh(command, SELF_TEST_TIMEOUT).await?;
    info!("self-test passed");
    Ok(())
}

/// Make the device noticeable for `duration_secs`
#[instrument(skip(ctx))]
async fn identify(ctx: &HandlerContext, payload: IdentifyPayload) -> Result<(), AgentError> {
    let duration = Duration::from_secs(payload.duration_secs);
    info!(
        device = %ctx.config.device_id,
        name = %ctx.config.name,
        secs = payload.duration_secs,
        ">>> identify <<<"
    );

    match &ctx.config.identify_command {
        Some(command) => {
            ctx.sh(command, duration + Duration::from_secs(30)).await?;
        }
        None => tokio::time::sleep(duration).await,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use fleetman_api::Command;
    use fleetman_exec::{CommandResult, ExecError};
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct RecordingExecutor {
        commands: Mutex<Vec<String>>,
        status: i32,
    }

    #[async_trait]
    impl RemoteExecutor for RecordingExecutor {
        async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
            self.commands.lock().unwrap().push(cmd.to_string());
            Ok(CommandResult {
                status: self.status,
                stdout: String::new(),
                stderr: if self.status == 0 { String::new() } else { "fatal".to_string() },
                duration: Duration::from_millis(1),
            })
        }

        async fn run_with_timeout(
            &self,
            cmd: &str,
            _timeout: Duration,
        ) -> Result<CommandResult, ExecError> {
            self.run(cmd).await
        }

        async fn run_with_stdin(&self, cmd: &str, _stdin: &[u8]) -> Result<CommandResult, ExecError> {
            self.run(cmd).await
        }

        fn executor_type(&self) -> &'static str {
            "recording"
        }
    }

    fn context(executor: Arc<RecordingExecutor>, config: AgentConfig) -> HandlerContext {
        HandlerContext {
            config: Arc::new(config),
            executor,
            http: reqwest::Client::new(),
        }
    }

    #[tokio::test]
    async fn test_update_repo_uses_payload_branch() {
        let executor = Arc::new(RecordingExecutor::default());
        let mut config = AgentConfig::new("r1", "Robot 1");
        config.repo_dir = "/srv/repo".to_string();
        let registry = builtin(context(executor.clone(), config)).unwrap();

        registry
            .prepare(&Command::new("1", "update_repo", json!({"branch": "release"})))
            .unwrap()
            .await
            .unwrap();

        let commands = executor.commands.lock().unwrap();
        assert_eq!(
            commands[0],
            "cd '/srv/repo' && git fetch 'origin' && git checkout 'release' && git merge --ff-only 'origin/release'"
        );
    }

    #[tokio::test]
    async fn test_update_repo_without_branch_pulls() {
        let executor = Arc::new(RecordingExecutor::default());
        let registry =
            builtin(context(executor.clone(), AgentConfig::new("r1", "Robot 1"))).unwrap();

        registry
            .prepare(&Command::new("1", "update_repo", json!({"path": "/opt/app"})))
            .unwrap()
            .await
            .unwrap();

        assert_eq!(
            executor.commands.lock().unwrap()[0],
            "cd '/opt/app' && git pull --ff-only 'origin'"
        );
    }

    #[tokio::test]
    async fn test_failed_command_fails_job() {
        let executor = Arc::new(RecordingExecutor {
            status: 1,
            ..RecordingExecutor::default()
        });
        let mut config = AgentConfig::new("r1", "Robot 1");
        config.self_test_command = Some("run-checks".to_string());
        let registry = builtin(context(executor, config)).unwrap();

        let err = registry
            .prepare(&Command::new("1", "self_test", json!({})))
            .unwrap()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("fatal"));
    }

    #[tokio::test]
    async fn test_self_test_requires_command() {
        let registry = builtin(context(
            Arc::new(RecordingExecutor::default()),
            AgentConfig::new("r1", "Robot 1"),
        ))
        .unwrap();

        let err = registry
            .prepare(&Command::new("1", "self_test", json!({})))
            .unwrap()
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn test_scenario_path_rejects_traversal() {
        assert!(scenario_path("/var/lib/fleetman", "../etc/passwd").is_err());
        assert!(scenario_path("/var/lib/fleetman", "").is_err());
        assert_eq!(
            scenario_path("/var/lib/fleetman", "warehouse-2").unwrap(),
            PathBuf::from("/var/lib/fleetman/scenarios/warehouse-2.json")
        );
    }

    #[test]
    fn test_scenario_url_prefers_payload() {
        let mut config = AgentConfig::new("r1", "Robot 1");
        config.coordinator_url = Some("http://coord:8080/".to_string());

        let from_base = ApplyScenarioPayload {
            scenario_id: "s1".to_string(),
            url: None,
        };
        assert_eq!(
            scenario_url(&config, &from_base).unwrap(),
            "http://coord:8080/api/scenarios/s1"
        );

        let explicit = ApplyScenarioPayload {
            scenario_id: "s1".to_string(),
            url: Some("http://files/s1.json".to_string()),
        };
        assert_eq!(scenario_url(&config, &explicit).unwrap(), "http://files/s1.json");

        config.coordinator_url = None;
        assert!(scenario_url(&config, &from_base).is_err());
    }

    #[test]
    fn test_every_builtin_is_registered() {
        let registry = builtin(context(
            Arc::new(RecordingExecutor::default()),
            AgentConfig::new("r1", "Robot 1"),
        ))
        .unwrap();
        for kind in CommandKind::ALL {
            assert!(registry.contains(kind.as_str()));
        }
    }
}
