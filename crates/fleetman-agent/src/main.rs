//! fleetman-agent
//!
//! Device agent: keeps the broker connection up, publishes heartbeats and
//! runs commands sent by the coordinator.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::Result;
use fleetman_agent::{Agent, CommandIntake, HandlerContext, UdpAddressSource, config, handlers};
use fleetman_bus::{MqttTransport, Transport};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fleetman-agent")]
#[command(about = "Fleet device agent", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to agent.toml (defaults to FLEETMAN_AGENT_CONFIG or standard locations)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Resolves on ctrl-c or, on unix, SIGTERM from the service manager
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::load(path)?,
        None => config::load_default()?,
    };
    init_tracing(&config.log_level, config.json_logs);

    info!(
        device = %config.device_id,
        broker = %config.broker.host,
        "fleetman-agent starting"
    );

    let (intake, intake_rx) = CommandIntake::new(
        config.intake_capacity,
        Duration::from_secs(config.dedup_ttl_secs),
    );

    let settings = fleetman_agent::mqtt_settings(&config)?;
    let transport: Arc<dyn Transport> =
        Arc::new(MqttTransport::connect(&settings, intake.handler()));
    fleetman_agent::subscribe_commands(transport.as_ref(), &config.device_id).await?;

    let registry = handlers::builtin(HandlerContext::local(config.clone())?)?;
    info!(commands = ?registry.kinds(), "handlers registered");

    let agent = Agent::new(
        config,
        transport,
        intake_rx,
        registry,
        Arc::new(UdpAddressSource::default()),
    );

    agent.run(shutdown_signal()).await;

    info!("fleetman-agent stopped");
    Ok(())
}
