//! fleetman daemon
//!
//! Coordinates provisioning batches and device commands over HTTP and the
//! pub/sub broker.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::Result;
use fleetman::ingest::{spawn_ingest, status_channel, subscribe_status};
use fleetman::{AppState, Config, create_router};
use fleetman_bus::{MqttSettings, MqttTransport, Transport};
use fleetman_core::{
    BatchCoordinator, BatchOrchestrator, CommandDispatcher, DeviceStore, DirArtifactSource,
    LivenessCache, StatusIngest,
};
use fleetman_exec::Provisioner;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fleetman")]
#[command(about = "Fleet provisioning and command coordinator", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to fleetman.toml (defaults to FLEETMAN_CONFIG or standard locations)
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
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    init_tracing(&config.daemon.log_level, config.daemon.json_logs);

    info!(
        bind = %config.daemon.bind,
        broker = %config.broker.host,
        devices = config.device.len(),
        demo_mode = config.batch.demo_mode,
        "fleetman starting"
    );

    let store: Arc<dyn DeviceStore> = Arc::new(config.seed_store().await);
    let liveness = LivenessCache::new();

    let (handler, status_rx) = status_channel();
    let settings = MqttSettings::new(
        &config.broker.host,
        config.broker.port,
        &config.broker.client_id,
    )
    .with_credentials(config.broker.username.clone(), config.broker.password.clone())
    .with_auto_reconnect(Duration::from_secs(5));
    let transport: Arc<dyn Transport> = Arc::new(MqttTransport::connect(&settings, handler));
    subscribe_status(transport.as_ref()).await?;
    let ingest = spawn_ingest(StatusIngest::new(liveness.clone(), store.clone()), status_rx);

    let dispatcher = Arc::new(CommandDispatcher::new(store.clone(), transport));
    let orchestrator = BatchOrchestrator::new(
        BatchCoordinator::new(),
        store.clone(),
        Arc::new(Provisioner::ssh()),
        Arc::new(DirArtifactSource::new(&config.batch.artifacts_dir)),
        dispatcher.clone(),
        config.batch_config(),
    );

    let state = Arc::new(
        AppState::new(orchestrator, dispatcher, liveness, store)
            .with_scenarios_dir(&config.daemon.scenarios_dir),
    );
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.daemon.bind).await?;
    info!(addr = %config.daemon.bind, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ingest.abort();
    info!("fleetman stopped");
    Ok(())
}
