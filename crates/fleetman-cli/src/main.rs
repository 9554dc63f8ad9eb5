//! fleetman CLI
//!
//! Command-line interface for the fleetman daemon

mod output;

use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::Result;
use eyre::WrapErr;
use fleetman_api::requests::RepoConfig;
use fleetman_client::HttpClient;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fleetman-cli")]
#[command(about = "Fleet provisioning and command CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// Daemon base URL
    #[arg(long, global = true, default_value = "http://localhost:8080")]
    url: String,

    /// Print raw JSON responses
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check daemon health
    Health,

    /// Provisioning batches
    #[command(subcommand)]
    Batch(BatchCommand),

    /// Queue a command for one device
    Command {
        device: String,
        /// Command type (reset_logs, update_repo, apply_scenario, self_test, identify)
        kind: String,
        /// JSON payload
        #[arg(long, default_value = "{}")]
        data: String,
    },

    /// Publish a command to every device
    Broadcast {
        kind: String,
        #[arg(long, default_value = "{}")]
        data: String,
    },

    /// Show one device's record and last heartbeat
    Device { id: String },

    /// Show the last heartbeat of every device
    Fleet,
}

#[derive(Subcommand)]
enum BatchCommand {
    /// Start a batch
    Start(StartArgs),

    /// Show the current or last batch
    Status {
        /// Poll until the batch is no longer active
        #[arg(long)]
        wait: bool,
        #[command(flatten)]
        poll: PollArgs,
    },
}

#[derive(Args)]
struct StartArgs {
    /// Device id (repeatable)
    #[arg(short, long = "device", required = true)]
    devices: Vec<String>,

    /// Reinstall the agent over SSH and wait for it to reconnect
    #[arg(long)]
    reinstall: bool,

    #[arg(long)]
    reset_logs: bool,

    #[arg(long)]
    update_repo: bool,

    /// Git remote for --update-repo
    #[arg(long, requires = "update_repo")]
    remote: Option<String>,

    /// Branch for --update-repo
    #[arg(long, requires = "update_repo")]
    branch: Option<String>,

    /// Working copy path for --update-repo
    #[arg(long, requires = "update_repo")]
    path: Option<String>,

    /// Scenario id to apply (repeatable)
    #[arg(long = "scenario")]
    scenarios: Vec<String>,

    #[arg(long)]
    self_test: bool,

    /// Poll until the batch is no longer active
    #[arg(long)]
    wait: bool,

    #[command(flatten)]
    poll: PollArgs,
}

#[derive(Args)]
struct PollArgs {
    /// Poll interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    poll_ms: u64,

    /// Give up waiting after this many seconds
    #[arg(long, default_value_t = 1800)]
    timeout_secs: u64,
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_data(data: &str) -> Result<serde_json::Value> {
    serde_json::from_str(data).wrap_err("--data is not valid JSON")
}

async fn wait_and_report(client: &HttpClient, poll: &PollArgs, json: bool) -> Result<()> {
    let mut last = String::new();
    let status = client
        .wait_for_batch(
            Duration::from_millis(poll.poll_ms),
            Duration::from_secs(poll.timeout_secs),
            |status| {
                let line = output::progress(status);
                if !json && line != last {
                    eprintln!("{line}");
                    last = line;
                }
            },
        )
        .await?;

    if json {
        print_json(&status)
    } else {
        print!("{}", output::batch_status(&status));
        if status.errors.is_empty() {
            Ok(())
        } else {
            Err(eyre::eyre!("{} device(s) failed", status.errors.len()))
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let client = HttpClient::new(&cli.url)?;
    tracing::debug!(url = %cli.url, "using daemon");

    match cli.command {
        Commands::Health => {
            let health = client.health().await?;
            if cli.json {
                print_json(&health)?;
            } else {
                println!("{}", health.status);
            }
        }
        Commands::Batch(BatchCommand::Start(args)) => {
            let repo_config = (args.remote.is_some() || args.branch.is_some() || args.path.is_some())
                .then(|| RepoConfig {
                    remote: args.remote.clone(),
                    branch: args.branch.clone(),
                    path: args.path.clone(),
                });

            let mut batch = client.batch().devices(args.devices.iter().cloned());
            if args.reinstall {
                batch = batch.reinstall();
            }
            if args.reset_logs {
                batch = batch.reset_logs();
            }
            if args.update_repo {
                batch = batch.update_repo(repo_config);
            }
            for scenario in &args.scenarios {
                batch = batch.scenario(scenario.clone());
            }
            if args.self_test {
                batch = batch.self_test();
            }

            let accepted = match batch.send().await {
                Err(e) if e.is_conflict() => {
                    return Err(eyre::eyre!("another batch is still running"));
                }
                other => other?,
            };
            if cli.json && !args.wait {
                print_json(&accepted)?;
            } else if !cli.json {
                println!("batch accepted for {} device(s)", accepted.total);
            }

            if args.wait {
                wait_and_report(&client, &args.poll, cli.json).await?;
            }
        }
        Commands::Batch(BatchCommand::Status { wait, poll }) => {
            if wait {
                wait_and_report(&client, &poll, cli.json).await?;
            } else {
                let status = client.batch_status().await?;
                if cli.json {
                    print_json(&status)?;
                } else {
                    print!("{}", output::batch_status(&status));
                }
            }
        }
        Commands::Command { device, kind, data } => {
            let job_id = client
                .queue_command(&device, &kind, parse_data(&data)?)
                .await?;
            if cli.json {
                print_json(&serde_json::json!({ "job_id": job_id }))?;
            } else {
                println!("queued {kind} for {device} as {job_id}");
            }
        }
        Commands::Broadcast { kind, data } => {
            let id = client.broadcast(&kind, parse_data(&data)?).await?;
            if cli.json {
                print_json(&serde_json::json!({ "job_id": id }))?;
            } else {
                println!("broadcast {kind} as {id}");
            }
        }
        Commands::Device { id } => {
            let device = client.device_status(&id).await?;
            if cli.json {
                print_json(&device)?;
            } else {
                print!("{}", output::device_status(&device));
            }
        }
        Commands::Fleet => {
            let devices = client.fleet_status().await?;
            if cli.json {
                print_json(&devices)?;
            } else {
                print!("{}", output::fleet(&devices));
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    run(Cli::parse()).await
}
