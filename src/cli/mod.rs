// CLI module - User-facing command-line interface

mod output;

pub use output::print_error;

use crate::config::{SupervisorConfig, TargetCommand};
use crate::error::{ReboundError, Result};
use crate::logs;
use crate::probe::HealthProbe;
use crate::process::ResourceInspector;
use crate::supervisor::Supervisor;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;

/// Rebound - keeps a fragile service alive by probing and restarting it
#[derive(Parser)]
#[command(name = "rebound")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Supervise the target until interrupted
    Run(RunArgs),

    /// Probe the target once and report
    Check {
        /// Configuration file (TOML or JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Health endpoint, overrides the config file
        #[arg(long)]
        health_url: Option<String>,

        /// Also inspect this process
        #[arg(long)]
        pid: Option<u32>,

        /// Memory ceiling for the inspection
        #[arg(long)]
        memory_mb: Option<u64>,

        /// Probe timeout in milliseconds
        #[arg(long, default_value = "2000")]
        timeout_ms: u64,
    },

    /// Write a default configuration file
    InitConfig {
        /// Destination file
        #[arg(short, long, default_value = "rebound.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Configuration file (TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Health endpoint to probe
    #[arg(long)]
    health_url: Option<String>,

    /// Pause between cycles in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Resident memory ceiling in megabytes
    #[arg(long)]
    memory_mb: Option<u64>,

    /// Command that launches the target
    #[arg(last = true)]
    command: Vec<String>,
}

impl Cli {
    /// Run the CLI application
    ///
    /// Returns `Ok(false)` when the command ran but the target is unhealthy.
    pub async fn run() -> Result<bool> {
        let cli = Cli::parse();
        cli.execute().await
    }

    async fn execute(self) -> Result<bool> {
        match self.command {
            Commands::Run(args) => run_supervisor(args).await,
            Commands::Check {
                config,
                health_url,
                pid,
                memory_mb,
                timeout_ms,
            } => check_once(config, health_url, pid, memory_mb, timeout_ms).await,
            Commands::InitConfig { output, force } => init_config(output, force),
        }
    }
}

async fn run_supervisor(args: RunArgs) -> Result<bool> {
    let config = build_config(&args)?;
    let _guard = logs::init(&config.logging)?;

    let supervisor = Supervisor::new(config)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signals = tokio::spawn(wait_for_signal(shutdown_tx));

    let result = supervisor.run(shutdown_rx).await;
    signals.abort();

    let summary = result?;
    output::print_summary(&summary);
    Ok(true)
}

/// Merge the config file (if any) with command-line overrides
fn build_config(args: &RunArgs) -> Result<SupervisorConfig> {
    let command_target = match args.command.split_first() {
        Some((program, rest)) => Some(TargetCommand::new(program.clone()).with_args(rest.to_vec())),
        None => None,
    };

    let mut config = match args.config {
        Some(ref path) => SupervisorConfig::from_file(path)?,
        None => {
            let health_url = args.health_url.clone().ok_or_else(|| {
                ReboundError::MissingConfigField("health_url (use --config or --health-url)".to_string())
            })?;
            let target = command_target.clone().ok_or_else(|| {
                ReboundError::MissingConfigField("target command (use --config or -- <command>)".to_string())
            })?;
            SupervisorConfig::new(health_url, target)
        }
    };

    if let Some(ref url) = args.health_url {
        config.health_url = url.clone();
    }
    if let Some(interval) = args.interval_ms {
        config.check_interval_ms = interval;
    }
    if let Some(memory) = args.memory_mb {
        config.memory_threshold_mb = memory;
    }
    if let Some(target) = command_target {
        config.target = target;
    }

    config.validate()?;
    Ok(config)
}

async fn check_once(
    config: Option<PathBuf>,
    health_url: Option<String>,
    pid: Option<u32>,
    memory_mb: Option<u64>,
    timeout_ms: u64,
) -> Result<bool> {
    let file_config = match config {
        Some(ref path) => Some(SupervisorConfig::from_file(path)?),
        None => None,
    };

    let url = health_url
        .or_else(|| file_config.as_ref().map(|c| c.health_url.clone()))
        .ok_or_else(|| ReboundError::MissingConfigField("health_url".to_string()))?;
    let memory_limit = memory_mb
        .or_else(|| file_config.as_ref().map(|c| c.memory_threshold_mb))
        .unwrap_or(100);

    let probe = HealthProbe::new()?;
    let health = probe.check(&url, Duration::from_millis(timeout_ms)).await;
    output::print_health(&url, &health);

    let mut healthy = health.healthy;

    if let Some(pid) = pid {
        let mut inspector = ResourceInspector::new();
        let resource = inspector.check(pid, memory_limit);
        output::print_resource(pid, &resource);
        healthy &= resource.healthy;
    }

    output::print_verdict(healthy);
    Ok(healthy)
}

fn init_config(output: PathBuf, force: bool) -> Result<bool> {
    if output.exists() && !force {
        return Err(ReboundError::ConfigError(format!(
            "{} already exists (use --force to overwrite)",
            output.display()
        )));
    }

    std::fs::write(&output, SupervisorConfig::template())?;
    output::print_config_written(&output);
    Ok(true)
}

/// Flip the shutdown flag on SIGINT or SIGTERM
async fn wait_for_signal(shutdown: watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    let _ = shutdown.send(true);
}
