//! Pod label registrar.
//!
//! # Architecture Overview
//!
//! ```text
//!   state changes (stdin: "active=true", ...)
//!          │
//!          ▼
//!   ┌──────────────────────┐     ┌──────────────┐     ┌────────────────┐
//!   │ ServiceRegistration  │────▶│ RetryEngine  │────▶│  KubeClient    │────▶ API server
//!   │ notify_*_change()    │     │ pending set  │     │  JSON patch    │
//!   └──────────────────────┘     │ + ticker     │     └────────────────┘
//!                                └──────────────┘
//!   SIGINT/SIGTERM → Shutdown → final labels → join
//! ```

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use pod_registrar::config::{load_config, RegistrarConfig};
use pod_registrar::lifecycle::{signals, Shutdown};
use pod_registrar::observability::{logging, metrics};
use pod_registrar::store::{KubeClient, PatchStore};
use pod_registrar::{PatchError, RegistrationState, ServiceRegistration};

#[derive(Parser)]
#[command(name = "pod-registrar")]
#[command(about = "Mirror process state onto Kubernetes pod labels", long_about = None)]
struct Cli {
    /// TOML configuration file. Environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the pod and apply state changes read from stdin
    Run {
        /// Value for the vault-version label
        #[arg(long, default_value = env!("CARGO_PKG_VERSION"))]
        vault_version: String,
        #[arg(long)]
        active: bool,
        #[arg(long)]
        sealed: bool,
        #[arg(long)]
        initialized: bool,
        #[arg(long)]
        perf_standby: bool,
    },
    /// Print the pod's current labels
    Labels,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    logging::init_tracing(&config.observability.log_filter);

    match cli.command {
        Commands::Run {
            vault_version,
            active,
            sealed,
            initialized,
            perf_standby,
        } => {
            let state = RegistrationState {
                vault_version,
                is_initialized: initialized,
                is_sealed: sealed,
                is_active: active,
                is_performance_standby: perf_standby,
            };
            run(config, state).await?;
        }
        Commands::Labels => {
            let client = KubeClient::new(&config.kubernetes)?;
            let pod = client.fetch_pod(&config.kubernetes.target()).await?;
            let labels = pod.metadata.labels.unwrap_or_default();
            println!("{}", serde_json::to_string_pretty(&labels)?);
        }
    }

    Ok(())
}

async fn run(config: RegistrarConfig, state: RegistrationState) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        pod = %config.kubernetes.target(),
        api = %format!("{}:{}", config.kubernetes.service_host, config.kubernetes.service_port),
        interval_ms = config.retry.interval_ms,
        "pod-registrar v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let store: Arc<dyn PatchStore> = Arc::new(KubeClient::new(&config.kubernetes)?);
    let registration =
        ServiceRegistration::new(store, config.kubernetes.target(), state, &config.retry).await?;

    let shutdown = Shutdown::new();
    let tasks = registration.run(&shutdown).await?;

    let terminate = signals::wait_for_termination();
    tokio::pin!(terminate);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if let Err(e) = apply_line(&registration, &line) {
                        tracing::warn!(input = %line, error = %e, "Ignoring state change");
                    }
                }
                Ok(None) => {
                    tracing::info!("stdin closed, waiting for a termination signal");
                    stdin_open = false;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read stdin, waiting for a termination signal");
                    stdin_open = false;
                }
            },
            _ = &mut terminate => break,
        }
    }

    shutdown.trigger();
    tasks.join().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

fn apply_line(registration: &ServiceRegistration, line: &str) -> Result<(), LineError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(());
    }
    let change: StateChange = line.parse()?;
    match change {
        StateChange::Active(v) => registration.notify_active_state_change(v)?,
        StateChange::Sealed(v) => registration.notify_sealed_state_change(v)?,
        StateChange::PerfStandby(v) => registration.notify_performance_standby_state_change(v)?,
        StateChange::Initialized(v) => registration.notify_initialized_state_change(v)?,
    }
    Ok(())
}

/// One `key=value` line from stdin.
#[derive(Debug, PartialEq, Eq)]
enum StateChange {
    Active(bool),
    Sealed(bool),
    PerfStandby(bool),
    Initialized(bool),
}

#[derive(Debug, thiserror::Error)]
enum LineError {
    #[error("expected key=value, got {0:?}")]
    Syntax(String),
    #[error("unknown state {0:?}")]
    UnknownKey(String),
    #[error("value for {key} must be true or false, got {value:?}")]
    NotBool { key: String, value: String },
    #[error(transparent)]
    Patch(#[from] PatchError),
}

impl FromStr for StateChange {
    type Err = LineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| LineError::Syntax(s.to_string()))?;
        let (key, value) = (key.trim(), value.trim());
        let flag: bool = value.parse().map_err(|_| LineError::NotBool {
            key: key.to_string(),
            value: value.to_string(),
        })?;

        match key {
            "active" => Ok(StateChange::Active(flag)),
            "sealed" => Ok(StateChange::Sealed(flag)),
            "perf-standby" | "performance-standby" => Ok(StateChange::PerfStandby(flag)),
            "initialized" => Ok(StateChange::Initialized(flag)),
            other => Err(LineError::UnknownKey(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_state_change() {
        assert_eq!("active=true".parse::<StateChange>().unwrap(), StateChange::Active(true));
        assert_eq!(" sealed = false ".parse::<StateChange>().unwrap(), StateChange::Sealed(false));
        assert_eq!(
            "performance-standby=true".parse::<StateChange>().unwrap(),
            StateChange::PerfStandby(true)
        );
        assert!(matches!("active".parse::<StateChange>(), Err(LineError::Syntax(_))));
        assert!(matches!("leader=true".parse::<StateChange>(), Err(LineError::UnknownKey(_))));
        assert!(matches!("active=yes".parse::<StateChange>(), Err(LineError::NotBool { .. })));
    }
}
