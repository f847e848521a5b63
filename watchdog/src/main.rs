mod config;
mod error;
mod extractor;
mod fetcher;
mod registry;
mod restart;
mod sync;
#[cfg(test)]
mod test_support;
mod types;
mod watchdog;

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::macros::format_description;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::FmtSubscriber;

use config::{PartialConfig, WatchdogConfig};
use fetcher::HttpFetcher;
use restart::CommandRestarter;
use types::MatchPolicy;
use watchdog::Watchdog;

#[derive(Parser, Debug)]
#[command(name = "node-watchdog")]
#[command(about = "Restarts a blockchain node that drops out of the registry or falls behind", long_about = None)]
struct Args {
    /// TOML config file; command-line options override it
    #[arg(long, env = "NODE_WATCHDOG_CONFIG")]
    config: Option<PathBuf>,

    /// Network name (used in logs)
    #[arg(long, env = "NODE_WATCHDOG_NETWORK")]
    network: Option<String>,

    /// Identifier this node is listed under in the registry (defaults to system hostname)
    #[arg(long, env = "NODE_WATCHDOG_NODE_ID")]
    node_id: Option<String>,

    /// Base URL of the local node API
    #[arg(long, env = "NODE_WATCHDOG_LOCAL_URL")]
    local_url: Option<String>,

    /// Base URL of the reference node API
    #[arg(long, env = "NODE_WATCHDOG_REFERENCE_URL")]
    reference_url: Option<String>,

    /// Base URL of the node manager; `/nodes` is appended
    #[arg(long, env = "NODE_WATCHDOG_REGISTRY_URL")]
    registry_url: Option<String>,

    /// Maximum accepted lag behind the reference node [default: 10]
    #[arg(long, env = "NODE_WATCHDOG_TOLERANCE")]
    tolerance: Option<u64>,

    /// Restart command, space separated (e.g. "systemctl restart node")
    #[arg(long, env = "NODE_WATCHDOG_RESTART_COMMAND", value_delimiter = ' ')]
    restart_command: Option<Vec<String>>,

    /// Seconds between cycles [default: 60]
    #[arg(long, env = "NODE_WATCHDOG_INTERVAL_SECS")]
    interval_secs: Option<u64>,

    /// Per-request timeout in seconds [default: 10]
    #[arg(long, env = "NODE_WATCHDOG_FETCH_TIMEOUT_SECS")]
    fetch_timeout_secs: Option<u64>,

    /// Seconds to wait for the restart command before killing it [default: 60]
    #[arg(long, env = "NODE_WATCHDOG_RESTART_TIMEOUT_SECS")]
    restart_timeout_secs: Option<u64>,

    /// How the node id is matched in the registry listing [default: substring]
    #[arg(long, env = "NODE_WATCHDOG_REGISTRY_MATCH", value_enum)]
    registry_match: Option<MatchPolicy>,

    /// Log restarts instead of running the restart command. `--dry-run=false`
    /// turns off a `dry_run = true` from the config file
    #[arg(
        long,
        env = "NODE_WATCHDOG_DRY_RUN",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    dry_run: Option<bool>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Append logs to this file instead of stdout
    #[arg(long, env = "NODE_WATCHDOG_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "NODE_WATCHDOG_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> PartialConfig {
        PartialConfig {
            network: self.network.clone(),
            node_id: self.node_id.clone(),
            local_url: self.local_url.clone(),
            reference_url: self.reference_url.clone(),
            registry_url: self.registry_url.clone(),
            tolerance: self.tolerance,
            // Repeated spaces in the env value would otherwise become empty arguments
            restart_command: self.restart_command.as_ref().map(|parts| {
                parts
                    .iter()
                    .filter(|p| !p.is_empty())
                    .cloned()
                    .collect()
            }),
            interval_secs: self.interval_secs,
            fetch_timeout_secs: self.fetch_timeout_secs,
            restart_timeout_secs: self.restart_timeout_secs,
            registry_match: self.registry_match,
            dry_run: self.dry_run,
        }
    }
}

fn init_logging(level: &str, log_file: Option<&PathBuf>) -> Result<()> {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let timer = UtcTime::new(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]"
    ));

    let (writer, ansi) = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {:?}", path))?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stdout), true),
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_timer(timer)
        .with_ansi(ansi)
        .with_writer(writer)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn system_hostname() -> Result<String> {
    Ok(hostname::get()
        .context("Failed to get system hostname")?
        .to_string_lossy()
        .to_string())
}

async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
    token.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.log_file.as_ref())?;

    info!("Starting node watchdog");

    let file_config = match &args.config {
        Some(path) => PartialConfig::load(path)?,
        None => PartialConfig::default(),
    };
    let config = WatchdogConfig::resolve(file_config.overlay(args.overrides()), system_hostname)
        .context("Invalid configuration")?;

    info!(
        "Watchdog configuration: network={}, node_id={}, local={}, reference={}, registry={}, tolerance={}, restart=`{}`, match={}, dry_run={}",
        config.network,
        config.node_id,
        config.local_url,
        config.reference_url,
        config.registry_url,
        config.tolerance,
        config.restart_command.join(" "),
        config.registry_match,
        config.dry_run
    );

    let fetcher = HttpFetcher::new(config.fetch_timeout)?;
    let restarter = Arc::new(CommandRestarter::new(
        config.restart_command.clone(),
        config.restart_timeout,
        config.dry_run,
    ));
    let drain_limit = config.restart_timeout + Duration::from_secs(1);
    let watchdog = Watchdog::new(Arc::new(config), fetcher, restarter);

    if args.once {
        if let Some(outcome) = watchdog.run_cycle().await {
            info!("Cycle outcome: {}", outcome);
        }
    } else {
        let shutdown = CancellationToken::new();
        tokio::spawn(shutdown_signal(shutdown.clone()));
        watchdog.run(shutdown).await;
    }

    watchdog.drain(drain_limit).await;
    Ok(())
}
