//! monika — synthetic uptime monitoring agent.
//!
//! Loads probe definitions from a YAML file, checks every probe on its
//! own interval, and notifies the configured channels when a probe
//! enters or leaves an incident.
//!
//! # Usage
//!
//! ```text
//! monika -c monika.yml
//! monika --config /etc/monika.yml --log-format json --tls-check-interval 3600
//! ```

mod geo;
mod reload;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio::sync::watch;
use tracing::info;

use monika_config::Config;
use monika_notify::NotificationDispatcher;
use monika_probe::{CertificateMonitor, ProbeSupervisor, RunnerContext, TlsInspector};

/// Broadcast to every channel after each successful (re)load.
pub const STARTUP_MESSAGE: &str = "Monika is starting up";

/// Filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str =
    "info,monika=debug,monika_probe=debug,monika_notify=debug,monika_config=debug";

#[derive(Parser, Debug)]
#[command(name = "monika", version, about = "Synthetic uptime monitoring agent")]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "monika.yml")]
    config: PathBuf,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Do not reload when the configuration file changes.
    #[arg(long)]
    no_watch: bool,

    /// Skip the public IP and location lookup at startup.
    #[arg(long)]
    no_banner: bool,

    /// Seconds between TLS certificate expiry checks (0 disables).
    #[arg(long, default_value = "10")]
    tls_check_interval: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);
    run(cli).await
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    info!("Monika is starting");

    let path = std::path::absolute(&cli.config)
        .with_context(|| format!("invalid config path {}", cli.config.display()))?;
    let config = load(&path)?;

    if !cli.no_banner {
        tokio::spawn(geo::log_banner());
    }

    // ── Subsystems ─────────────────────────────────────────────

    let dispatcher = Arc::new(NotificationDispatcher::with_default_senders());
    info!(senders = ?dispatcher.supported_kinds(), "notification dispatcher initialized");

    let supervisor = Arc::new(ProbeSupervisor::new(
        RunnerContext::new(Vec::new()).with_dispatcher(Arc::clone(&dispatcher)),
    ));

    announce(&dispatcher, &config).await;
    supervisor.start(&config).await;

    let (config_tx, config_rx) = watch::channel(Arc::new(config));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    // ── Background tasks ───────────────────────────────────────

    if cli.tls_check_interval > 0 {
        let inspector = TlsInspector::new().context("failed to set up TLS inspector")?;
        let monitor = CertificateMonitor::new(Arc::new(inspector), Arc::clone(&dispatcher));
        let interval = Duration::from_secs(cli.tls_check_interval);
        info!(interval_secs = cli.tls_check_interval, "certificate check enabled");
        tasks.push(tokio::spawn(monitor.run(
            interval,
            config_rx,
            shutdown_rx.clone(),
        )));
    }

    if cli.no_watch {
        drop(config_tx);
    } else {
        let reloader = reload::ConfigReloader::new(
            path,
            Arc::clone(&supervisor),
            Arc::clone(&dispatcher),
            config_tx,
        )
        .context("failed to watch configuration file")?;
        tasks.push(tokio::spawn(reloader.run(shutdown_rx.clone())));
    }

    // ── Shutdown ───────────────────────────────────────────────

    tokio::signal::ctrl_c()
        .await
        .context("failed to install CTRL+C handler")?;
    info!("shutdown signal received");

    let _ = shutdown_tx.send(true);
    supervisor.stop_all().await;
    for task in tasks {
        let _ = task.await;
    }

    info!("Monika stopped");
    Ok(())
}

/// Load and resolve the configuration file. Failure here is fatal.
fn load(path: &Path) -> anyhow::Result<Config> {
    let config = Config::from_file(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    info!(
        path = %path.display(),
        probes = config.probes.len(),
        notifications = config.notifications.len(),
        "configuration loaded"
    );
    Ok(config)
}

/// Tell every channel that monitoring (re)started.
pub async fn announce(dispatcher: &NotificationDispatcher, config: &Config) {
    dispatcher
        .broadcast(&config.notifications, STARTUP_MESSAGE)
        .await;
}
