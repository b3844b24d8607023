//! CLI module for the fleet panel.
//!
//! Can be run as a standalone binary or as the `serve` subcommand of the
//! unified fleet-rs CLI.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fleet_config::{
    CliOverrides, Config, LoggingConfig, apply_overrides, load_config, validate_config,
};
use fleet_ledger::{Ledger, LedgerOptions};
use fleet_node::HttpNodeClient;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cascade::LogNotifier;
use crate::context::{PanelContext, PanelSettings};
use crate::panel::Panel;
use crate::scheduler::Scheduler;

/// Fleet panel CLI arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "fleet-panel", version, about = "Proxy fleet control plane")]
pub struct PanelArgs {
    /// Config file path (json/yaml/toml)
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(flatten)]
    pub overrides: CliOverrides,
}

/// Run the panel until SIGINT/SIGTERM.
pub async fn run(args: PanelArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(&args.config)?;
    apply_overrides(&mut config, &args.overrides);
    validate_config(&config)?;

    init_tracing(&config.logging);

    if let Some(listen) = &config.metrics.listen {
        match fleet_metrics::init_prometheus(listen) {
            Ok(()) => info!("metrics exporter listening on {}", listen),
            Err(e) => warn!("failed to start metrics exporter: {}", e),
        }
    }

    let ledger = Arc::new(Ledger::connect(ledger_options(&config)).await?);
    ledger.init_schema().await?;

    let nodes = HttpNodeClient::new(
        config.node_api.scheme.clone(),
        config.node_api.token.clone(),
        Duration::from_secs(config.node_api.request_timeout_secs),
    )?;

    let ctx = PanelContext::new(ledger, Arc::new(nodes), PanelSettings::from_config(&config));
    let panel = Panel::start(ctx, Arc::new(LogNotifier));

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal_handler().await;
        info!("shutdown signal received");
        shutdown_signal.cancel();
    });

    info!(version = fleet_core::VERSION, "fleet panel started");
    Scheduler::new(panel.clone(), config.schedule.clone())
        .run(shutdown)
        .await;

    panel.shutdown();
    Ok(())
}

/// Pool options from the `ledger` config section.
pub fn ledger_options(config: &Config) -> LedgerOptions {
    let l = &config.ledger;
    LedgerOptions::new(l.database_url.clone())
        .max_connections(l.max_connections)
        .min_connections(l.min_connections)
        .connect_timeout(Duration::from_secs(l.connect_timeout_secs))
        .max_lifetime(Duration::from_secs(l.max_lifetime_secs))
        .idle_timeout(Duration::from_secs(l.idle_timeout_secs))
}

/// Wait for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal_handler() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Install the stderr `fmt` subscriber filtered at `logging.level`.
fn init_tracing(config: &LoggingConfig) {
    let level = config.level.as_deref().unwrap_or("info");
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}
