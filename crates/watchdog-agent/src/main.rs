//! Supply Watchdog: clinical-trial supply monitoring.
//! Entry point for one monitoring run, invoked by an external scheduler.

mod config;
mod transport;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use watchdog_db::{Database, PgFindingsStore, PgSupplyGateway};
use watchdog_engine::{Dispatcher, NotificationWorker, RunOutcome, SupplyWatchdog};

const EXIT_OK: u8 = 0;
const EXIT_FAILED: u8 = 1;
const EXIT_DEGRADED: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "supply-watchdog")]
#[command(about = "Detect expiring batches and projected stockouts, persist findings, notify")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to $WATCHDOG_CONFIG, then ./watchdog.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Create the findings table before running
    #[arg(long)]
    init_schema: bool,

    /// Write the JSON report here (overrides output.report_dir)
    #[arg(long)]
    report_dir: Option<PathBuf>,

    /// Skip sending the notification
    #[arg(long)]
    no_notify: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("supply_watchdog=debug,watchdog=info,info")),
        )
        .init();

    let cli = Cli::parse();
    info!("Supply watchdog {} starting", env!("CARGO_PKG_VERSION"));

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("Supply watchdog failed: {e:#}");
            ExitCode::from(EXIT_FAILED)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let config = config::Config::load(cli.config.as_deref())?;
    info!(
        expiry_horizon_days = config.policy.expiry.horizon_days,
        shortfall_horizon_weeks = config.policy.shortfall.horizon_weeks,
        recipients = config.notification.recipients.len(),
        "Configuration loaded"
    );

    let db = Database::connect(config.database.url()?, config.database.max_connections)
        .context("configuring database pool")?;
    db.ping().await.context("connecting to database")?;
    info!("Database connected");

    if cli.init_schema {
        db.initialize().await.context("creating findings table")?;
    }

    let mut watchdog = SupplyWatchdog::new(
        Arc::new(PgSupplyGateway::new(db.clone())),
        Arc::new(PgFindingsStore::new(db)),
        config.policy.clone(),
    )?;

    if let Some(dir) = cli.report_dir.or_else(|| config.output.report_dir.clone()) {
        watchdog = watchdog.with_report_dir(dir);
    }

    let worker = if cli.no_notify {
        None
    } else {
        let transport = transport::build(&config.notification)?;
        info!(transport = transport.name(), "Notification transport ready");
        let dispatcher = Dispatcher::new(
            transport,
            config.notification.recipients.clone(),
            &config.policy.delivery,
        );
        Some(NotificationWorker::start(dispatcher))
    };
    if let Some(worker) = &worker {
        watchdog = watchdog.with_notifier(worker.sender());
    }

    let result = watchdog.run().await;
    drop(watchdog);

    let code = match &result {
        Ok(outcome) => {
            log_summary(outcome);
            if outcome.is_degraded() { EXIT_DEGRADED } else { EXIT_OK }
        }
        Err(e) => {
            error!("Run failed: {e}");
            EXIT_FAILED
        }
    };

    if let Some(worker) = worker {
        let drain = Duration::from_secs(config.notification.drain_timeout_secs);
        match tokio::time::timeout(drain, worker.shutdown()).await {
            Ok(outcomes) => {
                let delivered = outcomes.iter().filter(|o| o.delivered).count();
                info!(delivered, queued = outcomes.len(), "Notification worker finished");
            }
            Err(_) => warn!("Notification still in flight after {}s, abandoning", drain.as_secs()),
        }
    }

    Ok(code)
}

fn log_summary(outcome: &RunOutcome) {
    let s = &outcome.report.summary;
    info!(
        run_id = %outcome.report.run_id,
        total = s.total,
        critical = s.critical,
        high = s.high,
        medium = s.medium,
        persisted = outcome.persisted,
        "Run complete"
    );
    if outcome.skipped_rows > 0 {
        warn!(skipped = outcome.skipped_rows, "Rows excluded for unusable values");
    }
    for failure in &outcome.failures {
        warn!(detector = %failure.detector, "Detector degraded: {}", failure.reason);
    }
}
