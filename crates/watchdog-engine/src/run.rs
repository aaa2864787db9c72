//! Run Orchestrator: one detect → persist → report → notify cycle.
//!
//! Detector failures are isolated: a failed query empties that category and
//! is recorded on the [`RunOutcome`], the other detector still runs.
//! Persistence failures fail the run. Notification is handed to the
//! background worker and never awaited here.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};
use watchdog_common::{Alert, Result, WatchdogError};
use watchdog_db::{FindingsStore, SupplyGateway};

use crate::assembler::assemble;
use crate::expiry::{detect_expiring, ExpiryScan};
use crate::policy::WatchdogPolicy;
use crate::rate::{estimate_consumption, lookback_start};
use crate::report::{run_id, Notification, RunReport};
use crate::shortfall::{predict_shortfalls, ShortfallScan};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detector {
    Expiry,
    Shortfall,
}

impl fmt::Display for Detector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Detector::Expiry => f.write_str("expiry"),
            Detector::Shortfall => f.write_str("shortfall"),
        }
    }
}

/// A detector whose data access failed during the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorFailure {
    pub detector: Detector,
    pub reason: String,
}

/// Result of a completed run (detection and persistence succeeded).
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: RunReport,
    pub persisted: usize,
    /// Rows excluded by either detector for unusable values.
    pub skipped_rows: usize,
    pub failures: Vec<DetectorFailure>,
    pub report_path: Option<PathBuf>,
    pub notification_queued: bool,
}

impl RunOutcome {
    /// At least one detector ran without its data.
    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }
}

pub struct SupplyWatchdog {
    gateway: Arc<dyn SupplyGateway>,
    store: Arc<dyn FindingsStore>,
    policy: WatchdogPolicy,
    notifier: Option<mpsc::UnboundedSender<Notification>>,
    report_dir: Option<PathBuf>,
}

impl SupplyWatchdog {
    pub fn new(
        gateway: Arc<dyn SupplyGateway>,
        store: Arc<dyn FindingsStore>,
        policy: WatchdogPolicy,
    ) -> Result<Self> {
        policy.validate()?;
        Ok(Self { gateway, store, policy, notifier: None, report_dir: None })
    }

    /// Queue each run's notification on this sender.
    pub fn with_notifier(mut self, notifier: mpsc::UnboundedSender<Notification>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Write each run's JSON report into this directory.
    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = Some(dir.into());
        self
    }

    pub async fn run(&self) -> Result<RunOutcome> {
        self.run_at(Utc::now()).await
    }

    /// Run one cycle with `now` as the shared run timestamp.
    #[instrument(skip(self), fields(run_id = %run_id(now)))]
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<RunOutcome> {
        info!("Starting supply watchdog run");

        let (expiry, shortfall) = tokio::join!(self.detect_expiry(now), self.detect_shortfall(now));

        let mut failures = Vec::new();
        let expiry = expiry.unwrap_or_else(|failure| {
            failures.push(failure);
            ExpiryScan::default()
        });
        let shortfall = shortfall.unwrap_or_else(|failure| {
            failures.push(failure);
            ShortfallScan::default()
        });
        let skipped_rows = expiry.skipped + shortfall.skipped;

        let alerts = assemble(expiry.candidates, shortfall.candidates);
        info!(alerts = alerts.len(), "Total alerts generated: {}", alerts.len());

        let persisted = self.persist(now, &alerts).await?;

        let report = RunReport::build(now, &alerts);
        let report_path = self.write_report(&report);
        let notification_queued = self.queue_notification(&report);

        Ok(RunOutcome { report, persisted, skipped_rows, failures, report_path, notification_queued })
    }

    async fn detect_expiry(&self, now: DateTime<Utc>) -> std::result::Result<ExpiryScan, DetectorFailure> {
        let policy = &self.policy.expiry;
        match self.gateway.active_allocations(&policy.active_order_statuses).await {
            Ok(rows) => {
                let scan = detect_expiring(&rows, now.date_naive(), policy);
                info!(alerts = scan.candidates.len(), skipped = scan.skipped, "Expiry detection: {} alerts", scan.candidates.len());
                Ok(scan)
            }
            Err(e) => {
                error!("Expiry detection failed: {e}");
                Err(DetectorFailure { detector: Detector::Expiry, reason: e.to_string() })
            }
        }
    }

    async fn detect_shortfall(&self, now: DateTime<Utc>) -> std::result::Result<ShortfallScan, DetectorFailure> {
        let since = lookback_start(now, &self.policy.consumption);
        let fetched = async {
            let visits = self.gateway.visit_summaries(since).await?;
            let stock = self.gateway.stock_positions().await?;
            Ok::<_, watchdog_db::DbError>((visits, stock))
        };

        match fetched.await {
            Ok((visits, stock)) => {
                let rates = estimate_consumption(&visits, &self.policy.consumption);
                let scan = predict_shortfalls(&stock, &rates, now, &self.policy.shortfall);
                info!(
                    alerts = scan.candidates.len(),
                    trials_with_history = rates.len(),
                    positions = stock.len(),
                    "Shortfall prediction: {} alerts",
                    scan.candidates.len()
                );
                Ok(scan)
            }
            Err(e) => {
                error!("Shortfall prediction failed: {e}");
                Err(DetectorFailure { detector: Detector::Shortfall, reason: e.to_string() })
            }
        }
    }

    async fn persist(&self, now: DateTime<Utc>, alerts: &[Alert]) -> Result<usize> {
        let persisted = match self.store.persist(now, alerts).await {
            Ok(n) => n,
            Err(e) => {
                error!(alerts = alerts.len(), "Saving findings failed: {e}");
                return Err(e.into());
            }
        };
        if persisted != alerts.len() {
            error!(expected = alerts.len(), persisted, "Findings store persisted an unexpected number of alerts");
            return Err(WatchdogError::PersistenceMismatch { expected: alerts.len(), persisted });
        }
        info!(persisted, "Saved {persisted} alerts to findings");
        Ok(persisted)
    }

    fn write_report(&self, report: &RunReport) -> Option<PathBuf> {
        let dir = self.report_dir.as_deref()?;
        match report.write_json(dir) {
            Ok(path) => {
                info!(path = %path.display(), "Report written");
                Some(path)
            }
            Err(e) => {
                warn!(dir = %dir.display(), "Writing report failed: {e}");
                None
            }
        }
    }

    fn queue_notification(&self, report: &RunReport) -> bool {
        let Some(tx) = &self.notifier else {
            info!("Notification disabled");
            return false;
        };
        let notification = report.render_notification();
        let subject = notification.subject.clone();
        match tx.send(notification) {
            Ok(()) => {
                info!("Notification queued: {subject}");
                true
            }
            Err(_) => {
                warn!("Notification worker is not running, notification dropped: {subject}");
                false
            }
        }
    }
}
