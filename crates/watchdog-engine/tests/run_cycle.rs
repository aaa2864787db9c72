//! End-to-end monitoring cycles against in-memory collaborators.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use pretty_assertions::assert_eq;
use watchdog_common::{Alert, AlertType, Severity, WatchdogError};
use watchdog_db::{AllocationRow, DbError, FindingsStore, StockRow, SupplyGateway, VisitSummaryRow};
use watchdog_engine::policy::DeliveryPolicy;
use watchdog_engine::run::Detector;
use watchdog_engine::{Dispatcher, NotificationTransport, NotificationWorker, SupplyWatchdog, WatchdogPolicy};

// ── Fakes ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeGateway {
    allocations: Vec<AllocationRow>,
    visits: Vec<VisitSummaryRow>,
    stock: Vec<StockRow>,
    fail_allocations: bool,
    fail_stock: bool,
}

#[async_trait]
impl SupplyGateway for FakeGateway {
    async fn active_allocations(&self, statuses: &[String]) -> watchdog_db::Result<Vec<AllocationRow>> {
        if self.fail_allocations {
            return Err(DbError::Shape("relation \"allocated_materials_to_orders\" does not exist".to_string()));
        }
        Ok(self
            .allocations
            .iter()
            .filter(|r| r.order_status.as_ref().is_some_and(|s| statuses.contains(s)))
            .cloned()
            .collect())
    }

    async fn visit_summaries(&self, _since: NaiveDate) -> watchdog_db::Result<Vec<VisitSummaryRow>> {
        Ok(self.visits.clone())
    }

    async fn stock_positions(&self) -> watchdog_db::Result<Vec<StockRow>> {
        if self.fail_stock {
            return Err(DbError::Pool("timed out waiting for connection".to_string()));
        }
        Ok(self.stock.clone())
    }
}

#[derive(Default)]
enum StoreMode {
    #[default]
    Accept,
    Fail,
    DropAll,
}

#[derive(Default)]
struct FakeStore {
    mode: StoreMode,
    saved: Mutex<Vec<(DateTime<Utc>, Alert)>>,
}

#[async_trait]
impl FindingsStore for FakeStore {
    async fn persist(&self, run_timestamp: DateTime<Utc>, alerts: &[Alert]) -> watchdog_db::Result<usize> {
        match self.mode {
            StoreMode::Fail => Err(DbError::Pool("connection refused".to_string())),
            StoreMode::DropAll => Ok(0),
            StoreMode::Accept => {
                let mut saved = self.saved.lock().unwrap();
                saved.extend(alerts.iter().cloned().map(|a| (run_timestamp, a)));
                Ok(alerts.len())
            }
        }
    }
}

struct CountingTransport {
    fail: bool,
    calls: AtomicU32,
    subjects: Mutex<Vec<String>>,
}

impl CountingTransport {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self { fail, calls: AtomicU32::new(0), subjects: Mutex::new(Vec::new()) })
    }
}

#[async_trait]
impl NotificationTransport for CountingTransport {
    fn name(&self) -> &str { "counting" }

    async fn send(&self, subject: &str, _body: &str, _recipients: &[String]) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("smtp unavailable");
        }
        self.subjects.lock().unwrap().push(subject.to_string());
        Ok(())
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 6, 0, 0).unwrap()
}

fn allocation(lot: &str, days_out: i64, status: &str) -> AllocationRow {
    AllocationRow {
        batch_lot: Some(lot.to_string()),
        trial_alias: Some("TRIAL-A".to_string()),
        material_description: Some("Kit 10mg".to_string()),
        expiry_date: Some((now().date_naive() + Duration::days(days_out)).to_string()),
        location: Some("Berlin DC".to_string()),
        quantity: Some("40".to_string()),
        order_id: Some("ORD-1".to_string()),
        order_status: Some(status.to_string()),
    }
}

fn position(trial: &str, qty: f64) -> StockRow {
    StockRow {
        trial_alias: Some(trial.to_string()),
        location: Some("Lyon".to_string()),
        material: Some("Vial 5ml".to_string()),
        total_stock: qty,
        excluded_rows: 0,
    }
}

/// A rate of exactly 20 packages/week: 40 visits/month × 2 ÷ 4.0 weeks.
fn twenty_per_week() -> (VisitSummaryRow, WatchdogPolicy) {
    let visits = VisitSummaryRow {
        trial_alias: Some("TRIAL-B".to_string()),
        total_patients: 20,
        total_visits: 120,
        months_present: 3,
        excluded_visits: 0,
    };
    let mut policy = WatchdogPolicy::default();
    policy.consumption.weeks_per_month = 4.0;
    (visits, policy)
}

fn watchdog(gateway: FakeGateway, store: Arc<FakeStore>, policy: WatchdogPolicy) -> SupplyWatchdog {
    SupplyWatchdog::new(Arc::new(gateway), store, policy).unwrap()
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_batch_expiring_in_25_days_raises_one_critical_alert() {
    let gateway = FakeGateway { allocations: vec![allocation("LOT-25", 25, "Released")], ..Default::default() };
    let store = Arc::new(FakeStore::default());
    let outcome = watchdog(gateway, store.clone(), WatchdogPolicy::default()).run_at(now()).await.unwrap();

    assert_eq!(outcome.report.summary.total, 1);
    let alert = &outcome.report.expiry_alerts.critical[0];
    assert_eq!(alert.alert_type(), AlertType::Expiry);
    assert_eq!(alert.days_until_expiry(), Some(25));
    assert!(alert.recommended_action.starts_with("URGENT"));
    assert_eq!(outcome.persisted, 1);
    assert!(!outcome.is_degraded());

    let saved = store.saved.lock().unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].0, now());
}

#[tokio::test]
async fn test_inactive_allocations_are_not_considered() {
    let gateway = FakeGateway {
        allocations: vec![allocation("SHIPPED", 5, "Shipped"), allocation("OPEN", 5, "In Progress")],
        ..Default::default()
    };
    let outcome = watchdog(gateway, Arc::new(FakeStore::default()), WatchdogPolicy::default())
        .run_at(now())
        .await
        .unwrap();
    assert_eq!(outcome.report.summary.total, 1);
    assert_eq!(outcome.report.expiry_alerts.critical[0].batch_lot(), Some("OPEN"));
}

#[tokio::test]
async fn test_five_weeks_of_stock_is_medium_shortfall() {
    let (visits, policy) = twenty_per_week();
    let gateway = FakeGateway { visits: vec![visits], stock: vec![position("TRIAL-B", 100.0)], ..Default::default() };
    let outcome = watchdog(gateway, Arc::new(FakeStore::default()), policy).run_at(now()).await.unwrap();

    let alert = &outcome.report.shortfall_predictions.medium[0];
    assert_eq!(alert.severity, Severity::Medium);
    assert_eq!(alert.weekly_consumption_rate(), Some(20.0));
    assert_eq!(alert.weeks_until_stockout(), Some(5.0));
    assert_eq!(alert.projected_shortage_date(), Some(now().date_naive() + Duration::weeks(5)));
}

#[tokio::test]
async fn test_trial_without_history_uses_default_rate() {
    let gateway = FakeGateway { stock: vec![position("TRIAL-C", 100.0)], ..Default::default() };
    let outcome = watchdog(gateway, Arc::new(FakeStore::default()), WatchdogPolicy::default())
        .run_at(now())
        .await
        .unwrap();
    assert_eq!(outcome.report.summary.total, 0);
    assert_eq!(outcome.persisted, 0);
}

#[tokio::test]
async fn test_zero_alert_run_is_all_clear() {
    let store = Arc::new(FakeStore::default());
    let outcome = watchdog(FakeGateway::default(), store.clone(), WatchdogPolicy::default())
        .run_at(now())
        .await
        .unwrap();

    assert_eq!(outcome.persisted, 0);
    assert!(outcome.report.summary.is_all_clear());
    assert_eq!(outcome.report.render_notification().subject, "Supply Watchdog: All clear");
    assert!(store.saved.lock().unwrap().is_empty());
    assert!(!outcome.notification_queued);
}

// ── Failure domains ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_expiry_query_failure_does_not_stop_shortfall() {
    let gateway = FakeGateway {
        fail_allocations: true,
        allocations: vec![allocation("LOT-1", 5, "Released")],
        stock: vec![position("TRIAL-X", 15.0)],
        ..Default::default()
    };
    let outcome = watchdog(gateway, Arc::new(FakeStore::default()), WatchdogPolicy::default())
        .run_at(now())
        .await
        .unwrap();

    assert!(outcome.is_degraded());
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].detector, Detector::Expiry);
    assert!(outcome.report.expiry_alerts.is_empty());
    assert_eq!(outcome.report.shortfall_predictions.critical.len(), 1);
}

#[tokio::test]
async fn test_stock_query_failure_does_not_stop_expiry() {
    let gateway = FakeGateway {
        fail_stock: true,
        allocations: vec![allocation("LOT-1", 45, "Created")],
        ..Default::default()
    };
    let outcome = watchdog(gateway, Arc::new(FakeStore::default()), WatchdogPolicy::default())
        .run_at(now())
        .await
        .unwrap();

    assert_eq!(outcome.failures[0].detector, Detector::Shortfall);
    assert!(outcome.failures[0].reason.contains("timed out"));
    assert_eq!(outcome.report.expiry_alerts.high.len(), 1);
}

#[tokio::test]
async fn test_unparsable_rows_are_counted() {
    let mut bad = allocation("BAD", 5, "Released");
    bad.expiry_date = Some("not a date".to_string());
    let gateway = FakeGateway { allocations: vec![bad, allocation("OK", 70, "Released")], ..Default::default() };
    let outcome = watchdog(gateway, Arc::new(FakeStore::default()), WatchdogPolicy::default())
        .run_at(now())
        .await
        .unwrap();
    assert_eq!(outcome.skipped_rows, 1);
    assert_eq!(outcome.report.summary.medium, 1);
}

#[tokio::test]
async fn test_malformed_visits_and_quantities_are_counted() {
    let (mut visits, policy) = twenty_per_week();
    visits.excluded_visits = 4;
    let mut stock = position("TRIAL-B", 100.0);
    stock.excluded_rows = 2;
    let gateway = FakeGateway { visits: vec![visits], stock: vec![stock], ..Default::default() };
    let outcome = watchdog(gateway, Arc::new(FakeStore::default()), policy).run_at(now()).await.unwrap();

    assert_eq!(outcome.skipped_rows, 6);
    assert_eq!(outcome.report.shortfall_predictions.medium.len(), 1);
    assert!(!outcome.is_degraded());
}

#[tokio::test]
async fn test_persistence_error_fails_run() {
    let gateway = FakeGateway { allocations: vec![allocation("LOT-1", 5, "Released")], ..Default::default() };
    let store = Arc::new(FakeStore { mode: StoreMode::Fail, ..Default::default() });
    let err = watchdog(gateway, store, WatchdogPolicy::default()).run_at(now()).await.unwrap_err();
    assert!(matches!(err, WatchdogError::Database(_)));
}

#[tokio::test]
async fn test_zero_persisted_despite_alerts_is_reported() {
    let gateway = FakeGateway { allocations: vec![allocation("LOT-1", 5, "Released")], ..Default::default() };
    let store = Arc::new(FakeStore { mode: StoreMode::DropAll, ..Default::default() });
    let err = watchdog(gateway, store, WatchdogPolicy::default()).run_at(now()).await.unwrap_err();
    assert!(matches!(err, WatchdogError::PersistenceMismatch { expected: 1, persisted: 0 }));
}

#[tokio::test]
async fn test_invalid_policy_is_rejected() {
    let mut policy = WatchdogPolicy::default();
    policy.shortfall.horizon_weeks = 1.0;
    let result = SupplyWatchdog::new(Arc::new(FakeGateway::default()), Arc::new(FakeStore::default()), policy);
    assert!(matches!(result, Err(WatchdogError::Config(_))));
}

// ── Notification ─────────────────────────────────────────────────────────────

fn no_backoff() -> DeliveryPolicy {
    DeliveryPolicy { max_retries: 3, retry_backoff_ms: 0 }
}

#[tokio::test]
async fn test_notification_is_queued_and_delivered() {
    let transport = CountingTransport::new(false);
    let worker = NotificationWorker::start(Dispatcher::new(transport.clone(), vec!["ops@example.org".to_string()], &no_backoff()));
    let gateway = FakeGateway { allocations: vec![allocation("LOT-1", 5, "Released")], ..Default::default() };

    let outcome = watchdog(gateway, Arc::new(FakeStore::default()), WatchdogPolicy::default())
        .with_notifier(worker.sender())
        .run_at(now())
        .await
        .unwrap();
    assert!(outcome.notification_queued);

    let deliveries = worker.shutdown().await;
    assert_eq!(deliveries.len(), 1);
    assert!(deliveries[0].delivered);
    assert_eq!(
        *transport.subjects.lock().unwrap(),
        vec!["Supply Watchdog: 1 CRITICAL, 0 HIGH, 0 MEDIUM".to_string()]
    );
}

#[tokio::test]
async fn test_failed_notification_leaves_run_successful() {
    let transport = CountingTransport::new(true);
    let worker = NotificationWorker::start(Dispatcher::new(transport.clone(), vec!["ops@example.org".to_string()], &no_backoff()));

    let result = watchdog(FakeGateway::default(), Arc::new(FakeStore::default()), WatchdogPolicy::default())
        .with_notifier(worker.sender())
        .run_at(now())
        .await;
    assert!(result.is_ok());

    let deliveries = worker.shutdown().await;
    assert!(!deliveries[0].delivered);
    assert_eq!(deliveries[0].attempts, 4);
    assert_eq!(transport.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_report_written_to_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let outcome = watchdog(FakeGateway::default(), Arc::new(FakeStore::default()), WatchdogPolicy::default())
        .with_report_dir(tmp.path())
        .run_at(now())
        .await
        .unwrap();

    let path = outcome.report_path.unwrap();
    assert_eq!(path.file_name().unwrap(), "watchdog_output_20261019_060000.json");
    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(json["run_id"], "WD-2026-10-19-060000-000");
    assert_eq!(json["summary"]["total"], 0);
}
