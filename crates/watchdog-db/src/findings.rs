//! Findings Store: the append-only log of persisted alerts.
//!
//! All writes are inserts. A run's alerts are committed in one transaction,
//! so a failed run leaves no partial rows behind. Deduplication and
//! acknowledgment happen outside this crate.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio_postgres::types::ToSql;
use watchdog_common::Alert;

use crate::database::Database;
use crate::error::{DbError, Result};
use crate::schema::INSERT_FINDING;

/// Persistence boundary for alerts.
#[async_trait]
pub trait FindingsStore: Send + Sync {
    /// Append every alert tagged with `run_timestamp`, all-or-nothing.
    ///
    /// Returns the number of rows written. An empty slice is a no-op that
    /// returns `Ok(0)`; any failure rolls back and returns `Err`.
    async fn persist(&self, run_timestamp: DateTime<Utc>, alerts: &[Alert]) -> Result<usize>;
}

/// PostgreSQL-backed findings store.
#[derive(Clone)]
pub struct PgFindingsStore {
    db: Database,
}

impl PgFindingsStore {
    pub fn new(db: Database) -> Self { Self { db } }

    /// Number of findings recorded for one run.
    pub async fn count_for_run(&self, run_timestamp: DateTime<Utc>) -> Result<i64> {
        let client = self.db.client().await?;
        let row = client
            .query_one(
                "SELECT COUNT(*) FROM watchdog_findings WHERE run_timestamp = $1",
                &[&run_timestamp],
            )
            .await?;
        Ok(row.try_get(0)?)
    }
}

#[async_trait]
impl FindingsStore for PgFindingsStore {
    async fn persist(&self, run_timestamp: DateTime<Utc>, alerts: &[Alert]) -> Result<usize> {
        if alerts.is_empty() { return Ok(0); }

        let mut client = self.db.client().await?;
        let tx = client.transaction().await?;
        let stmt = tx.prepare(INSERT_FINDING).await?;
        let mut count = 0usize;

        for alert in alerts {
            let row = FindingParams::from_alert(alert)?;
            tx.execute(&stmt, &row.params(&run_timestamp)).await?;
            count += 1;
        }

        tx.commit().await?;
        tracing::debug!("persist: committed {count} findings");
        Ok(count)
    }
}

// ── Row mapping ──────────────────────────────────────────────────────────────

/// Column values for one insert, borrowed from the alert where possible.
struct FindingParams<'a> {
    alert: &'a Alert,
    alert_type: &'static str,
    severity: &'static str,
    batch_lot: Option<&'a str>,
    expiry_date: Option<NaiveDate>,
    days_until_expiry: Option<i32>,
    projected_shortage_date: Option<NaiveDate>,
    weekly_consumption_rate: Option<f64>,
    weeks_until_stockout: Option<f64>,
    details: serde_json::Value,
}

impl<'a> FindingParams<'a> {
    fn from_alert(alert: &'a Alert) -> Result<Self> {
        let days_until_expiry = alert
            .days_until_expiry()
            .map(|d| {
                i32::try_from(d)
                    .map_err(|_| DbError::Shape(format!("days_until_expiry out of range: {d}")))
            })
            .transpose()?;

        Ok(Self {
            alert,
            alert_type: alert.alert_type().as_str(),
            severity: alert.severity.as_str(),
            batch_lot: alert.batch_lot(),
            expiry_date: alert.expiry_date(),
            days_until_expiry,
            projected_shortage_date: alert.projected_shortage_date(),
            weekly_consumption_rate: alert.weekly_consumption_rate(),
            weeks_until_stockout: alert.weeks_until_stockout(),
            details: alert.details_json()?,
        })
    }

    /// Bind order matches `INSERT_FINDING`.
    fn params<'p>(&'p self, run_timestamp: &'p DateTime<Utc>) -> [&'p (dyn ToSql + Sync); 15] {
        [
            run_timestamp,
            &self.alert_type,
            &self.severity,
            &self.alert.trial_alias,
            &self.alert.location,
            &self.batch_lot,
            &self.alert.material_description,
            &self.expiry_date,
            &self.days_until_expiry,
            &self.alert.current_quantity,
            &self.projected_shortage_date,
            &self.weekly_consumption_rate,
            &self.weeks_until_stockout,
            &self.details,
            &self.alert.recommended_action,
        ]
    }
}
