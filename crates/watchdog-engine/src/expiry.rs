//! Expiry Detector: allocated batches that lapse inside the horizon.
//!
//! Pure over gateway rows and the current date. Rows whose expiry date or
//! quantity cannot be coerced are excluded and counted, never alerted on.

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, warn};
use watchdog_common::Severity;
use watchdog_db::AllocationRow;

use crate::policy::ExpiryPolicy;
use crate::severity::classify_expiry;

/// A batch inside the expiry horizon, classified but not yet an [`Alert`].
///
/// [`Alert`]: watchdog_common::Alert
#[derive(Debug, Clone, PartialEq)]
pub struct ExpiryCandidate {
    pub severity: Severity,
    pub batch_lot: Option<String>,
    pub trial_alias: Option<String>,
    pub material_description: Option<String>,
    pub location: Option<String>,
    pub expiry_date: NaiveDate,
    pub days_until_expiry: i64,
    pub quantity: f64,
    pub order_id: Option<String>,
    pub order_status: Option<String>,
}

/// Detector output: candidates, most urgent first, plus the excluded row count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpiryScan {
    pub candidates: Vec<ExpiryCandidate>,
    pub skipped: usize,
}

// Text layouts seen in the inventory export, date-only first.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d-%b-%Y", "%d/%m/%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parse an expiry value as stored upstream.
pub fn parse_expiry_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(d);
        }
    }
    // Drop fractional seconds and zone suffixes before the datetime attempt.
    let head = raw.get(..19).unwrap_or(raw);
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(head, fmt) {
            return Some(dt.date());
        }
    }
    None
}

/// Parse an on-hand quantity. A missing value counts as zero.
pub fn parse_quantity(raw: Option<&str>) -> Option<f64> {
    let Some(raw) = raw else { return Some(0.0) };
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(0.0);
    }
    match raw.parse::<f64>() {
        Ok(q) if q.is_finite() && q >= 0.0 => Some(q),
        _ => None,
    }
}

/// Coerce one row, or say why it cannot be used.
fn evaluate(row: &AllocationRow, today: NaiveDate) -> Result<(NaiveDate, i64, f64), String> {
    let raw = row.expiry_date.as_deref().ok_or_else(|| "missing expiry date".to_string())?;
    let expiry_date = parse_expiry_date(raw).ok_or_else(|| format!("unparsable expiry date {raw:?}"))?;
    let quantity = parse_quantity(row.quantity.as_deref())
        .ok_or_else(|| format!("unusable quantity {:?}", row.quantity.as_deref().unwrap_or_default()))?;
    let days_until_expiry = (expiry_date - today).num_days();
    Ok((expiry_date, days_until_expiry, quantity))
}

/// Flag every allocated batch with `days_until_expiry <= horizon_days`.
///
/// Lapsed batches that still carry an active allocation come through with a
/// negative day count and are classified CRITICAL.
pub fn detect_expiring(rows: &[AllocationRow], today: NaiveDate, policy: &ExpiryPolicy) -> ExpiryScan {
    let mut scan = ExpiryScan::default();

    for row in rows {
        let (expiry_date, days_until_expiry, quantity) = match evaluate(row, today) {
            Ok(v) => v,
            Err(reason) => {
                debug!(batch = ?row.batch_lot, %reason, "Allocation row excluded");
                scan.skipped += 1;
                continue;
            }
        };
        if days_until_expiry > policy.horizon_days {
            continue;
        }

        scan.candidates.push(ExpiryCandidate {
            severity: classify_expiry(days_until_expiry, policy),
            batch_lot: row.batch_lot.clone(),
            trial_alias: row.trial_alias.clone(),
            material_description: row.material_description.clone(),
            location: row.location.clone(),
            expiry_date,
            days_until_expiry,
            quantity,
            order_id: row.order_id.clone(),
            order_status: row.order_status.clone(),
        });
    }

    if scan.skipped > 0 {
        warn!(skipped = scan.skipped, total = rows.len(), "Allocation rows with unusable expiry or quantity");
    }
    scan.candidates.sort_by_key(|c| c.days_until_expiry);
    scan
}
