//! Shortfall Predictor: projects when each stock position runs out.
//!
//! `weeks_until_stockout = current_stock / packages_per_week`, alerting only
//! inside the horizon. The consumption rate is looked up by trial alone, so
//! every location and material of one trial shares a single estimate. This
//! is a known approximation and can under- or over-state per-location risk.

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use tracing::{debug, warn};
use watchdog_common::Severity;
use watchdog_db::StockRow;

use crate::policy::ShortfallPolicy;
use crate::rate::RateTable;
use crate::severity::classify_shortfall;

/// A position projected to stock out inside the horizon.
#[derive(Debug, Clone, PartialEq)]
pub struct ShortfallCandidate {
    pub severity: Severity,
    pub trial_alias: Option<String>,
    pub location: Option<String>,
    pub material: Option<String>,
    pub current_stock: f64,
    pub packages_per_week: f64,
    pub weeks_until_stockout: f64,
    pub projected_shortage_date: NaiveDate,
    /// `None` when the trial had no usable visit history.
    pub total_patients: Option<i64>,
    pub visits_per_month: Option<f64>,
}

/// Candidates, soonest stockout first. `skipped` counts inventory and visit
/// rows excluded upstream plus positions that could not be projected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShortfallScan {
    pub candidates: Vec<ShortfallCandidate>,
    pub skipped: usize,
}

/// Date reached after a fractional number of weeks, or `None` past the
/// representable calendar.
pub fn projected_shortage_date(now: DateTime<Utc>, weeks: f64) -> Option<NaiveDate> {
    let seconds = weeks * 7.0 * 86_400.0;
    if !seconds.is_finite() {
        return None;
    }
    let delta = TimeDelta::try_seconds(seconds.round() as i64)?;
    now.checked_add_signed(delta).map(|t| t.date_naive())
}

pub fn predict_shortfalls(
    stock: &[StockRow],
    rates: &RateTable,
    now: DateTime<Utc>,
    policy: &ShortfallPolicy,
) -> ShortfallScan {
    let mut scan = ShortfallScan { skipped: rates.excluded_visits(), ..Default::default() };

    for row in stock {
        if row.excluded_rows > 0 {
            debug!(trial = ?row.trial_alias, location = ?row.location, excluded = row.excluded_rows, "Non-numeric inventory quantities excluded");
            scan.skipped = scan.skipped.saturating_add(usize::try_from(row.excluded_rows).unwrap_or(usize::MAX));
        }
        if !row.total_stock.is_finite() {
            debug!(trial = ?row.trial_alias, stock = row.total_stock, "Stock position excluded");
            scan.skipped += 1;
            continue;
        }
        if row.total_stock <= 0.0 {
            continue;
        }

        let trial = row.trial_alias.as_deref();
        let packages_per_week = rates.packages_per_week(trial);
        let weeks_until_stockout = row.total_stock / packages_per_week;
        if weeks_until_stockout >= policy.horizon_weeks {
            continue;
        }

        let Some(projected_shortage_date) = projected_shortage_date(now, weeks_until_stockout) else {
            debug!(trial = ?row.trial_alias, weeks = weeks_until_stockout, "Stockout date out of range");
            scan.skipped += 1;
            continue;
        };

        let estimate = rates.estimate(trial);
        scan.candidates.push(ShortfallCandidate {
            severity: classify_shortfall(weeks_until_stockout, policy),
            trial_alias: row.trial_alias.clone(),
            location: row.location.clone(),
            material: row.material.clone(),
            current_stock: row.total_stock,
            packages_per_week,
            weeks_until_stockout,
            projected_shortage_date,
            total_patients: estimate.map(|e| e.total_patients),
            visits_per_month: estimate.map(|e| e.visits_per_month),
        });
    }

    if scan.skipped > 0 {
        warn!(skipped = scan.skipped, positions = stock.len(), "Rows excluded from shortfall prediction");
    }
    scan.candidates
        .sort_by(|a, b| a.weeks_until_stockout.total_cmp(&b.weeks_until_stockout));
    scan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ConsumptionPolicy;
    use crate::rate::estimate_consumption;
    use chrono::TimeZone;
    use watchdog_db::VisitSummaryRow;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 6, 0, 0).unwrap()
    }

    fn stock(trial: &str, location: &str, qty: f64) -> StockRow {
        StockRow {
            trial_alias: Some(trial.to_string()),
            location: Some(location.to_string()),
            material: Some("Vial 5ml".to_string()),
            total_stock: qty,
            excluded_rows: 0,
        }
    }

    /// 20 packages/week: 43.3 visits/month at 2 per visit over 4.33 weeks.
    fn rates_at_twenty() -> RateTable {
        let rows = vec![VisitSummaryRow {
            trial_alias: Some("TRIAL-B".to_string()),
            total_patients: 15,
            total_visits: 130,
            months_present: 3,
            excluded_visits: 0,
        }];
        let policy = ConsumptionPolicy { weeks_per_month: 130.0 / 3.0 * 2.0 / 20.0, ..Default::default() };
        estimate_consumption(&rows, &policy)
    }

    #[test]
    fn test_five_weeks_is_medium() {
        let rates = rates_at_twenty();
        let scan = predict_shortfalls(&[stock("TRIAL-B", "Lyon", 100.0)], &rates, now(), &ShortfallPolicy::default());
        assert_eq!(scan.candidates.len(), 1);
        let c = &scan.candidates[0];
        assert!((c.packages_per_week - 20.0).abs() < 1e-9);
        assert!((c.weeks_until_stockout - 5.0).abs() < 1e-9);
        assert_eq!(c.severity, Severity::Medium);
        assert_eq!(c.projected_shortage_date, NaiveDate::from_ymd_opt(2026, 11, 23).unwrap());
        assert_eq!(c.total_patients, Some(15));
    }

    #[test]
    fn test_default_rate_beyond_horizon_is_silent() {
        let rates = estimate_consumption(&[], &ConsumptionPolicy::default());
        let scan = predict_shortfalls(&[stock("TRIAL-C", "Oslo", 100.0)], &rates, now(), &ShortfallPolicy::default());
        assert!(scan.candidates.is_empty());
        assert_eq!(scan.skipped, 0);
    }

    #[test]
    fn test_default_rate_still_alerts_inside_horizon() {
        let rates = estimate_consumption(&[], &ConsumptionPolicy::default());
        let scan = predict_shortfalls(&[stock("TRIAL-C", "Oslo", 15.0)], &rates, now(), &ShortfallPolicy::default());
        let c = &scan.candidates[0];
        assert_eq!(c.weeks_until_stockout, 1.5);
        assert_eq!(c.severity, Severity::Critical);
        assert_eq!(c.total_patients, None);
        assert_eq!(c.visits_per_month, None);
    }

    #[test]
    fn test_horizon_is_exclusive() {
        let rates = estimate_consumption(&[], &ConsumptionPolicy::default());
        let scan = predict_shortfalls(&[stock("T", "A", 80.0), stock("T", "B", 79.0)], &rates, now(), &ShortfallPolicy::default());
        assert_eq!(scan.candidates.len(), 1);
        assert_eq!(scan.candidates[0].location.as_deref(), Some("B"));
    }

    #[test]
    fn test_locations_share_trial_rate() {
        let rates = rates_at_twenty();
        let scan = predict_shortfalls(
            &[stock("TRIAL-B", "Lyon", 60.0), stock("TRIAL-B", "Porto", 100.0)],
            &rates,
            now(),
            &ShortfallPolicy::default(),
        );
        assert_eq!(scan.candidates.len(), 2);
        assert_eq!(scan.candidates[0].packages_per_week, scan.candidates[1].packages_per_week);
        assert_eq!(scan.candidates[0].severity, Severity::High);
        assert_eq!(scan.candidates[1].severity, Severity::Medium);
    }

    #[test]
    fn test_fractional_weeks_project_partial_days() {
        assert_eq!(projected_shortage_date(now(), 0.5), NaiveDate::from_ymd_opt(2026, 10, 22));
        assert_eq!(projected_shortage_date(now(), 0.0), NaiveDate::from_ymd_opt(2026, 10, 19));
    }

    #[test]
    fn test_out_of_range_projection_is_none() {
        assert_eq!(projected_shortage_date(now(), 1e12), None);
        assert_eq!(projected_shortage_date(now(), f64::INFINITY), None);
    }

    #[test]
    fn test_unusable_stock_is_counted() {
        let rates = estimate_consumption(&[], &ConsumptionPolicy::default());
        let scan = predict_shortfalls(
            &[stock("T", "A", 0.0), stock("T", "B", f64::NAN), stock("T", "C", f64::INFINITY)],
            &rates,
            now(),
            &ShortfallPolicy::default(),
        );
        assert!(scan.candidates.is_empty());
        assert_eq!(scan.skipped, 2);
    }

    #[test]
    fn test_huge_horizon_does_not_overflow() {
        let rates = estimate_consumption(&[], &ConsumptionPolicy::default());
        let policy = ShortfallPolicy { horizon_weeks: 1e9, ..Default::default() };
        let scan = predict_shortfalls(&[stock("T", "A", 5e9)], &rates, now(), &policy);
        assert!(scan.candidates.is_empty());
        assert_eq!(scan.skipped, 1);
    }

    #[test]
    fn test_excluded_rows_are_counted() {
        let rows = vec![VisitSummaryRow {
            trial_alias: Some("T".to_string()),
            total_patients: 1,
            total_visits: 4,
            months_present: 1,
            excluded_visits: 2,
        }];
        let rates = estimate_consumption(&rows, &ConsumptionPolicy::default());
        let mut partial = stock("T", "A", 0.0);
        partial.excluded_rows = 3;
        let scan = predict_shortfalls(&[partial, stock("T", "B", 1.0)], &rates, now(), &ShortfallPolicy::default());
        assert_eq!(scan.skipped, 5);
        assert_eq!(scan.candidates.len(), 1);
        assert_eq!(scan.candidates[0].location.as_deref(), Some("B"));
    }
}
