//! Per-trial consumption rate estimation from recent visit history.
//!
//! `packages_per_week = visits_per_month × packages_per_visit ÷ weeks_per_month`.
//! Trials with no usable history are not estimated here; [`RateTable`]
//! substitutes the policy default when the shortfall predictor asks for them.

use std::collections::HashMap;

use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use watchdog_db::VisitSummaryRow;

use crate::policy::ConsumptionPolicy;

/// Derived consumption for one trial. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionEstimate {
    pub trial_alias: String,
    pub total_patients: i64,
    pub total_visits: i64,
    pub visits_per_month: f64,
    pub packages_per_week: f64,
}

/// Estimates keyed by trial, plus the fallback rate for everything else.
#[derive(Debug, Clone)]
pub struct RateTable {
    estimates: HashMap<String, ConsumptionEstimate>,
    default_packages_per_week: f64,
    excluded_visits: usize,
}

impl RateTable {
    pub fn estimate(&self, trial_alias: Option<&str>) -> Option<&ConsumptionEstimate> {
        trial_alias.and_then(|t| self.estimates.get(t))
    }

    /// Weekly rate for a trial, never zero: missing or non-positive
    /// estimates fall back to the policy default.
    pub fn packages_per_week(&self, trial_alias: Option<&str>) -> f64 {
        match self.estimate(trial_alias) {
            Some(e) if e.packages_per_week.is_finite() && e.packages_per_week > 0.0 => e.packages_per_week,
            _ => self.default_packages_per_week,
        }
    }

    /// Visits left out of every estimate because their date was malformed.
    pub fn excluded_visits(&self) -> usize {
        self.excluded_visits
    }

    pub fn len(&self) -> usize {
        self.estimates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.estimates.is_empty()
    }
}

/// First calendar day included in the visit-history window.
pub fn lookback_start(now: DateTime<Utc>, policy: &ConsumptionPolicy) -> NaiveDate {
    let today = now.date_naive();
    today
        .checked_sub_months(Months::new(policy.lookback_months))
        .unwrap_or(NaiveDate::MIN)
}

/// Build the rate table from per-trial visit aggregates.
pub fn estimate_consumption(rows: &[VisitSummaryRow], policy: &ConsumptionPolicy) -> RateTable {
    let mut estimates = HashMap::with_capacity(rows.len());
    let mut excluded_visits = 0usize;

    for row in rows {
        if row.excluded_visits > 0 {
            debug!(trial = ?row.trial_alias, excluded = row.excluded_visits, "Visits with malformed dates excluded");
            excluded_visits = excluded_visits.saturating_add(usize::try_from(row.excluded_visits).unwrap_or(usize::MAX));
        }
        let Some(trial_alias) = row.trial_alias.as_deref() else {
            debug!(visits = row.total_visits, "Visit summary without trial alias skipped");
            continue;
        };
        if row.months_present <= 0 {
            debug!(trial = trial_alias, "No visit months in window, default rate applies");
            continue;
        }

        let visits_per_month = row.total_visits as f64 / row.months_present as f64;
        let packages_per_week = visits_per_month * policy.packages_per_visit / policy.weeks_per_month;

        estimates.insert(
            trial_alias.to_string(),
            ConsumptionEstimate {
                trial_alias: trial_alias.to_string(),
                total_patients: row.total_patients,
                total_visits: row.total_visits,
                visits_per_month,
                packages_per_week,
            },
        );
    }

    if excluded_visits > 0 {
        warn!(excluded = excluded_visits, "Visit rows with malformed dates left out of consumption rates");
    }

    RateTable {
        estimates,
        default_packages_per_week: policy.default_packages_per_week,
        excluded_visits,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn summary(trial: &str, patients: i64, visits: i64, months: i64) -> VisitSummaryRow {
        VisitSummaryRow {
            trial_alias: Some(trial.to_string()),
            total_patients: patients,
            total_visits: visits,
            months_present: months,
            excluded_visits: 0,
        }
    }

    #[test]
    fn test_rate_formula() {
        let policy = ConsumptionPolicy::default();
        let table = estimate_consumption(&[summary("T1", 12, 90, 3)], &policy);
        let e = table.estimate(Some("T1")).unwrap();
        assert_eq!(e.visits_per_month, 30.0);
        assert!((e.packages_per_week - 30.0 * 2.0 / 4.33).abs() < 1e-9);
        assert_eq!(e.total_patients, 12);
    }

    #[test]
    fn test_missing_trial_gets_default_rate() {
        let table = estimate_consumption(&[], &ConsumptionPolicy::default());
        assert!(table.is_empty());
        assert_eq!(table.packages_per_week(Some("UNKNOWN")), 10.0);
        assert_eq!(table.packages_per_week(None), 10.0);
    }

    #[test]
    fn test_zero_months_contributes_no_estimate() {
        let table = estimate_consumption(&[summary("T1", 0, 0, 0)], &ConsumptionPolicy::default());
        assert!(table.estimate(Some("T1")).is_none());
        assert_eq!(table.packages_per_week(Some("T1")), 10.0);
    }

    #[test]
    fn test_zero_rate_is_floored_to_default() {
        let policy = ConsumptionPolicy { packages_per_visit: 0.0, ..Default::default() };
        let table = estimate_consumption(&[summary("T1", 4, 8, 2)], &policy);
        assert_eq!(table.estimate(Some("T1")).unwrap().packages_per_week, 0.0);
        assert_eq!(table.packages_per_week(Some("T1")), 10.0);
    }

    #[test]
    fn test_malformed_visit_dates_are_counted() {
        let mut t1 = summary("T1", 3, 9, 3);
        t1.excluded_visits = 2;
        let orphan = VisitSummaryRow { trial_alias: None, excluded_visits: 1, ..Default::default() };
        let table = estimate_consumption(&[t1, orphan], &ConsumptionPolicy::default());
        assert_eq!(table.excluded_visits(), 3);
        assert_eq!(table.estimate(Some("T1")).unwrap().total_visits, 9);
    }

    #[test]
    fn test_lookback_start_is_three_calendar_months() {
        let now = Utc.with_ymd_and_hms(2026, 5, 31, 9, 0, 0).unwrap();
        let start = lookback_start(now, &ConsumptionPolicy::default());
        assert_eq!(start, NaiveDate::from_ymd_opt(2026, 2, 28).unwrap());
    }
}
