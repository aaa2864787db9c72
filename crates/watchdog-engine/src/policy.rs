//! Detection policy: every threshold and constant the detectors use.
//!
//! Defaults reproduce the production rules (90-day expiry horizon, 8-week
//! stockout horizon, 2 packages per visit, 4.33 weeks per month, 10/week
//! fallback rate, 3 notification retries).

use serde::{Deserialize, Serialize};
use watchdog_common::{Result, WatchdogError};

/// Two cutoffs splitting a risk metric into CRITICAL / HIGH / MEDIUM.
/// Both comparisons are strict: `metric < critical_below` is CRITICAL,
/// `metric < high_below` is HIGH, anything else is MEDIUM.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityBands<T> {
    pub critical_below: T,
    pub high_below: T,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WatchdogPolicy {
    #[serde(default)]
    pub expiry: ExpiryPolicy,
    #[serde(default)]
    pub shortfall: ShortfallPolicy,
    #[serde(default)]
    pub consumption: ConsumptionPolicy,
    #[serde(default)]
    pub delivery: DeliveryPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpiryPolicy {
    /// Batches with `days_until_expiry <= horizon_days` are reported.
    #[serde(default = "default_expiry_horizon")]
    pub horizon_days: i64,
    #[serde(default = "default_expiry_bands")]
    pub bands: SeverityBands<i64>,
    /// Allocation statuses meaning "not yet consumed or shipped".
    #[serde(default = "default_active_statuses")]
    pub active_order_statuses: Vec<String>,
}

fn default_expiry_horizon() -> i64 { 90 }
fn default_expiry_bands() -> SeverityBands<i64> {
    SeverityBands { critical_below: 30, high_below: 60 }
}
fn default_active_statuses() -> Vec<String> {
    vec!["Released".to_string(), "In Progress".to_string(), "Created".to_string()]
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            horizon_days: default_expiry_horizon(),
            bands: default_expiry_bands(),
            active_order_statuses: default_active_statuses(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortfallPolicy {
    /// Positions with `weeks_until_stockout < horizon_weeks` are reported.
    #[serde(default = "default_shortfall_horizon")]
    pub horizon_weeks: f64,
    #[serde(default = "default_shortfall_bands")]
    pub bands: SeverityBands<f64>,
}

fn default_shortfall_horizon() -> f64 { 8.0 }
fn default_shortfall_bands() -> SeverityBands<f64> {
    SeverityBands { critical_below: 2.0, high_below: 4.0 }
}

impl Default for ShortfallPolicy {
    fn default() -> Self {
        Self {
            horizon_weeks: default_shortfall_horizon(),
            bands: default_shortfall_bands(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionPolicy {
    #[serde(default = "default_lookback_months")]
    pub lookback_months: u32,
    #[serde(default = "default_packages_per_visit")]
    pub packages_per_visit: f64,
    #[serde(default = "default_weeks_per_month")]
    pub weeks_per_month: f64,
    /// Substituted for trials without recent visit history. Must be > 0.
    #[serde(default = "default_packages_per_week")]
    pub default_packages_per_week: f64,
}

fn default_lookback_months()    -> u32 { 3 }
fn default_packages_per_visit() -> f64 { 2.0 }
fn default_weeks_per_month()    -> f64 { 4.33 }
fn default_packages_per_week()  -> f64 { 10.0 }

impl Default for ConsumptionPolicy {
    fn default() -> Self {
        Self {
            lookback_months: default_lookback_months(),
            packages_per_visit: default_packages_per_visit(),
            weeks_per_month: default_weeks_per_month(),
            default_packages_per_week: default_packages_per_week(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryPolicy {
    /// Retries after the first attempt; total attempts = max_retries + 1.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_max_retries()      -> u32 { 3 }
fn default_retry_backoff_ms() -> u64 { 2_000 }

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// Ten years, in either unit.
const MAX_HORIZON_DAYS: i64 = 3650;
const MAX_HORIZON_WEEKS: f64 = 520.0;

impl WatchdogPolicy {
    /// Reject policies whose bands or constants would misclassify or divide by zero.
    pub fn validate(&self) -> Result<()> {
        let e = &self.expiry;
        if e.horizon_days > MAX_HORIZON_DAYS {
            return Err(WatchdogError::Config(format!(
                "expiry.horizon_days must be <= {MAX_HORIZON_DAYS} (got {})",
                e.horizon_days
            )));
        }
        if e.bands.critical_below >= e.bands.high_below || e.bands.high_below > e.horizon_days {
            return Err(WatchdogError::Config(format!(
                "expiry bands must satisfy critical_below < high_below <= horizon_days (got {} / {} / {})",
                e.bands.critical_below, e.bands.high_below, e.horizon_days
            )));
        }
        if e.active_order_statuses.is_empty() {
            return Err(WatchdogError::Config("expiry.active_order_statuses is empty".to_string()));
        }

        let s = &self.shortfall;
        if !(s.horizon_weeks.is_finite() && s.horizon_weeks <= MAX_HORIZON_WEEKS) {
            return Err(WatchdogError::Config(format!(
                "shortfall.horizon_weeks must be finite and <= {MAX_HORIZON_WEEKS} (got {})",
                s.horizon_weeks
            )));
        }
        if !(s.bands.critical_below < s.bands.high_below && s.bands.high_below <= s.horizon_weeks) {
            return Err(WatchdogError::Config(format!(
                "shortfall bands must satisfy critical_below < high_below <= horizon_weeks (got {} / {} / {})",
                s.bands.critical_below, s.bands.high_below, s.horizon_weeks
            )));
        }

        let c = &self.consumption;
        if !(c.weeks_per_month > 0.0) {
            return Err(WatchdogError::Config("consumption.weeks_per_month must be > 0".to_string()));
        }
        if !(c.default_packages_per_week > 0.0) {
            return Err(WatchdogError::Config(
                "consumption.default_packages_per_week must be > 0".to_string(),
            ));
        }
        if !(c.packages_per_visit >= 0.0) {
            return Err(WatchdogError::Config("consumption.packages_per_visit must be >= 0".to_string()));
        }
        if c.lookback_months == 0 {
            return Err(WatchdogError::Config("consumption.lookback_months must be >= 1".to_string()));
        }
        Ok(())
    }
}
