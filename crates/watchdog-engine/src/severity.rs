//! Severity classification shared by the expiry and shortfall detectors.
//!
//! Severity is always derived from the risk metric, never set directly.

use watchdog_common::Severity;

use crate::policy::{ExpiryPolicy, SeverityBands, ShortfallPolicy};

impl<T: PartialOrd + Copy> SeverityBands<T> {
    /// Map a metric (smaller = closer to breach) onto a band.
    pub fn classify(&self, metric: T) -> Severity {
        if metric < self.critical_below {
            Severity::Critical
        } else if metric < self.high_below {
            Severity::High
        } else {
            Severity::Medium
        }
    }
}

/// Band for a batch `days_until_expiry` days from lapsing.
pub fn classify_expiry(days_until_expiry: i64, policy: &ExpiryPolicy) -> Severity {
    policy.bands.classify(days_until_expiry)
}

/// Band for a position projected to run out in `weeks_until_stockout` weeks.
pub fn classify_shortfall(weeks_until_stockout: f64, policy: &ShortfallPolicy) -> Severity {
    policy.bands.classify(weeks_until_stockout)
}
