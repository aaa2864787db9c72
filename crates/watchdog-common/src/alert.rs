//! Alert data model.
//!
//! An [`Alert`] is created once per run by the engine's assembler and is never
//! mutated afterwards. Type-specific fields live in the tagged [`AlertRisk`]
//! variant so renderers and the findings store match on it exhaustively.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity band. Ordered so that `Critical > High > Medium`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Medium,
    High,
    Critical,
}

impl Severity {
    /// All bands, most severe first.
    pub const DESCENDING: [Severity; 3] = [Severity::Critical, Severity::High, Severity::Medium];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High     => "HIGH",
            Severity::Medium   => "MEDIUM",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert category, as stored in the `alert_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertType {
    #[serde(rename = "EXPIRY_ALERT")]
    Expiry,
    #[serde(rename = "SHORTFALL_PREDICTION")]
    Shortfall,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Expiry    => "EXPIRY_ALERT",
            AlertType::Shortfall => "SHORTFALL_PREDICTION",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order context attached to an expiry alert.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExpiryDetails {
    pub order_id: Option<String>,
    pub order_status: Option<String>,
}

/// Consumption context attached to a shortfall alert.
/// Both fields are `None` when the trial had no recent visit history.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ShortfallDetails {
    pub total_patients: Option<i64>,
    pub visits_per_month: Option<f64>,
}

/// Type-specific risk data. Serialized inline with an `alert_type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "alert_type")]
pub enum AlertRisk {
    #[serde(rename = "EXPIRY_ALERT")]
    Expiry {
        batch_lot: Option<String>,
        expiry_date: NaiveDate,
        /// Negative when a lapsed batch still shows an active allocation.
        days_until_expiry: i64,
        details: ExpiryDetails,
    },
    #[serde(rename = "SHORTFALL_PREDICTION")]
    Shortfall {
        weekly_consumption_rate: f64,
        weeks_until_stockout: f64,
        projected_shortage_date: NaiveDate,
        details: ShortfallDetails,
    },
}

/// A classified, actionable supply alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub severity: Severity,
    pub trial_alias: Option<String>,
    pub location: Option<String>,
    pub material_description: Option<String>,
    pub current_quantity: f64,
    #[serde(flatten)]
    pub risk: AlertRisk,
    pub recommended_action: String,
}

impl Alert {
    pub fn alert_type(&self) -> AlertType {
        match self.risk {
            AlertRisk::Expiry { .. }    => AlertType::Expiry,
            AlertRisk::Shortfall { .. } => AlertType::Shortfall,
        }
    }

    pub fn batch_lot(&self) -> Option<&str> {
        match &self.risk {
            AlertRisk::Expiry { batch_lot, .. } => batch_lot.as_deref(),
            AlertRisk::Shortfall { .. } => None,
        }
    }

    pub fn expiry_date(&self) -> Option<NaiveDate> {
        match self.risk {
            AlertRisk::Expiry { expiry_date, .. } => Some(expiry_date),
            AlertRisk::Shortfall { .. } => None,
        }
    }

    pub fn days_until_expiry(&self) -> Option<i64> {
        match self.risk {
            AlertRisk::Expiry { days_until_expiry, .. } => Some(days_until_expiry),
            AlertRisk::Shortfall { .. } => None,
        }
    }

    pub fn weekly_consumption_rate(&self) -> Option<f64> {
        match self.risk {
            AlertRisk::Shortfall { weekly_consumption_rate, .. } => Some(weekly_consumption_rate),
            AlertRisk::Expiry { .. } => None,
        }
    }

    pub fn weeks_until_stockout(&self) -> Option<f64> {
        match self.risk {
            AlertRisk::Shortfall { weeks_until_stockout, .. } => Some(weeks_until_stockout),
            AlertRisk::Expiry { .. } => None,
        }
    }

    pub fn projected_shortage_date(&self) -> Option<NaiveDate> {
        match self.risk {
            AlertRisk::Shortfall { projected_shortage_date, .. } => Some(projected_shortage_date),
            AlertRisk::Expiry { .. } => None,
        }
    }

    /// Type-specific details as a JSON object (the findings `details` column).
    pub fn details_json(&self) -> serde_json::Result<serde_json::Value> {
        match &self.risk {
            AlertRisk::Expiry { details, .. }    => serde_json::to_value(details),
            AlertRisk::Shortfall { details, .. } => serde_json::to_value(details),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn expiry_alert() -> Alert {
        Alert {
            severity: Severity::Critical,
            trial_alias: Some("TRIAL-A".to_string()),
            location: Some("Berlin DC".to_string()),
            material_description: Some("Kit 10mg".to_string()),
            current_quantity: 40.0,
            risk: AlertRisk::Expiry {
                batch_lot: Some("LOT-1".to_string()),
                expiry_date: NaiveDate::from_ymd_opt(2026, 11, 13).unwrap(),
                days_until_expiry: 25,
                details: ExpiryDetails {
                    order_id: Some("ORD-9".to_string()),
                    order_status: Some("Released".to_string()),
                },
            },
            recommended_action: "URGENT".to_string(),
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        let mut bands = vec![Severity::Medium, Severity::Critical, Severity::High];
        bands.sort_by(|a, b| b.cmp(a));
        assert_eq!(bands, Severity::DESCENDING.to_vec());
    }

    #[test]
    fn test_alert_serializes_flat_with_type_tag() {
        let value = serde_json::to_value(expiry_alert()).unwrap();
        assert_eq!(value["alert_type"], "EXPIRY_ALERT");
        assert_eq!(value["severity"], "CRITICAL");
        assert_eq!(value["expiry_date"], "2026-11-13");
        assert_eq!(value["days_until_expiry"], 25);
        assert_eq!(value["details"]["order_id"], "ORD-9");
    }

    #[test]
    fn test_alert_json_reads_back() {
        let alert = expiry_alert();
        let text = serde_json::to_string(&alert).unwrap();
        let back: Alert = serde_json::from_str(&text).unwrap();
        assert_eq!(back, alert);
    }

    #[test]
    fn test_accessors_follow_variant() {
        let alert = expiry_alert();
        assert_eq!(alert.alert_type(), AlertType::Expiry);
        assert_eq!(alert.batch_lot(), Some("LOT-1"));
        assert_eq!(alert.weeks_until_stockout(), None);
        assert_eq!(alert.details_json().unwrap()["order_status"], "Released");
    }
}
