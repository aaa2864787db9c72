//! Alert Assembler: detector candidates → uniform [`Alert`] records.
//!
//! Pure. Severity is carried over from the detector, never recomputed here,
//! and the recommended action is derived from severity and the risk figure.

use watchdog_common::{Alert, AlertRisk, ExpiryDetails, Severity, ShortfallDetails};

use crate::expiry::ExpiryCandidate;
use crate::shortfall::ShortfallCandidate;

fn or_unknown(value: Option<&str>) -> &str {
    value.unwrap_or("unknown")
}

/// Action text for a batch `days` from expiry.
pub fn recommend_expiry(severity: Severity, batch_lot: Option<&str>, days: i64) -> String {
    let lot = or_unknown(batch_lot);
    match severity {
        Severity::Critical => {
            format!("URGENT: Expedite shipment or reallocate batch {lot} immediately - expires in {days} days")
        }
        Severity::High => format!("Plan shipment for batch {lot} within 2 weeks - expires in {days} days"),
        Severity::Medium => format!("Monitor batch {lot} - expires in {days} days"),
    }
}

/// Action text for a position `weeks` from stockout.
pub fn recommend_shortfall(
    severity: Severity,
    trial_alias: Option<&str>,
    location: Option<&str>,
    weeks: f64,
) -> String {
    let trial = or_unknown(trial_alias);
    let location = or_unknown(location);
    match severity {
        Severity::Critical => {
            format!("URGENT: Initiate emergency order for {trial} at {location} - stockout in {weeks:.1} weeks")
        }
        Severity::High => format!("Expedite regular order for {trial} at {location} - stockout in {weeks:.1} weeks"),
        Severity::Medium => format!("Plan replenishment for {trial} at {location} - stockout in {weeks:.1} weeks"),
    }
}

pub fn expiry_alert(c: ExpiryCandidate) -> Alert {
    let recommended_action = recommend_expiry(c.severity, c.batch_lot.as_deref(), c.days_until_expiry);
    Alert {
        severity: c.severity,
        trial_alias: c.trial_alias,
        location: c.location,
        material_description: c.material_description,
        current_quantity: c.quantity,
        risk: AlertRisk::Expiry {
            batch_lot: c.batch_lot,
            expiry_date: c.expiry_date,
            days_until_expiry: c.days_until_expiry,
            details: ExpiryDetails { order_id: c.order_id, order_status: c.order_status },
        },
        recommended_action,
    }
}

pub fn shortfall_alert(c: ShortfallCandidate) -> Alert {
    let recommended_action = recommend_shortfall(
        c.severity,
        c.trial_alias.as_deref(),
        c.location.as_deref(),
        c.weeks_until_stockout,
    );
    Alert {
        severity: c.severity,
        trial_alias: c.trial_alias,
        location: c.location,
        material_description: c.material,
        current_quantity: c.current_stock,
        risk: AlertRisk::Shortfall {
            weekly_consumption_rate: c.packages_per_week,
            weeks_until_stockout: c.weeks_until_stockout,
            projected_shortage_date: c.projected_shortage_date,
            details: ShortfallDetails {
                total_patients: c.total_patients,
                visits_per_month: c.visits_per_month,
            },
        },
        recommended_action,
    }
}

/// Assemble both categories, expiry alerts first.
pub fn assemble(expiry: Vec<ExpiryCandidate>, shortfall: Vec<ShortfallCandidate>) -> Vec<Alert> {
    let mut alerts = Vec::with_capacity(expiry.len() + shortfall.len());
    alerts.extend(expiry.into_iter().map(expiry_alert));
    alerts.extend(shortfall.into_iter().map(shortfall_alert));
    alerts
}
