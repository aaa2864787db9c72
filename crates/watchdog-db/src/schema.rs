//! Findings table definition.
//!
//! Source tables (inventory, allocations, visit history) are owned by the
//! upstream load pipeline; only `watchdog_findings` is defined here.

pub const TABLE_FINDINGS: &str = "watchdog_findings";

/// Idempotent DDL for the append-only findings log.
/// Acknowledgment columns are maintained by an external workflow.
pub const FINDINGS_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS watchdog_findings (
    id SERIAL PRIMARY KEY,
    run_timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    alert_type VARCHAR(50) NOT NULL,
    severity VARCHAR(20) NOT NULL,
    trial_alias VARCHAR(100),
    location VARCHAR(200),
    batch_lot VARCHAR(100),
    material_description VARCHAR(500),
    expiry_date DATE,
    days_until_expiry INT,
    current_quantity DECIMAL,
    projected_shortage_date DATE,
    weekly_consumption_rate DECIMAL,
    weeks_until_stockout DECIMAL,
    details JSONB,
    recommended_action TEXT,
    email_sent BOOLEAN DEFAULT FALSE,
    acknowledged BOOLEAN DEFAULT FALSE,
    acknowledged_by VARCHAR(100),
    acknowledged_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_findings_run_timestamp ON watchdog_findings(run_timestamp);
CREATE INDEX IF NOT EXISTS idx_findings_alert_type ON watchdog_findings(alert_type);
CREATE INDEX IF NOT EXISTS idx_findings_severity ON watchdog_findings(severity);
CREATE INDEX IF NOT EXISTS idx_findings_trial ON watchdog_findings(trial_alias);
CREATE INDEX IF NOT EXISTS idx_findings_acknowledged ON watchdog_findings(acknowledged);
"#;

/// Append one finding. Numeric parameters are cast from FLOAT8 so `f64`
/// binds cleanly against the DECIMAL columns.
pub(crate) const INSERT_FINDING: &str = r#"
INSERT INTO watchdog_findings (
    run_timestamp, alert_type, severity, trial_alias, location,
    batch_lot, material_description, expiry_date, days_until_expiry,
    current_quantity, projected_shortage_date, weekly_consumption_rate,
    weeks_until_stockout, details, recommended_action
) VALUES (
    $1, $2, $3, $4, $5,
    $6, $7, $8, $9,
    $10::FLOAT8, $11, $12::FLOAT8,
    $13::FLOAT8, $14, $15
)
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ddl_is_idempotent() {
        assert!(FINDINGS_DDL.contains("CREATE TABLE IF NOT EXISTS watchdog_findings"));
        for line in FINDINGS_DDL.lines().filter(|l| l.starts_with("CREATE INDEX")) {
            assert!(line.contains("IF NOT EXISTS"), "non-idempotent index: {line}");
        }
    }

    #[test]
    fn test_insert_binds_fifteen_parameters() {
        assert!(INSERT_FINDING.contains("$15"));
        assert!(!INSERT_FINDING.contains("$16"));
        assert!(!INSERT_FINDING.to_uppercase().contains("UPDATE"));
    }
}
