//! Data Access Gateway: read-only queries over the supply source tables.
//!
//! Values that need per-row coercion (expiry dates, quantities) are returned
//! as raw text so one malformed row never fails the whole query; the engine
//! parses and filters them.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio_postgres::types::FromSql;
use tokio_postgres::Row;

use crate::database::Database;
use crate::error::{DbError, Result};

/// One active allocation joined to the inventory record of its lot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AllocationRow {
    pub batch_lot: Option<String>,
    pub trial_alias: Option<String>,
    pub material_description: Option<String>,
    /// Raw expiry value as stored upstream; may be missing or unparsable.
    pub expiry_date: Option<String>,
    pub location: Option<String>,
    /// Raw on-hand quantity; may be missing or non-numeric.
    pub quantity: Option<String>,
    pub order_id: Option<String>,
    pub order_status: Option<String>,
}

/// Visit history for one trial over the lookback window.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VisitSummaryRow {
    pub trial_alias: Option<String>,
    pub total_patients: i64,
    pub total_visits: i64,
    /// Distinct calendar months (YYYY-MM) with at least one visit.
    pub months_present: i64,
    /// Visits of this trial whose date is not `YYYY-MM-DD`, left out of the counts.
    pub excluded_visits: i64,
}

/// Aggregated positive stock for one (trial, location, material).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StockRow {
    pub trial_alias: Option<String>,
    pub location: Option<String>,
    pub material: Option<String>,
    pub total_stock: f64,
    /// Inventory rows with a non-numeric quantity, left out of `total_stock`.
    pub excluded_rows: i64,
}

/// Read access to the supply source tables.
#[async_trait]
pub trait SupplyGateway: Send + Sync {
    /// Allocation rows whose order status is in `statuses`.
    async fn active_allocations(&self, statuses: &[String]) -> Result<Vec<AllocationRow>>;

    /// Per-trial visit aggregates for visits on or after `since`.
    async fn visit_summaries(&self, since: NaiveDate) -> Result<Vec<VisitSummaryRow>>;

    /// Stock per (trial, location, material) where the aggregate is positive,
    /// plus groups that only carry excluded rows (with zero stock).
    async fn stock_positions(&self) -> Result<Vec<StockRow>>;
}

const ACTIVE_ALLOCATIONS: &str = r#"
SELECT
    a.material_component_batch AS batch_lot,
    a.trial_alias,
    a.material_description,
    i.expiration_date::TEXT AS expiry_date,
    i.warehouse_name AS location,
    i.actual_qty::TEXT AS quantity,
    a.order_id::TEXT AS order_id,
    a.order_status
FROM allocated_materials_to_orders a
JOIN complete_warehouse_inventory i
    ON a.material_component_batch = i.lot_number
WHERE a.order_status = ANY($1)
"#;

// Dates are compared as ISO text so a malformed value is counted, never cast.
const VISIT_SUMMARIES: &str = r#"
WITH visits AS (
    SELECT
        "Trial Alias" AS trial_alias,
        patient,
        CASE WHEN visit_date::TEXT ~ '^\s*[0-9]{4}-[0-9]{2}-[0-9]{2}\s*$'
             THEN TRIM(visit_date::TEXT)
        END AS visit_day
    FROM patient_status_and_treatment_report
)
SELECT
    trial_alias,
    COUNT(DISTINCT patient) FILTER (WHERE visit_day >= $1)::BIGINT AS total_patients,
    COUNT(*) FILTER (WHERE visit_day >= $1)::BIGINT AS total_visits,
    COUNT(DISTINCT SUBSTRING(visit_day FROM 1 FOR 7)) FILTER (WHERE visit_day >= $1)::BIGINT AS months_present,
    COUNT(*) FILTER (WHERE visit_day IS NULL)::BIGINT AS excluded_visits
FROM visits
GROUP BY trial_alias
HAVING COUNT(*) FILTER (WHERE visit_day >= $1 OR visit_day IS NULL) > 0
"#;

// Non-numeric quantities are counted and left out of the sum; NULL counts as no stock.
const STOCK_POSITIONS: &str = r#"
SELECT
    trial_alias,
    warehouse_name AS location,
    description AS material,
    COALESCE(SUM(qty), 0)::FLOAT8 AS total_stock,
    COUNT(*) FILTER (WHERE qty IS NULL AND NOT qty_missing)::BIGINT AS excluded_rows
FROM (
    SELECT
        trial_alias,
        warehouse_name,
        description,
        CASE WHEN actual_qty::TEXT ~ '^\s*-?[0-9]+(\.[0-9]+)?\s*$'
             THEN actual_qty::TEXT::NUMERIC
        END AS qty,
        actual_qty IS NULL AS qty_missing
    FROM complete_warehouse_inventory
) inv
GROUP BY trial_alias, warehouse_name, description
HAVING SUM(qty) > 0 OR COUNT(*) FILTER (WHERE qty IS NULL AND NOT qty_missing) > 0
"#;

/// PostgreSQL-backed gateway.
#[derive(Clone)]
pub struct PgSupplyGateway {
    db: Database,
}

impl PgSupplyGateway {
    pub fn new(db: Database) -> Self { Self { db } }
}

#[async_trait]
impl SupplyGateway for PgSupplyGateway {
    async fn active_allocations(&self, statuses: &[String]) -> Result<Vec<AllocationRow>> {
        let client = self.db.client().await?;
        let statuses: Vec<&str> = statuses.iter().map(String::as_str).collect();
        let rows = client.query(ACTIVE_ALLOCATIONS, &[&statuses]).await?;
        tracing::debug!(rows = rows.len(), "active_allocations fetched");

        rows.iter()
            .map(|row| {
                Ok(AllocationRow {
                    batch_lot: column(row, "batch_lot")?,
                    trial_alias: column(row, "trial_alias")?,
                    material_description: column(row, "material_description")?,
                    expiry_date: column(row, "expiry_date")?,
                    location: column(row, "location")?,
                    quantity: column(row, "quantity")?,
                    order_id: column(row, "order_id")?,
                    order_status: column(row, "order_status")?,
                })
            })
            .collect()
    }

    async fn visit_summaries(&self, since: NaiveDate) -> Result<Vec<VisitSummaryRow>> {
        let client = self.db.client().await?;
        let since_day = since.format("%Y-%m-%d").to_string();
        let rows = client.query(VISIT_SUMMARIES, &[&since_day]).await?;
        tracing::debug!(rows = rows.len(), since = %since, "visit_summaries fetched");

        rows.iter()
            .map(|row| {
                Ok(VisitSummaryRow {
                    trial_alias: column(row, "trial_alias")?,
                    total_patients: column(row, "total_patients")?,
                    total_visits: column(row, "total_visits")?,
                    months_present: column(row, "months_present")?,
                    excluded_visits: column(row, "excluded_visits")?,
                })
            })
            .collect()
    }

    async fn stock_positions(&self) -> Result<Vec<StockRow>> {
        let client = self.db.client().await?;
        let rows = client.query(STOCK_POSITIONS, &[]).await?;
        tracing::debug!(rows = rows.len(), "stock_positions fetched");

        rows.iter()
            .map(|row| {
                Ok(StockRow {
                    trial_alias: column(row, "trial_alias")?,
                    location: column(row, "location")?,
                    material: column(row, "material")?,
                    total_stock: column(row, "total_stock")?,
                    excluded_rows: column(row, "excluded_rows")?,
                })
            })
            .collect()
    }
}

/// Read a named column, reporting a type or name mismatch as a shape error.
fn column<'a, T: FromSql<'a>>(row: &'a Row, name: &str) -> Result<T> {
    row.try_get(name)
        .map_err(|e| DbError::Shape(format!("column `{name}`: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visit_query_never_casts_dates() {
        assert!(!VISIT_SUMMARIES.contains("TO_DATE"));
        assert!(VISIT_SUMMARIES.contains("visit_date::TEXT ~"));
        assert!(VISIT_SUMMARIES.contains("AS excluded_visits"));
    }

    #[test]
    fn test_stock_query_counts_non_numeric_rows() {
        assert!(STOCK_POSITIONS.contains("FILTER (WHERE qty IS NULL AND NOT qty_missing)"));
        assert!(STOCK_POSITIONS.contains("AS excluded_rows"));
    }

    #[test]
    fn test_guards_are_valid_patterns() {
        assert!(VISIT_SUMMARIES.contains(r"'^\s*[0-9]{4}-[0-9]{2}-[0-9]{2}\s*$'"));
        assert!(STOCK_POSITIONS.contains(r"'^\s*-?[0-9]+(\.[0-9]+)?\s*$'"));
    }
}
