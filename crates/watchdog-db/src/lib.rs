//! Supply Watchdog database layer.
//!
//! This crate is the boundary between the detection engine and PostgreSQL:
//!
//! - [`SupplyGateway`] reads allocation, visit-history and stock data
//! - [`FindingsStore`] appends each run's alerts to `watchdog_findings`
//! - [`Database`] owns the connection pool and the findings DDL
//!
//! The engine only sees the traits; the `Pg*` implementations live here.
//!
//! # Example
//!
//! ```rust,no_run
//! use watchdog_db::{Database, PgSupplyGateway, SupplyGateway};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://postgres@localhost/clinical_supply_chain", 4)?;
//!     db.initialize().await?;
//!
//!     let gateway = PgSupplyGateway::new(db.clone());
//!     let stock = gateway.stock_positions().await?;
//!     println!("{} stock positions", stock.len());
//!     Ok(())
//! }
//! ```

pub mod database;
pub mod error;
pub mod findings;
pub mod gateway;
pub mod schema;

pub use database::Database;
pub use error::{DbError, Result};
pub use findings::{FindingsStore, PgFindingsStore};
pub use gateway::{AllocationRow, PgSupplyGateway, StockRow, SupplyGateway, VisitSummaryRow};
pub use schema::TABLE_FINDINGS;
