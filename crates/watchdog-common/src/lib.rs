//! watchdog-common: Alert model and error taxonomy shared by all Supply Watchdog crates.

pub mod alert;
pub mod error;

// Re-export commonly used types
pub use alert::{Alert, AlertRisk, AlertType, ExpiryDetails, Severity, ShortfallDetails};
pub use error::{Result, WatchdogError};
