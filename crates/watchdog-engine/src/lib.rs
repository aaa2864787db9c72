//! watchdog-engine: Detection & Alerting Engine for clinical-trial supply.
//!
//! One monitoring cycle, leaves first:
//! - Rate estimation from trailing visit history ([`rate`])
//! - Expiry detection over active allocations ([`expiry`])
//! - Stockout projection per trial/location/material ([`shortfall`])
//! - Severity banding shared by both detectors ([`severity`])
//! - Alert assembly with recommended actions ([`assembler`])
//! - Structured report and notification rendering ([`report`])
//! - Non-blocking notification delivery with bounded retry ([`dispatch`])
//! - The run orchestrator tying it together ([`run`])

pub mod policy;
pub mod severity;
pub mod rate;
pub mod expiry;
pub mod shortfall;
pub mod assembler;
pub mod report;
pub mod dispatch;
pub mod run;

pub use dispatch::{DeliveryOutcome, Dispatcher, NotificationTransport, NotificationWorker};
pub use policy::WatchdogPolicy;
pub use report::{Notification, RunReport, RunSummary};
pub use run::{RunOutcome, SupplyWatchdog};
