/// Monitoring engine module - handles execution of monitoring checks
///
/// This module is responsible for:
/// - Probing HTTP/HTTPS targets
/// - Deciding up/down with failure hysteresis
/// - Opening and resolving incidents from status transitions
/// - Scheduling due monitors in bounded batches
pub mod checker;
pub mod clock;
pub mod executor;
pub mod incidents;
pub mod scheduler;
pub mod status;
pub mod types;

pub use checker::{HttpProber, Prober};
pub use clock::{Clock, SystemClock};
pub use executor::{CheckPipeline, CheckReport};
pub use incidents::{IncidentChange, IncidentReconciler, ReconcileAction};
pub use scheduler::{CycleSummary, MonitoringScheduler, SchedulerSettings};
pub use status::{StatusMachine, StatusState, Transition};
pub use types::{IncidentStatus, MonitorStatus, ProbeOutcome, Severity};
