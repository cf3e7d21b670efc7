use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::checker::Prober;
use super::clock::{Clock, SystemClock};
use super::incidents::{IncidentReconciler, ReconcileAction};
use super::status::{StatusMachine, StatusState};
use super::types::ProbeOutcome;
use crate::database::Database;
use crate::database::models::{CheckCommit, CheckUpdate, Heartbeat, Monitor};

/// Summary of one processed monitor
#[derive(Debug, Clone, PartialEq)]
pub struct CheckReport {
    pub monitor_id: Uuid,
    pub outcome: ProbeOutcome,
    pub state: StatusState,
    pub incident: ReconcileAction,
    pub checked_at: DateTime<Utc>,
    pub next_check_at: DateTime<Utc>,
}

/// Runs probe, state machine, reconciliation and logging for a single monitor
#[derive(Clone)]
pub struct CheckPipeline {
    database: Arc<dyn Database>,
    prober: Arc<dyn Prober>,
    machine: StatusMachine,
    clock: Arc<dyn Clock>,
}

impl CheckPipeline {
    pub fn new(database: Arc<dyn Database>, prober: Arc<dyn Prober>, machine: StatusMachine) -> Self {
        Self { database, prober, machine, clock: Arc::new(SystemClock) }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn machine(&self) -> &StatusMachine {
        &self.machine
    }

    /// Process one due monitor.
    ///
    /// The check is stamped with the time the probe finished. Its incident
    /// change, heartbeat and schedule are committed together, so a store
    /// failure writes nothing and leaves the monitor due for the next cycle.
    pub async fn process_monitor(&self, monitor: &Monitor) -> Result<CheckReport> {
        let outcome = self.prober.probe(&monitor.url, u64::from(monitor.timeout_ms)).await;
        let checked_at = self.clock.now();

        if !outcome.success {
            debug!(
                monitor_id = %monitor.id,
                url = %monitor.url,
                status_code = ?outcome.status_code,
                latency_ms = outcome.latency_ms,
                error = outcome.error.as_deref().unwrap_or_default(),
                "Probe failed"
            );
        }

        let transition = self.machine.apply(monitor.state(), outcome.success);
        let change = IncidentReconciler::new(self.database.clone())
            .plan(monitor, &transition, outcome.error.as_deref(), checked_at)
            .await?;

        let next_check_at = checked_at + Duration::seconds(i64::from(monitor.interval_seconds));
        let commit = CheckCommit {
            monitor_id: monitor.id,
            incident: change,
            heartbeat: Heartbeat::from_outcome(monitor, &outcome, checked_at),
            update: CheckUpdate { state: transition.next, checked_at, next_check_at },
        };
        let incident = self.database.commit_check(&commit).await?;

        if transition.went_down() {
            warn!(
                monitor_id = %monitor.id,
                failures = transition.next.consecutive_failures,
                "Monitor is down"
            );
        } else if transition.recovered() {
            info!(monitor_id = %monitor.id, "Monitor recovered");
        }
        match incident {
            ReconcileAction::Opened(incident_id) => warn!(
                monitor_id = %monitor.id,
                project_id = %monitor.project_id,
                incident_id = %incident_id,
                error = outcome.error.as_deref().unwrap_or_default(),
                "Incident opened"
            ),
            ReconcileAction::Resolved(incident_id) => {
                info!(monitor_id = %monitor.id, incident_id = %incident_id, "Incident resolved")
            }
            ReconcileAction::Refreshed(_) | ReconcileAction::Noop => {}
        }

        Ok(CheckReport {
            monitor_id: monitor.id,
            outcome,
            state: transition.next,
            incident,
            checked_at,
            next_check_at,
        })
    }
}
