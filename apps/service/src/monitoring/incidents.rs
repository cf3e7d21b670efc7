use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use super::status::Transition;
use super::types::{REASON_DOWN, REASON_RECOVERED};
use crate::database::Database;
use crate::database::models::{Incident, Monitor};

/// What a check did to the incident timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    Opened(Uuid),
    Refreshed(Uuid),
    Resolved(Uuid),
    Noop,
}

/// Incident write planned for one check, applied by [`Database::commit_check`]
#[derive(Debug, Clone, PartialEq)]
pub enum IncidentChange {
    None,
    Open(Incident),
    Refresh { incident_id: Uuid, error: String },
    Resolve { incident_id: Uuid, reason: String, at: DateTime<Utc> },
}

/// Decides how a status transition changes the incident timeline.
///
/// At most one incident per monitor is open at any time. The store enforces
/// this with a partial unique index, and a lost insert race is folded into a
/// refresh of the surviving incident when the change is committed.
pub struct IncidentReconciler {
    database: Arc<dyn Database>,
}

impl IncidentReconciler {
    pub fn new(database: Arc<dyn Database>) -> Self {
        Self { database }
    }

    pub async fn plan(
        &self,
        monitor: &Monitor,
        transition: &Transition,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<IncidentChange> {
        if !(transition.went_down() || transition.recovered() || transition.stayed_down()) {
            return Ok(IncidentChange::None);
        }

        let open = self.database.open_incident(monitor.id).await?;

        if transition.recovered() {
            return Ok(match open {
                Some(incident) => IncidentChange::Resolve {
                    incident_id: incident.id,
                    reason: REASON_RECOVERED.to_string(),
                    at: now,
                },
                None => IncidentChange::None,
            });
        }

        match (open, error) {
            (Some(incident), Some(error)) => Ok(IncidentChange::Refresh {
                incident_id: incident.id,
                error: error.to_string(),
            }),
            (Some(_), None) => Ok(IncidentChange::None),
            (None, error) if transition.went_down() => Ok(IncidentChange::Open(Incident::open(
                monitor,
                REASON_DOWN,
                error.map(str::to_string),
                now,
            ))),
            (None, _) => Ok(IncidentChange::None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseImpl;
    use crate::database::models::{CheckCommit, CheckUpdate, Heartbeat, IncidentFilter};
    use crate::monitoring::status::StatusState;
    use crate::monitoring::types::{IncidentStatus, MonitorStatus, ProbeOutcome};
    use crate::test_support::{new_monitor, temp_database};

    fn transition(from: MonitorStatus, to: MonitorStatus) -> Transition {
        Transition {
            previous: StatusState::new(from, 0),
            next: StatusState::new(to, 1),
        }
    }

    async fn commit(
        db: &Arc<DatabaseImpl>,
        monitor: &Monitor,
        transition: &Transition,
        change: IncidentChange,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> ReconcileAction {
        let outcome = match error {
            Some(error) => ProbeOutcome::transport_failure(error.to_string(), 5),
            None => ProbeOutcome::success(200, 5),
        };
        let commit = CheckCommit {
            monitor_id: monitor.id,
            incident: change,
            heartbeat: Heartbeat::from_outcome(monitor, &outcome, now),
            update: CheckUpdate {
                state: transition.next,
                checked_at: now,
                next_check_at: now + chrono::Duration::seconds(60),
            },
        };
        db.commit_check(&commit).await.unwrap()
    }

    async fn check(
        db: &Arc<DatabaseImpl>,
        monitor: &Monitor,
        transition: Transition,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> ReconcileAction {
        let change = IncidentReconciler::new(db.clone())
            .plan(monitor, &transition, error, now)
            .await
            .unwrap();
        commit(db, monitor, &transition, change, error, now).await
    }

    #[tokio::test]
    async fn test_open_refresh_resolve() {
        let (_dir, db) = temp_database().await.unwrap();
        let now = Utc::now();
        let (monitor, _) = db.insert_monitor(&new_monitor("p1", "https://a.test"), now).await.unwrap();

        let opened = check(&db, &monitor, transition(MonitorStatus::Up, MonitorStatus::Down), Some("timeout"), now).await;
        let ReconcileAction::Opened(id) = opened else { panic!("expected open, got {opened:?}") };

        let refreshed =
            check(&db, &monitor, transition(MonitorStatus::Down, MonitorStatus::Down), Some("refused"), now).await;
        assert_eq!(refreshed, ReconcileAction::Refreshed(id));
        let open = db.open_incident(monitor.id).await.unwrap().unwrap();
        assert_eq!(open.last_error.as_deref(), Some("refused"));
        assert_eq!(open.started_reason, "down");

        let resolved = check(&db, &monitor, transition(MonitorStatus::Down, MonitorStatus::Up), None, now).await;
        assert_eq!(resolved, ReconcileAction::Resolved(id));

        let all = db.list_incidents("p1", IncidentFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, IncidentStatus::Resolved);
        assert_eq!(all[0].resolved_reason.as_deref(), Some("recovered"));
        assert_eq!(db.recent_heartbeats(monitor.id, 10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_down_transition_with_open_incident_does_not_duplicate() {
        let (_dir, db) = temp_database().await.unwrap();
        let now = Utc::now();
        let (monitor, _) = db.insert_monitor(&new_monitor("p1", "https://a.test"), now).await.unwrap();
        let down = transition(MonitorStatus::Up, MonitorStatus::Down);

        let first = check(&db, &monitor, down, Some("a"), now).await;
        let second = check(&db, &monitor, down, Some("b"), now).await;

        let ReconcileAction::Opened(id) = first else { panic!("expected open") };
        assert_eq!(second, ReconcileAction::Refreshed(id));
        assert_eq!(db.list_incidents("p1", IncidentFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_open_folds_into_existing_incident() {
        let (_dir, db) = temp_database().await.unwrap();
        let now = Utc::now();
        let (monitor, _) = db.insert_monitor(&new_monitor("p1", "https://a.test"), now).await.unwrap();
        let reconciler = IncidentReconciler::new(db.clone());
        let down = transition(MonitorStatus::Up, MonitorStatus::Down);

        // Both writers plan before either commits, so both see no open incident.
        let first = reconciler.plan(&monitor, &down, Some("a"), now).await.unwrap();
        let second = reconciler.plan(&monitor, &down, Some("b"), now).await.unwrap();
        assert!(matches!(first, IncidentChange::Open(_)));
        assert!(matches!(second, IncidentChange::Open(_)));

        let ReconcileAction::Opened(id) = commit(&db, &monitor, &down, first, Some("a"), now).await else {
            panic!("expected open")
        };
        assert_eq!(commit(&db, &monitor, &down, second, Some("b"), now).await, ReconcileAction::Refreshed(id));

        let incidents = db.list_incidents("p1", IncidentFilter::default()).await.unwrap();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].last_error.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_noop_cases() {
        let (_dir, db) = temp_database().await.unwrap();
        let now = Utc::now();
        let (monitor, _) = db.insert_monitor(&new_monitor("p1", "https://a.test"), now).await.unwrap();
        let reconciler = IncidentReconciler::new(db.clone());

        let cases = [
            // a tolerated blip
            (transition(MonitorStatus::Up, MonitorStatus::Up), Some("blip")),
            // recovery with nothing open
            (transition(MonitorStatus::Down, MonitorStatus::Up), None),
            // still down but no incident to refresh
            (transition(MonitorStatus::Down, MonitorStatus::Down), Some("refused")),
        ];
        for (transition, error) in cases {
            let change = reconciler.plan(&monitor, &transition, error, now).await.unwrap();
            assert_eq!(change, IncidentChange::None, "{transition:?}");
            assert_eq!(commit(&db, &monitor, &transition, change, error, now).await, ReconcileAction::Noop);
        }

        assert!(db.list_incidents("p1", IncidentFilter::default()).await.unwrap().is_empty());
    }
}
