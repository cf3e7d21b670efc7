use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::monitoring::incidents::IncidentChange;
use crate::monitoring::status::StatusState;
use crate::monitoring::types::{IncidentStatus, MonitorStatus, ProbeOutcome, Severity};

/// Convert a timestamp to the stored representation (unix milliseconds)
pub fn timestamp_to_i64(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

/// Convert a stored unix-millisecond value back to a timestamp
pub fn i64_to_timestamp(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

/// Monitor model - an HTTP target checked on an interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Monitor {
    pub id: Uuid,
    pub project_id: String,
    pub name: Option<String>,
    pub url: String,
    pub interval_seconds: u32,
    pub timeout_ms: u32,
    pub status: MonitorStatus,
    pub consecutive_failures: u32,
    pub last_checked_at: Option<DateTime<Utc>>,
    /// `None` means due immediately
    pub next_check_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Monitor {
    pub fn state(&self) -> StatusState {
        StatusState::new(self.status, self.consecutive_failures)
    }

    /// Active, not tombstoned, and its next check has elapsed or was never set
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.deleted_at.is_none()
            && self.next_check_at.is_none_or(|next| next <= now)
    }
}

/// Fields supplied by the registration flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMonitor {
    pub project_id: String,
    pub name: Option<String>,
    pub url: String,
    pub interval_seconds: u32,
    pub timeout_ms: u32,
}

/// Engine-owned fields written after each check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckUpdate {
    pub state: StatusState,
    pub checked_at: DateTime<Utc>,
    pub next_check_at: DateTime<Utc>,
}

/// Everything a single check writes, committed together
#[derive(Debug, Clone, PartialEq)]
pub struct CheckCommit {
    pub monitor_id: Uuid,
    pub incident: IncidentChange,
    pub heartbeat: Heartbeat,
    pub update: CheckUpdate,
}

/// Heartbeat model - one immutable row per probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub id: Uuid,
    pub project_id: String,
    pub monitor_id: Uuid,
    pub status: MonitorStatus,
    pub status_code: Option<u16>,
    pub latency_ms: Option<u64>,
    pub error_message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl Heartbeat {
    /// Project a probe outcome into a heartbeat row
    pub fn from_outcome(monitor: &Monitor, outcome: &ProbeOutcome, checked_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id: monitor.project_id.clone(),
            monitor_id: monitor.id,
            status: outcome.status(),
            status_code: outcome.status_code,
            latency_ms: Some(outcome.latency_ms),
            error_message: outcome.error.clone(),
            checked_at,
        }
    }
}

/// Aggregate over a monitor's heartbeats since a cut-off
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatStats {
    pub total: u64,
    pub up: u64,
    pub avg_latency_ms: Option<f64>,
}

impl HeartbeatStats {
    /// Uptime percentage; a monitor with no history counts as fully up.
    pub fn uptime_percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.up as f64 / self.total as f64 * 100.0
        }
    }
}

/// Incident model - one continuous downtime window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: Uuid,
    pub project_id: String,
    pub monitor_id: Uuid,
    pub status: IncidentStatus,
    pub started_at: DateTime<Utc>,
    pub started_reason: String,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_reason: Option<String>,
    pub last_error: Option<String>,
}

impl Incident {
    pub fn open(
        monitor: &Monitor,
        reason: &str,
        last_error: Option<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id: monitor.project_id.clone(),
            monitor_id: monitor.id,
            status: IncidentStatus::Open,
            started_at,
            started_reason: reason.to_string(),
            resolved_at: None,
            resolved_reason: None,
            last_error,
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::from_start_reason(&self.started_reason)
    }
}

/// Filter for the incident read surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IncidentFilter {
    pub status: Option<IncidentStatus>,
    pub severity: Option<Severity>,
}

/// A user's subscription to a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub user_id: String,
    pub project_id: String,
    /// `None` means the paid plan never expires
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn monitor(now: DateTime<Utc>) -> Monitor {
        Monitor {
            id: Uuid::new_v4(),
            project_id: "proj".to_string(),
            name: None,
            url: "https://example.com".to_string(),
            interval_seconds: 60,
            timeout_ms: 5000,
            status: MonitorStatus::Up,
            consecutive_failures: 0,
            last_checked_at: None,
            next_check_at: None,
            is_active: true,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_timestamp_conversion_keeps_millis() {
        let now = i64_to_timestamp(1_700_000_000_123);
        assert_eq!(timestamp_to_i64(now), 1_700_000_000_123);
    }

    #[test]
    fn test_is_due() {
        let now = Utc::now();
        let mut m = monitor(now);
        assert!(m.is_due(now));

        m.next_check_at = Some(now + Duration::seconds(30));
        assert!(!m.is_due(now));
        m.next_check_at = Some(now);
        assert!(m.is_due(now));

        m.is_active = false;
        assert!(!m.is_due(now));
        m.is_active = true;
        m.deleted_at = Some(now);
        assert!(!m.is_due(now));
    }

    #[test]
    fn test_uptime_percent() {
        let empty = HeartbeatStats { total: 0, up: 0, avg_latency_ms: None };
        assert_eq!(empty.uptime_percent(), 100.0);

        let half = HeartbeatStats { total: 4, up: 2, avg_latency_ms: Some(12.5) };
        assert_eq!(half.uptime_percent(), 50.0);
    }

    #[test]
    fn test_incident_severity() {
        let now = Utc::now();
        let m = monitor(now);
        assert_eq!(Incident::open(&m, "down", None, now).severity(), Severity::Critical);
        assert_eq!(Incident::open(&m, "slow", None, now).severity(), Severity::Warning);
    }

    #[test]
    fn test_heartbeat_from_outcome() {
        let now = Utc::now();
        let m = monitor(now);
        let hb = Heartbeat::from_outcome(&m, &ProbeOutcome::transport_failure("dns", 7), now);
        assert_eq!(hb.status, MonitorStatus::Down);
        assert_eq!(hb.latency_ms, Some(7));
        assert_eq!(hb.status_code, None);
        assert_eq!(hb.error_message.as_deref(), Some("dns"));
        assert_eq!(hb.monitor_id, m.id);
    }
}
