use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;

/// Start reason recorded when an outage opens an incident.
pub const REASON_DOWN: &str = "down";

/// Resolve reason recorded when a monitor comes back up.
pub const REASON_RECOVERED: &str = "recovered";

/// Declared status of a monitor, and the per-probe status of a heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Up,
    Down,
}

impl MonitorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorStatus::Up => "up",
            MonitorStatus::Down => "down",
        }
    }
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MonitorStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(MonitorStatus::Up),
            "down" => Ok(MonitorStatus::Down),
            other => Err(anyhow!("unknown monitor status: {other}")),
        }
    }
}

/// Lifecycle of an incident
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Open,
    Resolved,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Open => "open",
            IncidentStatus::Resolved => "resolved",
        }
    }

    /// Parse a caller-supplied filter value. `active` is accepted as an alias of `open`.
    pub fn from_filter(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "open" | "active" => Some(IncidentStatus::Open),
            "resolved" => Some(IncidentStatus::Resolved),
            _ => None,
        }
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(IncidentStatus::Open),
            "resolved" => Ok(IncidentStatus::Resolved),
            other => Err(anyhow!("unknown incident status: {other}")),
        }
    }
}

/// Severity shown to alerting consumers, derived from an incident's start reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
}

impl Severity {
    pub fn from_start_reason(reason: &str) -> Self {
        if reason == REASON_DOWN { Severity::Critical } else { Severity::Warning }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
        }
    }

    pub fn from_filter(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "critical" => Some(Severity::Critical),
            "warning" => Some(Severity::Warning),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single probe. Never persisted as-is; projected into a heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    /// Whether the target answered with a status in [200, 400)
    pub success: bool,

    /// HTTP status code, absent on transport failure
    pub status_code: Option<u16>,

    /// Wall-clock time from call start, failures included
    pub latency_ms: u64,

    /// Failure detail
    pub error: Option<String>,
}

impl ProbeOutcome {
    pub fn success(status_code: u16, latency_ms: u64) -> Self {
        Self { success: true, status_code: Some(status_code), latency_ms, error: None }
    }

    /// The target answered, but with a status outside [200, 400)
    pub fn rejected(status_code: u16, latency_ms: u64) -> Self {
        Self {
            success: false,
            status_code: Some(status_code),
            latency_ms,
            error: Some(format!("HTTP status {status_code}")),
        }
    }

    /// The request never produced a response
    pub fn transport_failure(error: impl Into<String>, latency_ms: u64) -> Self {
        Self { success: false, status_code: None, latency_ms, error: Some(error.into()) }
    }

    /// Per-probe status written to the heartbeat log
    pub fn status(&self) -> MonitorStatus {
        if self.success { MonitorStatus::Up } else { MonitorStatus::Down }
    }
}
