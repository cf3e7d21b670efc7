/// Ingress gate for programmatic callers
///
/// Validates (project, API key) pairs against stored credentials and
/// subscriptions, and applies a per-project fixed-window rate limit.
pub mod credentials;
pub mod rate_limit;

pub use credentials::{hash_api_key, issue_api_key};
pub use rate_limit::{CounterStore, FixedWindowLimiter, InMemoryCounterStore, RateDecision};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::database::Database;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("missing project id or api key")]
    MissingCredentials,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("project access denied")]
    Forbidden,
    #[error("rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Paid,
}

impl Plan {
    /// Paid while the subscription has no expiry or expires after `now`
    pub fn for_expiry(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        match expires_at {
            Some(expires_at) if expires_at <= now => Plan::Free,
            _ => Plan::Paid,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Paid => "paid",
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self, Plan::Free)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An admitted caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub user_id: String,
    pub project_id: String,
    pub plan: Plan,
}

pub struct IngressGate {
    database: Arc<dyn Database>,
    limiter: FixedWindowLimiter,
}

impl IngressGate {
    pub fn new(database: Arc<dyn Database>, limiter: FixedWindowLimiter) -> Self {
        Self { database, limiter }
    }

    /// Gate one request: presence check, then rate limit, then credentials.
    ///
    /// Rejected requests still count against the project's window.
    pub async fn admit(
        &self,
        project_id: Option<&str>,
        api_key: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Admission, GateError> {
        let (project_id, api_key) = present(project_id, api_key)?;

        let decision = self.limiter.check(project_id, now);
        if !decision.allowed {
            warn!(project_id, count = decision.count, limit = decision.limit, "Rate limit exceeded");
            return Err(GateError::RateLimited { retry_after_secs: decision.retry_after_secs });
        }

        self.authorize(project_id, api_key, now).await
    }

    /// Credential check without consuming rate-limit budget
    pub async fn verify(
        &self,
        project_id: Option<&str>,
        api_key: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Admission, GateError> {
        let (project_id, api_key) = present(project_id, api_key)?;
        self.authorize(project_id, api_key, now).await
    }

    async fn authorize(&self, project_id: &str, api_key: &str, now: DateTime<Utc>) -> Result<Admission, GateError> {
        let Some(user_id) = self.database.api_key_owner(&hash_api_key(api_key)).await? else {
            debug!(project_id, "Unknown api key");
            return Err(GateError::InvalidCredentials);
        };

        let subscription = self
            .database
            .subscription(&user_id, project_id)
            .await?
            .filter(|s| s.is_active)
            .ok_or_else(|| {
                debug!(project_id, user_id = %user_id, "No active subscription");
                GateError::Forbidden
            })?;

        Ok(Admission {
            user_id,
            project_id: project_id.to_string(),
            plan: Plan::for_expiry(subscription.expires_at, now),
        })
    }
}

fn present<'a>(project_id: Option<&'a str>, api_key: Option<&'a str>) -> Result<(&'a str, &'a str), GateError> {
    let project_id = project_id.map(str::trim).filter(|v| !v.is_empty());
    let api_key = api_key.map(str::trim).filter(|v| !v.is_empty());
    match (project_id, api_key) {
        (Some(project_id), Some(api_key)) => Ok((project_id, api_key)),
        _ => Err(GateError::MissingCredentials),
    }
}
