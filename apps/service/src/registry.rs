//! Monitor registration: create, list and soft delete.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::database::Database;
use crate::database::models::{Monitor, NewMonitor};
use crate::validation::{clamp_interval, clamp_timeout, clean_name, clean_url, validate_http_endpoint};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("url is required")]
    MissingUrl,
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Caller-supplied registration request, before cleaning and clamping
#[derive(Debug, Clone, Default)]
pub struct CreateMonitor {
    pub url: String,
    pub name: Option<String>,
    pub interval_seconds: Option<i64>,
    pub timeout_ms: Option<i64>,
}

/// Result of a create call
#[derive(Debug, Clone)]
pub struct Registered {
    pub monitor: Monitor,
    /// `false` when an active monitor for the same URL was returned unchanged
    pub created: bool,
}

pub struct MonitorRegistry {
    database: Arc<dyn Database>,
}

impl MonitorRegistry {
    pub fn new(database: Arc<dyn Database>) -> Self {
        Self { database }
    }

    /// Register a monitor, idempotent on (project, url) while the first is active
    pub async fn create_monitor(
        &self,
        project_id: &str,
        request: CreateMonitor,
        now: DateTime<Utc>,
    ) -> Result<Registered, RegistryError> {
        let url = clean_url(&request.url);
        if url.is_empty() {
            return Err(RegistryError::MissingUrl);
        }
        validate_http_endpoint(&url).map_err(RegistryError::InvalidUrl)?;

        let new_monitor = NewMonitor {
            project_id: project_id.to_string(),
            name: clean_name(request.name.as_deref()),
            url,
            interval_seconds: clamp_interval(request.interval_seconds),
            timeout_ms: clamp_timeout(request.timeout_ms),
        };

        let (monitor, created) = self.database.insert_monitor(&new_monitor, now).await?;
        if created {
            info!(monitor_id = %monitor.id, project_id, url = %monitor.url, "Monitor registered");
        }

        Ok(Registered { monitor, created })
    }

    /// Active monitors of a project, newest first
    pub async fn list_monitors(&self, project_id: &str) -> Result<Vec<Monitor>, RegistryError> {
        Ok(self.database.list_monitors(project_id).await?)
    }

    /// Tombstone a monitor. `false` when it is unknown, belongs to another
    /// project or was already deleted.
    pub async fn delete_monitor(
        &self,
        id: Uuid,
        project_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, RegistryError> {
        let deleted = self.database.soft_delete_monitor(id, project_id, now).await?;
        if deleted {
            info!(monitor_id = %id, project_id, "Monitor deleted");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_database;

    fn request(url: &str) -> CreateMonitor {
        CreateMonitor { url: url.to_string(), ..Default::default() }
    }

    #[tokio::test]
    async fn test_create_is_idempotent_per_project() {
        let (_dir, db) = temp_database().await.unwrap();
        let registry = MonitorRegistry::new(db.clone());
        let now = Utc::now();

        let first = registry.create_monitor("p1", request("https://a.test"), now).await.unwrap();
        let second = registry
            .create_monitor("p1", request(" `https://a.test` "), now)
            .await
            .unwrap();
        let other = registry.create_monitor("p2", request("https://a.test"), now).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.monitor.id, second.monitor.id);
        assert!(other.created);
        assert_ne!(first.monitor.id, other.monitor.id);
    }

    #[tokio::test]
    async fn test_create_applies_defaults_and_clamps() {
        let (_dir, db) = temp_database().await.unwrap();
        let registry = MonitorRegistry::new(db.clone());
        let now = Utc::now();

        let defaults = registry.create_monitor("p1", request("https://a.test"), now).await.unwrap();
        assert_eq!(defaults.monitor.interval_seconds, 60);
        assert_eq!(defaults.monitor.timeout_ms, 5000);
        assert!(defaults.monitor.is_due(now));

        let clamped = registry
            .create_monitor(
                "p1",
                CreateMonitor {
                    url: "https://b.test".into(),
                    name: Some("  B ".into()),
                    interval_seconds: Some(1),
                    timeout_ms: Some(999_999),
                },
                now,
            )
            .await
            .unwrap();
        assert_eq!(clamped.monitor.interval_seconds, 30);
        assert_eq!(clamped.monitor.timeout_ms, 30000);
        assert_eq!(clamped.monitor.name.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_urls() {
        let (_dir, db) = temp_database().await.unwrap();
        let registry = MonitorRegistry::new(db.clone());
        let now = Utc::now();

        assert!(matches!(
            registry.create_monitor("p1", request("  "), now).await,
            Err(RegistryError::MissingUrl)
        ));
        assert!(matches!(
            registry.create_monitor("p1", request("ftp://a.test"), now).await,
            Err(RegistryError::InvalidUrl(_))
        ));
        assert!(matches!(
            registry.create_monitor("p1", request("a.test"), now).await,
            Err(RegistryError::InvalidUrl(_))
        ));
        assert!(registry.list_monitors("p1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_then_recreate() {
        let (_dir, db) = temp_database().await.unwrap();
        let registry = MonitorRegistry::new(db.clone());
        let now = Utc::now();

        let first = registry.create_monitor("p1", request("https://a.test"), now).await.unwrap();
        assert!(!registry.delete_monitor(first.monitor.id, "p2", now).await.unwrap());
        assert!(registry.delete_monitor(first.monitor.id, "p1", now).await.unwrap());
        assert!(!registry.delete_monitor(first.monitor.id, "p1", now).await.unwrap());
        assert!(registry.list_monitors("p1").await.unwrap().is_empty());

        let again = registry.create_monitor("p1", request("https://a.test"), now).await.unwrap();
        assert!(again.created);
        assert_ne!(again.monitor.id, first.monitor.id);

        let deleted = db.get_monitor(first.monitor.id).await.unwrap().unwrap();
        assert!(deleted.deleted_at.is_some());
        assert!(!deleted.is_active);
    }
}
