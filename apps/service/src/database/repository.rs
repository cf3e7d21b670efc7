use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Row, params};
use tracing::warn;
use uuid::Uuid;

use super::models::{
    CheckCommit, CheckUpdate, Heartbeat, HeartbeatStats, Incident, IncidentFilter, Monitor, NewMonitor,
    Subscription, i64_to_timestamp, timestamp_to_i64,
};
use crate::monitoring::incidents::{IncidentChange, ReconcileAction};
use crate::monitoring::types::{IncidentStatus, MonitorStatus};
use crate::pool::{LibsqlManager, LibsqlPool};

const MONITOR_COLUMNS: &str = "id, project_id, name, url, interval_seconds, timeout_ms, status, \
     consecutive_failures, last_checked_at, next_check_at, is_active, deleted_at, created_at, \
     updated_at";

const HEARTBEAT_COLUMNS: &str =
    "id, project_id, monitor_id, status, status_code, latency_ms, error_message, checked_at";

const INCIDENT_COLUMNS: &str = "id, project_id, monitor_id, status, started_at, started_reason, \
     resolved_at, resolved_reason, last_error";

/// Database trait for abstracting database operations
///
/// Monitor rows are shared with the registration API: it owns creation and
/// deletion, while the engine only writes the status and schedule fields
/// through [`Database::record_check`]. Heartbeats and incidents belong to the
/// engine alone.
#[async_trait]
pub trait Database: Send + Sync {
    /// Insert a monitor unless an active one already exists for the same
    /// (project, url). Returns the active row and whether it was just created.
    async fn insert_monitor(&self, monitor: &NewMonitor, now: DateTime<Utc>) -> Result<(Monitor, bool)>;

    /// Get a monitor by id, tombstoned or not
    async fn get_monitor(&self, id: Uuid) -> Result<Option<Monitor>>;

    /// Non-deleted monitors of a project, newest first
    async fn list_monitors(&self, project_id: &str) -> Result<Vec<Monitor>>;

    /// Tombstone a monitor. Returns false if it was missing or already deleted.
    async fn soft_delete_monitor(&self, id: Uuid, project_id: &str, now: DateTime<Utc>) -> Result<bool>;

    /// Up to `limit` active monitors due at `now`, never-checked first, then
    /// by next check time, then by creation time
    async fn select_due_monitors(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Monitor>>;

    /// Persist the engine-owned fields after a check
    async fn record_check(&self, id: Uuid, update: &CheckUpdate) -> Result<()>;

    /// Append a heartbeat
    async fn insert_heartbeat(&self, heartbeat: &Heartbeat) -> Result<()>;

    /// Apply everything one check produced in a single transaction: the
    /// incident change, the heartbeat and the new schedule. On error nothing
    /// is written and the monitor stays due.
    async fn commit_check(&self, commit: &CheckCommit) -> Result<ReconcileAction>;

    /// Most recent heartbeats of a monitor, newest first
    async fn recent_heartbeats(&self, monitor_id: Uuid, limit: usize) -> Result<Vec<Heartbeat>>;

    /// Aggregate of a monitor's heartbeats at or after `since`
    async fn heartbeat_stats(&self, monitor_id: Uuid, since: DateTime<Utc>) -> Result<HeartbeatStats>;

    /// The open incident of a monitor, if any
    async fn open_incident(&self, monitor_id: Uuid) -> Result<Option<Incident>>;

    /// Insert an open incident. Returns false, inserting nothing, when the
    /// monitor already has one open.
    async fn insert_incident(&self, incident: &Incident) -> Result<bool>;

    /// Mark an open incident resolved. Returns false if it was not open.
    async fn resolve_incident(&self, id: Uuid, reason: &str, at: DateTime<Utc>) -> Result<bool>;

    /// Refresh the last error of an open incident
    async fn update_incident_error(&self, id: Uuid, error: &str) -> Result<bool>;

    /// Incidents of a project, newest first
    async fn list_incidents(&self, project_id: &str, filter: IncidentFilter) -> Result<Vec<Incident>>;

    /// Owner of an API key, looked up by the key's hash
    async fn api_key_owner(&self, key_hash: &str) -> Result<Option<String>>;

    /// Create or replace a user's API key hash
    async fn store_api_key(&self, user_id: &str, key_hash: &str, now: DateTime<Utc>) -> Result<()>;

    /// Subscription of a user to a project
    async fn subscription(&self, user_id: &str, project_id: &str) -> Result<Option<Subscription>>;

    /// Create or replace a subscription
    async fn upsert_subscription(&self, subscription: &Subscription, now: DateTime<Utc>) -> Result<()>;
}

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        self.pool.get().await.map_err(|e| anyhow!("database pool unavailable: {e}"))
    }

    #[cfg(test)]
    pub(crate) async fn raw_connection(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        self.get_conn().await
    }
}

async fn find_active_by_url(conn: &Connection, project_id: &str, url: &str) -> Result<Option<Monitor>> {
    let mut rows = conn
        .query(
            &format!(
                "SELECT {MONITOR_COLUMNS} FROM monitors WHERE project_id = ? AND url = ? AND deleted_at IS NULL LIMIT 1"
            ),
            params![project_id.to_string(), url.to_string()],
        )
        .await?;

    match rows.next().await? {
        Some(row) => Ok(Some(monitor_from_row(&row)?)),
        None => Ok(None),
    }
}

fn monitor_from_row(row: &Row) -> Result<Monitor> {
    let id: String = row.get(0)?;
    let status: String = row.get(6)?;

    Ok(Monitor {
        id: Uuid::parse_str(&id)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        url: row.get(3)?,
        interval_seconds: row.get::<i64>(4)? as u32,
        timeout_ms: row.get::<i64>(5)? as u32,
        status: status.parse::<MonitorStatus>()?,
        consecutive_failures: row.get::<i64>(7)? as u32,
        last_checked_at: row.get::<Option<i64>>(8)?.map(i64_to_timestamp),
        next_check_at: row.get::<Option<i64>>(9)?.map(i64_to_timestamp),
        is_active: row.get::<i64>(10)? != 0,
        deleted_at: row.get::<Option<i64>>(11)?.map(i64_to_timestamp),
        created_at: i64_to_timestamp(row.get(12)?),
        updated_at: i64_to_timestamp(row.get(13)?),
    })
}

fn heartbeat_from_row(row: &Row) -> Result<Heartbeat> {
    let id: String = row.get(0)?;
    let monitor_id: String = row.get(2)?;
    let status: String = row.get(3)?;

    Ok(Heartbeat {
        id: Uuid::parse_str(&id)?,
        project_id: row.get(1)?,
        monitor_id: Uuid::parse_str(&monitor_id)?,
        status: status.parse::<MonitorStatus>()?,
        status_code: row.get::<Option<i64>>(4)?.map(|v| v as u16),
        latency_ms: row.get::<Option<i64>>(5)?.map(|v| v as u64),
        error_message: row.get(6)?,
        checked_at: i64_to_timestamp(row.get(7)?),
    })
}

fn incident_from_row(row: &Row) -> Result<Incident> {
    let id: String = row.get(0)?;
    let monitor_id: String = row.get(2)?;
    let status: String = row.get(3)?;

    Ok(Incident {
        id: Uuid::parse_str(&id)?,
        project_id: row.get(1)?,
        monitor_id: Uuid::parse_str(&monitor_id)?,
        status: status.parse::<IncidentStatus>()?,
        started_at: i64_to_timestamp(row.get(4)?),
        started_reason: row.get(5)?,
        resolved_at: row.get::<Option<i64>>(6)?.map(i64_to_timestamp),
        resolved_reason: row.get(7)?,
        last_error: row.get(8)?,
    })
}

async fn write_check(conn: &Connection, id: Uuid, update: &CheckUpdate) -> Result<()> {
    let checked_at = timestamp_to_i64(update.checked_at);

    conn.execute(
        "UPDATE monitors SET status = ?, consecutive_failures = ?, last_checked_at = ?, next_check_at = ?, updated_at = ? WHERE id = ?",
        params![
            update.state.status.as_str().to_string(),
            update.state.consecutive_failures as i64,
            checked_at,
            timestamp_to_i64(update.next_check_at),
            checked_at,
            id.to_string()
        ],
    )
    .await?;
    Ok(())
}

async fn write_heartbeat(conn: &Connection, heartbeat: &Heartbeat) -> Result<()> {
    conn.execute(
        "INSERT INTO heartbeats (id, project_id, monitor_id, status, status_code, latency_ms, error_message, checked_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            heartbeat.id.to_string(),
            heartbeat.project_id.clone(),
            heartbeat.monitor_id.to_string(),
            heartbeat.status.as_str().to_string(),
            heartbeat.status_code.map(|v| v as i64),
            heartbeat.latency_ms.map(|v| v as i64),
            heartbeat.error_message.clone(),
            timestamp_to_i64(heartbeat.checked_at)
        ],
    )
    .await?;
    Ok(())
}

async fn find_open_incident(conn: &Connection, monitor_id: Uuid) -> Result<Option<Incident>> {
    let mut rows = conn
        .query(
            &format!("SELECT {INCIDENT_COLUMNS} FROM incidents WHERE monitor_id = ? AND status = ? LIMIT 1"),
            params![monitor_id.to_string(), IncidentStatus::Open.as_str().to_string()],
        )
        .await?;

    match rows.next().await? {
        Some(row) => Ok(Some(incident_from_row(&row)?)),
        None => Ok(None),
    }
}

async fn write_incident(conn: &Connection, incident: &Incident) -> Result<bool> {
    let inserted = conn
        .execute(
            "INSERT INTO incidents (id, project_id, monitor_id, status, started_at, started_reason, resolved_at, resolved_reason, last_error)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT DO NOTHING",
            params![
                incident.id.to_string(),
                incident.project_id.clone(),
                incident.monitor_id.to_string(),
                incident.status.as_str().to_string(),
                timestamp_to_i64(incident.started_at),
                incident.started_reason.clone(),
                incident.resolved_at.map(timestamp_to_i64),
                incident.resolved_reason.clone(),
                incident.last_error.clone()
            ],
        )
        .await?;

    Ok(inserted == 1)
}

async fn write_resolution(conn: &Connection, id: Uuid, reason: &str, at: DateTime<Utc>) -> Result<bool> {
    let affected = conn
        .execute(
            "UPDATE incidents SET status = ?, resolved_at = ?, resolved_reason = ? WHERE id = ? AND status = ?",
            params![
                IncidentStatus::Resolved.as_str().to_string(),
                timestamp_to_i64(at),
                reason.to_string(),
                id.to_string(),
                IncidentStatus::Open.as_str().to_string()
            ],
        )
        .await?;

    Ok(affected > 0)
}

async fn write_incident_error(conn: &Connection, id: Uuid, error: &str) -> Result<bool> {
    let affected = conn
        .execute(
            "UPDATE incidents SET last_error = ? WHERE id = ? AND status = ?",
            params![error.to_string(), id.to_string(), IncidentStatus::Open.as_str().to_string()],
        )
        .await?;

    Ok(affected > 0)
}

/// Incident write, heartbeat and schedule of one check, on a connection that
/// is inside a transaction
async fn apply_check(conn: &Connection, commit: &CheckCommit) -> Result<ReconcileAction> {
    let action = match &commit.incident {
        IncidentChange::None => ReconcileAction::Noop,
        IncidentChange::Open(incident) => {
            if write_incident(conn, incident).await? {
                ReconcileAction::Opened(incident.id)
            } else {
                // Lost the race to another writer; its incident absorbs this error.
                match (find_open_incident(conn, commit.monitor_id).await?, incident.last_error.as_deref()) {
                    (Some(open), Some(error)) => {
                        write_incident_error(conn, open.id, error).await?;
                        ReconcileAction::Refreshed(open.id)
                    }
                    _ => ReconcileAction::Noop,
                }
            }
        }
        IncidentChange::Refresh { incident_id, error } => {
            if write_incident_error(conn, *incident_id, error).await? {
                ReconcileAction::Refreshed(*incident_id)
            } else {
                ReconcileAction::Noop
            }
        }
        IncidentChange::Resolve { incident_id, reason, at } => {
            if write_resolution(conn, *incident_id, reason, *at).await? {
                ReconcileAction::Resolved(*incident_id)
            } else {
                ReconcileAction::Noop
            }
        }
    };

    write_heartbeat(conn, &commit.heartbeat).await?;
    write_check(conn, commit.monitor_id, &commit.update).await?;
    Ok(action)
}

#[async_trait]
impl Database for DatabaseImpl {
    async fn insert_monitor(&self, monitor: &NewMonitor, now: DateTime<Utc>) -> Result<(Monitor, bool)> {
        let conn = self.get_conn().await?;
        let now = timestamp_to_i64(now);

        // The partial unique index on (project_id, url) settles concurrent registrations.
        let inserted = conn
            .execute(
                "INSERT INTO monitors (id, project_id, name, url, interval_seconds, timeout_ms, status, consecutive_failures, next_check_at, is_active, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, 1, ?, ?)
                 ON CONFLICT DO NOTHING",
                params![
                    Uuid::new_v4().to_string(),
                    monitor.project_id.clone(),
                    monitor.name.clone(),
                    monitor.url.clone(),
                    monitor.interval_seconds as i64,
                    monitor.timeout_ms as i64,
                    MonitorStatus::Up.as_str().to_string(),
                    now,
                    now,
                    now
                ],
            )
            .await?;

        let existing = find_active_by_url(&conn, &monitor.project_id, &monitor.url)
            .await?
            .with_context(|| format!("monitor for {} vanished after insert", monitor.url))?;

        Ok((existing, inserted == 1))
    }

    async fn get_monitor(&self, id: Uuid) -> Result<Option<Monitor>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = ?"),
                params![id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(monitor_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_monitors(&self, project_id: &str) -> Result<Vec<Monitor>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {MONITOR_COLUMNS} FROM monitors WHERE project_id = ? AND deleted_at IS NULL ORDER BY created_at DESC, id DESC"
                ),
                params![project_id.to_string()],
            )
            .await?;

        let mut monitors = Vec::new();
        while let Some(row) = rows.next().await? {
            monitors.push(monitor_from_row(&row)?);
        }
        Ok(monitors)
    }

    async fn soft_delete_monitor(&self, id: Uuid, project_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let conn = self.get_conn().await?;
        let now = timestamp_to_i64(now);

        let affected = conn
            .execute(
                "UPDATE monitors SET deleted_at = ?, is_active = 0, updated_at = ? WHERE id = ? AND project_id = ? AND deleted_at IS NULL",
                params![now, now, id.to_string(), project_id.to_string()],
            )
            .await?;

        Ok(affected > 0)
    }

    async fn select_due_monitors(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Monitor>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {MONITOR_COLUMNS} FROM monitors
                     WHERE is_active = 1 AND deleted_at IS NULL
                       AND (next_check_at IS NULL OR next_check_at <= ?)
                     ORDER BY next_check_at IS NOT NULL, next_check_at ASC, created_at ASC, id ASC
                     LIMIT ?"
                ),
                params![timestamp_to_i64(now), limit as i64],
            )
            .await?;

        let mut monitors = Vec::new();
        while let Some(row) = rows.next().await? {
            monitors.push(monitor_from_row(&row)?);
        }
        Ok(monitors)
    }

    async fn record_check(&self, id: Uuid, update: &CheckUpdate) -> Result<()> {
        let conn = self.get_conn().await?;
        write_check(&conn, id, update).await
    }

    async fn insert_heartbeat(&self, heartbeat: &Heartbeat) -> Result<()> {
        let conn = self.get_conn().await?;
        write_heartbeat(&conn, heartbeat).await
    }

    async fn commit_check(&self, commit: &CheckCommit) -> Result<ReconcileAction> {
        let conn = self.get_conn().await?;
        let tx = conn.transaction().await?;

        match apply_check(&tx, commit).await {
            Ok(action) => {
                tx.commit().await.context("failed to commit check")?;
                Ok(action)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(monitor_id = %commit.monitor_id, "Rollback failed: {rollback}");
                }
                Err(e)
            }
        }
    }

    async fn recent_heartbeats(&self, monitor_id: Uuid, limit: usize) -> Result<Vec<Heartbeat>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {HEARTBEAT_COLUMNS} FROM heartbeats WHERE monitor_id = ? ORDER BY checked_at DESC LIMIT ?"
                ),
                params![monitor_id.to_string(), limit as i64],
            )
            .await?;

        let mut heartbeats = Vec::new();
        while let Some(row) = rows.next().await? {
            heartbeats.push(heartbeat_from_row(&row)?);
        }
        Ok(heartbeats)
    }

    async fn heartbeat_stats(&self, monitor_id: Uuid, since: DateTime<Utc>) -> Result<HeartbeatStats> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT COUNT(*), SUM(CASE WHEN status = 'up' THEN 1 ELSE 0 END), AVG(latency_ms)
                 FROM heartbeats WHERE monitor_id = ? AND checked_at >= ?",
                params![monitor_id.to_string(), timestamp_to_i64(since)],
            )
            .await?;

        let row = rows.next().await?.context("aggregate query returned no row")?;
        Ok(HeartbeatStats {
            total: row.get::<i64>(0)? as u64,
            up: row.get::<Option<i64>>(1)?.unwrap_or(0) as u64,
            avg_latency_ms: row.get::<Option<f64>>(2)?,
        })
    }

    async fn open_incident(&self, monitor_id: Uuid) -> Result<Option<Incident>> {
        let conn = self.get_conn().await?;
        find_open_incident(&conn, monitor_id).await
    }

    async fn insert_incident(&self, incident: &Incident) -> Result<bool> {
        let conn = self.get_conn().await?;
        write_incident(&conn, incident).await
    }

    async fn resolve_incident(&self, id: Uuid, reason: &str, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.get_conn().await?;
        write_resolution(&conn, id, reason, at).await
    }

    async fn update_incident_error(&self, id: Uuid, error: &str) -> Result<bool> {
        let conn = self.get_conn().await?;
        write_incident_error(&conn, id, error).await
    }

    async fn list_incidents(&self, project_id: &str, filter: IncidentFilter) -> Result<Vec<Incident>> {
        let conn = self.get_conn().await?;
        let status = filter.status.map(|s| s.as_str().to_string());
        let severity = filter.severity.map(|s| s.as_str().to_string());

        let mut rows = conn
            .query(
                &format!(
                    "SELECT {INCIDENT_COLUMNS} FROM incidents
                     WHERE project_id = ?1
                       AND (?2 IS NULL OR status = ?2)
                       AND (?3 IS NULL
                            OR (?3 = 'critical' AND started_reason = 'down')
                            OR (?3 = 'warning' AND started_reason != 'down'))
                     ORDER BY started_at DESC"
                ),
                params![project_id.to_string(), status, severity],
            )
            .await?;

        let mut incidents = Vec::new();
        while let Some(row) = rows.next().await? {
            incidents.push(incident_from_row(&row)?);
        }
        Ok(incidents)
    }

    async fn api_key_owner(&self, key_hash: &str) -> Result<Option<String>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT user_id FROM api_keys WHERE key_hash = ? LIMIT 1",
                params![key_hash.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    async fn store_api_key(&self, user_id: &str, key_hash: &str, now: DateTime<Utc>) -> Result<()> {
        let conn = self.get_conn().await?;
        let now = timestamp_to_i64(now);

        conn.execute(
            "INSERT INTO api_keys (user_id, key_hash, created_at, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET key_hash = excluded.key_hash, updated_at = excluded.updated_at",
            params![user_id.to_string(), key_hash.to_string(), now, now],
        )
        .await?;
        Ok(())
    }

    async fn subscription(&self, user_id: &str, project_id: &str) -> Result<Option<Subscription>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT user_id, project_id, expires_at, is_active FROM subscriptions WHERE user_id = ? AND project_id = ? LIMIT 1",
                params![user_id.to_string(), project_id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Subscription {
                user_id: row.get(0)?,
                project_id: row.get(1)?,
                expires_at: row.get::<Option<i64>>(2)?.map(i64_to_timestamp),
                is_active: row.get::<i64>(3)? != 0,
            })),
            None => Ok(None),
        }
    }

    async fn upsert_subscription(&self, subscription: &Subscription, now: DateTime<Utc>) -> Result<()> {
        let conn = self.get_conn().await?;
        let now = timestamp_to_i64(now);

        conn.execute(
            "INSERT INTO subscriptions (user_id, project_id, expires_at, is_active, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id, project_id) DO UPDATE SET expires_at = excluded.expires_at, is_active = excluded.is_active, updated_at = excluded.updated_at",
            params![
                subscription.user_id.clone(),
                subscription.project_id.clone(),
                subscription.expires_at.map(timestamp_to_i64),
                if subscription.is_active { 1 } else { 0 },
                now,
                now
            ],
        )
        .await?;
        Ok(())
    }
}
