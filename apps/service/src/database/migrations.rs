use anyhow::Result;
use chrono::Utc;
use libsql::Connection;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 2;

/// Run database migrations
///
/// Both binaries call this on startup; every statement is idempotent.
pub async fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        tracing::debug!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    tracing::info!("Running migrations from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Monitors, heartbeats and incidents").await?;
    }

    if current_version < 2 {
        run_migration_v2(conn).await?;
        record_migration(conn, 2, "API keys and subscriptions").await?;
    }

    tracing::info!("Database migrations completed (now at version {})", SCHEMA_VERSION);
    Ok(())
}

async fn get_current_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i32> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

async fn record_migration(conn: &Connection, version: i32, description: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, Utc::now().timestamp(), description.to_string()],
    )
    .await?;

    tracing::info!("Applied migration v{}: {}", version, description);
    Ok(())
}

/// Migration v1: engine tables
async fn run_migration_v1(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS monitors (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            name TEXT,
            url TEXT NOT NULL,
            interval_seconds INTEGER NOT NULL DEFAULT 60,
            timeout_ms INTEGER NOT NULL DEFAULT 5000,
            status TEXT NOT NULL DEFAULT 'up',
            consecutive_failures INTEGER NOT NULL DEFAULT 0,
            last_checked_at INTEGER,
            next_check_at INTEGER,
            is_active INTEGER NOT NULL DEFAULT 1,
            deleted_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    // Heartbeats are append-only; nothing updates or deletes them.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS heartbeats (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            monitor_id TEXT NOT NULL,
            status TEXT NOT NULL,
            status_code INTEGER,
            latency_ms INTEGER,
            error_message TEXT,
            checked_at INTEGER NOT NULL,
            FOREIGN KEY (monitor_id) REFERENCES monitors(id)
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS incidents (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            monitor_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'open',
            started_at INTEGER NOT NULL,
            started_reason TEXT NOT NULL,
            resolved_at INTEGER,
            resolved_reason TEXT,
            last_error TEXT,
            FOREIGN KEY (monitor_id) REFERENCES monitors(id)
        )",
        (),
    )
    .await?;

    // One active monitor per (project, url); tombstoned rows don't count.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_monitors_project_url_active
            ON monitors(project_id, url) WHERE deleted_at IS NULL",
        (),
    )
    .await?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_monitors_due
            ON monitors(is_active, deleted_at, next_check_at, created_at)",
        (),
    )
    .await?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_monitors_project ON monitors(project_id, created_at DESC)",
        (),
    )
    .await?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_heartbeats_monitor_checked
            ON heartbeats(monitor_id, checked_at DESC)",
        (),
    )
    .await?;

    // At most one open incident per monitor.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_incidents_one_open
            ON incidents(monitor_id) WHERE status = 'open'",
        (),
    )
    .await?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_incidents_project_started
            ON incidents(project_id, started_at DESC)",
        (),
    )
    .await?;

    Ok(())
}

/// Migration v2: credentials consulted by the ingress gate
async fn run_migration_v2(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS api_keys (
            user_id TEXT PRIMARY KEY,
            key_hash TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subscriptions (
            user_id TEXT NOT NULL,
            project_id TEXT NOT NULL,
            expires_at INTEGER,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (user_id, project_id)
        )",
        (),
    )
    .await?;

    tracing::info!("Created credential tables");
    Ok(())
}
