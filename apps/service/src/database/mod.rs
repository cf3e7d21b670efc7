/// Database abstraction layer
///
/// Monitors, heartbeats, incidents and the credentials consulted by the
/// ingress gate, stored in a local libsql database.
pub mod migrations;
pub mod models;
pub mod repository;


pub use repository::{Database, DatabaseImpl};

use anyhow::Result;
use std::path::Path;

use crate::pool::connect_local;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}

/// Open the database file, run migrations and return a ready store
pub async fn open_database(path: impl AsRef<Path>, pool_size: usize) -> Result<DatabaseImpl> {
    let pool = connect_local(path, pool_size).await?;

    {
        let conn = pool.get().await.map_err(|e| anyhow::anyhow!("database pool unavailable: {e}"))?;
        initialize_database(&conn).await?;
    }

    Ok(DatabaseImpl::new_from_pool(pool))
}
