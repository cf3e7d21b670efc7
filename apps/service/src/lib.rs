//! Watchup monitoring engine.
//!
//! Holds the monitor store, the probe/state/incident pipeline driven by the
//! scheduler, and the ingress gate used by the HTTP surface.

pub mod config;
pub mod database;
pub mod gate;
pub mod monitoring;
pub mod pool;
pub mod registry;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;

use anyhow::Result;
use std::sync::Arc;

use crate::database::{Database, DatabaseImpl, open_database};
use crate::monitoring::{CheckPipeline, HttpProber, MonitoringScheduler, StatusMachine};

/// Open the configured database, migrations included
pub async fn open_store(config: &config::Config) -> Result<Arc<DatabaseImpl>> {
    let database = open_database(&config.database.path, config.database.pool_size).await?;
    Ok(Arc::new(database))
}

/// Wire a scheduler with the HTTP prober against `database`
pub fn build_scheduler(config: &config::Config, database: Arc<dyn Database>) -> Result<MonitoringScheduler> {
    let pipeline = CheckPipeline::new(
        database.clone(),
        Arc::new(HttpProber::new()?),
        StatusMachine::new(config.engine.failure_threshold),
    );
    Ok(MonitoringScheduler::new(database, pipeline, config.engine.scheduler_settings()))
}
