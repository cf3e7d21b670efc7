use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::executor::{CheckPipeline, CheckReport};
use crate::database::Database;
use crate::database::models::Monitor;

/// Scheduler tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Sleep between cycles
    pub poll_interval: Duration,
    /// Maximum monitors fetched per cycle
    pub batch_size: usize,
    /// Maximum monitors probed at once within a cycle
    pub concurrency: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 25,
            concurrency: 5,
        }
    }
}

/// Counts for one scheduling cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub selected: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Monitoring scheduler - pulls due monitors and drives them through the pipeline
pub struct MonitoringScheduler {
    database: Arc<dyn Database>,
    pipeline: CheckPipeline,
    settings: SchedulerSettings,
}

impl MonitoringScheduler {
    /// Create a new monitoring scheduler
    pub fn new(database: Arc<dyn Database>, pipeline: CheckPipeline, settings: SchedulerSettings) -> Self {
        Self { database, pipeline, settings }
    }

    /// Due monitors in check order, at most one batch
    pub async fn select_due(&self, now: DateTime<Utc>) -> Result<Vec<Monitor>> {
        self.database.select_due_monitors(now, self.settings.batch_size).await
    }

    /// Run one cycle, selecting the monitors due at `now`.
    ///
    /// Each monitor runs in its own task. An error or panic is logged against
    /// that monitor and the rest of the batch carries on.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleSummary> {
        let due = self.select_due(now).await?;
        let mut summary = CycleSummary { selected: due.len(), ..Default::default() };
        if due.is_empty() {
            return Ok(summary);
        }

        let permits = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for monitor in due {
            let pipeline = self.pipeline.clone();
            let permits = permits.clone();
            let monitor_id = monitor.id;

            tasks.spawn(check_task(pipeline, monitor, permits));
            debug!(monitor_id = %monitor_id, "Check scheduled");
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(report))) => {
                    summary.succeeded += 1;
                    debug!(
                        monitor_id = %report.monitor_id,
                        status = %report.state.status,
                        latency_ms = report.outcome.latency_ms,
                        "Check complete"
                    );
                }
                Ok((monitor_id, Err(e))) => {
                    summary.failed += 1;
                    error!(monitor_id = %monitor_id, "Monitor check failed: {e:#}");
                }
                Err(e) => {
                    summary.failed += 1;
                    error!("Monitor check task aborted: {e}");
                }
            }
        }

        Ok(summary)
    }

    pub async fn run_cycle(&self) -> Result<CycleSummary> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Loop until `shutdown` resolves. A failed cycle is logged and retried after
    /// the poll interval.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            batch_size = self.settings.batch_size,
            concurrency = self.settings.concurrency,
            "Monitoring scheduler started"
        );

        loop {
            match self.run_cycle().await {
                Ok(summary) if summary.selected > 0 => {
                    info!(
                        selected = summary.selected,
                        succeeded = summary.succeeded,
                        failed = summary.failed,
                        "Cycle complete"
                    );
                }
                Ok(_) => {}
                Err(e) => error!("Scheduling cycle failed: {e:#}"),
            }

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }

        info!("Monitoring scheduler stopped");
    }
}

/// Check one monitor once a permit is free. Errors and panics come back
/// tagged with the monitor they belong to.
async fn check_task(
    pipeline: CheckPipeline,
    monitor: Monitor,
    permits: Arc<Semaphore>,
) -> (Uuid, Result<CheckReport>) {
    let monitor_id = monitor.id;
    let permit = match permits.acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => return (monitor_id, Err(anyhow!(e))),
    };

    let check = tokio::spawn(async move {
        let _permit = permit;
        pipeline.process_monitor(&monitor).await
    });
    let result = match check.await {
        Ok(result) => result,
        Err(e) => Err(anyhow!("check task aborted: {e}")),
    };
    (monitor_id, result)
}
