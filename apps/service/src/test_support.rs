//! Fixtures shared by the unit tests of this crate.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::TempDir;

use crate::database::models::NewMonitor;
use crate::database::{DatabaseImpl, open_database};
use crate::monitoring::checker::Prober;
use crate::monitoring::clock::Clock;
use crate::monitoring::types::ProbeOutcome;

/// A database in a fresh temp directory. Keep the guard alive for the whole test.
pub async fn temp_database() -> Result<(TempDir, Arc<DatabaseImpl>)> {
    let dir = tempfile::tempdir()?;
    let database = open_database(dir.path().join("test.db"), 4).await?;
    Ok((dir, Arc::new(database)))
}

pub fn new_monitor(project_id: &str, url: &str) -> NewMonitor {
    NewMonitor {
        project_id: project_id.to_string(),
        name: None,
        url: url.to_string(),
        interval_seconds: 60,
        timeout_ms: 5000,
    }
}

/// Prober that replays queued outcomes per URL and succeeds once a queue runs dry
#[derive(Default)]
pub struct ScriptedProber {
    script: Mutex<HashMap<String, VecDeque<ProbeOutcome>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, url: &str, outcome: ProbeOutcome) {
        self.script.lock().unwrap().entry(url.to_string()).or_default().push_back(outcome);
    }

    pub fn push_failures(&self, url: &str, count: usize) {
        for i in 0..count {
            self.push(url, ProbeOutcome::transport_failure(format!("connection refused #{}", i + 1), 5));
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, url: &str, _timeout_ms: u64) -> ProbeOutcome {
        self.calls.lock().unwrap().push(url.to_string());
        if url.contains("panic.invalid") {
            panic!("prober blew up for {url}");
        }
        self.script
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| ProbeOutcome::success(200, 10))
    }
}

/// Clock that only moves when told to
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new(at: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self(Mutex::new(at)))
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.0.lock().unwrap() = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Prober that holds every call open for a while and records the most calls
/// it ever had in flight at once
pub struct SlowProber {
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl SlowProber {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for SlowProber {
    async fn probe(&self, _url: &str, _timeout_ms: u64) -> ProbeOutcome {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        ProbeOutcome::success(200, self.delay.as_millis() as u64)
    }
}
