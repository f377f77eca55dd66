//! In-process progress counters and the periodic reporter task.

use crate::spincost::engine::cancel::CancelToken;
use log::info;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Default sampling period for the progress reporter.
pub const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Atomic progress counters for one job.
///
/// Updated additively from many tasks; readers see a non-decreasing
/// sequence for each counter. `synced_failed` tracks the portion of
/// `failed` that has already been persisted to the job registry, so
/// the driver can push exactly the remainder at job end.
#[derive(Debug, Default)]
pub struct JobCounters {
    processed: AtomicI64,
    failed: AtomicI64,
    synced_failed: AtomicI64,
}

impl JobCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_processed(&self, count: i64) {
        self.processed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_failed(&self, count: i64) {
        self.failed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_synced_failed(&self, count: i64) {
        self.synced_failed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn processed(&self) -> i64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> i64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn synced_failed(&self) -> i64 {
        self.synced_failed.load(Ordering::Relaxed)
    }
}

/// A point-in-time sample with derived throughput and ETA.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSample {
    pub processed: i64,
    pub failed: i64,
    pub total: i64,
    pub percent: f64,
    pub rate_per_sec: f64,
    pub eta: Option<Duration>,
}

/// Sample the counters against a start instant.
pub fn sample(counters: &JobCounters, total: i64, started: Instant) -> ProgressSample {
    let processed = counters.processed();
    let failed = counters.failed();
    let elapsed = started.elapsed().as_secs_f64();

    let percent = if total > 0 {
        (processed as f64 / total as f64 * 100.0).min(100.0)
    } else {
        0.0
    };

    let rate_per_sec = if elapsed > 0.0 {
        processed as f64 / elapsed
    } else {
        0.0
    };

    let eta = if rate_per_sec > 0.0 && processed < total {
        let remaining = (total - processed) as f64;
        Some(Duration::from_secs_f64(remaining / rate_per_sec))
    } else {
        None
    };

    ProgressSample {
        processed,
        failed,
        total,
        percent,
        rate_per_sec,
        eta,
    }
}

/// Spawn the reporter task: one log line per interval until the stop
/// token trips.
pub fn spawn_reporter(
    job_id: Uuid,
    total: i64,
    counters: Arc<JobCounters>,
    stop: CancelToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let started = Instant::now();
        let mut ticker = tokio::time::interval(interval);
        // the first tick fires immediately; skip it so the first line
        // lands one full interval into the run
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    let s = sample(&counters, total, started);
                    let eta = match s.eta {
                        Some(eta) => format!("{}s", eta.as_secs()),
                        None => "-".to_string(),
                    };
                    info!(
                        "job {job_id}: {}/{} ({:.1}%) rate={:.0}/s failed={} eta={eta}",
                        s.processed, s.total, s.percent, s.rate_per_sec, s.failed
                    );
                }
            }
        }
    })
}
