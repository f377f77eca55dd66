//! In-memory store doubles for driving the pipeline end-to-end
//! without a database.

// each integration test binary compiles this module and uses a subset
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use spincost::spincost::db::{JobStore, StepSource, SummarySink, VariantSource};
use spincost::spincost::domain::{BatchJob, CostSummary, JobStatus, RoutingStep, VariantRef};
use spincost::spincost::error::{EngineError, EngineResult};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// Deterministic, ordered variant id so keyset paging is exercised.
pub fn variant_id(n: u64) -> Uuid {
    Uuid::from_u128(n as u128 + 1)
}

/// In-memory variant catalog plus routing steps.
pub struct MemCatalog {
    variants: Vec<VariantRef>,
    steps: HashMap<Uuid, Vec<RoutingStep>>,
}

impl MemCatalog {
    pub fn new(mut variants: Vec<VariantRef>, steps: HashMap<Uuid, Vec<RoutingStep>>) -> Self {
        variants.sort_by_key(|v| v.id);
        Self { variants, steps }
    }

    /// `count` variants all referencing one routing with the given
    /// formulas.
    pub fn single_routing(count: u64, routing_id: Uuid, formulas: &[&str]) -> Self {
        let variants = (0..count)
            .map(|n| VariantRef {
                id: variant_id(n),
                routing_id,
            })
            .collect();
        let steps = formulas
            .iter()
            .enumerate()
            .map(|(i, formula)| RoutingStep {
                routing_id,
                sequence_order: i as i32 + 1,
                formula_expression: formula.to_string(),
            })
            .collect();
        Self::new(variants, HashMap::from([(routing_id, steps)]))
    }
}

#[async_trait]
impl VariantSource for MemCatalog {
    async fn count_active(&self) -> EngineResult<i64> {
        Ok(self.variants.len() as i64)
    }

    async fn distinct_routing_ids(&self) -> EngineResult<Vec<Uuid>> {
        let mut ids: Vec<Uuid> = self.variants.iter().map(|v| v.routing_id).collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn page_active(&self, after: Option<Uuid>, limit: i64) -> EngineResult<Vec<VariantRef>> {
        let page = self
            .variants
            .iter()
            .filter(|v| after.map_or(true, |a| v.id > a))
            .take(limit as usize)
            .copied()
            .collect();
        Ok(page)
    }
}

#[async_trait]
impl StepSource for MemCatalog {
    async fn steps_for_routing(&self, routing_id: Uuid) -> EngineResult<Vec<RoutingStep>> {
        Ok(self.steps.get(&routing_id).cloned().unwrap_or_default())
    }
}

/// In-memory summary sink with optional failure injection and write
/// latency.
#[derive(Default)]
pub struct MemSummarySink {
    rows: Mutex<BTreeMap<Uuid, CostSummary>>,
    /// Every flush up to this count returns an error.
    pub fail_flushes: AtomicU64,
    flushes: AtomicU64,
    /// Simulated latency per flush.
    pub flush_delay: Option<Duration>,
}

impl MemSummarySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flush_delay(delay: Duration) -> Self {
        Self {
            flush_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn failing_first(n: u64) -> Self {
        let sink = Self::default();
        sink.fail_flushes.store(n, Ordering::SeqCst);
        sink
    }

    pub fn rows(&self) -> BTreeMap<Uuid, CostSummary> {
        self.rows.lock().unwrap().clone()
    }

    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SummarySink for MemSummarySink {
    async fn upsert_batch(&self, summaries: &[CostSummary]) -> EngineResult<u64> {
        if let Some(delay) = self.flush_delay {
            tokio::time::sleep(delay).await;
        }
        let attempt = self.flushes.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_flushes.load(Ordering::SeqCst) {
            return Err(EngineError::Pool("injected flush failure".to_string()));
        }

        let mut rows = self.rows.lock().unwrap();
        for summary in summaries {
            rows.insert(summary.variant_id, summary.clone());
        }
        Ok(summaries.len() as u64)
    }
}

/// In-memory job registry with additive counters and sticky terminal
/// statuses.
#[derive(Default)]
pub struct MemJobStore {
    jobs: Mutex<HashMap<Uuid, BatchJob>>,
}

impl MemJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<F>(&self, id: Uuid, requested: JobStatus, apply: F) -> EngineResult<()>
    where
        F: FnOnce(&mut BatchJob),
    {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&id)
            .ok_or(EngineError::JobNotFound { job_id: id })?;
        if job.status.is_terminal() {
            return Err(EngineError::TerminalStatus {
                job_id: id,
                status: job.status,
                requested,
            });
        }
        apply(job);
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemJobStore {
    async fn create(&self, job: &BatchJob) -> EngineResult<()> {
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> EngineResult<BatchJob> {
        self.jobs
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(EngineError::JobNotFound { job_id: id })
    }

    async fn mark_running(&self, id: Uuid, total_records: i64) -> EngineResult<()> {
        self.update(id, JobStatus::Running, |job| {
            job.status = JobStatus::Running;
            job.total_records = total_records;
            job.started_at = Some(Utc::now());
        })
    }

    async fn add_progress(&self, id: Uuid, processed: i64, failed: i64) -> EngineResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(&id) {
            job.processed_records += processed;
            job.failed_records += failed;
        }
        Ok(())
    }

    async fn complete(&self, id: Uuid) -> EngineResult<()> {
        self.update(id, JobStatus::Completed, |job| {
            job.status = JobStatus::Completed;
            job.finished_at = Some(Utc::now());
        })
    }

    async fn fail(&self, id: Uuid, error_message: &str) -> EngineResult<()> {
        let message = error_message.to_string();
        self.update(id, JobStatus::Failed, move |job| {
            job.status = JobStatus::Failed;
            job.error_message = Some(message);
            job.finished_at = Some(Utc::now());
        })
    }

    async fn cancel(&self, id: Uuid) -> EngineResult<()> {
        self.update(id, JobStatus::Cancelled, |job| {
            job.status = JobStatus::Cancelled;
            job.finished_at = Some(Utc::now());
        })
    }

    async fn list_recent(&self, limit: i64) -> EngineResult<Vec<BatchJob>> {
        let jobs = self.jobs.lock().unwrap();
        let mut all: Vec<BatchJob> = jobs.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit as usize);
        Ok(all)
    }
}
