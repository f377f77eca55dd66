//! The four-stage recalculation pipeline.
//!
//! ```text
//! [Paging Reader] → [Work Queue] → [N Evaluators] → [Result Queue] → [Batch Writer]
//! ```
//!
//! One reader task pages active variants in ascending id order into a
//! bounded work queue; `worker_count` evaluator tasks turn variants
//! into summaries against the shared routing cache; one collector task
//! buffers summaries and bulk-loads them in `batch_size` flushes. Both
//! queues hold `2 × batch_size` items, so a slow database backs
//! pressure all the way to the reader and no work is dropped.
//!
//! Ordering: the reader emits ascending ids, but nothing downstream of
//! the work queue preserves that order. Upsert semantics make row
//! order within a flush irrelevant.
//!
//! Lifecycle: the reader closes the work queue when the catalog is
//! exhausted; evaluators exit when the queue is drained and closed;
//! the result queue closes when the last evaluator drops its sender;
//! the job is complete when the collector exits. Every task runs under
//! a `JoinHandle`, so a panic is caught at the join and fails the job
//! with the panic message.

use crate::spincost::db::{JobStore, StepSource, SummarySink, VariantSource};
use crate::spincost::domain::{CostSummary, JobStatus, VariantRef};
use crate::spincost::engine::calculator::VariantCalculator;
use crate::spincost::engine::cancel::CancelToken;
use crate::spincost::engine::progress::{JobCounters, REPORT_INTERVAL, spawn_reporter};
use crate::spincost::engine::routing_cache::RoutingStepCache;
use crate::spincost::error::{EngineError, EngineResult};
use crate::spincost::params::ParamBag;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinError;
use uuid::Uuid;

/// Attempts per flush before a buffer is dropped and attributed to the
/// failed counter.
const MAX_FLUSH_ATTEMPTS: u32 = 3;
const FLUSH_RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Final accounting for one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub status: JobStatus,
    pub total: i64,
    pub processed: i64,
    pub failed: i64,
    pub elapsed: Duration,
}

/// The recalculation pipeline over pluggable stores.
pub struct RecalcPipeline {
    variants: Arc<dyn VariantSource>,
    steps: Arc<dyn StepSource>,
    summaries: Arc<dyn SummarySink>,
    jobs: Arc<dyn JobStore>,
    worker_count: usize,
    batch_size: usize,
}

impl RecalcPipeline {
    pub fn new(
        variants: Arc<dyn VariantSource>,
        steps: Arc<dyn StepSource>,
        summaries: Arc<dyn SummarySink>,
        jobs: Arc<dyn JobStore>,
        worker_count: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            variants,
            steps,
            summaries,
            jobs,
            worker_count: worker_count.max(1),
            batch_size: batch_size.max(1),
        }
    }

    /// Run one recalculation job to completion.
    ///
    /// On success the job is marked `Completed` (or `Cancelled` when
    /// the token tripped); any pipeline error marks it `Failed` with
    /// the error message. Reruns are safe: the summary store is
    /// upsert-keyed on `variant_id`.
    pub async fn run(
        &self,
        job_id: Uuid,
        params: ParamBag,
        cancel: CancelToken,
    ) -> EngineResult<JobOutcome> {
        let started = Instant::now();

        match self.run_stages(job_id, params, &cancel).await {
            Ok((total, processed, failed)) => {
                let status = if cancel.is_cancelled() {
                    self.jobs.cancel(job_id).await?;
                    JobStatus::Cancelled
                } else {
                    self.jobs.complete(job_id).await?;
                    JobStatus::Completed
                };

                let elapsed = started.elapsed();
                let throughput = if elapsed.as_secs_f64() > 0.0 {
                    processed as f64 / elapsed.as_secs_f64()
                } else {
                    0.0
                };
                info!(
                    "job {job_id}: {status} in {:.1}s: processed={processed} failed={failed} \
                     throughput={throughput:.0}/s",
                    elapsed.as_secs_f64()
                );

                Ok(JobOutcome {
                    status,
                    total,
                    processed,
                    failed,
                    elapsed,
                })
            }
            Err(err) => {
                error!("job {job_id}: failed: {err}");
                if let Err(mark_err) = self.jobs.fail(job_id, &err.to_string()).await {
                    error!("job {job_id}: could not record failure: {mark_err}");
                }
                Err(err)
            }
        }
    }

    async fn run_stages(
        &self,
        job_id: Uuid,
        params: ParamBag,
        cancel: &CancelToken,
    ) -> EngineResult<(i64, i64, i64)> {
        let total = self.variants.count_active().await?;
        self.jobs.mark_running(job_id, total).await?;

        let cache = Arc::new(
            RoutingStepCache::load(self.variants.as_ref(), self.steps.as_ref()).await?,
        );
        let calculator = Arc::new(VariantCalculator::new(Arc::new(params)));

        info!(
            "job {job_id}: starting recalculation: {total} variants, {} workers, \
             batch size {}, {} routings cached",
            self.worker_count,
            self.batch_size,
            cache.len()
        );

        let counters = Arc::new(JobCounters::new());
        let queue_capacity = self.batch_size * 2;
        let (work_tx, work_rx) = mpsc::channel::<VariantRef>(queue_capacity);
        let (result_tx, result_rx) = mpsc::channel::<CostSummary>(queue_capacity);
        // tokio mpsc receivers are single-consumer; the evaluators
        // share this one behind a lock held only per recv
        let work_rx = Arc::new(Mutex::new(work_rx));

        let reporter_stop = CancelToken::new();
        let reporter = spawn_reporter(
            job_id,
            total,
            counters.clone(),
            reporter_stop.clone(),
            REPORT_INTERVAL,
        );

        let reader = tokio::spawn(read_pages(
            job_id,
            self.variants.clone(),
            work_tx,
            self.batch_size as i64,
            cancel.clone(),
        ));

        let mut evaluators = Vec::with_capacity(self.worker_count);
        for worker_id in 0..self.worker_count {
            evaluators.push(tokio::spawn(evaluate(
                worker_id,
                work_rx.clone(),
                result_tx.clone(),
                cache.clone(),
                calculator.clone(),
                counters.clone(),
            )));
        }
        // the evaluators hold the only senders now; the result queue
        // closes when the last of them exits
        drop(result_tx);

        let collector = tokio::spawn(collect(
            job_id,
            result_rx,
            self.summaries.clone(),
            self.jobs.clone(),
            counters.clone(),
            self.batch_size,
        ));

        let joined: EngineResult<()> = async {
            let reader_result = reader.await.map_err(|err| panic_error("reader", err))?;
            for evaluator in evaluators {
                evaluator
                    .await
                    .map_err(|err| panic_error("evaluator", err))?;
            }
            collector
                .await
                .map_err(|err| panic_error("collector", err))?;
            reader_result
        }
        .await;

        reporter_stop.cancel();
        let _ = reporter.await;

        joined?;

        // evaluator-side failures (missing routings) are only tracked
        // in process; push the remainder into the registry now
        let unsynced_failed = counters.failed() - counters.synced_failed();
        if unsynced_failed > 0 {
            self.jobs.add_progress(job_id, 0, unsynced_failed).await?;
        }

        Ok((total, counters.processed(), counters.failed()))
    }
}

fn panic_error(task: &'static str, err: JoinError) -> EngineError {
    EngineError::TaskPanic {
        task,
        message: err.to_string(),
    }
}

/// Reader task: keyset-paged scan of active variants in ascending id
/// order. Dropping the sender on every exit path closes the work
/// queue.
async fn read_pages(
    job_id: Uuid,
    variants: Arc<dyn VariantSource>,
    work_tx: mpsc::Sender<VariantRef>,
    page_size: i64,
    cancel: CancelToken,
) -> EngineResult<()> {
    let mut last_id: Option<Uuid> = None;

    'pages: loop {
        if cancel.is_cancelled() {
            info!("job {job_id}: reader stopping on cancellation");
            break;
        }

        let page = match variants.page_active(last_id, page_size).await {
            Ok(page) => page,
            Err(err) => {
                error!("job {job_id}: reader failed to page variants: {err}");
                return Err(err);
            }
        };
        if page.is_empty() {
            break;
        }
        last_id = page.last().map(|variant| variant.id);

        for variant in page {
            tokio::select! {
                _ = cancel.cancelled() => break 'pages,
                sent = work_tx.send(variant) => {
                    if sent.is_err() {
                        // every evaluator exited; nothing left to feed
                        break 'pages;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Evaluator task: one variant in, one summary out. A variant whose
/// routing is missing from the cache is counted failed and produces no
/// summary; the two outcomes are exclusive.
async fn evaluate(
    worker_id: usize,
    work_rx: Arc<Mutex<mpsc::Receiver<VariantRef>>>,
    result_tx: mpsc::Sender<CostSummary>,
    cache: Arc<RoutingStepCache>,
    calculator: Arc<VariantCalculator>,
    counters: Arc<JobCounters>,
) {
    loop {
        let item = {
            let mut rx = work_rx.lock().await;
            rx.recv().await
        };
        let Some(variant) = item else { break };

        match cache.get(&variant.routing_id) {
            Some(steps) => {
                let summary = calculator.calculate(variant.id, steps);
                if result_tx.send(summary).await.is_err() {
                    break;
                }
            }
            None => {
                debug!(
                    "evaluator {worker_id}: variant {} references routing {} missing from cache",
                    variant.id, variant.routing_id
                );
                counters.add_failed(1);
            }
        }
    }
}

/// Collector task: buffer summaries, flush every `batch_size`, and
/// flush the remainder when the result queue closes (including after
/// cancellation, best-effort).
async fn collect(
    job_id: Uuid,
    mut result_rx: mpsc::Receiver<CostSummary>,
    summaries: Arc<dyn SummarySink>,
    jobs: Arc<dyn JobStore>,
    counters: Arc<JobCounters>,
    batch_size: usize,
) {
    let mut buffer: Vec<CostSummary> = Vec::with_capacity(batch_size);

    while let Some(summary) = result_rx.recv().await {
        buffer.push(summary);
        if buffer.len() >= batch_size {
            flush(job_id, &mut buffer, summaries.as_ref(), jobs.as_ref(), &counters).await;
        }
    }

    if !buffer.is_empty() {
        flush(job_id, &mut buffer, summaries.as_ref(), jobs.as_ref(), &counters).await;
    }
}

/// One flush: bounded retry, then attribute the buffer to the failed
/// counter so the variants stay visible in exactly one counter.
async fn flush(
    job_id: Uuid,
    buffer: &mut Vec<CostSummary>,
    summaries: &dyn SummarySink,
    jobs: &dyn JobStore,
    counters: &JobCounters,
) {
    let count = buffer.len() as i64;

    for attempt in 1..=MAX_FLUSH_ATTEMPTS {
        match summaries.upsert_batch(buffer).await {
            Ok(_) => {
                counters.add_processed(count);
                if let Err(err) = jobs.add_progress(job_id, count, 0).await {
                    warn!("job {job_id}: could not persist progress delta: {err}");
                }
                buffer.clear();
                return;
            }
            Err(err) => {
                warn!(
                    "job {job_id}: flush of {count} summaries failed \
                     (attempt {attempt}/{MAX_FLUSH_ATTEMPTS}): {err}"
                );
                if attempt < MAX_FLUSH_ATTEMPTS {
                    tokio::time::sleep(FLUSH_RETRY_BACKOFF).await;
                }
            }
        }
    }

    error!(
        "job {job_id}: dropping batch of {count} summaries after \
         {MAX_FLUSH_ATTEMPTS} failed attempts; rerun the job to recover them"
    );
    counters.add_failed(count);
    counters.add_synced_failed(count);
    if let Err(err) = jobs.add_progress(job_id, 0, count).await {
        warn!("job {job_id}: could not persist failure delta: {err}");
    }
    buffer.clear();
}
