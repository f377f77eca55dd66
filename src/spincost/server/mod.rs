//! Job control facade toward the REST/CLI collaborators.
//!
//! [`RecalcJobServer`] owns the pipeline and the registry handle:
//! starting a recalculation creates the job record, spawns the
//! pipeline task, and returns the job id immediately. The server
//! tracks the cancel token of every job running in this process so a
//! cancellation request reaches the right pipeline.

use crate::spincost::config::EngineConfig;
use crate::spincost::db::{
    JobStore, PgJobStore, PgPool, PgStepStore, PgSummaryStore, PgVariantStore, StepSource,
    SummarySink, VariantSource,
};
use crate::spincost::domain::{BatchJob, JobType};
use crate::spincost::engine::cancel::CancelToken;
use crate::spincost::engine::pipeline::{JobOutcome, RecalcPipeline};
use crate::spincost::error::EngineResult;
use crate::spincost::params::ParamBag;
use log::info;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

pub struct RecalcJobServer {
    pipeline: Arc<RecalcPipeline>,
    jobs: Arc<dyn JobStore>,
    /// Cancel tokens of jobs currently running in this process
    running: Arc<RwLock<HashMap<Uuid, CancelToken>>>,
}

impl RecalcJobServer {
    pub fn new(pipeline: Arc<RecalcPipeline>, jobs: Arc<dyn JobStore>) -> Self {
        Self {
            pipeline,
            jobs,
            running: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Build the full Postgres-backed stack from configuration.
    pub async fn connect(config: &EngineConfig) -> EngineResult<Self> {
        let pool = PgPool::connect(config.database.pool_config()).await?;

        let variants: Arc<dyn VariantSource> = Arc::new(PgVariantStore::new(pool.clone()));
        let steps: Arc<dyn StepSource> = Arc::new(PgStepStore::new(pool.clone()));
        let summaries: Arc<dyn SummarySink> = Arc::new(PgSummaryStore::new(pool.clone()));
        let jobs: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool));

        let pipeline = Arc::new(RecalcPipeline::new(
            variants,
            steps,
            summaries,
            jobs.clone(),
            config.worker_count,
            config.batch_size,
        ));

        Ok(Self::new(pipeline, jobs))
    }

    /// Create a recalculation job over `base_params` and run it
    /// asynchronously. Returns the job id immediately; progress is
    /// observable through [`RecalcJobServer::get_job`].
    pub async fn start_recalculate_all(
        &self,
        base_params: serde_json::Value,
    ) -> EngineResult<Uuid> {
        // validate the bag before the job record exists
        let params = ParamBag::from_json(&base_params)?;

        let job = BatchJob::new(JobType::RecalculateAll, base_params);
        let job_id = job.id;
        self.jobs.create(&job).await?;

        let cancel = CancelToken::new();
        self.running.write().await.insert(job_id, cancel.clone());

        let pipeline = self.pipeline.clone();
        let running = self.running.clone();
        tokio::spawn(async move {
            // run() marks the terminal status and logs the outcome
            let _ = pipeline.run(job_id, params, cancel).await;
            running.write().await.remove(&job_id);
        });

        info!("job {job_id}: recalculation accepted");
        Ok(job_id)
    }

    /// Run an already-created pending job to completion, taking its
    /// parameter bag from the job metadata. Used by the worker binary.
    pub async fn run_pending_job(&self, job: &BatchJob) -> EngineResult<JobOutcome> {
        let params = ParamBag::from_json(&job.metadata)?;

        let cancel = CancelToken::new();
        self.running.write().await.insert(job.id, cancel.clone());
        let outcome = self.pipeline.run(job.id, params, cancel).await;
        self.running.write().await.remove(&job.id);

        outcome
    }

    pub async fn get_job(&self, job_id: Uuid) -> EngineResult<BatchJob> {
        self.jobs.get(job_id).await
    }

    pub async fn list_recent_jobs(&self, limit: i64) -> EngineResult<Vec<BatchJob>> {
        self.jobs.list_recent(limit).await
    }

    /// Request cancellation of a job.
    ///
    /// A job running in this process gets its token tripped and winds
    /// down cooperatively; a job that has not started yet is marked
    /// cancelled directly in the registry.
    pub async fn cancel_job(&self, job_id: Uuid) -> EngineResult<()> {
        if let Some(cancel) = self.running.read().await.get(&job_id) {
            info!("job {job_id}: cancellation requested");
            cancel.cancel();
            return Ok(());
        }
        self.jobs.cancel(job_id).await
    }

    /// Ids of jobs currently running in this process.
    pub async fn running_jobs(&self) -> Vec<Uuid> {
        self.running.read().await.keys().copied().collect()
    }
}
