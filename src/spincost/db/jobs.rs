//! Postgres-backed job registry.
//!
//! Progress counters move only through additive `SET x = x + $n`
//! statements so concurrent flushes cannot lose updates, and every
//! status transition carries a guard against leaving a terminal
//! status.

use crate::spincost::db::pool::PgPool;
use crate::spincost::db::JobStore;
use crate::spincost::domain::{BatchJob, JobStatus, JobType};
use crate::spincost::error::{EngineError, EngineResult};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio_postgres::Row;
use uuid::Uuid;

const JOB_COLUMNS: &str = "id, job_type, status, total_records, processed_records, \
    failed_records, metadata, error_message, started_at, finished_at, created_at";

/// Guard clause shared by every status-changing statement.
const NOT_TERMINAL: &str = "status NOT IN ('COMPLETED', 'FAILED', 'CANCELLED')";

pub struct PgJobStore {
    pool: Arc<PgPool>,
}

impl PgJobStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    fn decode(row: &Row) -> EngineResult<BatchJob> {
        let job_type_raw: String = row.get(1);
        let status_raw: String = row.get(2);

        let job_type = JobType::parse(&job_type_raw)
            .ok_or_else(|| EngineError::Decode(format!("unknown job type '{job_type_raw}'")))?;
        let status = JobStatus::parse(&status_raw)
            .ok_or_else(|| EngineError::Decode(format!("unknown job status '{status_raw}'")))?;

        Ok(BatchJob {
            id: row.get(0),
            job_type,
            status,
            total_records: row.get(3),
            processed_records: row.get(4),
            failed_records: row.get(5),
            metadata: row.get(6),
            error_message: row.get(7),
            started_at: row.get(8),
            finished_at: row.get(9),
            created_at: row.get(10),
        })
    }

    /// Distinguish "no such job" from "job already terminal" after a
    /// guarded update matched zero rows.
    async fn explain_rejected_update(
        &self,
        id: Uuid,
        requested: JobStatus,
    ) -> EngineError {
        match self.get(id).await {
            Ok(job) => EngineError::TerminalStatus {
                job_id: id,
                status: job.status,
                requested,
            },
            Err(err) => err,
        }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, job: &BatchJob) -> EngineResult<()> {
        let conn = self.pool.acquire(None).await?;
        conn.client()
            .execute(
                &format!(
                    "INSERT INTO batch_jobs ({JOB_COLUMNS}) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
                ),
                &[
                    &job.id,
                    &job.job_type.as_str(),
                    &job.status.as_str(),
                    &job.total_records,
                    &job.processed_records,
                    &job.failed_records,
                    &job.metadata,
                    &job.error_message,
                    &job.started_at,
                    &job.finished_at,
                    &job.created_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> EngineResult<BatchJob> {
        let conn = self.pool.acquire(None).await?;
        let row = conn
            .client()
            .query_opt(
                &format!("SELECT {JOB_COLUMNS} FROM batch_jobs WHERE id = $1"),
                &[&id],
            )
            .await?
            .ok_or(EngineError::JobNotFound { job_id: id })?;
        Self::decode(&row)
    }

    async fn mark_running(&self, id: Uuid, total_records: i64) -> EngineResult<()> {
        let conn = self.pool.acquire(None).await?;
        let updated = conn
            .client()
            .execute(
                &format!(
                    "UPDATE batch_jobs SET status = 'RUNNING', total_records = $2, \
                     started_at = $3 WHERE id = $1 AND {NOT_TERMINAL}"
                ),
                &[&id, &total_records, &Utc::now()],
            )
            .await?;
        if updated == 0 {
            return Err(self.explain_rejected_update(id, JobStatus::Running).await);
        }
        Ok(())
    }

    async fn add_progress(&self, id: Uuid, processed: i64, failed: i64) -> EngineResult<()> {
        let conn = self.pool.acquire(None).await?;
        conn.client()
            .execute(
                "UPDATE batch_jobs SET \
                 processed_records = processed_records + $2, \
                 failed_records = failed_records + $3 \
                 WHERE id = $1",
                &[&id, &processed, &failed],
            )
            .await?;
        Ok(())
    }

    async fn complete(&self, id: Uuid) -> EngineResult<()> {
        let conn = self.pool.acquire(None).await?;
        let updated = conn
            .client()
            .execute(
                &format!(
                    "UPDATE batch_jobs SET status = 'COMPLETED', finished_at = $2 \
                     WHERE id = $1 AND {NOT_TERMINAL}"
                ),
                &[&id, &Utc::now()],
            )
            .await?;
        if updated == 0 {
            return Err(self.explain_rejected_update(id, JobStatus::Completed).await);
        }
        Ok(())
    }

    async fn fail(&self, id: Uuid, error_message: &str) -> EngineResult<()> {
        let conn = self.pool.acquire(None).await?;
        let updated = conn
            .client()
            .execute(
                &format!(
                    "UPDATE batch_jobs SET status = 'FAILED', error_message = $2, \
                     finished_at = $3 WHERE id = $1 AND {NOT_TERMINAL}"
                ),
                &[&id, &error_message, &Utc::now()],
            )
            .await?;
        if updated == 0 {
            return Err(self.explain_rejected_update(id, JobStatus::Failed).await);
        }
        Ok(())
    }

    async fn cancel(&self, id: Uuid) -> EngineResult<()> {
        let conn = self.pool.acquire(None).await?;
        let updated = conn
            .client()
            .execute(
                &format!(
                    "UPDATE batch_jobs SET status = 'CANCELLED', finished_at = $2 \
                     WHERE id = $1 AND {NOT_TERMINAL}"
                ),
                &[&id, &Utc::now()],
            )
            .await?;
        if updated == 0 {
            return Err(self.explain_rejected_update(id, JobStatus::Cancelled).await);
        }
        Ok(())
    }

    async fn list_recent(&self, limit: i64) -> EngineResult<Vec<BatchJob>> {
        let conn = self.pool.acquire(None).await?;
        let rows = conn
            .client()
            .query(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM batch_jobs \
                     ORDER BY created_at DESC LIMIT $1"
                ),
                &[&limit],
            )
            .await?;
        rows.iter().map(Self::decode).collect()
    }
}
