//! Domain entities shared by the engine and the persistence layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The slice of a variant the pipeline needs: its id and the routing
/// it references. Streamed by the paging reader in ascending id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantRef {
    pub id: Uuid,
    pub routing_id: Uuid,
}

/// One step of a routing as stored, before formula compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingStep {
    pub routing_id: Uuid,
    pub sequence_order: i32,
    pub formula_expression: String,
}

/// Aggregated cost record for one variant, upsert-keyed on
/// `variant_id`. The previous summary, if any, is replaced wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub variant_id: Uuid,
    pub total_material_cost: f64,
    pub total_process_cost: f64,
    pub total_overhead: f64,
    pub grand_total: f64,
    pub last_recalculated_at: DateTime<Utc>,
    pub version_hash: String,
}

/// Status of a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Wire form used in the `batch_jobs.status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(JobStatus::Pending),
            "RUNNING" => Some(JobStatus::Running),
            "COMPLETED" => Some(JobStatus::Completed),
            "FAILED" => Some(JobStatus::Failed),
            "CANCELLED" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal statuses are sticky: no transition leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type tag of a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    RecalculateAll,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::RecalculateAll => "RECALCULATE_ALL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RECALCULATE_ALL" => Some(JobType::RecalculateAll),
            _ => None,
        }
    }
}

/// A recalculation run with its lifecycle and progress counters.
///
/// `processed_records` and `failed_records` only move by additive
/// deltas so concurrent flushes never lose progress, and
/// `processed_records + failed_records <= total_records` holds at
/// every observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub total_records: i64,
    pub processed_records: i64,
    pub failed_records: i64,
    pub metadata: serde_json::Value,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl BatchJob {
    /// Create a fresh pending job.
    pub fn new(job_type: JobType, metadata: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type,
            status: JobStatus::Pending,
            total_records: 0,
            processed_records: 0,
            failed_records: 0,
            metadata,
            error_message: None,
            started_at: None,
            finished_at: None,
            created_at: Utc::now(),
        }
    }

    /// Progress percentage: `100 × processed / total`, zero when the
    /// total is zero.
    pub fn progress(&self) -> f64 {
        if self.total_records == 0 {
            return 0.0;
        }
        self.processed_records as f64 / self.total_records as f64 * 100.0
    }
}
