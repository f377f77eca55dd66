//! Persistence layer: connection pool, store traits, and their
//! Postgres implementations.
//!
//! The engine only sees the traits, so pipeline behavior can be
//! exercised end-to-end with in-memory doubles. The Postgres
//! implementations own the SQL and the bulk-copy path.

pub mod jobs;
pub mod pool;
pub mod steps;
pub mod summaries;
pub mod variants;

pub use jobs::PgJobStore;
pub use pool::{PgPool, PgPoolConfig, PooledConn};
pub use steps::PgStepStore;
pub use summaries::PgSummaryStore;
pub use variants::PgVariantStore;

use crate::spincost::domain::{BatchJob, CostSummary, RoutingStep, VariantRef};
use crate::spincost::error::EngineResult;
use async_trait::async_trait;
use uuid::Uuid;

/// Read access to the variant catalog.
#[async_trait]
pub trait VariantSource: Send + Sync {
    /// Number of active variants a full recalculation will visit.
    async fn count_active(&self) -> EngineResult<i64>;

    /// Distinct routing ids referenced by any active variant.
    async fn distinct_routing_ids(&self) -> EngineResult<Vec<Uuid>>;

    /// One page of active `(variant_id, routing_id)` pairs in
    /// ascending id order, strictly after `after` when given. Pages
    /// are half-open and non-overlapping; an empty page means the
    /// catalog is exhausted.
    async fn page_active(&self, after: Option<Uuid>, limit: i64) -> EngineResult<Vec<VariantRef>>;
}

/// Read access to routing step lists.
#[async_trait]
pub trait StepSource: Send + Sync {
    /// Ordered steps for one routing (ascending `sequence_order`).
    async fn steps_for_routing(&self, routing_id: Uuid) -> EngineResult<Vec<RoutingStep>>;
}

/// Write access to the summary store.
#[async_trait]
pub trait SummarySink: Send + Sync {
    /// Atomically upsert a batch of summaries keyed on `variant_id`,
    /// overwriting every column. Returns the number of rows loaded.
    async fn upsert_batch(&self, summaries: &[CostSummary]) -> EngineResult<u64>;
}

/// The job registry.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: &BatchJob) -> EngineResult<()>;

    async fn get(&self, id: Uuid) -> EngineResult<BatchJob>;

    /// Move a pending job to `Running`, recording its total and start
    /// time. Refused for terminal jobs.
    async fn mark_running(&self, id: Uuid, total_records: i64) -> EngineResult<()>;

    /// Additively bump the progress counters. Deltas, not absolutes,
    /// so concurrent flushes never lose progress.
    async fn add_progress(&self, id: Uuid, processed: i64, failed: i64) -> EngineResult<()>;

    /// Terminal transitions; each is sticky once applied.
    async fn complete(&self, id: Uuid) -> EngineResult<()>;
    async fn fail(&self, id: Uuid, error_message: &str) -> EngineResult<()>;
    async fn cancel(&self, id: Uuid) -> EngineResult<()>;

    async fn list_recent(&self, limit: i64) -> EngineResult<Vec<BatchJob>>;
}
