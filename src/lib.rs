//! High-throughput cost recalculation engine for yarn variant
//! catalogs.
//!
//! The core is a four-stage streaming pipeline: a paging reader
//! streams active variant ids into a bounded work queue, a fixed pool
//! of evaluator tasks computes one cost summary per variant from a
//! per-job routing-step cache and a shared parameter bag, and a
//! collector bulk-loads summaries into Postgres in batches while a
//! sampler task reports progress.

pub mod spincost;

// Re-export main API
pub use spincost::config::{DatabaseConfig, EngineConfig};
pub use spincost::domain::{BatchJob, CostSummary, JobStatus, JobType, RoutingStep, VariantRef};
pub use spincost::engine::{CancelToken, JobOutcome, RecalcPipeline, RoutingStepCache};
pub use spincost::error::{EngineError, EngineResult};
pub use spincost::formula::{Formula, FormulaError};
pub use spincost::params::ParamBag;
pub use spincost::server::RecalcJobServer;
