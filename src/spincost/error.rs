//! Engine-level error type shared by the pipeline and the
//! persistence layer.

use crate::spincost::domain::JobStatus;
use crate::spincost::params::ParamBagError;
use uuid::Uuid;

/// Errors surfaced by the recalculation engine and its stores.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Database protocol or query error
    #[error("database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// Connection pool could not hand out a connection
    #[error("connection pool error: {0}")]
    Pool(String),

    /// Row contents did not match the expected shape
    #[error("corrupt row: {0}")]
    Decode(String),

    /// Referenced job does not exist
    #[error("job {job_id} not found")]
    JobNotFound { job_id: Uuid },

    /// Attempted transition out of a terminal job status
    #[error("job {job_id} is {status} and cannot transition to {requested}")]
    TerminalStatus {
        job_id: Uuid,
        status: JobStatus,
        requested: JobStatus,
    },

    /// Parameter bag construction failed
    #[error(transparent)]
    Params(#[from] ParamBagError),

    /// A pipeline task panicked; the message is attached to the job
    #[error("pipeline task '{task}' panicked: {message}")]
    TaskPanic { task: &'static str, message: String },
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
