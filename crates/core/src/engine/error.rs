//! Error types for pipeline execution.
//!
//! Step failures are not errors: they are reported through the run's
//! status. These errors cover the cases where the engine itself cannot
//! do its job.

use crate::persistence::StoreError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum EngineError {
    /// The run store rejected or failed a write.
    #[error("Run store failure: {0}")]
    Store(#[from] StoreError),

    #[error("Pipeline not found: {0}")]
    PipelineNotFound(String),

    /// Only one run may be active at a time.
    #[error("Run {0} is already active")]
    RunAlreadyActive(Uuid),

    #[error("Run {0} is not active")]
    RunNotActive(Uuid),

    /// The background task driving a run panicked or was aborted.
    #[error("Run task failed: {0}")]
    Join(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
