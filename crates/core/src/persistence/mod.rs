//! Durable records of runs and their steps.
//!
//! The engine is the only writer while a run is in progress. Stores
//! enforce the forward-only status rules and strictly increasing step
//! indexes, so an invalid write is reported instead of silently applied.

pub mod file;
pub mod memory;

pub use file::FileRunStore;
pub use memory::InMemoryRunStore;

use async_trait::async_trait;
use chrono::Utc;
use pl_protocol::generation_models::TokenUsage;
use pl_protocol::run_models::{PipelineRun, RunStatus, RunStep, StepStatus};
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Run {0} not found")]
    RunNotFound(Uuid),

    #[error("Run step {0} not found")]
    StepNotFound(Uuid),

    #[error("Invalid status transition {from:?} -> {to:?} for run {run_id}")]
    InvalidRunTransition {
        run_id: Uuid,
        from: RunStatus,
        to: RunStatus,
    },

    #[error("Invalid status transition {from:?} -> {to:?} for run step {step_id}")]
    InvalidStepTransition {
        step_id: Uuid,
        from: StepStatus,
        to: StepStatus,
    },

    #[error("Run {run_id} expected step index {expected}, got {actual}")]
    OutOfOrderStep {
        run_id: Uuid,
        expected: usize,
        actual: usize,
    },

    #[error("Failed to access run record at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to encode run record at {path}: {source}")]
    Serde {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// A status change for one run step, with the fields that accompany it.
#[derive(Debug, Clone, PartialEq)]
pub struct StepUpdate {
    pub status: StepStatus,
    pub output: Option<String>,
    pub error: Option<String>,
    pub usage: Option<TokenUsage>,
}

impl StepUpdate {
    pub fn running() -> Self {
        Self {
            status: StepStatus::Running,
            output: None,
            error: None,
            usage: None,
        }
    }

    pub fn completed(output: String, usage: Option<TokenUsage>) -> Self {
        Self {
            status: StepStatus::Completed,
            output: Some(output),
            error: None,
            usage,
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            status: StepStatus::Failed,
            output: None,
            error: Some(error),
            usage: None,
        }
    }
}

/// Run/step persistence used by the engine.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Create a run in `Pending` status.
    async fn create_run(&self, pipeline_id: &str, project_id: &str)
        -> Result<PipelineRun, StoreError>;

    async fn update_run_status(&self, run_id: Uuid, status: RunStatus)
        -> Result<PipelineRun, StoreError>;

    /// Create the next step record of a run in `Pending` status.
    ///
    /// `step_index` must equal the number of steps already recorded.
    async fn create_run_step(
        &self,
        run_id: Uuid,
        step_index: usize,
        framework_id: &str,
        label: &str,
    ) -> Result<RunStep, StoreError>;

    async fn update_run_step(&self, step_id: Uuid, update: StepUpdate)
        -> Result<RunStep, StoreError>;

    async fn get_run(&self, run_id: Uuid) -> Result<Option<PipelineRun>, StoreError>;

    /// Steps of a run ordered by `step_index`.
    async fn list_run_steps(&self, run_id: Uuid) -> Result<Vec<RunStep>, StoreError>;
}

pub(crate) fn new_run(pipeline_id: &str, project_id: &str) -> PipelineRun {
    PipelineRun {
        id: Uuid::new_v4(),
        pipeline_id: pipeline_id.to_string(),
        project_id: project_id.to_string(),
        status: RunStatus::Pending,
        created_at: Utc::now(),
        finished_at: None,
    }
}

pub(crate) fn new_step(
    run_id: Uuid,
    existing_steps: usize,
    step_index: usize,
    framework_id: &str,
    label: &str,
) -> Result<RunStep, StoreError> {
    if step_index != existing_steps {
        return Err(StoreError::OutOfOrderStep {
            run_id,
            expected: existing_steps,
            actual: step_index,
        });
    }

    Ok(RunStep {
        id: Uuid::new_v4(),
        run_id,
        step_index,
        framework_id: framework_id.to_string(),
        label: label.to_string(),
        status: StepStatus::Pending,
        output: String::new(),
        error: None,
        usage: None,
        started_at: None,
        finished_at: None,
    })
}

pub(crate) fn apply_run_status(run: &mut PipelineRun, status: RunStatus) -> Result<(), StoreError> {
    if !run.status.can_transition_to(status) {
        return Err(StoreError::InvalidRunTransition {
            run_id: run.id,
            from: run.status,
            to: status,
        });
    }

    run.status = status;
    if status.is_terminal() {
        run.finished_at = Some(Utc::now());
    }
    Ok(())
}

pub(crate) fn apply_step_update(step: &mut RunStep, update: StepUpdate) -> Result<(), StoreError> {
    if !step.status.can_transition_to(update.status) {
        return Err(StoreError::InvalidStepTransition {
            step_id: step.id,
            from: step.status,
            to: update.status,
        });
    }

    step.status = update.status;
    match update.status {
        StepStatus::Running => step.started_at = Some(Utc::now()),
        StepStatus::Completed | StepStatus::Failed => step.finished_at = Some(Utc::now()),
        StepStatus::Pending => {}
    }
    if let Some(output) = update.output {
        step.output = output;
    }
    if update.error.is_some() {
        step.error = update.error;
    }
    if update.usage.is_some() {
        step.usage = update.usage;
    }
    Ok(())
}
