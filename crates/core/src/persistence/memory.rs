//! In-process run store.

use crate::persistence::{
    apply_run_status, apply_step_update, new_run, new_step, RunStore, StepUpdate, StoreError,
};
use async_trait::async_trait;
use pl_protocol::run_models::{PipelineRun, RunStatus, RunStep};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    runs: HashMap<Uuid, PipelineRun>,
    steps: HashMap<Uuid, RunStep>,
    /// Step ids of each run, in step_index order.
    run_steps: HashMap<Uuid, Vec<Uuid>>,
}

/// Keeps runs in memory for the lifetime of the process.
#[derive(Default)]
pub struct InMemoryRunStore {
    state: Mutex<MemoryState>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn create_run(
        &self,
        pipeline_id: &str,
        project_id: &str,
    ) -> Result<PipelineRun, StoreError> {
        let run = new_run(pipeline_id, project_id);
        let mut state = self.state.lock().await;
        state.runs.insert(run.id, run.clone());
        state.run_steps.insert(run.id, Vec::new());
        Ok(run)
    }

    async fn update_run_status(
        &self,
        run_id: Uuid,
        status: RunStatus,
    ) -> Result<PipelineRun, StoreError> {
        let mut state = self.state.lock().await;
        let run = state
            .runs
            .get_mut(&run_id)
            .ok_or(StoreError::RunNotFound(run_id))?;
        apply_run_status(run, status)?;
        Ok(run.clone())
    }

    async fn create_run_step(
        &self,
        run_id: Uuid,
        step_index: usize,
        framework_id: &str,
        label: &str,
    ) -> Result<RunStep, StoreError> {
        let mut state = self.state.lock().await;
        let existing = state
            .run_steps
            .get(&run_id)
            .ok_or(StoreError::RunNotFound(run_id))?
            .len();

        let step = new_step(run_id, existing, step_index, framework_id, label)?;
        state.steps.insert(step.id, step.clone());
        state.run_steps.entry(run_id).or_default().push(step.id);
        Ok(step)
    }

    async fn update_run_step(
        &self,
        step_id: Uuid,
        update: StepUpdate,
    ) -> Result<RunStep, StoreError> {
        let mut state = self.state.lock().await;
        let step = state
            .steps
            .get_mut(&step_id)
            .ok_or(StoreError::StepNotFound(step_id))?;
        apply_step_update(step, update)?;
        Ok(step.clone())
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Option<PipelineRun>, StoreError> {
        Ok(self.state.lock().await.runs.get(&run_id).cloned())
    }

    async fn list_run_steps(&self, run_id: Uuid) -> Result<Vec<RunStep>, StoreError> {
        let state = self.state.lock().await;
        let ids = state
            .run_steps
            .get(&run_id)
            .ok_or(StoreError::RunNotFound(run_id))?;
        Ok(ids
            .iter()
            .filter_map(|id| state.steps.get(id).cloned())
            .collect())
    }
}
