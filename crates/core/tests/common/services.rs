//! Instrumented collaborators and an engine harness.

#![allow(dead_code)]

use async_trait::async_trait;
use pl_core::documents::InMemoryDocumentStore;
use pl_core::engine::PipelineEngine;
use pl_core::executor::StepExecutor;
use pl_core::generation::{MockGenerationService, MockResponse};
use pl_core::persistence::{InMemoryRunStore, RunStore, StepUpdate, StoreError};
use pl_protocol::config_models::EngineSettings;
use pl_protocol::document_models::ContextDocument;
use pl_protocol::run_models::{PipelineRun, RunStatus, RunStep, StepStatus};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// One observed write to the run store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    CreateRun,
    RunStatus(RunStatus),
    CreateStep(usize),
    StepStatus(usize, StepStatus),
}

/// Run store that records every successful write in order.
pub struct RecordingRunStore {
    inner: InMemoryRunStore,
    calls: Mutex<Vec<StoreCall>>,
    step_indexes: Mutex<Vec<(Uuid, usize)>>,
    /// Fail `create_run_step` for this step index.
    fail_create_step: Option<usize>,
}

impl RecordingRunStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryRunStore::new(),
            calls: Mutex::new(Vec::new()),
            step_indexes: Mutex::new(Vec::new()),
            fail_create_step: None,
        }
    }

    pub fn failing_at_step(index: usize) -> Self {
        Self {
            fail_create_step: Some(index),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn index_of(&self, step_id: Uuid) -> usize {
        self.step_indexes
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| *id == step_id)
            .map(|(_, index)| *index)
            .unwrap_or(usize::MAX)
    }
}

#[async_trait]
impl RunStore for RecordingRunStore {
    async fn create_run(
        &self,
        pipeline_id: &str,
        project_id: &str,
    ) -> Result<PipelineRun, StoreError> {
        let run = self.inner.create_run(pipeline_id, project_id).await?;
        self.record(StoreCall::CreateRun);
        Ok(run)
    }

    async fn update_run_status(
        &self,
        run_id: Uuid,
        status: RunStatus,
    ) -> Result<PipelineRun, StoreError> {
        let run = self.inner.update_run_status(run_id, status).await?;
        self.record(StoreCall::RunStatus(status));
        Ok(run)
    }

    async fn create_run_step(
        &self,
        run_id: Uuid,
        step_index: usize,
        framework_id: &str,
        label: &str,
    ) -> Result<RunStep, StoreError> {
        if self.fail_create_step == Some(step_index) {
            return Err(StoreError::Io {
                path: "runs".into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            });
        }
        let step = self
            .inner
            .create_run_step(run_id, step_index, framework_id, label)
            .await?;
        self.step_indexes.lock().unwrap().push((step.id, step_index));
        self.record(StoreCall::CreateStep(step_index));
        Ok(step)
    }

    async fn update_run_step(
        &self,
        step_id: Uuid,
        update: StepUpdate,
    ) -> Result<RunStep, StoreError> {
        let status = update.status;
        let step = self.inner.update_run_step(step_id, update).await?;
        self.record(StoreCall::StepStatus(self.index_of(step_id), status));
        Ok(step)
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Option<PipelineRun>, StoreError> {
        self.inner.get_run(run_id).await
    }

    async fn list_run_steps(&self, run_id: Uuid) -> Result<Vec<RunStep>, StoreError> {
        self.inner.list_run_steps(run_id).await
    }
}

/// An engine wired to a scripted generation service and a recording store.
pub struct Harness {
    pub engine: PipelineEngine,
    pub store: Arc<RecordingRunStore>,
    pub generation: MockGenerationService,
}

pub fn create_harness(script: Vec<MockResponse>) -> Harness {
    create_harness_with(script, Vec::new(), RecordingRunStore::new())
}

pub fn create_harness_with(
    script: Vec<MockResponse>,
    documents: Vec<ContextDocument>,
    store: RecordingRunStore,
) -> Harness {
    let generation = MockGenerationService::new(script);
    let store = Arc::new(store);
    let executor = StepExecutor::new(
        Arc::new(generation.clone()),
        Arc::new(InMemoryDocumentStore::new(documents)),
        &EngineSettings::default(),
    );

    Harness {
        engine: PipelineEngine::new(executor, store.clone()),
        store,
        generation,
    }
}
