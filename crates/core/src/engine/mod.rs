//! Pipeline execution engine.
//!
//! The PipelineEngine executes pipeline steps strictly in sequence, feeds
//! each step's output into the next step's prompt, and records run and
//! step state transitions in the run store.

pub mod error;

pub use error::{EngineError, EngineResult};

use crate::executor::{StepContext, StepExecutor, StepOutcome};
use crate::persistence::{RunStore, StepUpdate};
use pl_protocol::ipc::Event;
use pl_protocol::pipeline_models::PipelineDefinition;
use pl_protocol::run_models::{PipelineRun, RunStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How the step loop ended.
enum RunEnd {
    Completed,
    Failed(String),
    Cancelled,
}

/// The main pipeline execution engine.
///
/// PipelineEngine owns no run state between calls: each run is an explicit
/// [`PipelineRun`] record threaded through [`PipelineEngine::execute`], and
/// the run store is the only place its progress becomes visible.
pub struct PipelineEngine {
    executor: StepExecutor,
    store: Arc<dyn RunStore>,
}

impl PipelineEngine {
    /// Create a new PipelineEngine.
    ///
    /// # Arguments
    ///
    /// * `executor` - Runs individual steps against the generation service
    /// * `store` - Durable record of runs and their steps
    pub fn new(executor: StepExecutor, store: Arc<dyn RunStore>) -> Self {
        Self { executor, store }
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    /// Create the run record for a pipeline without starting it.
    pub async fn create_run(&self, pipeline: &PipelineDefinition) -> EngineResult<PipelineRun> {
        Ok(self
            .store
            .create_run(&pipeline.id, &pipeline.project_id)
            .await?)
    }

    /// Create a run for `pipeline` and execute it to a terminal status.
    pub async fn run(
        &self,
        pipeline: &PipelineDefinition,
        overrides: &HashMap<String, String>,
        cancel: CancellationToken,
        events_tx: Sender<Event>,
    ) -> EngineResult<PipelineRun> {
        let run = self.create_run(pipeline).await?;
        self.execute(run, pipeline, overrides, cancel, events_tx).await
    }

    /// Execute a previously created run and return its final state.
    ///
    /// This method:
    /// 1. Moves the run to Running (or straight to Cancelled if `cancel` already fired)
    /// 2. Creates each RunStep immediately before the step runs
    /// 3. Passes each successful step's output to the next step
    /// 4. Stops at the first failed step or when `cancel` fires
    ///
    /// # Arguments
    ///
    /// * `run` - A Pending run created by [`PipelineEngine::create_run`]
    /// * `pipeline` - The pipeline definition the run executes
    /// * `overrides` - Template bindings that take precedence over `pipeline.variables`
    /// * `cancel` - Irreversible cancellation trigger for this run
    /// * `events_tx` - Channel for live observers; send failures are ignored
    ///
    /// # Errors
    ///
    /// Returns an error only when the run store fails. A failed or cancelled
    /// step is reported through the returned run's status. On a store error
    /// the run is marked Failed on a best-effort basis.
    pub async fn execute(
        &self,
        run: PipelineRun,
        pipeline: &PipelineDefinition,
        overrides: &HashMap<String, String>,
        cancel: CancellationToken,
        events_tx: Sender<Event>,
    ) -> EngineResult<PipelineRun> {
        let run_id = run.id;

        match self.drive(run, pipeline, overrides, &cancel, &events_tx).await {
            Ok(run) => Ok(run),
            Err(e) => {
                error!(%run_id, error = %e, "run aborted by store failure");
                if let Err(mark_err) = self.store.update_run_status(run_id, RunStatus::Failed).await {
                    warn!(%run_id, error = %mark_err, "could not mark aborted run as failed");
                }
                let _ = events_tx
                    .send(Event::RunFailed {
                        run_id,
                        error: e.to_string(),
                    })
                    .await;
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        run: PipelineRun,
        pipeline: &PipelineDefinition,
        overrides: &HashMap<String, String>,
        cancel: &CancellationToken,
        events_tx: &Sender<Event>,
    ) -> EngineResult<PipelineRun> {
        let run_id = run.id;

        let _ = events_tx
            .send(Event::RunStarted {
                run_id,
                pipeline_id: pipeline.id.clone(),
                step_count: pipeline.steps.len(),
            })
            .await;

        if cancel.is_cancelled() {
            return self.finish(run_id, RunEnd::Cancelled, events_tx).await;
        }

        self.store.update_run_status(run_id, RunStatus::Running).await?;
        let _ = events_tx
            .send(Event::RunStatusUpdate {
                run_id,
                status: RunStatus::Running,
            })
            .await;
        info!(%run_id, pipeline_id = %pipeline.id, steps = pipeline.steps.len(), "run started");

        let variables = merge_variables(&pipeline.variables, overrides);
        let mut prior_output = String::new();

        for (step_index, step) in pipeline.steps.iter().enumerate() {
            if cancel.is_cancelled() {
                return self.finish(run_id, RunEnd::Cancelled, events_tx).await;
            }

            let label = step.display_label();
            let run_step = self
                .store
                .create_run_step(run_id, step_index, &step.framework_id, label)
                .await?;
            self.store
                .update_run_step(run_step.id, StepUpdate::running())
                .await?;
            let _ = events_tx
                .send(Event::StepStarted {
                    run_id,
                    step_index,
                    label: label.to_string(),
                })
                .await;
            info!(%run_id, step_index, framework_id = %step.framework_id, "step started");

            let ctx = StepContext {
                run_id,
                project_id: &pipeline.project_id,
                step_index,
                step,
                variables: &variables,
            };

            match self
                .executor
                .execute(&ctx, &prior_output, cancel, events_tx)
                .await
            {
                StepOutcome::Success { text, usage } => {
                    self.store
                        .update_run_step(run_step.id, StepUpdate::completed(text.clone(), usage))
                        .await?;
                    info!(%run_id, step_index, chars = text.len(), "step completed");
                    let _ = events_tx
                        .send(Event::StepCompleted {
                            run_id,
                            step_index,
                            text: text.clone(),
                        })
                        .await;
                    prior_output = text;
                }
                StepOutcome::Failure { reason } => {
                    self.store
                        .update_run_step(run_step.id, StepUpdate::failed(reason.clone()))
                        .await?;
                    let _ = events_tx
                        .send(Event::StepFailed {
                            run_id,
                            step_index,
                            error: reason.clone(),
                        })
                        .await;
                    warn!(%run_id, step_index, %reason, "step failed");
                    return self.finish(run_id, RunEnd::Failed(reason), events_tx).await;
                }
                // The in-flight step keeps its Running record.
                StepOutcome::Cancelled => {
                    return self.finish(run_id, RunEnd::Cancelled, events_tx).await;
                }
            }
        }

        self.finish(run_id, RunEnd::Completed, events_tx).await
    }

    /// Persist the terminal run status and emit the matching events.
    async fn finish(
        &self,
        run_id: uuid::Uuid,
        end: RunEnd,
        events_tx: &Sender<Event>,
    ) -> EngineResult<PipelineRun> {
        let status = match end {
            RunEnd::Completed => RunStatus::Completed,
            RunEnd::Failed(_) => RunStatus::Failed,
            RunEnd::Cancelled => RunStatus::Cancelled,
        };
        let run = self.store.update_run_status(run_id, status).await?;

        let _ = events_tx
            .send(Event::RunStatusUpdate { run_id, status })
            .await;
        let terminal = match end {
            RunEnd::Completed => Event::RunCompleted { run_id },
            RunEnd::Failed(error) => Event::RunFailed { run_id, error },
            RunEnd::Cancelled => Event::RunCancelled { run_id },
        };
        let _ = events_tx.send(terminal).await;

        info!(%run_id, ?status, "run finished");
        Ok(run)
    }
}

/// Pipeline variables with run-time overrides applied on top.
pub fn merge_variables(
    pipeline_variables: &HashMap<String, String>,
    overrides: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut merged = pipeline_variables.clone();
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}
