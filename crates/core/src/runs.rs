//! Single-flight ownership of the active pipeline run.
//!
//! The RunManager is the entry point a host uses to drive the engine. It
//! starts runs on background tasks, holds the cancellation trigger of the
//! one active run, and answers [`Op`]s from a front-end.

use crate::engine::{EngineError, EngineResult, PipelineEngine};
use crate::persistence::StoreError;
use pl_protocol::ipc::{Event, Op};
use pl_protocol::pipeline_models::PipelineDefinition;
use pl_protocol::run_models::{PipelineRun, RunStep};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

struct ActiveRun {
    run_id: Uuid,
    cancel: CancellationToken,
}

type ActiveSlot = Arc<Mutex<Option<ActiveRun>>>;

fn clear_slot(active: &mut Option<ActiveRun>, run_id: Uuid) {
    if active.as_ref().is_some_and(|a| a.run_id == run_id) {
        *active = None;
    }
}

/// Held by a run's task; frees the active slot when the task ends, even
/// if it panics or is aborted.
struct SlotGuard {
    slot: ActiveSlot,
    run_id: Uuid,
    armed: bool,
}

impl SlotGuard {
    async fn release(mut self) {
        clear_slot(&mut *self.slot.lock().await, self.run_id);
        self.armed = false;
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(mut active) = self.slot.try_lock() {
            clear_slot(&mut active, self.run_id);
            return;
        }

        warn!(run_id = %self.run_id, "run task ended abnormally, releasing active slot");
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let slot = Arc::clone(&self.slot);
            let run_id = self.run_id;
            runtime.spawn(async move {
                clear_slot(&mut *slot.lock().await, run_id);
            });
        }
    }
}

/// Handle to a run executing in the background.
pub struct RunHandle {
    run_id: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<EngineResult<PipelineRun>>,
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Fire the run's cancellation trigger.
    ///
    /// Irreversible; calling it again has no further effect.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A clone of the trigger, e.g. for a Ctrl-C handler.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the run to reach a terminal status.
    pub async fn wait(self) -> EngineResult<PipelineRun> {
        self.task
            .await
            .map_err(|e| EngineError::Join(e.to_string()))?
    }
}

/// Owns the engine and the at-most-one active run.
pub struct RunManager {
    engine: Arc<PipelineEngine>,
    active: ActiveSlot,
    events_tx: mpsc::Sender<Event>,
}

impl RunManager {
    /// Create a new RunManager.
    ///
    /// # Arguments
    ///
    /// * `engine` - The engine that executes runs
    /// * `events_tx` - Channel every run publishes its events on
    pub fn new(engine: PipelineEngine, events_tx: mpsc::Sender<Event>) -> Self {
        Self {
            engine: Arc::new(engine),
            active: Arc::new(Mutex::new(None)),
            events_tx,
        }
    }

    /// Start executing a pipeline in the background.
    ///
    /// The run record is created before this returns, so the handle's
    /// run id is immediately visible in the run store.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RunAlreadyActive`] while another run has not
    /// finished, or a store error if the run record cannot be created.
    pub async fn start(
        &self,
        pipeline: PipelineDefinition,
        variables: HashMap<String, String>,
    ) -> EngineResult<RunHandle> {
        let mut active = self.active.lock().await;
        if let Some(current) = active.as_ref() {
            return Err(EngineError::RunAlreadyActive(current.run_id));
        }

        let run = self.engine.create_run(&pipeline).await?;
        let run_id = run.id;
        let cancel = CancellationToken::new();
        *active = Some(ActiveRun {
            run_id,
            cancel: cancel.clone(),
        });
        drop(active);

        let engine = Arc::clone(&self.engine);
        let guard = SlotGuard {
            slot: Arc::clone(&self.active),
            run_id,
            armed: true,
        };
        let events_tx = self.events_tx.clone();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let result = engine
                .execute(run, &pipeline, &variables, token, events_tx)
                .await;
            guard.release().await;
            result
        });

        info!(%run_id, "run scheduled");
        Ok(RunHandle {
            run_id,
            cancel,
            task,
        })
    }

    /// Cancel the active run if it has the given id.
    pub async fn cancel(&self, run_id: Uuid) -> EngineResult<()> {
        match self.active.lock().await.as_ref() {
            Some(active) if active.run_id == run_id => {
                active.cancel.cancel();
                Ok(())
            }
            _ => Err(EngineError::RunNotActive(run_id)),
        }
    }

    /// Cancel whatever run is active and return its id.
    pub async fn cancel_active(&self) -> Option<Uuid> {
        let active = self.active.lock().await;
        active.as_ref().map(|a| {
            a.cancel.cancel();
            a.run_id
        })
    }

    pub async fn active_run(&self) -> Option<Uuid> {
        self.active.lock().await.as_ref().map(|a| a.run_id)
    }

    /// The persisted run and its steps, `None` when the store has no such run.
    pub async fn get_run(&self, run_id: Uuid) -> EngineResult<Option<(PipelineRun, Vec<RunStep>)>> {
        let store = self.engine.store();
        let Some(run) = store.get_run(run_id).await? else {
            return Ok(None);
        };
        let steps = store.list_run_steps(run_id).await?;
        Ok(Some((run, steps)))
    }

    /// Dispatch an operation received from a front-end.
    ///
    /// Results are reported as events: a started run publishes its own
    /// lifecycle events and [`Op::GetRun`] is answered with
    /// [`Event::RunSnapshot`].
    pub async fn handle_op(&self, op: Op) -> EngineResult<()> {
        match op {
            Op::StartPipeline {
                pipeline,
                variables,
            } => {
                // Detached; progress is observed through events.
                self.start(pipeline, variables).await?;
                Ok(())
            }
            Op::CancelRun { run_id } => self.cancel(run_id).await,
            Op::GetRun { run_id } => {
                let (run, steps) = self
                    .get_run(run_id)
                    .await?
                    .ok_or(EngineError::Store(StoreError::RunNotFound(run_id)))?;
                let _ = self.events_tx.send(Event::RunSnapshot { run, steps }).await;
                Ok(())
            }
        }
    }
}
