//! Host/core communication protocol.
//!
//! The protocol follows an Operation/Event pattern:
//! - `Op`: Commands sent from a host (CLI, desktop shell) to the core
//! - `Event`: Notifications sent from the core while a run progresses
//!
//! Events are purely observational. A dropped receiver never affects the
//! outcome of a run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ts_rs::TS;
use uuid::Uuid;

use crate::pipeline_models::PipelineDefinition;
use crate::run_models::{PipelineRun, RunStatus, RunStep};

/// Operations sent from the host to the core.
///
/// Uses tagged enum serialization for TypeScript compatibility:
/// ```json
/// {
///   "type": "cancelRun",
///   "payload": { "run_id": "uuid-here" }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Op {
    /// Start executing a pipeline. Rejected while another run is active.
    StartPipeline {
        pipeline: PipelineDefinition,
        /// Run-time template bindings; they override pipeline variables.
        #[serde(default)]
        variables: HashMap<String, String>,
    },

    /// Fire the cancellation trigger of an active run.
    CancelRun {
        #[ts(type = "string")]
        run_id: Uuid,
    },

    /// Request the persisted state of a run and its steps.
    GetRun {
        #[ts(type = "string")]
        run_id: Uuid,
    },
}

/// Events sent from the core to the host.
///
/// ```json
/// {
///   "type": "stepOutput",
///   "payload": { "run_id": "uuid-here", "step_index": 0, "text": "Partial te" }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Event {
    /// A run record has been created.
    RunStarted {
        #[ts(type = "string")]
        run_id: Uuid,
        pipeline_id: String,
        step_count: usize,
    },

    /// A run's status has changed.
    RunStatusUpdate {
        #[ts(type = "string")]
        run_id: Uuid,
        status: RunStatus,
    },

    /// A step record has been created and is now running.
    StepStarted {
        #[ts(type = "string")]
        run_id: Uuid,
        step_index: usize,
        label: String,
    },

    /// Accumulated text of the running step after a new delta.
    ///
    /// Transient view only; the durable output is written on completion.
    StepOutput {
        #[ts(type = "string")]
        run_id: Uuid,
        step_index: usize,
        text: String,
    },

    /// A step finished; `text` is its full output as persisted.
    StepCompleted {
        #[ts(type = "string")]
        run_id: Uuid,
        step_index: usize,
        text: String,
    },

    StepFailed {
        #[ts(type = "string")]
        run_id: Uuid,
        step_index: usize,
        error: String,
    },

    RunCompleted {
        #[ts(type = "string")]
        run_id: Uuid,
    },

    RunFailed {
        #[ts(type = "string")]
        run_id: Uuid,
        error: String,
    },

    RunCancelled {
        #[ts(type = "string")]
        run_id: Uuid,
    },

    /// Reply to [`Op::GetRun`].
    RunSnapshot { run: PipelineRun, steps: Vec<RunStep> },
}

impl Event {
    /// Whether this event ends a run's event sequence.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Event::RunCompleted { .. } | Event::RunFailed { .. } | Event::RunCancelled { .. }
        )
    }
}
