//! Run-time records of pipeline executions.
//!
//! A [`PipelineRun`] is one execution attempt of a pipeline; it owns one
//! [`RunStep`] per step that has started. Both status machines only move
//! forward: once a terminal status is reached it is never left.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::generation_models::TokenUsage;

/// Lifecycle status of a pipeline run.
///
/// Normal progression: Pending -> Running -> Completed.
/// A run may also end as Failed (a step failed) or Cancelled (user stop).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Run has been created but not started yet.
    Pending,

    /// Run is executing its steps.
    Running,

    /// Every step completed.
    Completed,

    /// A step failed and the remaining steps were skipped.
    Failed,

    /// The run was stopped by its cancellation trigger.
    Cancelled,
}

impl RunStatus {
    /// Whether this status ends the run.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether moving from `self` to `next` respects the forward-only rule.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        use RunStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

/// Lifecycle status of a single run step.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(self, next: StepStatus) -> bool {
        use StepStatus::*;
        matches!(
            (self, next),
            (Pending, Running) | (Running, Completed) | (Running, Failed)
        )
    }
}

/// Durable record of one pipeline execution.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct PipelineRun {
    #[ts(type = "string")]
    pub id: Uuid,
    pub pipeline_id: String,
    pub project_id: String,
    pub status: RunStatus,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    /// Set together with the terminal status.
    #[ts(type = "string | null")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Durable record of one step within a run.
///
/// Created immediately before the step begins, so a step with index `k`
/// implies steps `0..k` already completed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct RunStep {
    #[ts(type = "string")]
    pub id: Uuid,
    #[ts(type = "string")]
    pub run_id: Uuid,
    /// Zero-based position of the step in the pipeline definition.
    pub step_index: usize,
    pub framework_id: String,
    #[serde(default)]
    pub label: String,
    pub status: StepStatus,
    /// Final generated text. Only meaningful when `status` is Completed.
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub error: Option<String>,
    /// Token usage reported by the generation service, when available.
    #[serde(default)]
    pub usage: Option<TokenUsage>,
    #[ts(type = "string | null")]
    pub started_at: Option<DateTime<Utc>>,
    #[ts(type = "string | null")]
    pub finished_at: Option<DateTime<Utc>>,
}
