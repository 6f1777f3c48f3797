//! Pipeline definition models for `.promptline/pipelines/*.yaml`.
//!
//! A pipeline is an ordered list of generation steps. Each step's prompt
//! template may reference the previous step's final output through the
//! reserved chaining placeholder.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ts_rs::TS;

/// A single generation step of a pipeline.
///
/// `prompt_template` may contain `{name}` placeholders. The reserved
/// `{prev_output}` placeholder is bound to the final output of the
/// previous step; every occurrence is replaced.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(rename_all = "kebab-case")]
pub struct StepDefinition {
    /// Identifier of the framework this step generates (e.g. "prd", "user-stories").
    pub framework_id: String,

    /// Human-readable label shown while the step runs.
    ///
    /// Defaults to the framework id when omitted.
    #[serde(default)]
    pub label: String,

    /// Prompt text with optional `{variable}` placeholders.
    #[serde(default)]
    pub prompt_template: String,

    /// Ids of the context documents supplied to the generation call.
    ///
    /// Order is preserved when rendering documents into the request.
    #[serde(default)]
    pub context_doc_ids: Vec<String>,

    /// Model for this step. Empty means "use the engine's default model".
    #[serde(default)]
    pub model: String,
}

impl StepDefinition {
    /// The label to display, falling back to the framework id.
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.framework_id
        } else {
            &self.label
        }
    }
}

/// A named, ordered sequence of generation steps.
///
/// # Example
///
/// ```yaml
/// id: discovery
/// project-id: acme
/// name: Product discovery
/// description: From raw notes to user stories
/// variables:
///   audience: "B2B buyers"
/// steps:
///   - framework-id: summary
///     prompt-template: "Summarize the attached research for {audience}"
///     context-doc-ids: ["interviews"]
///   - framework-id: user-stories
///     prompt-template: "Write user stories from:\n{prev_output}"
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, TS)]
#[serde(rename_all = "kebab-case")]
pub struct PipelineDefinition {
    /// Unique identifier of this pipeline.
    pub id: String,

    /// Project the pipeline belongs to.
    #[serde(default)]
    pub project_id: String,

    /// Display name.
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Steps executed strictly in this order.
    pub steps: Vec<StepDefinition>,

    /// Whether this pipeline is a reusable template rather than a project pipeline.
    #[serde(default)]
    pub is_template: bool,

    /// Template bindings applied to every step.
    #[serde(default)]
    pub variables: HashMap<String, String>,
}
