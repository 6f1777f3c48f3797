//! Test fixtures for creating sample configurations and test data.

use pl_protocol::document_models::ContextDocument;
use pl_protocol::pipeline_models::{PipelineDefinition, StepDefinition};
use std::collections::HashMap;
use tempfile::TempDir;

/// Create a step with the given framework id and prompt template.
#[allow(dead_code)]
pub fn create_test_step(framework_id: &str, template: &str) -> StepDefinition {
    StepDefinition {
        framework_id: framework_id.to_string(),
        label: String::new(),
        prompt_template: template.to_string(),
        context_doc_ids: Vec::new(),
        model: String::new(),
    }
}

/// Create a pipeline owned by the "acme" project.
#[allow(dead_code)]
pub fn create_test_pipeline(id: &str, steps: Vec<StepDefinition>) -> PipelineDefinition {
    PipelineDefinition {
        id: id.to_string(),
        project_id: "acme".to_string(),
        name: format!("Pipeline {id}"),
        description: String::new(),
        steps,
        is_template: false,
        variables: HashMap::new(),
    }
}

/// A pipeline of `n` steps, each chaining the previous output.
#[allow(dead_code)]
pub fn create_chained_pipeline(id: &str, n: usize) -> PipelineDefinition {
    let steps = (0..n)
        .map(|i| create_test_step(&format!("framework-{i}"), &format!("Step {i}: {{prev_output}}")))
        .collect();
    create_test_pipeline(id, steps)
}

#[allow(dead_code)]
pub fn create_test_document(id: &str, name: &str, content: &str) -> ContextDocument {
    ContextDocument {
        id: id.to_string(),
        name: name.to_string(),
        content: content.to_string(),
    }
}

/// Create a temporary project directory with a `.promptline/` configuration.
///
/// Contains one two-step pipeline ("discovery") and one context document
/// ("interviews"). Returns a TempDir that must be kept alive for the test
/// duration.
#[allow(dead_code)]
pub fn create_test_project() -> std::io::Result<TempDir> {
    let temp_dir = tempfile::tempdir()?;
    let root = temp_dir.path().join(".promptline");

    std::fs::create_dir_all(root.join("pipelines"))?;
    std::fs::create_dir_all(root.join("documents"))?;

    std::fs::write(
        root.join("config.toml"),
        "default-model = \"test-model\"\nstall-timeout-secs = 5\n",
    )?;

    let pipeline_yaml = r#"
id: discovery
project-id: acme
name: Product discovery
variables:
  audience: "B2B buyers"
steps:
  - framework-id: summary
    label: Research summary
    prompt-template: "Summarize the interviews for {audience}"
    context-doc-ids: [interviews]
  - framework-id: user-stories
    prompt-template: "Write user stories from:\n{prev_output}"
"#;
    std::fs::write(root.join("pipelines/discovery.yaml"), pipeline_yaml)?;

    let document_md = r#"---
id: interviews
name: Customer interviews
---
Users abandon onboarding at step three."#;
    std::fs::write(root.join("documents/interviews.md"), document_md)?;

    Ok(temp_dir)
}
