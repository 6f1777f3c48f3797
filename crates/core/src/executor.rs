//! Execution of a single pipeline step.
//!
//! The [`StepExecutor`] resolves a step's context documents and prompt,
//! opens a generation stream and accumulates the decoded deltas until the
//! stream ends. Live partial output is published as [`Event::StepOutput`]
//! on the observer channel; the return value carries only the terminal
//! outcome.

use crate::documents::{resolve_documents, DocumentStore};
use crate::generation::{GenerationError, GenerationService};
use crate::stream::{decode_stream, EventStream, StreamEvent};
use crate::template::resolve_step_prompt;
use pl_protocol::config_models::EngineSettings;
use pl_protocol::generation_models::{GenerationRequest, TokenUsage};
use pl_protocol::ipc::Event;
use pl_protocol::pipeline_models::StepDefinition;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tokio::time::error::Elapsed;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Failure reason when a stream ends without any generated text.
pub const NO_CONTENT_REASON: &str = "no content received from generation service";

/// Failure reason when the stream goes quiet for longer than the stall timeout.
pub const STALLED_REASON: &str = "stream stalled";

/// Terminal result of one step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The stream finished with non-empty text.
    Success {
        text: String,
        usage: Option<TokenUsage>,
    },
    /// The step could not produce a result.
    Failure { reason: String },
    /// The cancellation trigger fired before the step finished.
    Cancelled,
}

impl StepOutcome {
    fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }
}

/// Everything the executor needs to know about the step being run.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub run_id: Uuid,
    pub project_id: &'a str,
    pub step_index: usize,
    pub step: &'a StepDefinition,
    /// Pipeline variables merged with run-time overrides.
    pub variables: &'a HashMap<String, String>,
}

/// Runs one step against the generation service.
pub struct StepExecutor {
    generation: Arc<dyn GenerationService>,
    documents: Arc<dyn DocumentStore>,
    default_model: String,
    max_tokens: u32,
    /// `None` waits for the next stream event indefinitely.
    stall_timeout: Option<Duration>,
}

impl StepExecutor {
    pub fn new(
        generation: Arc<dyn GenerationService>,
        documents: Arc<dyn DocumentStore>,
        settings: &EngineSettings,
    ) -> Self {
        let stall_timeout = match settings.stall_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Self {
            generation,
            documents,
            default_model: settings.default_model.clone(),
            max_tokens: settings.max_tokens,
            stall_timeout,
        }
    }

    /// Override the stall timeout; `None` disables it.
    pub fn with_stall_timeout(mut self, stall_timeout: Option<Duration>) -> Self {
        self.stall_timeout = stall_timeout;
        self
    }

    /// Build the generation request for a step.
    pub async fn build_request(&self, ctx: &StepContext<'_>, prior_output: &str) -> GenerationRequest {
        let context_documents =
            resolve_documents(self.documents.as_ref(), &ctx.step.context_doc_ids).await;
        let prompt = resolve_step_prompt(&ctx.step.prompt_template, ctx.variables, prior_output);
        let model = if ctx.step.model.is_empty() {
            self.default_model.clone()
        } else {
            ctx.step.model.clone()
        };

        GenerationRequest {
            project_id: ctx.project_id.to_string(),
            framework_id: ctx.step.framework_id.clone(),
            prompt,
            model,
            max_tokens: self.max_tokens,
            context_documents,
        }
    }

    /// Execute a step and return its terminal outcome.
    ///
    /// `cancel` is observed while the request is being opened and before
    /// every read of the response; once it fires the stream is dropped,
    /// which aborts the underlying request.
    pub async fn execute(
        &self,
        ctx: &StepContext<'_>,
        prior_output: &str,
        cancel: &CancellationToken,
        events_tx: &Sender<Event>,
    ) -> StepOutcome {
        if cancel.is_cancelled() {
            return StepOutcome::Cancelled;
        }

        let request = self.build_request(ctx, prior_output).await;
        debug!(
            run_id = %ctx.run_id,
            step_index = ctx.step_index,
            model = %request.model,
            documents = request.context_documents.len(),
            "opening generation stream"
        );

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return StepOutcome::Cancelled,
            opened = self.generation.open_stream(&request) => opened,
        };

        let mut events = match opened {
            Ok(bytes) => decode_stream(bytes),
            Err(e) => {
                warn!(run_id = %ctx.run_id, step_index = ctx.step_index, error = %e, "failed to open generation stream");
                return StepOutcome::failure(e.to_string());
            }
        };

        let mut text = String::new();
        let mut usage = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(run_id = %ctx.run_id, step_index = ctx.step_index, "step cancelled mid-stream");
                    return StepOutcome::Cancelled;
                }
                next = next_event(&mut events, self.stall_timeout) => next,
            };

            match next {
                Err(_) => {
                    warn!(run_id = %ctx.run_id, step_index = ctx.step_index, "generation stream stalled");
                    return StepOutcome::failure(STALLED_REASON);
                }
                Ok(None) => break,
                Ok(Some(Ok(StreamEvent::ContentDelta { text: delta }))) => {
                    if delta.is_empty() {
                        continue;
                    }
                    text.push_str(&delta);
                    // Live output is lossy; a slow observer only misses intermediate views.
                    let _ = events_tx.try_send(Event::StepOutput {
                        run_id: ctx.run_id,
                        step_index: ctx.step_index,
                        text: text.clone(),
                    });
                }
                Ok(Some(Ok(StreamEvent::MessageStop { usage: reported, cost }))) => {
                    debug!(run_id = %ctx.run_id, step_index = ctx.step_index, ?reported, ?cost, "message stop received");
                    usage = reported;
                    break;
                }
                Ok(Some(Ok(StreamEvent::Error { message }))) => {
                    warn!(run_id = %ctx.run_id, step_index = ctx.step_index, error = %message, "generation stream reported an error");
                    return StepOutcome::failure(message);
                }
                Ok(Some(Err(e))) => {
                    warn!(run_id = %ctx.run_id, step_index = ctx.step_index, error = %e, "generation stream failed");
                    return StepOutcome::failure(e.to_string());
                }
            }
        }

        if text.is_empty() {
            return StepOutcome::failure(NO_CONTENT_REASON);
        }

        StepOutcome::Success { text, usage }
    }
}

async fn next_event(
    events: &mut EventStream,
    stall_timeout: Option<Duration>,
) -> Result<Option<Result<StreamEvent, GenerationError>>, Elapsed> {
    match stall_timeout {
        Some(limit) => tokio::time::timeout(limit, events.next()).await,
        None => Ok(events.next().await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::InMemoryDocumentStore;
    use crate::generation::mock::delta_frame;
    use crate::generation::{MockGenerationService, MockResponse};
    use pl_protocol::document_models::ContextDocument;
    use tokio::sync::mpsc;

    fn step(template: &str) -> StepDefinition {
        StepDefinition {
            framework_id: "prd".to_string(),
            label: "PRD".to_string(),
            prompt_template: template.to_string(),
            context_doc_ids: vec![],
            model: String::new(),
        }
    }

    fn executor(service: MockGenerationService) -> StepExecutor {
        let docs = InMemoryDocumentStore::new(vec![ContextDocument {
            id: "notes".to_string(),
            name: "Notes".to_string(),
            content: "Customers churn after onboarding.".to_string(),
        }]);
        StepExecutor::new(Arc::new(service), Arc::new(docs), &EngineSettings::default())
    }

    async fn run_step(
        executor: &StepExecutor,
        step: &StepDefinition,
        prior_output: &str,
    ) -> (StepOutcome, Vec<Event>) {
        let variables = HashMap::new();
        let ctx = StepContext {
            run_id: Uuid::new_v4(),
            project_id: "acme",
            step_index: 0,
            step,
            variables: &variables,
        };
        let (tx, mut rx) = mpsc::channel(64);
        let outcome = executor
            .execute(&ctx, prior_output, &CancellationToken::new(), &tx)
            .await;
        drop(tx);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (outcome, events)
    }

    #[tokio::test]
    async fn test_success_accumulates_deltas() {
        let service = MockGenerationService::new(vec![MockResponse::text(&["Hel", "lo"])]);
        let executor = executor(service);

        let (outcome, events) = run_step(&executor, &step("Write"), "").await;
        match outcome {
            StepOutcome::Success { text, usage } => {
                assert_eq!(text, "Hello");
                assert_eq!(usage.map(|u| u.output_tokens), Some(5));
            }
            other => panic!("expected success, got {other:?}"),
        }

        let partials: Vec<String> = events
            .into_iter()
            .filter_map(|e| match e {
                Event::StepOutput { text, .. } => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(partials, vec!["Hel", "Hello"]);
    }

    #[tokio::test]
    async fn test_empty_stream_is_failure() {
        let service = MockGenerationService::new(vec![MockResponse::empty()]);
        let (outcome, _) = run_step(&executor(service), &step("Write"), "").await;
        assert_eq!(
            outcome,
            StepOutcome::Failure {
                reason: NO_CONTENT_REASON.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_stream_close_without_stop_keeps_text() {
        let service =
            MockGenerationService::new(vec![MockResponse::Body(vec![delta_frame("partial")])]);
        let (outcome, _) = run_step(&executor(service), &step("Write"), "").await;
        assert_eq!(
            outcome,
            StepOutcome::Success {
                text: "partial".to_string(),
                usage: None
            }
        );
    }

    #[tokio::test]
    async fn test_declared_error_discards_partial_text() {
        let service = MockGenerationService::new(vec![MockResponse::stream_error(
            &["half"],
            "overloaded",
        )]);
        let (outcome, _) = run_step(&executor(service), &step("Write"), "").await;
        assert_eq!(
            outcome,
            StepOutcome::Failure {
                reason: "overloaded".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_transport_failures() {
        let service = MockGenerationService::new(vec![
            MockResponse::Reject(GenerationError::Status {
                status: 502,
                body: "bad gateway".to_string(),
            }),
            MockResponse::Interrupted(
                vec![delta_frame("A")],
                GenerationError::Transport("connection reset".to_string()),
            ),
        ]);
        let executor = executor(service);

        let (rejected, _) = run_step(&executor, &step("Write"), "").await;
        match rejected {
            StepOutcome::Failure { reason } => {
                assert!(reason.contains("502"));
                assert!(reason.contains("bad gateway"));
            }
            other => panic!("expected failure, got {other:?}"),
        }

        let (interrupted, _) = run_step(&executor, &step("Write"), "").await;
        assert!(matches!(interrupted, StepOutcome::Failure { reason } if reason.contains("connection reset")));
    }

    #[tokio::test]
    async fn test_request_uses_prior_output_and_documents() {
        let service = MockGenerationService::default();
        let executor = executor(service.clone());
        let mut definition = step("Expand: {prev_output}");
        definition.context_doc_ids = vec!["missing".to_string(), "notes".to_string()];

        let (outcome, _) = run_step(&executor, &definition, "short").await;
        assert!(matches!(outcome, StepOutcome::Success { .. }));

        let requests = service.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].prompt, "Expand: short");
        assert_eq!(requests[0].model, EngineSettings::default().default_model);
        assert_eq!(requests[0].context_documents.len(), 1);
        assert_eq!(requests[0].context_documents[0].id, "notes");
    }

    #[tokio::test]
    async fn test_step_model_overrides_default() {
        let service = MockGenerationService::default();
        let executor = executor(service.clone());
        let mut definition = step("Write");
        definition.model = "gpt-4o".to_string();

        run_step(&executor, &definition, "").await;
        assert_eq!(service.requests().await[0].model, "gpt-4o");
    }

    #[tokio::test]
    async fn test_cancel_mid_stream() {
        let service = MockGenerationService::new(vec![MockResponse::Hang(vec![delta_frame("partial")])]);
        let executor = executor(service);
        let definition = step("Write");
        let variables = HashMap::new();
        let ctx = StepContext {
            run_id: Uuid::new_v4(),
            project_id: "acme",
            step_index: 0,
            step: &definition,
            variables: &variables,
        };

        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(16);
        let trigger = cancel.clone();
        let observer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if matches!(event, Event::StepOutput { .. }) {
                    trigger.cancel();
                }
            }
        });

        let outcome = executor.execute(&ctx, "", &cancel, &tx).await;
        assert_eq!(outcome, StepOutcome::Cancelled);
        drop(tx);
        observer.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_before_start_sends_nothing() {
        let service = MockGenerationService::default();
        let executor = executor(service.clone());
        let definition = step("Write");
        let variables = HashMap::new();
        let ctx = StepContext {
            run_id: Uuid::new_v4(),
            project_id: "acme",
            step_index: 0,
            step: &definition,
            variables: &variables,
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (tx, _rx) = mpsc::channel(4);

        assert_eq!(executor.execute(&ctx, "", &cancel, &tx).await, StepOutcome::Cancelled);
        assert!(service.requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_stall_timeout_fails_step() {
        let service = MockGenerationService::new(vec![MockResponse::Hang(vec![delta_frame("A")])]);
        let executor = executor(service).with_stall_timeout(Some(Duration::from_millis(50)));

        let (outcome, _) = run_step(&executor, &step("Write"), "").await;
        assert_eq!(
            outcome,
            StepOutcome::Failure {
                reason: STALLED_REASON.to_string()
            }
        );
    }

    #[test]
    fn test_zero_stall_timeout_disables() {
        let settings = EngineSettings {
            stall_timeout_secs: 0,
            ..EngineSettings::default()
        };
        let executor = StepExecutor::new(
            Arc::new(MockGenerationService::default()),
            Arc::new(InMemoryDocumentStore::default()),
            &settings,
        );
        assert!(executor.stall_timeout.is_none());
    }
}
