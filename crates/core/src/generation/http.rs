//! HTTP generation service speaking the sidecar's `/chat/stream` API.

use crate::generation::{ByteStream, GenerationError, GenerationService};
use async_trait::async_trait;
use pl_protocol::config_models::EngineSettings;
use pl_protocol::document_models::ContextDocument;
use pl_protocol::generation_models::GenerationRequest;
use reqwest::Client;
use serde::Serialize;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

const STREAM_PATH: &str = "chat/stream";
const HEALTH_PATH: &str = "health";

/// Request body accepted by `POST /chat/stream`.
#[derive(Debug, Serialize)]
struct ChatStreamBody<'a> {
    project_id: &'a str,
    framework_id: &'a str,
    messages: Vec<ChatMessage<'a>>,
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Streams generations from an HTTP service.
///
/// The response body is passed through untouched; dropping the returned
/// stream aborts the underlying connection.
pub struct HttpGenerationService {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpGenerationService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: None,
        }
    }

    /// Build from engine settings, reading the API key from the configured
    /// environment variable when it is set.
    pub fn from_settings(settings: &EngineSettings) -> Self {
        let service = Self::new(settings.service_url.clone());
        match std::env::var(&settings.api_key_env) {
            Ok(key) if !key.is_empty() => service.with_api_key(key),
            _ => service,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn build_body<'a>(&'a self, request: &'a GenerationRequest) -> ChatStreamBody<'a> {
        ChatStreamBody {
            project_id: &request.project_id,
            framework_id: &request.framework_id,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            model: &request.model,
            max_tokens: request.max_tokens,
            system: render_context_documents(&request.context_documents),
            api_key: self.api_key.as_deref(),
        }
    }
}

/// Render context documents into a system preamble, one section per document.
pub fn render_context_documents(documents: &[ContextDocument]) -> Option<String> {
    if documents.is_empty() {
        return None;
    }

    let mut system = String::from("Use the following context documents as background material.\n");
    for doc in documents {
        system.push_str("\n## ");
        system.push_str(&doc.name);
        system.push_str("\n\n");
        system.push_str(doc.content.trim_end());
        system.push('\n');
    }
    Some(system)
}

#[async_trait]
impl GenerationService for HttpGenerationService {
    async fn check_availability(&self) -> bool {
        match self.client.get(self.endpoint(HEALTH_PATH)).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "generation service health check failed");
                false
            }
        }
    }

    async fn open_stream(&self, request: &GenerationRequest) -> Result<ByteStream, GenerationError> {
        let body = self.build_body(request);

        let response = self
            .client
            .post(self.endpoint(STREAM_PATH))
            .header("accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    GenerationError::Request(e.to_string())
                } else {
                    GenerationError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "generation service rejected request");
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes_stream().map(|chunk| {
            chunk
                .map(|b| b.to_vec())
                .map_err(|e| GenerationError::Transport(e.to_string()))
        });

        Ok(Box::pin(bytes))
    }
}
