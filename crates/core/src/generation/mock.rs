//! Scripted generation service for testing and offline demos.

use crate::generation::{ByteStream, GenerationError, GenerationService};
use async_trait::async_trait;
use pl_protocol::generation_models::GenerationRequest;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// One scripted answer to `open_stream`.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Emit these body fragments, then close the stream.
    Body(Vec<Vec<u8>>),
    /// Emit these fragments, then fail with a transport error.
    Interrupted(Vec<Vec<u8>>, GenerationError),
    /// Emit these fragments, then never produce anything again.
    Hang(Vec<Vec<u8>>),
    /// Fail before any body is produced.
    Reject(GenerationError),
}

impl MockResponse {
    /// A well-formed stream with one delta frame per text and a final `message_stop`.
    pub fn text(deltas: &[&str]) -> Self {
        let mut fragments: Vec<Vec<u8>> = deltas.iter().map(|t| delta_frame(t)).collect();
        fragments.push(stop_frame());
        Self::Body(fragments)
    }

    /// A stream that stops without delivering any content.
    pub fn empty() -> Self {
        Self::Body(vec![stop_frame()])
    }

    /// A stream that declares an error after the given deltas.
    pub fn stream_error(deltas: &[&str], message: &str) -> Self {
        let mut fragments: Vec<Vec<u8>> = deltas.iter().map(|t| delta_frame(t)).collect();
        let error = serde_json::json!({ "type": "error", "error": message });
        fragments.push(format!("data: {error}\n\n").into_bytes());
        Self::Body(fragments)
    }
}

/// Encode one `content_block_delta` frame.
pub fn delta_frame(text: &str) -> Vec<u8> {
    let envelope = serde_json::json!({
        "type": "content_block_delta",
        "delta": { "text": text },
    });
    format!("data: {envelope}\n\n").into_bytes()
}

/// Encode a `message_stop` frame.
pub fn stop_frame() -> Vec<u8> {
    b"data: {\"type\":\"message_stop\",\"usage\":{\"input_tokens\":10,\"output_tokens\":5}}\n\n"
        .to_vec()
}

/// Answers each call with the next scripted [`MockResponse`].
///
/// Once the script is exhausted every call receives a short successful
/// answer. Received requests are recorded for inspection.
#[derive(Clone)]
pub struct MockGenerationService {
    available: bool,
    script: Arc<Mutex<VecDeque<MockResponse>>>,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
    chunk_delay: Option<Duration>,
}

impl Default for MockGenerationService {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl MockGenerationService {
    pub fn new(script: Vec<MockResponse>) -> Self {
        Self {
            available: true,
            script: Arc::new(Mutex::new(script.into())),
            requests: Arc::new(Mutex::new(Vec::new())),
            chunk_delay: None,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::default()
        }
    }

    /// Sleep before each emitted fragment.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Requests received so far, in call order.
    pub async fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl GenerationService for MockGenerationService {
    async fn check_availability(&self) -> bool {
        self.available
    }

    async fn open_stream(&self, request: &GenerationRequest) -> Result<ByteStream, GenerationError> {
        if !self.available {
            return Err(GenerationError::NotAvailable(
                "Mock generation service not available".to_string(),
            ));
        }

        self.requests.lock().await.push(request.clone());
        let response = self
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| {
                MockResponse::text(&["Mock ", "response ", "for ", request.framework_id.as_str()])
            });

        let (fragments, tail) = match response {
            MockResponse::Reject(e) => return Err(e),
            MockResponse::Body(fragments) => (fragments, Tail::Close),
            MockResponse::Interrupted(fragments, e) => (fragments, Tail::Fail(e)),
            MockResponse::Hang(fragments) => (fragments, Tail::Hang),
        };
        let delay = self.chunk_delay;

        let stream = async_stream::stream! {
            for fragment in fragments {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                yield Ok(fragment);
            }
            match tail {
                Tail::Close => {}
                Tail::Fail(e) => {
                    yield Err(e);
                }
                Tail::Hang => {
                    std::future::pending::<()>().await;
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

enum Tail {
    Close,
    Fail(GenerationError),
    Hang,
}
