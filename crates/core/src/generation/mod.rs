//! Generation-stream service abstraction.
//!
//! A [`GenerationService`] opens one streaming generation call and hands
//! back the raw response body as a stream of byte fragments. Framing is
//! decoded separately by [`crate::stream`].

pub mod http;
pub mod mock;

pub use http::HttpGenerationService;
pub use mock::{MockGenerationService, MockResponse};

use async_trait::async_trait;
use pl_protocol::generation_models::GenerationRequest;
use std::pin::Pin;
use thiserror::Error;
use tokio_stream::Stream;

/// Raw response body of a generation call.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, GenerationError>> + Send>>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Generation service not available: {0}")]
    NotAvailable(String),
    #[error("Failed to build generation request: {0}")]
    Request(String),
    #[error("Generation service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Generation stream interrupted: {0}")]
    Transport(String),
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn check_availability(&self) -> bool;
    async fn open_stream(&self, request: &GenerationRequest) -> Result<ByteStream, GenerationError>;
}
