//! Generation-stream request and wire envelope models.
//!
//! The generation service answers a [`GenerationRequest`] with a
//! `text/event-stream` body whose frames look like:
//!
//! ```text
//! data: {"type":"content_block_delta","delta":{"text":"Hel"}}
//!
//! data: {"type":"message_stop","usage":{"input_tokens":12,"output_tokens":3}}
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::document_models::ContextDocument;

/// A single generation call issued by the step executor.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct GenerationRequest {
    pub project_id: String,
    pub framework_id: String,
    /// Fully resolved prompt; never empty.
    pub prompt: String,
    pub model: String,
    pub max_tokens: u32,
    /// Resolved context documents, in the order the step listed them.
    #[serde(default)]
    pub context_documents: Vec<ContextDocument>,
}

/// Token accounting reported on `message_stop`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, TS)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// Text payload of a `content_block_delta` envelope.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TextDelta {
    #[serde(default)]
    pub text: String,
}

/// One `data: ` frame of the generation stream.
///
/// Unrecognized `type` values deserialize to [`StreamEnvelope::Unknown`]
/// so newer services stay compatible.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEnvelope {
    ContentBlockDelta {
        delta: TextDelta,
    },
    MessageStop {
        #[serde(default)]
        usage: Option<TokenUsage>,
        /// Cost in USD as computed by the service.
        #[serde(default)]
        cost: Option<f64>,
    },
    /// `error` is either a plain string or an object carrying `message`.
    Error {
        #[serde(default)]
        error: serde_json::Value,
    },
    ConversationId {
        #[serde(default)]
        conversation_id: String,
    },
    #[serde(other)]
    Unknown,
}

impl StreamEnvelope {
    /// Human-readable message of an `error` envelope.
    pub fn error_message(error: &serde_json::Value) -> String {
        match error {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Object(map) => match map.get("message") {
                Some(serde_json::Value::String(s)) => s.clone(),
                _ => error.to_string(),
            },
            serde_json::Value::Null => "unknown stream error".to_string(),
            other => other.to_string(),
        }
    }
}
