//! Buffering decoder for `data: `-framed JSON envelopes.

use crate::generation::{ByteStream, GenerationError};
use pl_protocol::generation_models::{StreamEnvelope, TokenUsage};
use std::pin::Pin;
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// Typed event produced by the decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// An incremental fragment of generated text.
    ContentDelta { text: String },
    /// Advisory end-of-message marker with optional accounting.
    MessageStop {
        usage: Option<TokenUsage>,
        cost: Option<f64>,
    },
    /// The service declared an error inside the stream.
    Error { message: String },
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, GenerationError>> + Send>>;

/// Accumulate-until-newline state machine.
///
/// Bytes are held until a `\n` completes a line, so a frame split across
/// fragments (including inside a multi-byte UTF-8 sequence) is parsed
/// only once it is whole. Lines without the `data: ` prefix are dropped,
/// as are complete frames that are not valid envelopes.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment and return the events completed by it.
    pub fn push(&mut self, fragment: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(fragment);

        let mut events = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.buffer[consumed..].iter().position(|b| *b == b'\n') {
            let end = consumed + offset;
            if let Some(event) = decode_line(&self.buffer[consumed..end]) {
                events.push(event);
            }
            consumed = end + 1;
        }
        self.buffer.drain(..consumed);

        events
    }

    /// Flush a trailing line that was never newline-terminated.
    ///
    /// A truncated frame left over at end of stream is discarded.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest).into_iter().collect()
    }

    /// Number of bytes waiting for a line terminator.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn decode_line(raw: &[u8]) -> Option<StreamEvent> {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim_end_matches('\r');

    let payload = line.strip_prefix(DATA_PREFIX)?.trim();
    if payload.is_empty() || payload == DONE_SENTINEL {
        return None;
    }

    match serde_json::from_str::<StreamEnvelope>(payload) {
        Ok(envelope) => event_from_envelope(envelope),
        Err(e) => {
            debug!(error = %e, "ignoring undecodable stream frame");
            None
        }
    }
}

fn event_from_envelope(envelope: StreamEnvelope) -> Option<StreamEvent> {
    match envelope {
        StreamEnvelope::ContentBlockDelta { delta } => {
            Some(StreamEvent::ContentDelta { text: delta.text })
        }
        StreamEnvelope::MessageStop { usage, cost } => Some(StreamEvent::MessageStop { usage, cost }),
        StreamEnvelope::Error { error } => Some(StreamEvent::Error {
            message: StreamEnvelope::error_message(&error),
        }),
        StreamEnvelope::ConversationId { conversation_id } => {
            debug!(%conversation_id, "generation stream opened");
            None
        }
        StreamEnvelope::Unknown => None,
    }
}

/// Decode a byte stream lazily into events.
///
/// Ends when the byte stream ends; a transport error is yielded once and
/// terminates the sequence.
pub fn decode_stream(mut bytes: ByteStream) -> EventStream {
    Box::pin(async_stream::stream! {
        let mut decoder = SseDecoder::new();

        while let Some(fragment) = bytes.next().await {
            match fragment {
                Ok(fragment) => {
                    for event in decoder.push(&fragment) {
                        yield Ok(event);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }

        for event in decoder.finish() {
            yield Ok(event);
        }
    })
}
