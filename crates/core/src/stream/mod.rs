//! Generation stream decoding.
//!
//! The generation service frames its response as newline-delimited
//! `data: <json>` lines. [`SseDecoder`] turns arbitrary byte fragments
//! into typed [`StreamEvent`]s; [`decode_stream`] adapts it over an
//! asynchronous byte stream.

pub mod decoder;

pub use decoder::{decode_stream, EventStream, SseDecoder, StreamEvent};
