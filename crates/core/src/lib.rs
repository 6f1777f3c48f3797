//! # pl-core
//!
//! Pipeline execution engine for promptline.
//!
//! This crate provides:
//! - Prompt template substitution with output chaining between steps
//! - A tolerant decoder for `data: `-framed generation streams
//! - Step execution against a generation service with live output
//! - Sequential, cancellable pipeline orchestration with run persistence
//! - Configuration loading from the `.promptline/` directory
//!
//! ## Modules
//!
//! - [`template`]: Placeholder substitution
//! - [`stream`]: Stream event decoder
//! - [`generation`]: Generation service trait, HTTP client and scripted mock
//! - [`documents`]: Context-document lookup
//! - [`persistence`]: Run and step records
//! - [`executor`]: Single-step execution
//! - [`engine`]: Pipeline orchestrator
//! - [`runs`]: Single-flight run management
//! - [`config`]: Configuration loading

pub mod config;
pub mod documents;
pub mod engine;
pub mod executor;
pub mod generation;
pub mod persistence;
pub mod runs;
pub mod stream;
pub mod template;
