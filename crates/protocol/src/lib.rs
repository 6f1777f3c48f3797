//! # pl-protocol
//!
//! Core protocol definitions and data models for promptline.
//!
//! This crate defines all shared data structures used for:
//! - Pipeline definition files (YAML)
//! - Durable run and run-step records
//! - The generation-stream request and its wire envelopes
//! - Communication between a UI host and the core engine
//!
//! ## Modules
//!
//! - [`pipeline_models`]: Pipeline and step definitions
//! - [`run_models`]: Run/step records and their status machines
//! - [`document_models`]: Context documents supplied to generation calls
//! - [`generation_models`]: Generation request and stream envelopes
//! - [`config_models`]: Engine settings from config.toml
//! - [`ipc`]: Operations and Events for host-core communication
//!
//! ## Design Principles
//!
//! - Minimal dependencies: Only serde, ts-rs, chrono and uuid
//! - TypeScript generation: All types derive `TS` for client compatibility
//! - Independent compilation: No dependencies on other promptline crates

pub mod config_models;
pub mod document_models;
pub mod generation_models;
pub mod ipc;
pub mod pipeline_models;
pub mod run_models;

// Re-export all public types for convenience
pub use config_models::*;
pub use document_models::*;
pub use generation_models::*;
pub use ipc::*;
pub use pipeline_models::*;
pub use run_models::*;
