//! Common test utilities shared by the integration tests.
//!
//! - Fixtures (step/pipeline builders, sample project directories)
//! - Custom assertions over event sequences
//! - Instrumented run stores and engine harnesses
//! - A fake generation sidecar speaking HTTP over a raw TCP socket

pub mod assertions;
pub mod fixtures;
pub mod services;
pub mod sidecar;

#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use services::*;
