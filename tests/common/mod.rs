//! Shared test utilities for logview integration harnesses.
//!
//! Import everything you need via `mod common; use common::*;` at the top of
//! each harness file.

pub mod assertions;
pub mod builders;
pub mod fake_docker_api;
pub mod fixtures;

pub use assertions::*;
pub use builders::*;
pub use fixtures::*;
