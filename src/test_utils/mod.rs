//! Shared test fixtures.
//!
//! An in-memory schema provider, a small sample domain model, and fake
//! collaborators for exercising the orchestrator without a database. Gated
//! behind the `test-utils` feature for use by the integration suite.

pub mod fakes;
pub mod provider;
pub mod sample;
