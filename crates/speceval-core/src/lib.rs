//! Execution orchestrator and deterministic scoring engine for declarative
//! answer evaluations.
//!
//! A run loads [`model::TestCase`]s, drives one [`providers::BackendAdapter`]
//! per case through the bounded retry policy in [`engine::runner`], scores the
//! accepted answer with [`scoring`], and appends one record per case through a
//! [`report::ResultSink`].

pub mod engine;
pub mod errors;
pub mod loader;
pub mod model;
pub mod prompt;
pub mod providers;
pub mod report;
pub mod scoring;
pub mod targets;
