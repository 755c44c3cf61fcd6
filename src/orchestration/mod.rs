//! Orchestration layer for publishing
//!
//! Runs every selected registry plugin concurrently and gathers their
//! results and errors.

pub mod batch_publisher;

pub use batch_publisher::{BatchPublishResult, BatchPublisher, TargetOutcome};
