//! shipbin publishes prebuilt native binaries to npm and PyPI.
//!
//! Each binary becomes a per-platform npm package plus a root package with a
//! JavaScript launcher, and a platform-tagged wheel with a Python shim.

pub mod core;
pub mod orchestration;
pub mod packaging;
pub mod plugins;
pub mod security;
pub mod validation;

pub use core::*;
pub use orchestration::{BatchPublishResult, BatchPublisher, TargetOutcome};
pub use plugins::{NpmPlugin, PyPiPlugin};
pub use security::{CommandError, SafeCommandExecutor, SecureTokenManager};
