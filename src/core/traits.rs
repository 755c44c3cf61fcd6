//! Core traits and types for package publishing
//!
//! Every registry shipbin publishes to is a [`RegistryPlugin`]. The
//! orchestrator only sees this trait, which keeps registry-specific packaging,
//! authentication and error translation inside each plugin.

use crate::core::config::{PublishConfig, PublishTarget};
use crate::core::error::PublishError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outcome of one registry publish
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishResult {
    pub target: PublishTarget,
    pub version: String,
    /// Packages or wheels uploaded, or that would be in a dry run
    pub published: Vec<String>,
    /// Packages to poll for registry visibility after the run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_visibility: Vec<String>,
    /// Commands that a dry run skipped
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,
    pub dry_run: bool,
}

impl PublishResult {
    pub fn new(target: PublishTarget, version: impl Into<String>, dry_run: bool) -> Self {
        Self {
            target,
            version: version.into(),
            published: Vec::new(),
            pending_visibility: Vec::new(),
            commands: Vec::new(),
            dry_run,
        }
    }
}

/// A registry shipbin can publish to
///
/// # Examples
///
/// ```no_run
/// # use shipbin::core::{PublishConfig, PublishError, PublishResult, PublishTarget, RegistryPlugin};
/// # use async_trait::async_trait;
/// struct Noop;
///
/// #[async_trait]
/// impl RegistryPlugin for Noop {
///     fn target(&self) -> PublishTarget { PublishTarget::Npm }
///     fn name(&self) -> &str { "noop" }
///     async fn publish(&self, config: &PublishConfig) -> Result<PublishResult, PublishError> {
///         Ok(PublishResult::new(self.target(), &config.version, config.dry_run))
///     }
/// }
/// ```
#[async_trait]
pub trait RegistryPlugin: Send + Sync {
    /// Which result slot this plugin fills
    fn target(&self) -> PublishTarget;

    /// Plugin name, used in log lines
    fn name(&self) -> &str;

    /// Build and upload everything for this registry.
    ///
    /// In a dry run, packages are still built so format errors surface, but
    /// nothing is uploaded and no credential is required.
    async fn publish(&self, config: &PublishConfig) -> Result<PublishResult, PublishError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_result_new() {
        let result = PublishResult::new(PublishTarget::Pypi, "1.0.0", true);

        assert_eq!(result.target, PublishTarget::Pypi);
        assert_eq!(result.version, "1.0.0");
        assert!(result.dry_run);
        assert!(result.published.is_empty());
    }

    #[test]
    fn test_publish_result_serialization() {
        let mut result = PublishResult::new(PublishTarget::Npm, "2.1.0", false);
        result.published.push("@acme/tool-linux-x64".to_string());

        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"target\":\"npm\""));
        assert!(!json.contains("commands"));

        let back: PublishResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }
}
