//! Configuration structures and types for shipbin
//!
//! This module provides type-safe configuration management with serde support.
//! [`ProjectConfig`] mirrors the optional `.shipbin.yaml` project file, while
//! [`PublishConfig`] is the fully resolved, validated configuration handed to
//! the registry plugins.

use crate::core::artifact::Artifact;
use crate::core::error::PublishError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default npm dist-tag
pub const DEFAULT_TAG: &str = "latest";

/// A single registry a run can publish to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishTarget {
    Npm,
    Pypi,
}

impl PublishTarget {
    /// Every target, in result-slot order
    pub const ALL: [PublishTarget; 2] = [PublishTarget::Npm, PublishTarget::Pypi];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Pypi => "pypi",
        }
    }

    /// Index of this target's result slot in the orchestrator
    pub fn slot(&self) -> usize {
        match self {
            Self::Npm => 0,
            Self::Pypi => 1,
        }
    }
}

impl fmt::Display for PublishTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which registries a run publishes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishTargets {
    #[default]
    All,
    Npm,
    Pypi,
}

impl PublishTargets {
    pub fn includes(&self, target: PublishTarget) -> bool {
        matches!(
            (self, target),
            (Self::All, _)
                | (Self::Npm, PublishTarget::Npm)
                | (Self::Pypi, PublishTarget::Pypi)
        )
    }

    /// Selected targets, in result-slot order
    pub fn selected(&self) -> Vec<PublishTarget> {
        PublishTarget::ALL
            .into_iter()
            .filter(|t| self.includes(*t))
            .collect()
    }
}

impl FromStr for PublishTargets {
    type Err = PublishError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "" => Ok(Self::All),
            "npm" => Ok(Self::Npm),
            "pypi" => Ok(Self::Pypi),
            other => Err(PublishError::ConfigError(format!(
                "invalid target \"{}\": must be one of all, npm, pypi",
                other
            ))),
        }
    }
}

impl fmt::Display for PublishTargets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::All => "all",
            Self::Npm => "npm",
            Self::Pypi => "pypi",
        })
    }
}

/// Contents of the `.shipbin.yaml` project file. Every key is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProjectConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Long description file, relative to the project directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readme: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<PublishTargets>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub npm: Option<NpmProjectConfig>,
}

/// `npm:` section of the project file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NpmProjectConfig {
    /// npm scope without the leading `@`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,

    /// npm dist-tag (default: "latest")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<bool>,
}

/// npm-specific publish settings
#[derive(Debug, Clone, PartialEq)]
pub struct NpmConfig {
    pub org: String,
    pub tag: String,
    pub provenance: bool,
}

impl Default for NpmConfig {
    fn default() -> Self {
        Self {
            org: String::new(),
            tag: DEFAULT_TAG.to_string(),
            provenance: false,
        }
    }
}

/// Fully resolved configuration for one publish run
#[derive(Debug, Clone, Default)]
pub struct PublishConfig {
    /// Binary name; also the root npm package name and the PyPI project name
    pub name: String,
    /// Semver version with any leading `v` stripped
    pub version: String,
    pub license: String,
    pub summary: String,
    /// Optional long description (README)
    pub readme: Option<PathBuf>,
    pub artifacts: Vec<Artifact>,
    pub npm: NpmConfig,
    pub targets: PublishTargets,
    pub dry_run: bool,
}

impl PublishConfig {
    /// Check the invariants every registry plugin relies on
    pub fn validate(&self) -> Result<(), PublishError> {
        if self.name.trim().is_empty() {
            return Err(PublishError::ConfigError("--name is required".to_string()));
        }
        if self.version.trim().is_empty() {
            return Err(PublishError::ConfigError(
                "version is required: pass --version or tag the current commit".to_string(),
            ));
        }
        if self.artifacts.is_empty() {
            return Err(PublishError::ConfigError(
                "at least one --artifact is required".to_string(),
            ));
        }
        if self.targets.includes(PublishTarget::Npm) && self.npm.org.trim().is_empty() {
            return Err(PublishError::ConfigError(
                "--org is required when publishing to npm".to_string(),
            ));
        }
        if self.npm.tag.trim().is_empty() {
            return Err(PublishError::ConfigError("--tag must not be empty".to_string()));
        }
        Ok(())
    }
}
