//! Version Validator - normalizes release versions for each registry
//!
//! npm wants a semantic version; PyPI wants a PEP 440 version. A release
//! version is accepted once (semver, leading `v` stripped) and then checked
//! against PEP 440 before any wheel is built.
//!
//! # Example
//!
//! ```
//! use shipbin::validation::VersionValidator;
//!
//! let validator = VersionValidator::new();
//! assert_eq!(validator.normalize("v1.2.3").unwrap(), "1.2.3");
//! assert_eq!(validator.to_pypi_version("1.0.0rc1").unwrap(), "1.0.0rc1");
//! assert!(validator.to_pypi_version("1.0.0-beta").is_err());
//! ```

use crate::core::error::{PYPI, PublishError};
use lazy_static::lazy_static;
use regex::Regex;
use semver::Version;

lazy_static! {
    static ref PEP440: Regex =
        Regex::new(r"^\d+(\.\d+)*((a|b|rc)\d+)?(\.post\d+)?(\.dev\d+)?$").unwrap();
}

/// Validator for release versions
pub struct VersionValidator;

impl Default for VersionValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionValidator {
    pub fn new() -> Self {
        Self
    }

    /// Strip a leading `v` and require `MAJOR.MINOR.PATCH[-PRERELEASE]`
    ///
    /// Build metadata (`+sha`) is rejected: neither registry keeps it.
    pub fn normalize(&self, version_str: &str) -> Result<String, PublishError> {
        let trimmed = version_str.trim();
        let v = trimmed.strip_prefix('v').unwrap_or(trimmed);

        match Version::parse(v) {
            Ok(version) if version.build.is_empty() => Ok(v.to_string()),
            _ => Err(PublishError::ConfigError(format!(
                "invalid version {:?}: must be valid semver (e.g. 1.2.3, 1.2.3-beta.1)",
                v
            ))),
        }
    }

    /// Check a version against the PEP 440 subset PyPI accepts for wheels.
    /// Valid versions are returned unchanged.
    pub fn to_pypi_version(&self, version: &str) -> Result<String, PublishError> {
        if PEP440.is_match(version) {
            Ok(version.to_string())
        } else {
            Err(PublishError::InvalidVersion {
                registry: PYPI.to_string(),
                version: version.to_string(),
            })
        }
    }
}
