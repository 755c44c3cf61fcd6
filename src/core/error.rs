//! Error handling for shipbin
//!
//! Every failure the packaging and publish engine can report lives in
//! [`PublishError`]. Each variant carries the registry it belongs to and,
//! where one exists, the package that triggered it, so that a joined error
//! spanning both registries still tells the user exactly what went wrong.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Registry label used for npm errors
pub const NPM: &str = "npm";

/// Registry label used for PyPI errors
pub const PYPI: &str = "pypi";

/// Main error type for packaging and publishing operations
#[derive(Error, Debug)]
pub enum PublishError {
    // Input / validation errors
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error(
        "[{registry}] version \"{version}\" is not valid PEP 440 (required by PyPI)\nexamples: 1.0.0, 1.0.0a1, 1.0.0b1, 1.0.0rc1, 1.0.0.dev1"
    )]
    InvalidVersion { registry: String, version: String },

    #[error("[{registry}] failed to read {}: {source}", .path.display())]
    ReadFailed {
        registry: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Build errors
    #[error("[{registry}] failed to build {package}: {message}")]
    BuildFailed {
        registry: String,
        package: String,
        message: String,
    },

    #[error("[{registry}] failed to write wheel archive {package}: {source}")]
    ArchiveFailed {
        registry: String,
        package: String,
        #[source]
        source: zip::result::ZipError,
    },

    // Authentication errors
    #[error(
        "[{registry}] no credentials found\nset PYPI_TOKEN for local publishing, or\nensure your workflow has 'id-token: write' permission and\na trusted publisher is registered at https://pypi.org/manage/account/publishing/"
    )]
    TokenMissing { registry: String },

    #[error("[{registry}] {message}")]
    AuthenticationFailed { registry: String, message: String },

    // Registry rejection errors
    #[error(
        "[{registry}] {package}: 2FA is blocking publish: generate and use a token with 2FA disabled"
    )]
    OtpRequired { registry: String, package: String },

    #[error("[{registry}] {package}: not authenticated: {}", not_authenticated_hint(.registry))]
    NotAuthenticated { registry: String, package: String },

    #[error("[{registry}] {package}: permission denied: {}", permission_hint(.registry))]
    PermissionDenied { registry: String, package: String },

    #[error(
        "[{registry}] {package}: version already exists: this version has already been published"
    )]
    VersionConflict { registry: String, package: String },

    #[error(
        "[{registry}] {package}: payload too large: the file exceeds the registry upload size limit"
    )]
    PayloadTooLarge { registry: String, package: String },

    #[error("[{registry}] {package}: invalid package: {message}")]
    InvalidPackage {
        registry: String,
        package: String,
        message: String,
    },

    #[error(
        "[{registry}] {package}: provenance is not supported outside of CI: use --provenance=false when publishing locally"
    )]
    ProvenanceUnsupported { registry: String, package: String },

    #[error("[{registry}] {package}: network error: {message}")]
    NetworkError {
        registry: String,
        package: String,
        message: String,
    },

    #[error("[{registry}] {package}: unexpected status {status}: {body}")]
    UnexpectedStatus {
        registry: String,
        package: String,
        status: u16,
        body: String,
    },

    #[error("[{registry}] {package}: publish failed: {message}")]
    PublishFailed {
        registry: String,
        package: String,
        message: String,
    },

    // Propagation errors
    #[error(
        "[{registry}] registry propagation timed out for {package}: {package}@{version} not visible after {waited:?}"
    )]
    TimeoutError {
        registry: String,
        package: String,
        version: String,
        waited: Duration,
    },

    // Execution errors
    #[error("[{registry}] command error: {message}")]
    CommandError { registry: String, message: String },

    #[error("[{registry}] publish task aborted: {message}")]
    TaskFailed { registry: String, message: String },
}

fn not_authenticated_hint(registry: &str) -> &'static str {
    match registry {
        NPM => "generate a token with npm and ensure it's configured correctly",
        _ => "check that the upload token is valid and has not expired",
    }
}

fn permission_hint(registry: &str) -> &'static str {
    match registry {
        NPM => "ensure the token has write access to this package or org",
        _ => "ensure the token or trusted publisher is scoped to this project",
    }
}

impl PublishError {
    /// Get the registry name associated with this error
    pub fn registry(&self) -> &str {
        match self {
            Self::ConfigError(_) => "config",
            Self::InvalidVersion { registry, .. }
            | Self::ReadFailed { registry, .. }
            | Self::BuildFailed { registry, .. }
            | Self::ArchiveFailed { registry, .. }
            | Self::TokenMissing { registry }
            | Self::AuthenticationFailed { registry, .. }
            | Self::OtpRequired { registry, .. }
            | Self::NotAuthenticated { registry, .. }
            | Self::PermissionDenied { registry, .. }
            | Self::VersionConflict { registry, .. }
            | Self::PayloadTooLarge { registry, .. }
            | Self::InvalidPackage { registry, .. }
            | Self::ProvenanceUnsupported { registry, .. }
            | Self::NetworkError { registry, .. }
            | Self::UnexpectedStatus { registry, .. }
            | Self::PublishFailed { registry, .. }
            | Self::TimeoutError { registry, .. }
            | Self::CommandError { registry, .. }
            | Self::TaskFailed { registry, .. } => registry,
        }
    }

    /// Get suggested actions for this error
    pub fn suggested_actions(&self) -> Vec<&'static str> {
        match self {
            Self::ConfigError(_) => vec!["Check the command-line flags and .shipbin.yaml"],
            Self::InvalidVersion { .. } => vec![
                "Use a PEP 440 version such as 1.0.0, 1.0.0b1 or 1.0.0.dev1",
                "Publish to npm only with --target npm for semver pre-releases",
            ],
            Self::ReadFailed { .. } => vec!["Check that the file exists and is readable"],
            Self::BuildFailed { .. } | Self::ArchiveFailed { .. } => vec![
                "Check free space in the temporary directory",
                "Re-run with RUST_LOG=shipbin=debug for details",
            ],
            Self::TokenMissing { .. } => vec![
                "Set PYPI_TOKEN for local publishing",
                "Grant 'id-token: write' and register a trusted publisher in CI",
            ],
            Self::AuthenticationFailed { .. } => vec![
                "Check the trusted publisher configuration on PyPI",
                "Check that the workflow has 'id-token: write' permission",
            ],
            Self::OtpRequired { .. } => vec!["Use an automation token with 2FA disabled"],
            Self::NotAuthenticated { .. } => vec![
                "Check that the registry token is set and has not expired",
            ],
            Self::PermissionDenied { .. } => vec![
                "Check the token scope",
                "Check membership of the npm org or PyPI project",
            ],
            Self::VersionConflict { .. } => vec!["Bump the version and publish again"],
            Self::PayloadTooLarge { .. } => vec![
                "Strip debug symbols from the binary",
                "Request a larger upload limit from the registry",
            ],
            Self::InvalidPackage { .. } => vec!["Check the package name, version and metadata"],
            Self::ProvenanceUnsupported { .. } => {
                vec!["Drop --provenance when publishing outside CI"]
            }
            Self::NetworkError { .. } => vec![
                "Check your internet connection",
                "Wait a moment and try again",
            ],
            Self::UnexpectedStatus { .. } | Self::PublishFailed { .. } => vec![
                "Read the registry output above",
                "Check the registry status page",
            ],
            Self::TimeoutError { .. } => vec![
                "The upload succeeded; check the registry again in a few minutes",
            ],
            Self::CommandError { .. } => vec!["Check that npm is installed and on PATH"],
            Self::TaskFailed { .. } => vec!["Re-run the publish for this registry"],
        }
    }

    /// Get error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::InvalidVersion { .. } => "INVALID_VERSION",
            Self::ReadFailed { .. } => "READ_FAILED",
            Self::BuildFailed { .. } => "BUILD_FAILED",
            Self::ArchiveFailed { .. } => "ARCHIVE_FAILED",
            Self::TokenMissing { .. } => "TOKEN_MISSING",
            Self::AuthenticationFailed { .. } => "AUTHENTICATION_FAILED",
            Self::OtpRequired { .. } => "OTP_REQUIRED",
            Self::NotAuthenticated { .. } => "NOT_AUTHENTICATED",
            Self::PermissionDenied { .. } => "PERMISSION_DENIED",
            Self::VersionConflict { .. } => "VERSION_CONFLICT",
            Self::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Self::InvalidPackage { .. } => "INVALID_PACKAGE",
            Self::ProvenanceUnsupported { .. } => "PROVENANCE_UNSUPPORTED",
            Self::NetworkError { .. } => "NETWORK_ERROR",
            Self::UnexpectedStatus { .. } => "UNEXPECTED_STATUS",
            Self::PublishFailed { .. } => "PUBLISH_FAILED",
            Self::TimeoutError { .. } => "TIMEOUT_ERROR",
            Self::CommandError { .. } => "COMMAND_ERROR",
            Self::TaskFailed { .. } => "TASK_FAILED",
        }
    }
}

/// All errors collected from one publish run, displayed one per line.
#[derive(Debug)]
pub struct PublishErrors(Vec<PublishError>);

impl PublishErrors {
    pub fn new(errors: Vec<PublishError>) -> Self {
        Self(errors)
    }

    pub fn errors(&self) -> &[PublishError] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PublishErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for PublishErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_conflict_error() {
        let error = PublishError::VersionConflict {
            registry: PYPI.to_string(),
            package: "mytool-1.0.0-py3-none-win_amd64.whl".to_string(),
        };

        assert_eq!(error.registry(), "pypi");
        assert_eq!(error.code(), "VERSION_CONFLICT");
        let display = error.to_string();
        assert!(display.contains("already exists"));
        assert!(display.contains("mytool-1.0.0-py3-none-win_amd64.whl"));
    }

    #[test]
    fn test_permission_hint_differs_per_registry() {
        let npm = PublishError::PermissionDenied {
            registry: NPM.to_string(),
            package: "@acme/tool-linux-x64".to_string(),
        };
        let pypi = PublishError::PermissionDenied {
            registry: PYPI.to_string(),
            package: "tool.whl".to_string(),
        };

        assert!(npm.to_string().contains("permission denied"));
        assert!(npm.to_string().contains("write access to this package or org"));
        assert!(pypi.to_string().contains("permission denied"));
        assert!(pypi.to_string().contains("trusted publisher"));
    }

    #[test]
    fn test_token_missing_names_both_remediations() {
        let error = PublishError::TokenMissing {
            registry: PYPI.to_string(),
        };

        let display = error.to_string();
        assert!(display.contains("PYPI_TOKEN"));
        assert!(display.contains("id-token: write"));
        assert_eq!(error.suggested_actions().len(), 2);
    }

    #[test]
    fn test_read_failed_names_path() {
        let error = PublishError::ReadFailed {
            registry: NPM.to_string(),
            path: PathBuf::from("/tmp/missing-binary"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };

        assert!(error.to_string().contains("/tmp/missing-binary"));
        assert_eq!(error.code(), "READ_FAILED");
    }

    #[test]
    fn test_timeout_error_display() {
        let error = PublishError::TimeoutError {
            registry: NPM.to_string(),
            package: "@acme/tool-darwin-arm64".to_string(),
            version: "1.2.3".to_string(),
            waited: Duration::from_secs(120),
        };

        let display = error.to_string();
        assert!(display.contains("@acme/tool-darwin-arm64@1.2.3"));
        assert!(display.contains("120s"));
    }

    #[test]
    fn test_every_error_has_suggested_actions() {
        let errors = vec![
            PublishError::ConfigError("missing name".to_string()),
            PublishError::OtpRequired {
                registry: NPM.to_string(),
                package: "tool".to_string(),
            },
            PublishError::TaskFailed {
                registry: PYPI.to_string(),
                message: "panicked".to_string(),
            },
        ];

        for error in errors {
            assert!(!error.suggested_actions().is_empty(), "{}", error.code());
        }
    }

    #[test]
    fn test_joined_errors_display_one_per_line() {
        let joined = PublishErrors::new(vec![
            PublishError::CommandError {
                registry: NPM.to_string(),
                message: "npm not found".to_string(),
            },
            PublishError::TokenMissing {
                registry: PYPI.to_string(),
            },
        ]);

        let display = joined.to_string();
        assert!(display.starts_with("[npm] command error: npm not found\n"));
        assert!(display.contains("[pypi] no credentials found"));
        assert_eq!(joined.len(), 2);
    }
}
