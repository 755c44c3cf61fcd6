//! PyPI Plugin - PyPI registry publishing implementation
//!
//! Builds one wheel per artifact and uploads it to the legacy upload API
//! (`https://upload.pypi.org/legacy/`) as a multipart form, authenticated with
//! `__token__` and the token from [`SecureTokenManager`].

use crate::core::config::{PublishConfig, PublishTarget};
use crate::core::error::{PYPI, PublishError};
use crate::core::traits::{PublishResult, RegistryPlugin};
use crate::packaging::{WheelFile, build_wheel};
use crate::security::SecureTokenManager;
use crate::validation::VersionValidator;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

/// Legacy upload endpoint
pub const PYPI_UPLOAD_URL: &str = "https://upload.pypi.org/legacy/";

const TOKEN_USERNAME: &str = "__token__";

/// PyPI registry plugin
pub struct PyPiPlugin {
    client: reqwest::Client,
    upload_url: String,
    credentials: SecureTokenManager,
}

impl Default for PyPiPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl PyPiPlugin {
    /// Plugin reading credentials from the process environment
    pub fn new() -> Self {
        Self::with_credentials(SecureTokenManager::from_env())
    }

    pub fn with_credentials(credentials: SecureTokenManager) -> Self {
        Self {
            client: reqwest::Client::new(),
            upload_url: PYPI_UPLOAD_URL.to_string(),
            credentials,
        }
    }

    /// Upload to a different endpoint (TestPyPI, a mirror, a test server)
    pub fn with_upload_url(mut self, upload_url: impl Into<String>) -> Self {
        self.upload_url = upload_url.into();
        self
    }

    /// Upload one wheel. 200 and 201 count as success.
    pub async fn upload_wheel(&self, wheel: &WheelFile, token: &SecretString) -> Result<(), PublishError> {
        let response = self
            .client
            .post(&self.upload_url)
            .basic_auth(TOKEN_USERNAME, Some(token.expose_secret()))
            .multipart(upload_form(wheel)?)
            .send()
            .await
            .map_err(|e| PublishError::NetworkError {
                registry: PYPI.to_string(),
                package: wheel.filename.clone(),
                message: format!("unable to reach PyPI, check your connection ({})", e),
            })?;

        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::CREATED {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(pypi_error(status.as_u16(), &body, &wheel.filename))
    }
}

/// Multipart form for the legacy upload API. Optional fields are sent only when non-empty.
fn upload_form(wheel: &WheelFile) -> Result<Form, PublishError> {
    let mut form = Form::new()
        .text(":action", "file_upload")
        .text("metadata_version", "2.1")
        .text("name", wheel.name.clone())
        .text("version", wheel.version.clone())
        .text("requires_python", ">=3.7")
        .text("filetype", "bdist_wheel")
        .text("pyversion", "py3")
        .text("sha256_digest", wheel.sha256_hex())
        .text("protocol_version", "1");

    if !wheel.summary.is_empty() {
        form = form.text("summary", wheel.summary.clone());
    }
    if !wheel.license.is_empty() {
        form = form.text("license", wheel.license.clone());
    }
    if !wheel.description.is_empty() {
        form = form.text("description", wheel.description.clone());
        if !wheel.description_content_type.is_empty() {
            form = form.text("description_content_type", wheel.description_content_type.clone());
        }
    }

    let content = Part::bytes(wheel.data.clone())
        .file_name(wheel.filename.clone())
        .mime_str("application/octet-stream")
        .map_err(|e| PublishError::BuildFailed {
            registry: PYPI.to_string(),
            package: wheel.filename.clone(),
            message: e.to_string(),
        })?;
    Ok(form.part("content", content))
}

/// Translate an upload status into a [`PublishError`]
pub fn pypi_error(status: u16, body: &str, filename: &str) -> PublishError {
    let registry = PYPI.to_string();
    let package = filename.to_string();

    match status {
        401 => PublishError::NotAuthenticated { registry, package },
        403 => PublishError::PermissionDenied { registry, package },
        409 => PublishError::VersionConflict { registry, package },
        413 => PublishError::PayloadTooLarge { registry, package },
        400 => PublishError::InvalidPackage {
            registry,
            package,
            message: first_line(body)
                .unwrap_or("PyPI rejected the upload")
                .to_string(),
        },
        _ => PublishError::UnexpectedStatus {
            registry,
            package,
            status,
            body: body.trim().to_string(),
        },
    }
}

fn first_line(body: &str) -> Option<&str> {
    body.lines().map(str::trim).find(|l| !l.is_empty())
}

#[async_trait]
impl RegistryPlugin for PyPiPlugin {
    fn target(&self) -> PublishTarget {
        PublishTarget::Pypi
    }

    fn name(&self) -> &str {
        PYPI
    }

    async fn publish(&self, config: &PublishConfig) -> Result<PublishResult, PublishError> {
        let mut result = PublishResult::new(PublishTarget::Pypi, &config.version, config.dry_run);
        let verb = if config.dry_run { "would publish" } else { "publishing" };
        info!(version = %config.version, "pypi: {} {} wheel(s)", verb, config.artifacts.len());

        // Reject the version before any network call.
        VersionValidator::new().to_pypi_version(&config.version)?;

        let token = if config.dry_run {
            None
        } else {
            Some(self.credentials.pypi_token().await?)
        };

        for artifact in &config.artifacts {
            let label = format!("{} {}", config.name, artifact.platform);
            let wheel = {
                let config = config.clone();
                let artifact = artifact.clone();
                tokio::task::spawn_blocking(move || build_wheel(&config, &artifact))
                    .await
                    .map_err(|e| PublishError::BuildFailed {
                        registry: PYPI.to_string(),
                        package: label,
                        message: format!("wheel build task failed: {}", e),
                    })??
            };

            match &token {
                Some(token) => {
                    info!(wheel = %wheel.filename, "pypi: publishing");
                    self.upload_wheel(&wheel, token).await?;
                }
                None => {
                    info!("pypi: [dry run] would upload {}", wheel.filename);
                }
            }
            debug!(wheel = %wheel.filename, sha256 = %wheel.sha256_hex(), "pypi: wheel done");
            result.published.push(wheel.filename);
        }

        info!("pypi: done");
        Ok(result)
    }
}
