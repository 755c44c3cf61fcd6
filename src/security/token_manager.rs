//! Secure token manager for PyPI uploads
//!
//! A PyPI upload token comes from one of two places:
//!
//! 1. `PYPI_TOKEN`, used as-is (local publishing);
//! 2. a GitHub Actions OIDC identity token, exchanged for a short-lived upload
//!    token through PyPI trusted publishing.
//!
//! Tokens are held in [`SecretString`] and never logged. The environment is
//! captured once into a map so tests never touch the process environment.

use crate::core::error::{PYPI, PublishError};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::info;
use url::Url;

pub const PYPI_TOKEN_ENV: &str = "PYPI_TOKEN";
pub const OIDC_REQUEST_URL_ENV: &str = "ACTIONS_ID_TOKEN_REQUEST_URL";
pub const OIDC_REQUEST_TOKEN_ENV: &str = "ACTIONS_ID_TOKEN_REQUEST_TOKEN";

/// PyPI endpoint exchanging an OIDC token for an upload token
pub const PYPI_MINT_TOKEN_URL: &str = "https://pypi.org/_/oidc/mint-token";

const OIDC_AUDIENCE: &str = "pypi";

/// Where the upload token will come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Token,
    TrustedPublisher,
    Missing,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Token => PYPI_TOKEN_ENV,
            Self::TrustedPublisher => "OIDC trusted publisher",
            Self::Missing => "none",
        })
    }
}

#[derive(Deserialize)]
struct OidcTokenResponse {
    #[serde(default)]
    value: String,
}

#[derive(Serialize)]
struct MintTokenRequest<'a> {
    token: &'a str,
}

#[derive(Deserialize)]
struct MintTokenResponse {
    #[serde(default)]
    token: String,
}

/// Resolves PyPI upload credentials
///
/// # Examples
///
/// ```no_run
/// use shipbin::security::SecureTokenManager;
///
/// # async fn run() -> Result<(), shipbin::PublishError> {
/// let manager = SecureTokenManager::from_env();
/// let token = manager.pypi_token().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SecureTokenManager {
    client: reqwest::Client,
    env: HashMap<String, String>,
    mint_url: String,
}

impl SecureTokenManager {
    /// Capture the process environment
    pub fn from_env() -> Self {
        Self::with_env(std::env::vars().collect())
    }

    pub fn with_env(env: HashMap<String, String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            env,
            mint_url: PYPI_MINT_TOKEN_URL.to_string(),
        }
    }

    /// Point the token exchange at a different endpoint
    pub fn with_mint_url(mut self, mint_url: impl Into<String>) -> Self {
        self.mint_url = mint_url.into();
        self
    }

    fn var(&self, key: &str) -> Option<&str> {
        self.env
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Which credential [`pypi_token`](Self::pypi_token) would use, without any network call
    pub fn credential_source(&self) -> CredentialSource {
        if self.var(PYPI_TOKEN_ENV).is_some() {
            CredentialSource::Token
        } else if self.var(OIDC_REQUEST_URL_ENV).is_some()
            && self.var(OIDC_REQUEST_TOKEN_ENV).is_some()
        {
            CredentialSource::TrustedPublisher
        } else {
            CredentialSource::Missing
        }
    }

    /// Acquire an upload token. Failures are final; nothing is retried.
    pub async fn pypi_token(&self) -> Result<SecretString, PublishError> {
        if let Some(token) = self.var(PYPI_TOKEN_ENV) {
            info!("pypi: authenticating with {}", PYPI_TOKEN_ENV);
            return Ok(SecretString::new(token.into()));
        }

        let (Some(request_url), Some(request_token)) =
            (self.var(OIDC_REQUEST_URL_ENV), self.var(OIDC_REQUEST_TOKEN_ENV))
        else {
            return Err(PublishError::TokenMissing {
                registry: PYPI.to_string(),
            });
        };

        info!("pypi: authenticating with OIDC trusted publisher");
        let request_token = SecretString::new(request_token.into());
        let oidc_token = self
            .request_oidc_token(request_url, &request_token)
            .await
            .map_err(|e| auth_error(format!("failed to request OIDC token: {}", e)))?;

        self.exchange_for_upload_token(&oidc_token)
            .await
            .map_err(|e| auth_error(format!("failed to mint PyPI upload token: {}", e)))
    }

    /// Fetch the CI identity token for audience `pypi`
    pub async fn request_oidc_token(
        &self,
        request_url: &str,
        request_token: &SecretString,
    ) -> Result<SecretString, String> {
        let url = with_audience(request_url)?;

        let response = self
            .client
            .get(url)
            .bearer_auth(request_token.expose_secret())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("unexpected status {}: {}", status.as_u16(), body.trim()));
        }

        let parsed: OidcTokenResponse = response.json().await.map_err(|e| e.to_string())?;
        if parsed.value.is_empty() {
            return Err("OIDC token response was empty".to_string());
        }
        Ok(SecretString::new(parsed.value.into()))
    }

    /// Trade the identity token for a short-lived PyPI upload token
    pub async fn exchange_for_upload_token(
        &self,
        oidc_token: &SecretString,
    ) -> Result<SecretString, String> {
        let response = self
            .client
            .post(&self.mint_url)
            .json(&MintTokenRequest {
                token: oidc_token.expose_secret(),
            })
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(format!(
                "PyPI mint-token returned status {}: {}",
                status.as_u16(),
                body.trim()
            ));
        }

        let parsed: MintTokenResponse = response.json().await.map_err(|e| e.to_string())?;
        if parsed.token.is_empty() {
            return Err("PyPI returned empty upload token".to_string());
        }
        Ok(SecretString::new(parsed.token.into()))
    }
}

/// Set `audience=pypi`, replacing any audience already in the query
fn with_audience(request_url: &str) -> Result<Url, String> {
    let mut url =
        Url::parse(request_url).map_err(|e| format!("invalid OIDC request URL: {}", e))?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "audience")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("audience", OIDC_AUDIENCE);
    Ok(url)
}

fn auth_error(message: String) -> PublishError {
    PublishError::AuthenticationFailed {
        registry: PYPI.to_string(),
        message,
    }
}
