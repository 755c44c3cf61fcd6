//! Registry propagation polling
//!
//! After an upload succeeds the registry may take a while before the new
//! version is visible to readers. [`PropagationChecker`] repeats a GET of the
//! version metadata URL at a fixed interval until it returns 200 or a
//! wall-clock deadline passes.

use crate::core::error::{NPM, PublishError};
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, info};

/// Default npm registry used for read-after-write checks
pub const NPM_REGISTRY_URL: &str = "https://registry.npmjs.org";

/// Options for propagation polling
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Delay between two attempts
    pub interval: Duration,
    /// Give up once this much time has passed since the first attempt
    pub timeout: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Polls `<registry>/<package>/<version>` until the version is visible
///
/// # Examples
///
/// ```no_run
/// use shipbin::core::{PollOptions, PropagationChecker};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let checker = PropagationChecker::new(PollOptions::default());
///     checker.wait_until_visible("@acme/tool-linux-x64", "1.2.3").await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct PropagationChecker {
    client: reqwest::Client,
    registry_url: String,
    options: PollOptions,
}

impl PropagationChecker {
    pub fn new(options: PollOptions) -> Self {
        Self::with_registry(NPM_REGISTRY_URL, options)
    }

    /// Create a checker against a different registry base URL
    pub fn with_registry(registry_url: impl Into<String>, options: PollOptions) -> Self {
        Self {
            client: reqwest::Client::new(),
            registry_url: registry_url.into().trim_end_matches('/').to_string(),
            options,
        }
    }

    /// Wait until `package@version` answers 200. Transport errors and non-200
    /// answers both count as "not visible yet".
    pub async fn wait_until_visible(&self, package: &str, version: &str) -> Result<(), PublishError> {
        let url = format!("{}/{}/{}", self.registry_url, package, version);
        let deadline = Instant::now() + self.options.timeout;
        let mut attempt = 0u32;

        while Instant::now() < deadline {
            attempt += 1;
            match timeout_at(deadline, self.client.get(&url).send()).await {
                Ok(Ok(response)) if response.status() == reqwest::StatusCode::OK => {
                    info!(package, version, attempt, "package visible on registry");
                    return Ok(());
                }
                Ok(Ok(response)) => {
                    debug!(package, version, attempt, status = %response.status(), "not visible yet");
                }
                Ok(Err(e)) => {
                    debug!(package, version, attempt, error = %e, "registry check failed");
                }
                Err(_) => {
                    debug!(package, version, attempt, "registry check hit the deadline");
                }
            }
            sleep(self.options.interval.min(deadline.saturating_duration_since(Instant::now()))).await;
        }

        Err(PublishError::TimeoutError {
            registry: NPM.to_string(),
            package: package.to_string(),
            version: version.to_string(),
            waited: self.options.timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast() -> PollOptions {
        PollOptions {
            interval: Duration::from_millis(20),
            timeout: Duration::from_millis(300),
        }
    }

    #[test]
    fn test_default_options() {
        let options = PollOptions::default();
        assert_eq!(options.interval, Duration::from_secs(5));
        assert_eq!(options.timeout, Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_visible_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/@acme/tool-linux-x64/1.0.0"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let checker = PropagationChecker::with_registry(server.uri(), fast());
        checker
            .wait_until_visible("@acme/tool-linux-x64", "1.0.0")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_visible_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/@acme/tool-linux-x64/1.0.0"))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/@acme/tool-linux-x64/1.0.0"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let checker = PropagationChecker::with_registry(server.uri(), fast());
        assert!(
            checker
                .wait_until_visible("@acme/tool-linux-x64", "1.0.0")
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let checker = PropagationChecker::with_registry(server.uri(), fast());
        let err = checker
            .wait_until_visible("@acme/tool-darwin-arm64", "2.0.0")
            .await
            .unwrap_err();

        assert_eq!(err.code(), "TIMEOUT_ERROR");
        assert!(err.to_string().contains("@acme/tool-darwin-arm64@2.0.0"));
    }

    #[tokio::test]
    async fn test_hanging_request_respects_deadline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let checker = PropagationChecker::with_registry(
            server.uri(),
            PollOptions {
                interval: Duration::from_millis(20),
                timeout: Duration::from_millis(200),
            },
        );
        let started = std::time::Instant::now();
        let err = checker
            .wait_until_visible("@acme/tool-linux-x64", "1.0.0")
            .await
            .unwrap_err();

        assert_eq!(err.code(), "TIMEOUT_ERROR");
        assert!(started.elapsed() < Duration::from_secs(1), "{:?}", started.elapsed());
    }
}
