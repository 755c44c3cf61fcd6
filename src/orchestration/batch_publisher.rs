//! Batch Publisher - publishes to every selected registry at once
//!
//! Features:
//! - One tokio task per selected registry, all started before any is awaited
//! - Each task writes only its own result slot
//! - A failure (or panic) on one registry never cancels the other
//! - Post-publish propagation polling for npm platform packages
//! - Every error from every registry is kept and reported together

use crate::core::config::{PublishConfig, PublishTarget};
use crate::core::error::{PublishError, PublishErrors};
use crate::core::poll::PropagationChecker;
use crate::core::traits::{PublishResult, RegistryPlugin};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// What happened on one registry
#[derive(Debug)]
pub struct TargetOutcome {
    pub target: PublishTarget,
    /// Present when the upload itself succeeded, even if polling failed afterwards
    pub result: Option<PublishResult>,
    pub errors: Vec<PublishError>,
    pub duration: Duration,
}

impl TargetOutcome {
    fn failed(target: PublishTarget, error: PublishError, duration: Duration) -> Self {
        Self {
            target,
            result: None,
            errors: vec![error],
            duration,
        }
    }

    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Batch publish result, one slot per target in [`PublishTarget::ALL`] order
#[derive(Debug, Default)]
pub struct BatchPublishResult {
    slots: [Option<TargetOutcome>; 2],
}

impl BatchPublishResult {
    /// Outcomes of the targets that ran, in slot order
    pub fn outcomes(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.slots.iter().flatten()
    }

    pub fn outcome(&self, target: PublishTarget) -> Option<&TargetOutcome> {
        self.slots[target.slot()].as_ref()
    }

    pub fn succeeded(&self) -> Vec<PublishTarget> {
        self.outcomes()
            .filter(|o| o.success())
            .map(|o| o.target)
            .collect()
    }

    pub fn failed(&self) -> Vec<PublishTarget> {
        self.outcomes()
            .filter(|o| !o.success())
            .map(|o| o.target)
            .collect()
    }

    /// Overall success: every target that ran reported no error
    pub fn success(&self) -> bool {
        self.outcomes().all(TargetOutcome::success)
    }

    /// Join every error of every target into one
    pub fn into_result(self) -> Result<Vec<PublishResult>, PublishErrors> {
        let mut results = Vec::new();
        let mut errors = Vec::new();
        for outcome in self.slots.into_iter().flatten() {
            errors.extend(outcome.errors);
            results.extend(outcome.result);
        }

        if errors.is_empty() {
            Ok(results)
        } else {
            Err(PublishErrors::new(errors))
        }
    }

    /// Print batch publish summary
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(60));
        println!("📊 Publish Summary");
        println!("{}", "=".repeat(60));

        for outcome in self.outcomes() {
            let millis = outcome.duration.as_millis();
            match (&outcome.result, outcome.success()) {
                (Some(result), true) => {
                    let verb = if result.dry_run { "would publish" } else { "published" };
                    println!("\n✅ {} ({}ms): {} {}", outcome.target, millis, verb, result.version);
                    for name in &result.published {
                        println!("   - {}", name);
                    }
                    for command in &result.commands {
                        println!("   $ {}", command);
                    }
                }
                (Some(result), false) => {
                    println!(
                        "\n⚠️  {} ({}ms): published {} with errors",
                        outcome.target, millis, result.version
                    );
                    for error in &outcome.errors {
                        println!("   - {}", error);
                    }
                }
                (None, _) => {
                    println!("\n❌ {} ({}ms): failed", outcome.target, millis);
                    for error in &outcome.errors {
                        println!("   - {}", error);
                    }
                }
            }
        }

        println!("\n{}", "=".repeat(60));
        println!("Overall Status: {}", if self.success() { "✅ SUCCESS" } else { "❌ FAILED" });
        println!("{}\n", "=".repeat(60));
    }
}

/// BatchPublisher - runs registry plugins concurrently
pub struct BatchPublisher {
    plugins: Vec<Arc<dyn RegistryPlugin>>,
    propagation: PropagationChecker,
}

impl BatchPublisher {
    /// Create a publisher with no plugins
    pub fn new(propagation: PropagationChecker) -> Self {
        Self {
            plugins: Vec::new(),
            propagation,
        }
    }

    /// Register a plugin; a later plugin for the same target replaces the earlier one
    pub fn with_plugin(mut self, plugin: Arc<dyn RegistryPlugin>) -> Self {
        self.plugins.retain(|p| p.target() != plugin.target());
        self.plugins.push(plugin);
        self
    }

    fn plugin(&self, target: PublishTarget) -> Option<Arc<dyn RegistryPlugin>> {
        self.plugins.iter().find(|p| p.target() == target).cloned()
    }

    /// Publish to every target selected in `config`
    pub async fn publish(&self, config: Arc<PublishConfig>) -> BatchPublishResult {
        let targets = config.targets.selected();
        info!(
            targets = %targets.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(", "),
            version = %config.version,
            dry_run = config.dry_run,
            "starting publish"
        );

        let mut result = BatchPublishResult::default();
        let mut tasks = Vec::new();

        for target in targets {
            let Some(plugin) = self.plugin(target) else {
                let error = PublishError::ConfigError(format!("no {} plugin registered", target));
                result.slots[target.slot()] = Some(TargetOutcome::failed(target, error, Duration::ZERO));
                continue;
            };

            let config = Arc::clone(&config);
            let propagation = self.propagation.clone();
            let task = tokio::spawn(async move { run_target(plugin, config, propagation).await });
            tasks.push((target, Instant::now(), task));
        }

        for (target, started, task) in tasks {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(target = %target, error = %e, "publish task aborted");
                    let message = if e.is_panic() {
                        "task panicked".to_string()
                    } else {
                        e.to_string()
                    };
                    let error = PublishError::TaskFailed {
                        registry: target.as_str().to_string(),
                        message,
                    };
                    TargetOutcome::failed(target, error, started.elapsed())
                }
            };
            result.slots[target.slot()] = Some(outcome);
        }

        result
    }
}

async fn run_target(
    plugin: Arc<dyn RegistryPlugin>,
    config: Arc<PublishConfig>,
    propagation: PropagationChecker,
) -> TargetOutcome {
    let target = plugin.target();
    let started = Instant::now();

    let publish_result = match plugin.publish(&config).await {
        Ok(result) => result,
        Err(e) => {
            warn!(target = %target, code = e.code(), "publish failed");
            return TargetOutcome::failed(target, e, started.elapsed());
        }
    };

    let mut errors = Vec::new();
    if !publish_result.dry_run && !publish_result.pending_visibility.is_empty() {
        info!(target = %target, "waiting for registry propagation");
        for package in &publish_result.pending_visibility {
            if let Err(e) = propagation
                .wait_until_visible(package, &publish_result.version)
                .await
            {
                warn!(target = %target, package = %package, "package not visible in time");
                errors.push(e);
            }
        }
    }

    TargetOutcome {
        target,
        result: Some(publish_result),
        errors,
        duration: started.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{NpmConfig, PublishTargets};
    use crate::core::error::{NPM, PYPI};
    use crate::core::poll::PollOptions;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Barrier;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    enum Behavior {
        Succeed(Vec<String>),
        Fail,
        Panic,
        /// Succeed only once the other plugin is running too
        Rendezvous(Arc<Barrier>),
    }

    struct FakePlugin {
        target: PublishTarget,
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl FakePlugin {
        fn new(target: PublishTarget, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                target,
                behavior,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RegistryPlugin for FakePlugin {
        fn target(&self) -> PublishTarget {
            self.target
        }

        fn name(&self) -> &str {
            self.target.as_str()
        }

        async fn publish(&self, config: &PublishConfig) -> Result<PublishResult, PublishError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut result = PublishResult::new(self.target, &config.version, config.dry_run);
            match &self.behavior {
                Behavior::Succeed(pending) => {
                    result.published = pending.clone();
                    if !config.dry_run {
                        result.pending_visibility = pending.clone();
                    }
                    Ok(result)
                }
                Behavior::Fail => Err(PublishError::BuildFailed {
                    registry: self.target.as_str().to_string(),
                    package: "@acme/tool-linux-x64".to_string(),
                    message: "failed to copy binary".to_string(),
                }),
                Behavior::Panic => panic!("plugin exploded"),
                Behavior::Rendezvous(barrier) => {
                    barrier.wait().await;
                    Ok(result)
                }
            }
        }
    }

    fn config(targets: PublishTargets) -> Arc<PublishConfig> {
        Arc::new(PublishConfig {
            name: "tool".to_string(),
            version: "1.0.0".to_string(),
            npm: NpmConfig {
                org: "acme".to_string(),
                ..Default::default()
            },
            targets,
            ..Default::default()
        })
    }

    fn fast_poll(uri: String) -> PropagationChecker {
        PropagationChecker::with_registry(
            uri,
            PollOptions {
                interval: Duration::from_millis(20),
                timeout: Duration::from_millis(200),
            },
        )
    }

    async fn registry(status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_both_targets_succeed() {
        let server = registry(200).await;
        let npm = FakePlugin::new(
            PublishTarget::Npm,
            Behavior::Succeed(vec!["@acme/tool-linux-x64".to_string()]),
        );
        let pypi = FakePlugin::new(PublishTarget::Pypi, Behavior::Succeed(vec![]));
        let publisher = BatchPublisher::new(fast_poll(server.uri()))
            .with_plugin(npm.clone())
            .with_plugin(pypi.clone());

        let result = publisher.publish(config(PublishTargets::All)).await;

        assert!(result.success());
        assert_eq!(result.succeeded(), vec![PublishTarget::Npm, PublishTarget::Pypi]);
        let results = result.into_result().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].target, PublishTarget::Npm);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_npm_failure_does_not_stop_pypi() {
        let server = registry(200).await;
        let npm = FakePlugin::new(PublishTarget::Npm, Behavior::Fail);
        let pypi = FakePlugin::new(PublishTarget::Pypi, Behavior::Succeed(vec![]));
        let publisher = BatchPublisher::new(fast_poll(server.uri()))
            .with_plugin(npm.clone())
            .with_plugin(pypi.clone());

        let result = publisher.publish(config(PublishTargets::All)).await;

        assert_eq!(pypi.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.failed(), vec![PublishTarget::Npm]);
        assert_eq!(result.succeeded(), vec![PublishTarget::Pypi]);
        assert!(result.outcome(PublishTarget::Pypi).unwrap().result.is_some());

        let err = result.into_result().unwrap_err();
        assert_eq!(err.len(), 1);
        assert!(err.to_string().starts_with("[npm] failed to build"));
    }

    #[tokio::test]
    async fn test_errors_from_both_targets_are_joined() {
        let server = registry(200).await;
        let publisher = BatchPublisher::new(fast_poll(server.uri()))
            .with_plugin(FakePlugin::new(PublishTarget::Npm, Behavior::Fail))
            .with_plugin(FakePlugin::new(PublishTarget::Pypi, Behavior::Fail));

        let err = publisher
            .publish(config(PublishTargets::All))
            .await
            .into_result()
            .unwrap_err();

        let registries: Vec<_> = err.errors().iter().map(|e| e.registry()).collect();
        assert_eq!(registries, vec![NPM, PYPI]);
        assert_eq!(err.to_string().lines().count(), 2);
    }

    #[tokio::test]
    async fn test_targets_run_concurrently() {
        let server = registry(200).await;
        let barrier = Arc::new(Barrier::new(2));
        let publisher = BatchPublisher::new(fast_poll(server.uri()))
            .with_plugin(FakePlugin::new(
                PublishTarget::Npm,
                Behavior::Rendezvous(barrier.clone()),
            ))
            .with_plugin(FakePlugin::new(
                PublishTarget::Pypi,
                Behavior::Rendezvous(barrier.clone()),
            ));

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            publisher.publish(config(PublishTargets::All)),
        )
        .await
        .expect("targets should not wait on each other");
        assert!(result.success());
    }

    #[tokio::test]
    async fn test_only_selected_target_runs() {
        let server = registry(200).await;
        let npm = FakePlugin::new(PublishTarget::Npm, Behavior::Succeed(vec![]));
        let pypi = FakePlugin::new(PublishTarget::Pypi, Behavior::Succeed(vec![]));
        let publisher = BatchPublisher::new(fast_poll(server.uri()))
            .with_plugin(npm.clone())
            .with_plugin(pypi.clone());

        let result = publisher.publish(config(PublishTargets::Pypi)).await;

        assert_eq!(npm.calls.load(Ordering::SeqCst), 0);
        assert!(result.outcome(PublishTarget::Npm).is_none());
        assert!(result.success());
    }

    #[tokio::test]
    async fn test_propagation_timeout_keeps_publish_result() {
        let server = registry(404).await;
        let npm = FakePlugin::new(
            PublishTarget::Npm,
            Behavior::Succeed(vec![
                "@acme/tool-linux-x64".to_string(),
                "@acme/tool-darwin-arm64".to_string(),
            ]),
        );
        let pypi = FakePlugin::new(PublishTarget::Pypi, Behavior::Succeed(vec![]));
        let publisher = BatchPublisher::new(fast_poll(server.uri()))
            .with_plugin(npm)
            .with_plugin(pypi);

        let result = publisher.publish(config(PublishTargets::All)).await;

        let npm_outcome = result.outcome(PublishTarget::Npm).unwrap();
        assert!(npm_outcome.result.is_some());
        assert_eq!(npm_outcome.errors.len(), 2);
        assert!(npm_outcome.errors.iter().all(|e| e.code() == "TIMEOUT_ERROR"));
        assert!(result.outcome(PublishTarget::Pypi).unwrap().success());
        assert!(!result.success());
    }

    #[tokio::test]
    async fn test_dry_run_skips_polling() {
        let server = registry(404).await;
        let npm = FakePlugin::new(
            PublishTarget::Npm,
            Behavior::Succeed(vec!["@acme/tool-linux-x64".to_string()]),
        );
        let publisher = BatchPublisher::new(fast_poll(server.uri())).with_plugin(npm);
        let mut cfg = (*config(PublishTargets::Npm)).clone();
        cfg.dry_run = true;

        let result = publisher.publish(Arc::new(cfg)).await;

        assert!(result.success());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_panicking_task_becomes_error() {
        let server = registry(200).await;
        let publisher = BatchPublisher::new(fast_poll(server.uri()))
            .with_plugin(FakePlugin::new(PublishTarget::Npm, Behavior::Panic))
            .with_plugin(FakePlugin::new(PublishTarget::Pypi, Behavior::Succeed(vec![])));

        let result = publisher.publish(config(PublishTargets::All)).await;

        let npm_outcome = result.outcome(PublishTarget::Npm).unwrap();
        assert_eq!(npm_outcome.errors[0].code(), "TASK_FAILED");
        assert!(result.outcome(PublishTarget::Pypi).unwrap().success());
    }

    #[tokio::test]
    async fn test_missing_plugin_reported() {
        let server = registry(200).await;
        let publisher = BatchPublisher::new(fast_poll(server.uri()))
            .with_plugin(FakePlugin::new(PublishTarget::Npm, Behavior::Succeed(vec![])));

        let err = publisher
            .publish(config(PublishTargets::All))
            .await
            .into_result()
            .unwrap_err();
        assert!(err.to_string().contains("no pypi plugin registered"));
    }
}
