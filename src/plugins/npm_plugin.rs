//! NPM Plugin - npm registry publishing implementation
//!
//! Publishes one package per platform and then the root package, each with
//! `npm publish --access public --tag <tag> [--provenance]` run inside the
//! assembled package directory. The npm CLI handles authentication through
//! the user's `.npmrc` / `NODE_AUTH_TOKEN`; failures are translated from the
//! `npm ERR! code <X>` line of its output.

use crate::core::config::{PublishConfig, PublishTarget};
use crate::core::error::{NPM, PublishError};
use crate::core::traits::{PublishResult, RegistryPlugin};
use crate::packaging::{BuiltPackage, build_platform_packages, build_root_package};
use crate::security::{CommandRunner, NPM_PUBLISH_TIMEOUT, SafeCommandExecutor};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

const ERROR_CODE_PREFIXES: &[&str] = &["npm ERR! code ", "npm error code "];

/// npm registry plugin
pub struct NpmPlugin {
    runner: Arc<dyn CommandRunner>,
}

impl Default for NpmPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl NpmPlugin {
    pub fn new() -> Self {
        Self::with_runner(Arc::new(SafeCommandExecutor::with_timeout(NPM_PUBLISH_TIMEOUT)))
    }

    /// Use a custom process runner
    pub fn with_runner(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Arguments passed to `npm`
    pub fn publish_args(tag: &str, provenance: bool) -> Vec<String> {
        let mut args = vec![
            "publish".to_string(),
            "--access".to_string(),
            "public".to_string(),
            "--tag".to_string(),
            tag.to_string(),
        ];
        if provenance {
            args.push("--provenance".to_string());
        }
        args
    }

    async fn publish_package(
        &self,
        package: &BuiltPackage,
        config: &PublishConfig,
        result: &mut PublishResult,
    ) -> Result<(), PublishError> {
        let args = Self::publish_args(&config.npm.tag, config.npm.provenance);

        if config.dry_run {
            let command = format!("npm {} (in {})", args.join(" "), package.path().display());
            info!("npm: [dry run] {}", command);
            result.commands.push(command);
            result.published.push(package.name().to_string());
            return Ok(());
        }

        info!(package = package.name(), "npm: publishing");
        let output = self
            .runner
            .run("npm", &args, package.path())
            .await
            .map_err(|e| PublishError::CommandError {
                registry: NPM.to_string(),
                message: format!("{}: {}", package.name(), e),
            })?;

        if !output.success {
            return Err(npm_error(&output.combined(), package.name()));
        }

        result.published.push(package.name().to_string());
        Ok(())
    }
}

/// Translate npm output into a [`PublishError`] using the first `code` line
pub fn npm_error(output: &str, package: &str) -> PublishError {
    let registry = NPM.to_string();
    let package = package.to_string();

    for line in output.lines() {
        let line = line.trim();
        let Some(code) = ERROR_CODE_PREFIXES
            .iter()
            .find_map(|prefix| line.strip_prefix(prefix))
        else {
            continue;
        };

        match code.trim() {
            "EOTP" => return PublishError::OtpRequired { registry, package },
            "ENEEDAUTH" | "E401" => return PublishError::NotAuthenticated { registry, package },
            "E403" => return PublishError::PermissionDenied { registry, package },
            "E409" | "EPUBLISHCONFLICT" => {
                return PublishError::VersionConflict { registry, package };
            }
            "ENOTFOUND" | "ETIMEDOUT" | "ECONNREFUSED" => {
                return PublishError::NetworkError {
                    registry,
                    package,
                    message: "unable to reach the npm registry, check your connection".to_string(),
                };
            }
            "EUSAGE" if output.contains("provenance") => {
                return PublishError::ProvenanceUnsupported { registry, package };
            }
            _ => {}
        }
    }

    PublishError::PublishFailed {
        registry,
        package,
        message: output.trim().to_string(),
    }
}

#[async_trait]
impl RegistryPlugin for NpmPlugin {
    fn target(&self) -> PublishTarget {
        PublishTarget::Npm
    }

    fn name(&self) -> &str {
        NPM
    }

    async fn publish(&self, config: &PublishConfig) -> Result<PublishResult, PublishError> {
        let mut result = PublishResult::new(PublishTarget::Npm, &config.version, config.dry_run);
        let verb = if config.dry_run { "would publish" } else { "publishing" };
        info!(version = %config.version, "npm: {} {} package(s)", verb, config.artifacts.len() + 1);

        // Dropping a guard on an early return removes its directory.
        let platforms = build_platform_packages(config).await?;
        for package in platforms.iter() {
            self.publish_package(package, config, &mut result).await?;
        }

        let root = build_root_package(config).await?;
        self.publish_package(&root, config, &mut result).await?;

        if !config.dry_run {
            result.pending_visibility = platforms.names();
        }

        if let Err(e) = platforms.release() {
            warn!(error = %e, "npm: failed to remove platform package directories");
        }
        if let Err(e) = root.release() {
            warn!(error = %e, "npm: failed to remove root package directory");
        }

        info!("npm: done");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::artifact::Artifact;
    use crate::core::config::NpmConfig;
    use crate::core::platforms;
    use crate::packaging::PackageJson;
    use crate::security::{CommandError, CommandOutput};
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records every call and fails for one package name
    #[derive(Default)]
    struct FakeRunner {
        calls: Mutex<Vec<(String, Vec<String>, PathBuf)>>,
        fail_package: Option<(String, String)>,
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(
            &self,
            command: &str,
            args: &[String],
            dir: &Path,
        ) -> Result<CommandOutput, CommandError> {
            let raw = std::fs::read_to_string(dir.join("package.json")).unwrap();
            let manifest: PackageJson = serde_json::from_str(&raw).unwrap();
            self.calls
                .lock()
                .unwrap()
                .push((command.to_string(), args.to_vec(), dir.to_path_buf()));

            match &self.fail_package {
                Some((name, output)) if *name == manifest.name => Ok(CommandOutput {
                    success: false,
                    code: Some(1),
                    stdout: String::new(),
                    stderr: output.clone(),
                }),
                _ => Ok(CommandOutput {
                    success: true,
                    code: Some(0),
                    stdout: format!("+ {}@{}", manifest.name, manifest.version),
                    stderr: String::new(),
                }),
            }
        }
    }

    impl FakeRunner {
        fn dirs(&self) -> Vec<PathBuf> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(_, _, dir)| dir.clone())
                .collect()
        }
    }

    fn config(dir: &Path) -> PublishConfig {
        let artifacts = [("linux", "amd64"), ("darwin", "arm64")]
            .iter()
            .map(|(os, arch)| {
                let path = dir.join(format!("tool-{}-{}", os, arch));
                std::fs::write(&path, b"bin").unwrap();
                let mapping = platforms::lookup(os, arch).unwrap().clone();
                Artifact {
                    platform: mapping.platform.clone(),
                    mapping,
                    path,
                }
            })
            .collect();

        PublishConfig {
            name: "tool".to_string(),
            version: "3.1.0".to_string(),
            artifacts,
            npm: NpmConfig {
                org: "acme".to_string(),
                tag: "next".to_string(),
                provenance: true,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_publish_args() {
        assert_eq!(
            NpmPlugin::publish_args("latest", false),
            vec!["publish", "--access", "public", "--tag", "latest"]
        );
        assert_eq!(
            NpmPlugin::publish_args("beta", true).last().map(String::as_str),
            Some("--provenance")
        );
    }

    #[test]
    fn test_npm_error_mapping() {
        let cases = [
            ("npm ERR! code EOTP", "OTP_REQUIRED", "2FA is blocking publish"),
            ("npm ERR! code ENEEDAUTH", "NOT_AUTHENTICATED", "not authenticated"),
            ("npm ERR! code E401", "NOT_AUTHENTICATED", "generate a token with npm"),
            ("npm ERR! code E403", "PERMISSION_DENIED", "permission denied"),
            ("npm ERR! code E409", "VERSION_CONFLICT", "already exists"),
            ("npm error code EPUBLISHCONFLICT", "VERSION_CONFLICT", "already been published"),
            ("npm ERR! code ETIMEDOUT", "NETWORK_ERROR", "unable to reach the npm registry"),
            ("npm ERR! code ECONNREFUSED", "NETWORK_ERROR", "network error"),
        ];

        for (output, code, fragment) in cases {
            let err = npm_error(&format!("npm notice\n  {}\nnpm ERR! more", output), "@acme/tool-linux-x64");
            assert_eq!(err.code(), code, "{}", output);
            assert!(err.to_string().contains(fragment), "{}", err);
            assert!(err.to_string().starts_with("[npm] @acme/tool-linux-x64"));
        }
    }

    #[test]
    fn test_npm_error_provenance_and_fallback() {
        let err = npm_error("npm ERR! code EUSAGE\nnpm ERR! provenance generation failed", "tool");
        assert_eq!(err.code(), "PROVENANCE_UNSUPPORTED");
        assert!(err.to_string().contains("--provenance=false"));

        let err = npm_error("npm ERR! code EUSAGE\nnpm ERR! bad flag", "tool");
        assert_eq!(err.code(), "PUBLISH_FAILED");

        let err = npm_error("  something odd happened\n", "tool");
        assert_eq!(err.to_string(), "[npm] tool: publish failed: something odd happened");
    }

    #[tokio::test]
    async fn test_publishes_platforms_before_root() {
        let src = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::default());
        let plugin = NpmPlugin::with_runner(runner.clone());
        let cfg = config(src.path());

        let result = plugin.publish(&cfg).await.unwrap();

        assert_eq!(
            result.published,
            vec!["@acme/tool-linux-x64", "@acme/tool-darwin-arm64", "tool"]
        );
        assert_eq!(
            result.pending_visibility,
            vec!["@acme/tool-linux-x64", "@acme/tool-darwin-arm64"]
        );
        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        for (command, args, dir) in calls.iter() {
            assert_eq!(command, "npm");
            assert_eq!(args, &NpmPlugin::publish_args("next", true));
            assert!(!dir.exists(), "package directory should be removed");
        }
    }

    #[tokio::test]
    async fn test_platform_failure_skips_root() {
        let src = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner {
            fail_package: Some((
                "@acme/tool-linux-x64".to_string(),
                "npm ERR! code E403\nnpm ERR! 403 Forbidden".to_string(),
            )),
            ..Default::default()
        });
        let plugin = NpmPlugin::with_runner(runner.clone());

        let err = plugin.publish(&config(src.path())).await.unwrap_err();

        assert_eq!(err.code(), "PERMISSION_DENIED");
        assert!(err.to_string().contains("@acme/tool-linux-x64"));
        assert_eq!(runner.calls.lock().unwrap().len(), 1);
        assert!(runner.dirs().iter().all(|d| !d.exists()));
    }

    #[tokio::test]
    async fn test_dry_run_spawns_nothing() {
        let src = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::default());
        let plugin = NpmPlugin::with_runner(runner.clone());
        let mut cfg = config(src.path());
        cfg.dry_run = true;

        let result = plugin.publish(&cfg).await.unwrap();

        assert!(runner.calls.lock().unwrap().is_empty());
        assert!(result.dry_run);
        assert!(result.pending_visibility.is_empty());
        assert_eq!(result.commands.len(), 3);
        assert!(
            result.commands[0]
                .starts_with("npm publish --access public --tag next --provenance (in ")
        );
    }
}
