//! Configuration loader for shipbin
//!
//! Layers defaults, the project file (`.shipbin.yaml`) and CLI overrides
//! into a validated [`PublishConfig`].

use super::config::*;
use crate::core::artifact::parse_artifacts;
use crate::core::error::PublishError;
use crate::security::{CommandRunner, GIT_TIMEOUT, SafeCommandExecutor};
use crate::validation::VersionValidator;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

/// Configuration file name
pub const CONFIG_FILENAME: &str = ".shipbin.yaml";

/// Values given on the command line (highest priority)
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub name: Option<String>,
    pub version: Option<String>,
    pub license: Option<String>,
    pub summary: Option<String>,
    pub readme: Option<PathBuf>,
    /// Raw `os/arch:path` entries
    pub artifacts: Vec<String>,
    pub org: Option<String>,
    pub tag: Option<String>,
    pub provenance: Option<bool>,
    pub target: Option<PublishTargets>,
    pub dry_run: bool,
}

/// Configuration load options
#[derive(Debug, Clone)]
pub struct ConfigLoadOptions {
    /// Project path; relative artifact and readme paths resolve against it
    pub project_path: PathBuf,

    /// Explicit config file, instead of `<project_path>/.shipbin.yaml`
    pub config_file: Option<PathBuf>,

    pub overrides: ConfigOverrides,
}

impl ConfigLoadOptions {
    pub fn new(project_path: impl Into<PathBuf>) -> Self {
        Self {
            project_path: project_path.into(),
            config_file: None,
            overrides: ConfigOverrides::default(),
        }
    }
}

/// Configuration file loader
pub struct ConfigLoader {
    runner: Arc<dyn CommandRunner>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::with_runner(Arc::new(SafeCommandExecutor::with_timeout(GIT_TIMEOUT)))
    }

    /// Use a custom runner for `git`
    pub fn with_runner(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Load and validate configuration
    ///
    /// Priority (high to low):
    /// 1. CLI overrides
    /// 2. Project config (`.shipbin.yaml` or `--config`)
    /// 3. Default values
    pub async fn load(&self, options: ConfigLoadOptions) -> Result<PublishConfig, PublishError> {
        let file_config = match &options.config_file {
            Some(path) => {
                let path = options.project_path.join(path);
                Some(Self::load_config_file(&path).await?.ok_or_else(|| {
                    PublishError::ConfigError(format!(
                        "config file not found: {}",
                        path.display()
                    ))
                })?)
            }
            None => Self::load_config_file(&options.project_path.join(CONFIG_FILENAME)).await?,
        };

        let overrides = options.overrides;
        let project = file_config.unwrap_or_default();
        let npm_file = project.npm.clone().unwrap_or_default();

        let version = match overrides.version {
            Some(v) => v,
            None => self.git_tag_version(&options.project_path).await?,
        };
        let version = VersionValidator::new().normalize(&version)?;

        let readme = overrides
            .readme
            .or(project.readme)
            .map(|p| options.project_path.join(p));

        let mut config = PublishConfig {
            name: overrides.name.or(project.name).unwrap_or_default(),
            version,
            license: overrides.license.or(project.license).unwrap_or_default(),
            summary: overrides.summary.or(project.summary).unwrap_or_default(),
            readme,
            artifacts: Vec::new(),
            npm: NpmConfig {
                org: overrides.org.or(npm_file.org).unwrap_or_default(),
                tag: overrides
                    .tag
                    .or(npm_file.tag)
                    .unwrap_or_else(|| DEFAULT_TAG.to_string()),
                provenance: overrides.provenance.or(npm_file.provenance).unwrap_or(false),
            },
            targets: overrides.target.or(project.target).unwrap_or_default(),
            dry_run: overrides.dry_run,
        };

        config.artifacts = parse_artifacts(&overrides.artifacts, &options.project_path)?;
        config.validate()?;

        info!(
            name = %config.name,
            version = %config.version,
            targets = %config.targets,
            artifacts = config.artifacts.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Load the project file; a missing file is not an error
    async fn load_config_file(path: &Path) -> Result<Option<ProjectConfig>, PublishError> {
        let exists = fs::try_exists(path).await.map_err(|e| {
            PublishError::ConfigError(format!("failed to read {}: {}", path.display(), e))
        })?;
        if !exists {
            debug!(path = %path.display(), "no config file");
            return Ok(None);
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            PublishError::ConfigError(format!("failed to read {}: {}", path.display(), e))
        })?;

        if content.trim().is_empty() {
            return Ok(Some(ProjectConfig::default()));
        }

        let config: ProjectConfig = serde_yaml::from_str(&content).map_err(|e| {
            PublishError::ConfigError(format!("failed to parse {}: {}", path.display(), e))
        })?;

        debug!(path = %path.display(), "loaded config file");
        Ok(Some(config))
    }

    /// Version from an exact git tag on HEAD
    async fn git_tag_version(&self, project_path: &Path) -> Result<String, PublishError> {
        let args = ["describe", "--tags", "--exact-match"].map(String::from);
        let output = self
            .runner
            .run("git", &args, project_path)
            .await
            .map_err(|e| {
                PublishError::ConfigError(format!(
                    "--version not provided and no exact git tag found: {}",
                    e
                ))
            })?;

        let tag = output.stdout.trim();
        if !output.success || tag.is_empty() {
            return Err(PublishError::ConfigError(format!(
                "--version not provided and no exact git tag found: {}",
                output.stderr.trim()
            )));
        }

        debug!(tag, "version from git tag");
        Ok(tag.to_string())
    }
}
