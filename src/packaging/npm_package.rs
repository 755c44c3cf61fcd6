//! npm package assembler
//!
//! Builds one `@<org>/<name>-<os>-<cpu>` package per artifact and a root
//! package `<name>` that pulls the right one in through
//! `optionalDependencies`. Every package lives in its own temporary
//! directory, owned by a [`BuiltPackage`] guard.

use crate::core::artifact::Artifact;
use crate::core::config::PublishConfig;
use crate::core::error::{NPM, PublishError};
use crate::packaging::templates::wrapper_script;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tempfile::TempDir;
use tracing::debug;

const EXECUTABLE_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;

/// `package.json` contents written by the assembler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageJson {
    pub name: String,
    pub version: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub license: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub os: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cpu: Vec<String>,
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bin: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub optional_dependencies: BTreeMap<String, String>,
}

/// A package directory ready for `npm publish`
///
/// The directory is removed when the guard is dropped; [`BuiltPackage::release`]
/// does the same but reports removal errors.
#[derive(Debug)]
pub struct BuiltPackage {
    dir: TempDir,
    name: String,
}

impl BuiltPackage {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn release(self) -> std::io::Result<()> {
        self.dir.close()
    }
}

/// Every platform package of one run, in artifact order
#[derive(Debug, Default)]
pub struct PlatformPackages {
    packages: Vec<BuiltPackage>,
}

impl PlatformPackages {
    pub fn iter(&self) -> impl Iterator<Item = &BuiltPackage> {
        self.packages.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.packages.iter().map(|p| p.name.clone()).collect()
    }

    /// Remove every directory; all removals are attempted, the first error is returned
    pub fn release(self) -> std::io::Result<()> {
        let mut first_error = None;
        for package in self.packages {
            if let Err(e) = package.release() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// `@<org>/<name>-<suffix>`
pub fn platform_package_name(org: &str, name: &str, artifact: &Artifact) -> String {
    format!("@{}/{}-{}", org, name, artifact.mapping.npm_suffix)
}

/// Build one package per artifact. On error, directories created so far are removed.
pub async fn build_platform_packages(config: &PublishConfig) -> Result<PlatformPackages, PublishError> {
    build_platform_packages_in(config, &std::env::temp_dir()).await
}

async fn build_platform_packages_in(
    config: &PublishConfig,
    temp_root: &Path,
) -> Result<PlatformPackages, PublishError> {
    let mut built = PlatformPackages::default();

    for artifact in &config.artifacts {
        let package = build_platform_package(config, artifact, temp_root).await?;
        debug!(package = %package.name, dir = %package.path().display(), "assembled platform package");
        built.packages.push(package);
    }

    Ok(built)
}

async fn build_platform_package(
    config: &PublishConfig,
    artifact: &Artifact,
    temp_root: &Path,
) -> Result<BuiltPackage, PublishError> {
    let name = platform_package_name(&config.npm.org, &config.name, artifact);
    let dir = temp_dir(temp_root, "shipbin-npm-", &name)?;

    let bin_dir = dir.path().join("bin");
    tokio::fs::create_dir_all(&bin_dir)
        .await
        .map_err(|e| build_error(&name, format!("failed to create bin dir: {}", e)))?;
    copy_file(
        &artifact.path,
        &bin_dir.join(artifact.binary_name(&config.name)),
        EXECUTABLE_MODE,
        &name,
    )
    .await?;

    let manifest = PackageJson {
        name: name.clone(),
        version: config.version.clone(),
        description: format!("{} binary for {}", config.name, artifact.mapping.npm_suffix),
        license: config.license.clone(),
        os: vec![artifact.mapping.npm_os.to_string()],
        cpu: vec![artifact.mapping.npm_cpu.to_string()],
        files: vec!["bin".to_string()],
        bin: BTreeMap::new(),
        optional_dependencies: BTreeMap::new(),
    };
    write_json(&dir.path().join("package.json"), &manifest, &name).await?;

    Ok(BuiltPackage { dir, name })
}

/// Build the root package with the launcher and `optionalDependencies`
pub async fn build_root_package(config: &PublishConfig) -> Result<BuiltPackage, PublishError> {
    let name = config.name.clone();
    let dir = temp_dir(&std::env::temp_dir(), "shipbin-npm-root-", &name)?;

    let bin_dir = dir.path().join("bin");
    tokio::fs::create_dir_all(&bin_dir)
        .await
        .map_err(|e| build_error(&name, format!("failed to create bin dir: {}", e)))?;
    let wrapper_path = bin_dir.join(&config.name);
    tokio::fs::write(&wrapper_path, wrapper_script(&config.name, &config.npm.org))
        .await
        .map_err(|e| build_error(&name, format!("failed to write wrapper script: {}", e)))?;
    set_mode(&wrapper_path, EXECUTABLE_MODE, &name).await?;

    let optional_dependencies = config
        .artifacts
        .iter()
        .map(|a| {
            (
                platform_package_name(&config.npm.org, &config.name, a),
                config.version.clone(),
            )
        })
        .collect();

    let description = if config.summary.is_empty() {
        format!("Install {}: native binary distributed via npm", config.name)
    } else {
        config.summary.clone()
    };

    let manifest = PackageJson {
        name: name.clone(),
        version: config.version.clone(),
        description,
        license: config.license.clone(),
        os: Vec::new(),
        cpu: Vec::new(),
        files: vec!["bin".to_string()],
        bin: BTreeMap::from([(config.name.clone(), format!("bin/{}", config.name))]),
        optional_dependencies,
    };
    write_json(&dir.path().join("package.json"), &manifest, &name).await?;

    if let Some(readme) = &config.readme {
        copy_file(readme, &dir.path().join("README.md"), FILE_MODE, &name).await?;
    }

    debug!(package = %name, dir = %dir.path().display(), "assembled root package");
    Ok(BuiltPackage { dir, name })
}

fn temp_dir(temp_root: &Path, prefix: &str, package: &str) -> Result<TempDir, PublishError> {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir_in(temp_root)
        .map_err(|e| build_error(package, format!("failed to create temp dir: {}", e)))
}

async fn copy_file(src: &Path, dst: &Path, mode: u32, package: &str) -> Result<(), PublishError> {
    tokio::fs::copy(src, dst)
        .await
        .map_err(|source| PublishError::ReadFailed {
            registry: NPM.to_string(),
            path: src.to_path_buf(),
            source,
        })?;
    set_mode(dst, mode, package).await
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32, package: &str) -> Result<(), PublishError> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|e| build_error(package, format!("failed to set permissions on {}: {}", path.display(), e)))
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32, _package: &str) -> Result<(), PublishError> {
    Ok(())
}

/// Two-space indented JSON with a trailing newline
async fn write_json(path: &Path, manifest: &PackageJson, package: &str) -> Result<(), PublishError> {
    let mut data = serde_json::to_vec_pretty(manifest)
        .map_err(|e| build_error(package, format!("failed to encode package.json: {}", e)))?;
    data.push(b'\n');
    tokio::fs::write(path, data)
        .await
        .map_err(|e| build_error(package, format!("failed to write package.json: {}", e)))
}

fn build_error(package: &str, message: String) -> PublishError {
    PublishError::BuildFailed {
        registry: NPM.to_string(),
        package: package.to_string(),
        message,
    }
}
