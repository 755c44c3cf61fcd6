//! Artifact parsing and pre-flight checks
//!
//! Artifacts are supplied as `os/arch:path` entries. Every entry is checked
//! before anything is built, and all problems are reported together.

use crate::core::error::PublishError;
use crate::core::platforms::{self, Platform, RegistryMapping};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A pre-built executable for one platform
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub platform: Platform,
    pub mapping: RegistryMapping,
    pub path: PathBuf,
}

impl Artifact {
    /// File name of the binary inside a package: `name`, or `name.exe` on windows
    pub fn binary_name(&self, name: &str) -> String {
        if self.platform.is_windows() {
            format!("{}.exe", name)
        } else {
            name.to_string()
        }
    }
}

/// Parse and check `os/arch:path` entries. Relative paths are resolved
/// against `base_dir`.
pub fn parse_artifacts(entries: &[String], base_dir: &Path) -> Result<Vec<Artifact>, PublishError> {
    let mut seen: HashMap<Platform, &str> = HashMap::new();
    let mut artifacts = Vec::new();
    let mut problems = Vec::new();

    for entry in entries {
        match parse_entry(entry, base_dir, &mut seen) {
            Ok(artifact) => {
                debug!(platform = %artifact.platform, path = %artifact.path.display(), "artifact accepted");
                artifacts.push(artifact);
            }
            Err(problem) => problems.push(problem),
        }
    }

    if !problems.is_empty() {
        return Err(PublishError::ConfigError(problems.join("\n")));
    }
    Ok(artifacts)
}

fn parse_entry<'a>(
    entry: &'a str,
    base_dir: &Path,
    seen: &mut HashMap<Platform, &'a str>,
) -> Result<Artifact, String> {
    let Some((platform_str, path)) = entry.split_once(':') else {
        return Err(format!("invalid --artifact {:?}: expected os/arch:path", entry));
    };
    let Some((os, arch)) = platform_str.split_once('/') else {
        return Err(format!("invalid --artifact {:?}: platform must be os/arch", entry));
    };
    if path.is_empty() {
        return Err(format!("invalid --artifact {:?}: path is empty", entry));
    }

    let mapping = platforms::lookup(os, arch).ok_or_else(|| {
        format!(
            "--artifact {:?}: unsupported platform {}/{} (supported: {})",
            entry,
            os,
            arch,
            platforms::supported().join(", ")
        )
    })?;

    let platform = mapping.platform.clone();
    if let Some(prev) = seen.get(&platform) {
        return Err(format!(
            "duplicate --artifact for {}: {:?} and {:?}",
            platform, prev, entry
        ));
    }
    seen.insert(platform.clone(), entry);

    let path = base_dir.join(path);
    let metadata =
        std::fs::metadata(&path).map_err(|e| format!("--artifact {:?}: {}", entry, e))?;
    if metadata.is_dir() {
        return Err(format!("--artifact {:?}: path is a directory, not a file", entry));
    }
    if metadata.len() == 0 {
        return Err(format!("--artifact {:?}: file is empty", entry));
    }
    if !platform.is_windows() && !is_executable(&metadata) {
        return Err(format!("--artifact {:?}: file is not executable", entry));
    }

    Ok(Artifact {
        platform,
        mapping: mapping.clone(),
        path,
    })
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    true
}
