//! Platform identifier to registry tag lookup
//!
//! The table is built once per process and never mutated.

use lazy_static::lazy_static;
use std::fmt;

/// A target platform, named with Go-style `os/arch` identifiers
/// (`linux/amd64`, `darwin/arm64`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

/// Registry-specific tags for one platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryMapping {
    pub platform: Platform,
    /// Value for the npm `os` field
    pub npm_os: &'static str,
    /// Value for the npm `cpu` field
    pub npm_cpu: &'static str,
    /// Suffix of the platform package name, e.g. `linux-x64`
    pub npm_suffix: &'static str,
    /// Wheel platform tag
    pub wheel_tag: &'static str,
}

lazy_static! {
    static ref MAPPINGS: Vec<RegistryMapping> = vec![
        mapping(
            "linux",
            "amd64",
            "linux",
            "x64",
            "linux-x64",
            "manylinux_2_17_x86_64.manylinux2014_x86_64",
        ),
        mapping(
            "linux",
            "arm64",
            "linux",
            "arm64",
            "linux-arm64",
            "manylinux_2_17_aarch64.manylinux2014_aarch64",
        ),
        mapping("darwin", "amd64", "darwin", "x64", "darwin-x64", "macosx_10_12_x86_64"),
        mapping("darwin", "arm64", "darwin", "arm64", "darwin-arm64", "macosx_11_0_arm64"),
        mapping("windows", "amd64", "win32", "x64", "win32-x64", "win_amd64"),
        mapping("windows", "arm64", "win32", "arm64", "win32-arm64", "win_arm64"),
    ];
}

fn mapping(
    os: &str,
    arch: &str,
    npm_os: &'static str,
    npm_cpu: &'static str,
    npm_suffix: &'static str,
    wheel_tag: &'static str,
) -> RegistryMapping {
    RegistryMapping {
        platform: Platform::new(os, arch),
        npm_os,
        npm_cpu,
        npm_suffix,
        wheel_tag,
    }
}

/// Look up the registry tags for `os/arch`
pub fn lookup(os: &str, arch: &str) -> Option<&'static RegistryMapping> {
    MAPPINGS
        .iter()
        .find(|m| m.platform.os == os && m.platform.arch == arch)
}

/// Every supported platform
pub fn all() -> &'static [RegistryMapping] {
    &MAPPINGS
}

/// Supported platforms as `os/arch` strings, for error messages
pub fn supported() -> Vec<String> {
    all().iter().map(|m| m.platform.to_string()).collect()
}
