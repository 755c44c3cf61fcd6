//! Wheel builder
//!
//! Produces one binary distribution (`.whl`) per platform artifact, entirely
//! in memory. Entries are stored uncompressed with a fixed 1980-01-01
//! timestamp, so identical inputs always yield byte-identical archives.
//!
//! Layout of a wheel for binary `my-tool` on linux/amd64:
//!
//! ```text
//! my_tool/bin/my-tool                      0755
//! my_tool/__init__.py                      0644  (launcher shim)
//! my_tool-1.2.3.dist-info/METADATA
//! my_tool-1.2.3.dist-info/WHEEL
//! my_tool-1.2.3.dist-info/entry_points.txt
//! my_tool-1.2.3.dist-info/RECORD
//! ```

use crate::core::artifact::Artifact;
use crate::core::config::PublishConfig;
use crate::core::error::{PYPI, PublishError};
use crate::packaging::templates::render_shim;
use crate::validation::VersionValidator;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::io::{Cursor, Write};
use std::path::Path;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

const EXECUTABLE_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;

/// A built wheel, held in memory until upload
#[derive(Debug, Clone, PartialEq)]
pub struct WheelFile {
    pub filename: String,
    /// Distribution name with `-` and `.` replaced by `_`
    pub name: String,
    pub version: String,
    pub summary: String,
    pub license: String,
    pub description: String,
    pub description_content_type: String,
    pub data: Vec<u8>,
}

impl WheelFile {
    /// Lowercase hex SHA-256 of the archive bytes
    pub fn sha256_hex(&self) -> String {
        hex::encode(Sha256::digest(&self.data))
    }
}

/// Replace `-` and `.` with `_`, as wheel filenames require
pub fn normalize_name(name: &str) -> String {
    name.replace(['-', '.'], "_")
}

/// Wheel filename: `{name}-{version}-py3-none-{platform_tag}.whl`
pub fn wheel_filename(name: &str, pypi_version: &str, wheel_tag: &str) -> String {
    format!("{}-{}-py3-none-{}.whl", normalize_name(name), pypi_version, wheel_tag)
}

/// Build the wheel for one artifact.
///
/// The version is checked against PEP 440 before any file is read.
pub fn build_wheel(config: &PublishConfig, artifact: &Artifact) -> Result<WheelFile, PublishError> {
    let version = VersionValidator::new().to_pypi_version(&config.version)?;
    let name = normalize_name(&config.name);
    let wheel_tag = artifact.mapping.wheel_tag;
    let filename = wheel_filename(&config.name, &version, wheel_tag);
    let dist_info = format!("{}-{}.dist-info", name, version);

    let binary = std::fs::read(&artifact.path).map_err(|source| PublishError::ReadFailed {
        registry: PYPI.to_string(),
        path: artifact.path.clone(),
        source,
    })?;
    let (description, content_type) = match &config.readme {
        Some(path) => read_description(path)?,
        None => (String::new(), String::new()),
    };

    let mut writer = WheelWriter::new(&filename);
    writer.add(
        &format!("{}/bin/{}", name, artifact.binary_name(&config.name)),
        &binary,
        EXECUTABLE_MODE,
    )?;
    writer.add(
        &format!("{}/__init__.py", name),
        render_shim(&config.name).as_bytes(),
        FILE_MODE,
    )?;
    let metadata = build_metadata(
        &name,
        &version,
        &config.summary,
        &config.license,
        &description,
        &content_type,
    );
    writer.add(&format!("{}/METADATA", dist_info), metadata.as_bytes(), FILE_MODE)?;
    writer.add(
        &format!("{}/WHEEL", dist_info),
        build_wheel_meta(wheel_tag).as_bytes(),
        FILE_MODE,
    )?;
    let entry_points = format!("[console_scripts]\n{} = {}:main\n", config.name, name);
    writer.add(
        &format!("{}/entry_points.txt", dist_info),
        entry_points.as_bytes(),
        FILE_MODE,
    )?;
    let data = writer.finish(&format!("{}/RECORD", dist_info))?;

    debug!(wheel = %filename, bytes = data.len(), "built wheel");

    Ok(WheelFile {
        filename,
        name,
        version,
        summary: config.summary.clone(),
        license: config.license.clone(),
        description,
        description_content_type: content_type,
        data,
    })
}

/// Zip writer that records every entry for RECORD
struct WheelWriter {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    record: String,
    filename: String,
}

impl WheelWriter {
    fn new(filename: &str) -> Self {
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            record: String::new(),
            filename: filename.to_string(),
        }
    }

    fn add(&mut self, path: &str, data: &[u8], mode: u32) -> Result<(), PublishError> {
        self.write_entry(path, data, mode)?;
        let digest = URL_SAFE_NO_PAD.encode(Sha256::digest(data));
        // writing to a String cannot fail
        let _ = writeln!(self.record, "{},sha256={},{}", path, digest, data.len());
        Ok(())
    }

    fn write_entry(&mut self, path: &str, data: &[u8], mode: u32) -> Result<(), PublishError> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .unix_permissions(mode)
            .last_modified_time(DateTime::default());

        self.zip
            .start_file(path, options)
            .map_err(|source| self.archive_error(source))?;
        self.zip.write_all(data).map_err(|e| PublishError::BuildFailed {
            registry: PYPI.to_string(),
            package: self.filename.clone(),
            message: format!("failed to write zip entry {}: {}", path, e),
        })
    }

    /// Append RECORD (which lists itself without a hash) and close the archive
    fn finish(mut self, record_path: &str) -> Result<Vec<u8>, PublishError> {
        let mut record = std::mem::take(&mut self.record);
        let _ = writeln!(record, "{},,", record_path);
        self.write_entry(record_path, record.as_bytes(), FILE_MODE)?;

        let filename = self.filename;
        self.zip
            .finish()
            .map(Cursor::into_inner)
            .map_err(|source| PublishError::ArchiveFailed {
                registry: PYPI.to_string(),
                package: filename,
                source,
            })
    }

    fn archive_error(&self, source: zip::result::ZipError) -> PublishError {
        PublishError::ArchiveFailed {
            registry: PYPI.to_string(),
            package: self.filename.clone(),
            source,
        }
    }
}

/// Core metadata (`METADATA`). Empty optional fields are omitted.
pub fn build_metadata(
    name: &str,
    version: &str,
    summary: &str,
    license: &str,
    description: &str,
    content_type: &str,
) -> String {
    let mut out = String::new();
    out.push_str("Metadata-Version: 2.1\n");
    let _ = writeln!(out, "Name: {}", name);
    let _ = writeln!(out, "Version: {}", version);
    if !summary.is_empty() {
        let _ = writeln!(out, "Summary: {}", summary);
    }
    if !license.is_empty() {
        let _ = writeln!(out, "License: {}", license);
    }
    out.push_str("Requires-Python: >=3.7\n");
    if !description.is_empty() {
        let _ = writeln!(out, "Description-Content-Type: {}", content_type);
        out.push('\n');
        out.push_str(description);
    }
    out
}

/// Wheel metadata (`WHEEL`)
pub fn build_wheel_meta(platform_tag: &str) -> String {
    format!(
        "Wheel-Version: 1.0\nGenerator: shipbin\nRoot-Is-Purelib: false\nTag: py3-none-{}\n",
        platform_tag
    )
}

/// Read a long description and pick its content type from the extension
pub fn read_description(path: &Path) -> Result<(String, String), PublishError> {
    let content = std::fs::read_to_string(path).map_err(|source| PublishError::ReadFailed {
        registry: PYPI.to_string(),
        path: path.to_path_buf(),
        source,
    })?;
    Ok((content, description_content_type(path).to_string()))
}

fn description_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("md") | Some("markdown") => "text/markdown",
        Some("rst") => "text/x-rst",
        _ => "text/plain",
    }
}
