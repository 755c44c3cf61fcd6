//! Launcher templates embedded in the packages
//!
//! The Python shim becomes `<pkg>/__init__.py` inside every wheel; the
//! JavaScript wrapper becomes `bin/<name>` in the root npm package.

use crate::core::platforms;

const SHIM_TEMPLATE: &str = include_str!("templates/shim.py");
const WRAPPER_TEMPLATE: &str = include_str!("templates/wrapper.js");

const BIN_PLACEHOLDER: &str = "__BIN_NAME__";
const ORG_PLACEHOLDER: &str = "__ORG_NAME__";
const PLATFORMS_PLACEHOLDER: &str = "__PLATFORMS__";

/// Render the Python import shim for `bin_name`
pub fn render_shim(bin_name: &str) -> String {
    SHIM_TEMPLATE.replace(BIN_PLACEHOLDER, bin_name)
}

/// Render the npm launcher that resolves `@<org>/<bin_name>-<os>-<cpu>`
pub fn wrapper_script(bin_name: &str, org: &str) -> String {
    let supported = platforms::all()
        .iter()
        .map(|m| format!("\"{}\"", m.npm_suffix))
        .collect::<Vec<_>>()
        .join(", ");

    WRAPPER_TEMPLATE
        .replace(BIN_PLACEHOLDER, bin_name)
        .replace(ORG_PLACEHOLDER, org)
        .replace(PLATFORMS_PLACEHOLDER, &supported)
}
