// src/manifest.rs
//! Package manifest wire types and validation
//!
//! The publish body is an npm-style package document: top-level name, a
//! versions map, a dist-tags map, an optional readme, and an optional
//! `_attachments` map carrying inline base64 tarballs. Everything the
//! registry does not interpret is carried opaquely so round-trips preserve
//! client fields (`_id`, `description`, ...).

use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Distribution-tag mapping (tag name → version string)
pub type DistTags = BTreeMap<String, String>;

/// Longest package name the registry accepts (npm rule)
const MAX_NAME_LEN: usize = 214;

/// Names that are never valid packages regardless of shape
const FORBIDDEN_NAMES: &[&str] = &["node_modules", "favicon.ico", "__proto__"];

/// One version entry inside a package manifest
///
/// Version metadata is carried opaquely; the orchestrator only owns the
/// readme field, which it populates before the version is recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Readme text, filled in by the publish flow (empty if the manifest
    /// carried none)
    #[serde(default)]
    pub readme: String,

    /// Everything else the client sent for this version
    #[serde(flatten)]
    pub meta: serde_json::Map<String, Value>,
}

/// Inline tarball attachment payload
///
/// Parsed from the manifest, decoded once, discarded after the tarball
/// write completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentPayload {
    /// MIME type as declared by the client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Base64-encoded tarball bytes
    pub data: String,

    /// Declared byte length of the decoded payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
}

/// The package metadata document submitted on publish
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageManifest {
    /// Registry-unique package name
    #[serde(default)]
    pub name: String,

    /// Version string → version record
    #[serde(default)]
    pub versions: BTreeMap<String, VersionRecord>,

    /// Distribution tags (e.g. "latest" → "1.2.3")
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: DistTags,

    /// Inline tarballs, keyed by file name
    #[serde(
        rename = "_attachments",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub attachments: BTreeMap<String, AttachmentPayload>,

    /// Package readme text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme: Option<String>,

    /// Fields we carry but do not interpret (`_id`, `description`, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl PackageManifest {
    /// Deserialize and normalize a publish body against the package name
    /// from the URL
    ///
    /// Normalization fills in a missing manifest name from the URL; a name
    /// that is present but different is a structural violation. All failures
    /// here are local and final — no backend call has happened yet.
    pub fn from_value(value: Value, expected_name: &str) -> Result<Self> {
        validate_name(expected_name)?;

        let mut manifest: PackageManifest = serde_json::from_value(value)
            .map_err(|e| RegistryError::invalid(format!("malformed package document: {e}")))?;

        if manifest.name.is_empty() {
            manifest.name = expected_name.to_string();
        } else if manifest.name != expected_name {
            return Err(RegistryError::invalid(format!(
                "manifest name '{}' does not match URL package '{}'",
                manifest.name, expected_name
            )));
        }

        Ok(manifest)
    }

    /// True when the manifest carries at least one inline attachment
    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }
}

/// Detect an npm star/unstar body: a JSON object whose only key is `users`
pub fn is_star_body(value: &Value) -> bool {
    match value.as_object() {
        Some(map) => map.len() == 1 && map.contains_key("users"),
        None => false,
    }
}

/// Validate a package name
///
/// Rules follow the registry conventions: bounded length, no path games,
/// scopes spelled `@scope/name`, and a handful of names that are never
/// packages.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(RegistryError::invalid("package name is empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(RegistryError::invalid(format!(
            "package name exceeds {MAX_NAME_LEN} characters"
        )));
    }
    if FORBIDDEN_NAMES.contains(&name) || name == "." || name == ".." {
        return Err(RegistryError::invalid(format!(
            "'{name}' is not a valid package name"
        )));
    }
    if name.starts_with('.') || name.starts_with('_') || name.starts_with('-') {
        return Err(RegistryError::invalid(format!(
            "package name '{name}' may not start with '{}'",
            &name[..1]
        )));
    }

    let slashes = name.matches('/').count();
    if slashes > 1 || (slashes == 1 && !name.starts_with('@')) {
        return Err(RegistryError::invalid(format!(
            "package name '{name}' has an invalid scope"
        )));
    }

    let valid_char =
        |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@' | '/');
    if let Some(bad) = name.chars().find(|&c| !valid_char(c)) {
        return Err(RegistryError::invalid(format!(
            "package name '{name}' contains invalid character '{bad}'"
        )));
    }
    if name.contains("..") {
        return Err(RegistryError::invalid(format!(
            "package name '{name}' contains a path traversal"
        )));
    }

    Ok(())
}
