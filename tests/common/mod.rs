// tests/common/mod.rs

//! Shared fixtures for registry integration tests.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;

/// Tarball payload used across the publish tests.
pub const TARBALL: &[u8] = b"fake tarball bytes for integration tests";

/// Build a full npm publish body: one version, a `latest` tag, and the
/// tarball inlined as a base64 attachment.
pub fn publish_body(name: &str, version: &str, tarball: &[u8]) -> Vec<u8> {
    let filename = format!("{name}-{version}.tgz");
    let body = json!({
        "_id": name,
        "name": name,
        "description": "integration fixture",
        "dist-tags": { "latest": version },
        "versions": {
            version: {
                "name": name,
                "version": version,
                "dist": {
                    "tarball": format!("http://localhost:4873/{name}/-/{filename}"),
                },
            },
        },
        "readme": "# fixture readme",
        "_attachments": {
            filename: {
                "content_type": "application/octet-stream",
                "data": STANDARD.encode(tarball),
                "length": tarball.len(),
            },
        },
    });
    serde_json::to_vec(&body).unwrap()
}

/// Build a manifest-only publish body with no attachments.
pub fn bare_body(name: &str, version: &str) -> Vec<u8> {
    let body = json!({
        "name": name,
        "dist-tags": { "latest": version },
        "versions": {
            version: {
                "name": name,
                "version": version,
            },
        },
    });
    serde_json::to_vec(&body).unwrap()
}
