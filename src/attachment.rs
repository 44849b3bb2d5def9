// src/attachment.rs
//! Inline tarball attachment decoding
//!
//! Older clients embed the tarball directly in the publish body as a base64
//! string under `_attachments`. The payload is decoded exactly once, checked
//! against its declared length, and handed to the ingest path as raw bytes.

use crate::error::{RegistryError, Result};
use crate::manifest::AttachmentPayload;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Decode an attachment payload into tarball bytes
///
/// Failures are `InvalidManifest` (422): the body was structurally broken
/// even though this runs after the dispatch step.
pub fn decode(payload: &AttachmentPayload) -> Result<Vec<u8>> {
    let bytes = BASE64
        .decode(payload.data.as_bytes())
        .map_err(|e| RegistryError::invalid(format!("attachment is not valid base64: {e}")))?;

    if bytes.is_empty() {
        return Err(RegistryError::invalid(
            "refusing to accept a zero-length tarball attachment",
        ));
    }

    if let Some(declared) = payload.length
        && declared != bytes.len() as u64
    {
        return Err(RegistryError::invalid(format!(
            "attachment length mismatch: declared {declared}, decoded {}",
            bytes.len()
        )));
    }

    Ok(bytes)
}

/// Reduce an attachment key to its base file name
///
/// Clients occasionally send the full tarball path
/// (`pkg/-/pkg-1.0.0.tgz`); the tarball is stored under the final
/// component only.
pub fn base_file_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(data: &str, length: Option<u64>) -> AttachmentPayload {
        AttachmentPayload {
            content_type: Some("application/octet-stream".to_string()),
            data: data.to_string(),
            length,
        }
    }

    #[test]
    fn test_decode_roundtrip() {
        let encoded = BASE64.encode(b"tarball bytes");
        let bytes = decode(&payload(&encoded, Some(13))).unwrap();
        assert_eq!(bytes, b"tarball bytes");
    }

    #[test]
    fn test_decode_without_declared_length() {
        let encoded = BASE64.encode(b"data");
        assert_eq!(decode(&payload(&encoded, None)).unwrap(), b"data");
    }

    #[test]
    fn test_decode_rejects_bad_base64() {
        let err = decode(&payload("not//valid==base64!!", None)).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidManifest(_)));
    }

    #[test]
    fn test_decode_rejects_empty_payload() {
        let err = decode(&payload("", None)).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidManifest(_)));
    }

    #[test]
    fn test_decode_rejects_length_mismatch() {
        let encoded = BASE64.encode(b"four");
        let err = decode(&payload(&encoded, Some(99))).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidManifest(_)));
    }

    #[test]
    fn test_base_file_name() {
        assert_eq!(base_file_name("pkg-1.0.0.tgz"), "pkg-1.0.0.tgz");
        assert_eq!(base_file_name("pkg/-/pkg-1.0.0.tgz"), "pkg-1.0.0.tgz");
        assert_eq!(base_file_name("@scope/pkg/-/pkg-1.0.0.tgz"), "pkg-1.0.0.tgz");
    }
}
