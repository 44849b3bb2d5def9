// src/ingest.rs
//! Tarball ingest
//!
//! Feeds tarball bytes into a backend sink with exactly one terminal
//! outcome per upload: `done` when every byte arrived, `abort` on any
//! failure. Callers get a receipt with the byte count and SHA-256 so
//! they can log or cross-check integrity.

use crate::error::{RegistryError, Result};
use crate::storage::{RegistryBackend, TarballSink};
use futures::{Stream, StreamExt};
use sha2::{Digest, Sha256};

/// Outcome of a completed ingest
#[derive(Debug, Clone)]
pub struct IngestReceipt {
    pub bytes_written: u64,
    /// Hex SHA-256 of the stored bytes
    pub sha256: String,
}

/// Store a fully buffered tarball (the inline attachment path)
pub async fn write_attachment(
    backend: &dyn RegistryBackend,
    package: &str,
    filename: &str,
    bytes: &[u8],
) -> Result<IngestReceipt> {
    if bytes.is_empty() {
        return Err(RegistryError::invalid(
            "refusing to accept a zero-length tarball",
        ));
    }

    let mut sink = backend.open_tarball(package, filename).await?;
    if let Err(e) = sink.write(bytes).await {
        abort_quietly(sink, package, filename).await;
        return Err(e.into());
    }
    sink.done().await?;

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let receipt = IngestReceipt {
        bytes_written: bytes.len() as u64,
        sha256: hex::encode(hasher.finalize()),
    };
    tracing::debug!(
        "Stored tarball {}/{} ({} bytes, sha256 {})",
        package,
        filename,
        receipt.bytes_written,
        receipt.sha256
    );
    Ok(receipt)
}

/// Stream a tarball from the wire into the backend
///
/// An `Err` frame means the client went away mid-upload; the partial
/// write is aborted and the caller sees `UploadInterrupted`. A stream
/// that ends before producing a single byte is refused the same way a
/// zero-length attachment is.
pub async fn pipe_stream<S, B, E>(
    backend: &dyn RegistryBackend,
    package: &str,
    filename: &str,
    mut stream: S,
) -> Result<IngestReceipt>
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut sink = backend.open_tarball(package, filename).await?;
    let mut hasher = Sha256::new();
    let mut bytes_written = 0u64;

    while let Some(frame) = stream.next().await {
        let chunk = match frame {
            Ok(chunk) => chunk,
            Err(e) => {
                abort_quietly(sink, package, filename).await;
                return Err(RegistryError::UploadInterrupted(format!(
                    "client stopped sending '{filename}': {e}"
                )));
            }
        };
        let chunk = chunk.as_ref();
        if let Err(e) = sink.write(chunk).await {
            abort_quietly(sink, package, filename).await;
            return Err(e.into());
        }
        hasher.update(chunk);
        bytes_written += chunk.len() as u64;
    }

    if bytes_written == 0 {
        abort_quietly(sink, package, filename).await;
        return Err(RegistryError::invalid(
            "refusing to accept a zero-length tarball",
        ));
    }

    sink.done().await?;
    let receipt = IngestReceipt {
        bytes_written,
        sha256: hex::encode(hasher.finalize()),
    };
    tracing::debug!(
        "Stored tarball {}/{} ({} bytes, sha256 {})",
        package,
        filename,
        receipt.bytes_written,
        receipt.sha256
    );
    Ok(receipt)
}

/// Abort a sink, keeping the original error as the one the caller sees
async fn abort_quietly(sink: Box<dyn TarballSink>, package: &str, filename: &str) {
    if let Err(e) = sink.abort().await {
        tracing::warn!(
            "Failed to abort tarball upload {}/{}: {}",
            package,
            filename,
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::PackageManifest;
    use crate::storage::MemoryBackend;
    use serde_json::json;
    use std::convert::Infallible;

    async fn backend_with(name: &str) -> MemoryBackend {
        let backend = MemoryBackend::new();
        let manifest = PackageManifest::from_value(
            json!({ "name": name, "versions": { "1.0.0": {} } }),
            name,
        )
        .unwrap();
        backend.create_package(name, &manifest).await.unwrap();
        backend
    }

    #[tokio::test]
    async fn test_write_attachment_stores_bytes() {
        let backend = backend_with("pkg").await;
        let receipt = write_attachment(&backend, "pkg", "pkg-1.0.0.tgz", b"hello world")
            .await
            .unwrap();

        assert_eq!(receipt.bytes_written, 11);
        assert_eq!(
            receipt.sha256,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(
            backend.tarball("pkg", "pkg-1.0.0.tgz").await.unwrap(),
            b"hello world"
        );
    }

    #[tokio::test]
    async fn test_write_attachment_refuses_empty() {
        let backend = backend_with("pkg").await;
        let err = write_attachment(&backend, "pkg", "pkg-1.0.0.tgz", b"")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidManifest(_)));
    }

    #[tokio::test]
    async fn test_pipe_stream_concatenates_frames() {
        let backend = backend_with("pkg").await;
        let frames = futures::stream::iter(vec![
            Ok::<_, Infallible>(b"hello ".to_vec()),
            Ok(b"world".to_vec()),
        ]);

        let receipt = pipe_stream(&backend, "pkg", "pkg-1.0.0.tgz", frames)
            .await
            .unwrap();
        assert_eq!(receipt.bytes_written, 11);
        assert_eq!(
            receipt.sha256,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(
            backend.tarball("pkg", "pkg-1.0.0.tgz").await.unwrap(),
            b"hello world"
        );
    }

    #[tokio::test]
    async fn test_pipe_stream_aborts_on_client_error() {
        let backend = backend_with("pkg").await;
        let frames = futures::stream::iter(vec![
            Ok(b"partial".to_vec()),
            Err("connection reset by peer".to_string()),
        ]);

        let err = pipe_stream(&backend, "pkg", "pkg-1.0.0.tgz", frames)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::UploadInterrupted(_)), "{err}");
        assert!(
            backend.tarball("pkg", "pkg-1.0.0.tgz").await.is_none(),
            "interrupted upload must leave nothing behind"
        );
    }

    #[tokio::test]
    async fn test_pipe_stream_refuses_empty_stream() {
        let backend = backend_with("pkg").await;
        let frames = futures::stream::iter(Vec::<std::result::Result<Vec<u8>, Infallible>>::new());

        let err = pipe_stream(&backend, "pkg", "pkg-1.0.0.tgz", frames)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidManifest(_)));
        assert!(backend.tarball("pkg", "pkg-1.0.0.tgz").await.is_none());
    }

    #[tokio::test]
    async fn test_pipe_stream_unknown_package() {
        let backend = MemoryBackend::new();
        let frames =
            futures::stream::iter(vec![Ok::<_, Infallible>(b"data".to_vec())]);

        let err = pipe_stream(&backend, "ghost", "x.tgz", frames)
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 404);
    }
}
