// src/storage/mod.rs
//! Storage backend contract
//!
//! The registry core never touches bytes on disk itself; it drives a
//! `RegistryBackend` through a narrow interface and treats its answers as
//! authoritative. Backends signal failures with an optional HTTP-style
//! status code — 409 is the one status the orchestrator inspects.
//!
//! Tarball writes go through a `TarballSink`: a write-capable byte sink
//! with states `open → writing → {completed | aborted | errored}`. The
//! terminal transitions (`done`, `abort`) consume the sink, so exactly one
//! terminal outcome can ever fire for a given write.

mod fs;
mod memory;

pub use fs::FsBackend;
pub use memory::MemoryBackend;

use crate::error::BackendError;
use crate::manifest::{DistTags, PackageManifest, VersionRecord};
use async_trait::async_trait;

/// Result type for backend operations
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// An in-flight tarball write
///
/// Handed out by [`RegistryBackend::open_tarball`]; the caller feeds it
/// bytes and then drives exactly one terminal transition. Dropping a sink
/// without calling either terminal method leaves the write errored and the
/// partial data is never visible as a completed tarball.
#[async_trait]
pub trait TarballSink: Send {
    /// Append a chunk of tarball bytes
    async fn write(&mut self, chunk: &[u8]) -> BackendResult<()>;

    /// Finalize the write: the tarball becomes durably visible
    async fn done(self: Box<Self>) -> BackendResult<()>;

    /// Discard the write: partial data is dropped
    async fn abort(self: Box<Self>) -> BackendResult<()>;
}

impl std::fmt::Debug for dyn TarballSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TarballSink").finish_non_exhaustive()
    }
}

/// The persistent store behind the registry
///
/// Cross-request consistency is the backend's job: conflicting writers to
/// the same package are expected to be serialized at least per package,
/// surfacing losers as 409 conflicts.
#[async_trait]
pub trait RegistryBackend: Send + Sync {
    /// Create a brand-new package record
    ///
    /// Fails with a 409 conflict if the package already exists.
    async fn create_package(&self, name: &str, manifest: &PackageManifest) -> BackendResult<()>;

    /// Replace an existing package record at a known revision
    ///
    /// Fails with a 409 conflict if the stored revision differs.
    async fn change_package(
        &self,
        name: &str,
        manifest: &PackageManifest,
        revision: &str,
    ) -> BackendResult<()>;

    /// Remove an entire package record and its tarballs
    async fn remove_package(&self, name: &str) -> BackendResult<()>;

    /// Open a write sink for a tarball under `(package, filename)`
    async fn open_tarball(
        &self,
        name: &str,
        filename: &str,
    ) -> BackendResult<Box<dyn TarballSink>>;

    /// Remove a single named tarball under a given revision
    async fn remove_tarball(
        &self,
        name: &str,
        filename: &str,
        revision: &str,
    ) -> BackendResult<()>;

    /// Commit one version record into the package's version set
    ///
    /// When `tag` is set the backend also points that tag at the version.
    async fn add_version(
        &self,
        name: &str,
        version: &str,
        record: VersionRecord,
        tag: Option<&str>,
    ) -> BackendResult<()>;

    /// Merge a distribution-tag mapping into the package's tags
    /// (last writer wins per tag key)
    async fn merge_tags(&self, name: &str, tags: &DistTags) -> BackendResult<()>;
}
