// src/storage/memory.rs
//! In-memory reference backend
//!
//! Keeps whole package documents and tarballs in process memory behind a
//! `tokio::sync::RwLock`. This is the backend the test suite runs against
//! and what `serve --ephemeral` uses; it implements the full conflict
//! semantics (CouchDB-style `N-hex` revisions, 409 on conflicting writers)
//! so the orchestration paths it exercises are the real ones.

use super::{BackendResult, RegistryBackend, TarballSink};
use crate::error::BackendError;
use crate::manifest::{DistTags, PackageManifest, VersionRecord};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// One stored package document
#[derive(Debug, Clone)]
struct PackageDoc {
    /// Opaque revision token, `seq-hex`
    rev: String,
    /// Monotonic part of the revision
    rev_seq: u64,
    /// The manifest as last written (attachments stripped)
    manifest: PackageManifest,
    /// Publish time stamps: `created`, `modified`, and one per version
    time: BTreeMap<String, String>,
    /// Tarball bytes keyed by file name
    tarballs: HashMap<String, Vec<u8>>,
}

/// In-memory package store
#[derive(Clone, Default)]
pub struct MemoryBackend {
    packages: Arc<RwLock<HashMap<String, PackageDoc>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored manifest for a package, if present (test/inspection helper)
    pub async fn manifest(&self, name: &str) -> Option<PackageManifest> {
        self.packages
            .read()
            .await
            .get(name)
            .map(|doc| doc.manifest.clone())
    }

    /// Current revision token for a package
    pub async fn revision(&self, name: &str) -> Option<String> {
        self.packages.read().await.get(name).map(|doc| doc.rev.clone())
    }

    /// Stored tarball bytes, if present
    pub async fn tarball(&self, name: &str, filename: &str) -> Option<Vec<u8>> {
        self.packages
            .read()
            .await
            .get(name)
            .and_then(|doc| doc.tarballs.get(filename).cloned())
    }

    /// Distribution tags for a package
    pub async fn dist_tags(&self, name: &str) -> Option<DistTags> {
        self.manifest(name).await.map(|m| m.dist_tags)
    }
}

fn make_rev(seq: u64) -> String {
    format!("{}-{}", seq, Uuid::new_v4().simple())
}

fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn missing(name: &str) -> BackendError {
    BackendError::not_found(format!("no such package '{name}'"))
}

impl PackageDoc {
    fn new(manifest: &PackageManifest) -> Self {
        let mut manifest = manifest.clone();
        manifest.attachments.clear();

        let now = now_stamp();
        let mut time = BTreeMap::new();
        time.insert("created".to_string(), now.clone());
        time.insert("modified".to_string(), now.clone());
        for version in manifest.versions.keys() {
            time.insert(version.clone(), now.clone());
        }

        Self {
            rev: make_rev(1),
            rev_seq: 1,
            manifest,
            time,
            tarballs: HashMap::new(),
        }
    }

    fn bump(&mut self) {
        self.rev_seq += 1;
        self.rev = make_rev(self.rev_seq);
        self.time.insert("modified".to_string(), now_stamp());
    }
}

#[async_trait]
impl RegistryBackend for MemoryBackend {
    async fn create_package(&self, name: &str, manifest: &PackageManifest) -> BackendResult<()> {
        let mut packages = self.packages.write().await;
        if packages.contains_key(name) {
            return Err(BackendError::conflict(format!(
                "package '{name}' already exists"
            )));
        }
        packages.insert(name.to_string(), PackageDoc::new(manifest));
        Ok(())
    }

    async fn change_package(
        &self,
        name: &str,
        manifest: &PackageManifest,
        revision: &str,
    ) -> BackendResult<()> {
        let mut packages = self.packages.write().await;
        let doc = packages.get_mut(name).ok_or_else(|| missing(name))?;
        if doc.rev != revision {
            return Err(BackendError::conflict(format!(
                "revision mismatch for '{name}': expected {}, got {revision}",
                doc.rev
            )));
        }

        let mut manifest = manifest.clone();
        manifest.attachments.clear();
        let now = now_stamp();
        for version in manifest.versions.keys() {
            doc.time.entry(version.clone()).or_insert_with(|| now.clone());
        }
        doc.manifest = manifest;
        doc.bump();
        Ok(())
    }

    async fn remove_package(&self, name: &str) -> BackendResult<()> {
        let mut packages = self.packages.write().await;
        packages.remove(name).map(|_| ()).ok_or_else(|| missing(name))
    }

    async fn open_tarball(
        &self,
        name: &str,
        filename: &str,
    ) -> BackendResult<Box<dyn TarballSink>> {
        let packages = self.packages.read().await;
        if !packages.contains_key(name) {
            return Err(missing(name));
        }
        Ok(Box::new(MemorySink {
            packages: Arc::clone(&self.packages),
            package: name.to_string(),
            filename: filename.to_string(),
            buf: Vec::new(),
        }))
    }

    async fn remove_tarball(
        &self,
        name: &str,
        filename: &str,
        _revision: &str,
    ) -> BackendResult<()> {
        let mut packages = self.packages.write().await;
        let doc = packages.get_mut(name).ok_or_else(|| missing(name))?;
        if doc.tarballs.remove(filename).is_none() {
            return Err(BackendError::not_found(format!(
                "no such tarball '{filename}' in '{name}'"
            )));
        }
        doc.bump();
        Ok(())
    }

    async fn add_version(
        &self,
        name: &str,
        version: &str,
        record: VersionRecord,
        tag: Option<&str>,
    ) -> BackendResult<()> {
        let mut packages = self.packages.write().await;
        let doc = packages.get_mut(name).ok_or_else(|| missing(name))?;

        match doc.manifest.versions.get(version) {
            // Re-publishing an identical record is a no-op so that retried
            // add-version calls converge instead of failing
            Some(existing) if *existing == record => {}
            Some(_) => {
                return Err(BackendError::conflict(format!(
                    "version {version} of '{name}' already exists"
                )));
            }
            None => {
                doc.manifest
                    .versions
                    .insert(version.to_string(), record);
                doc.time.insert(version.to_string(), now_stamp());
            }
        }

        if let Some(tag) = tag {
            doc.manifest
                .dist_tags
                .insert(tag.to_string(), version.to_string());
        }
        doc.bump();
        Ok(())
    }

    async fn merge_tags(&self, name: &str, tags: &DistTags) -> BackendResult<()> {
        let mut packages = self.packages.write().await;
        let doc = packages.get_mut(name).ok_or_else(|| missing(name))?;
        for (tag, version) in tags {
            doc.manifest
                .dist_tags
                .insert(tag.clone(), version.clone());
        }
        doc.bump();
        Ok(())
    }
}

/// Buffering sink that commits into the package map on `done`
struct MemorySink {
    packages: Arc<RwLock<HashMap<String, PackageDoc>>>,
    package: String,
    filename: String,
    buf: Vec<u8>,
}

#[async_trait]
impl TarballSink for MemorySink {
    async fn write(&mut self, chunk: &[u8]) -> BackendResult<()> {
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    async fn done(self: Box<Self>) -> BackendResult<()> {
        let mut packages = self.packages.write().await;
        let doc = packages
            .get_mut(&self.package)
            .ok_or_else(|| missing(&self.package))?;
        doc.tarballs.insert(self.filename, self.buf);
        doc.bump();
        Ok(())
    }

    async fn abort(self: Box<Self>) -> BackendResult<()> {
        // Nothing was visible yet; dropping the buffer is the whole abort
        Ok(())
    }
}
