// src/storage/fs.rs
//! Filesystem backend
//!
//! Lays packages out as one directory per package containing the package
//! document (`package.json`) and its tarballs. Documents are written
//! atomically (write to temp, then rename), and tarball uploads stream
//! into a hidden temp file that only becomes visible on `done`.

use super::{BackendResult, RegistryBackend, TarballSink};
use crate::error::BackendError;
use crate::manifest::{DistTags, PackageManifest, VersionRecord};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

/// File name of the package document inside a package directory
const DOC_FILE: &str = "package.json";

/// On-disk package document
///
/// Serializes npm-shaped: `_rev` and `time` sit next to the manifest
/// fields at the top level of the JSON object.
#[derive(Debug, Serialize, Deserialize)]
struct StoredDoc {
    #[serde(rename = "_rev")]
    rev: String,
    #[serde(default)]
    time: BTreeMap<String, String>,
    #[serde(flatten)]
    manifest: PackageManifest,
}

/// Filesystem-backed package store
#[derive(Clone)]
pub struct FsBackend {
    root: PathBuf,
    /// Serializes document read-modify-write cycles
    doc_lock: Arc<Mutex<()>>,
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

impl StoredDoc {
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
            time,
            manifest,
        }
    }

    fn bump(&mut self) {
        let seq = self
            .rev
            .split('-')
            .next()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);
        self.rev = make_rev(seq + 1);
        self.time.insert("modified".to_string(), now_stamp());
    }
}

impl FsBackend {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            doc_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Directory holding the document and tarballs for a package
    ///
    /// Scoped names (`@scope/name`) nest one level deeper; the name has
    /// already been validated, so it cannot contain `..` segments.
    fn package_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn doc_path(&self, name: &str) -> PathBuf {
        self.package_dir(name).join(DOC_FILE)
    }

    /// Path for a tarball, refusing names that would escape the package
    /// directory or collide with the document file
    fn tarball_path(&self, name: &str, filename: &str) -> BackendResult<PathBuf> {
        if filename.is_empty()
            || filename == DOC_FILE
            || filename.starts_with('.')
            || filename.contains('/')
            || filename.contains('\\')
        {
            return Err(BackendError::new(format!(
                "invalid tarball file name '{filename}'"
            )));
        }
        Ok(self.package_dir(name).join(filename))
    }

    async fn read_doc(&self, name: &str) -> BackendResult<Option<StoredDoc>> {
        let bytes = match tokio::fs::read(self.doc_path(name)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let doc = serde_json::from_slice(&bytes).map_err(|e| {
            BackendError::new(format!("corrupt package document for '{name}': {e}"))
        })?;
        Ok(Some(doc))
    }

    async fn write_doc(&self, name: &str, doc: &StoredDoc) -> BackendResult<()> {
        let path = self.doc_path(name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let data = serde_json::to_vec_pretty(doc)
            .map_err(|e| BackendError::new(format!("serializing document: {e}")))?;

        // Write atomically (write to temp, then rename)
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, data).await?;
        tokio::fs::rename(&temp_path, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl RegistryBackend for FsBackend {
    async fn create_package(&self, name: &str, manifest: &PackageManifest) -> BackendResult<()> {
        let _guard = self.doc_lock.lock().await;
        if self.read_doc(name).await?.is_some() {
            return Err(BackendError::conflict(format!(
                "package '{name}' already exists"
            )));
        }
        self.write_doc(name, &StoredDoc::new(manifest)).await?;
        tracing::debug!("Created package directory for {}", name);
        Ok(())
    }

    async fn change_package(
        &self,
        name: &str,
        manifest: &PackageManifest,
        revision: &str,
    ) -> BackendResult<()> {
        let _guard = self.doc_lock.lock().await;
        let mut doc = self.read_doc(name).await?.ok_or_else(|| missing(name))?;
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
        self.write_doc(name, &doc).await
    }

    async fn remove_package(&self, name: &str) -> BackendResult<()> {
        let _guard = self.doc_lock.lock().await;
        if self.read_doc(name).await?.is_none() {
            return Err(missing(name));
        }
        tokio::fs::remove_dir_all(self.package_dir(name)).await?;
        tracing::debug!("Removed package directory for {}", name);
        Ok(())
    }

    async fn open_tarball(
        &self,
        name: &str,
        filename: &str,
    ) -> BackendResult<Box<dyn TarballSink>> {
        let final_path = self.tarball_path(name, filename)?;
        if self.read_doc(name).await?.is_none() {
            return Err(missing(name));
        }

        let temp_path = self
            .package_dir(name)
            .join(format!(".upload-{}.tmp", Uuid::new_v4().simple()));
        let file = tokio::fs::File::create(&temp_path).await?;
        Ok(Box::new(FsSink {
            file,
            temp_path,
            final_path,
        }))
    }

    async fn remove_tarball(
        &self,
        name: &str,
        filename: &str,
        _revision: &str,
    ) -> BackendResult<()> {
        let _guard = self.doc_lock.lock().await;
        let mut doc = self.read_doc(name).await?.ok_or_else(|| missing(name))?;

        let path = self.tarball_path(name, filename)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BackendError::not_found(format!(
                    "no such tarball '{filename}' in '{name}'"
                )));
            }
            Err(e) => return Err(e.into()),
        }

        doc.bump();
        self.write_doc(name, &doc).await
    }

    async fn add_version(
        &self,
        name: &str,
        version: &str,
        record: VersionRecord,
        tag: Option<&str>,
    ) -> BackendResult<()> {
        let _guard = self.doc_lock.lock().await;
        let mut doc = self.read_doc(name).await?.ok_or_else(|| missing(name))?;

        match doc.manifest.versions.get(version) {
            // Identical re-publishes converge instead of conflicting
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
        self.write_doc(name, &doc).await
    }

    async fn merge_tags(&self, name: &str, tags: &DistTags) -> BackendResult<()> {
        let _guard = self.doc_lock.lock().await;
        let mut doc = self.read_doc(name).await?.ok_or_else(|| missing(name))?;
        for (tag, version) in tags {
            doc.manifest
                .dist_tags
                .insert(tag.clone(), version.clone());
        }
        doc.bump();
        self.write_doc(name, &doc).await
    }
}

/// Sink that streams into a temp file and renames it into place on `done`
struct FsSink {
    file: tokio::fs::File,
    temp_path: PathBuf,
    final_path: PathBuf,
}

#[async_trait]
impl TarballSink for FsSink {
    async fn write(&mut self, chunk: &[u8]) -> BackendResult<()> {
        self.file.write_all(chunk).await?;
        Ok(())
    }

    async fn done(self: Box<Self>) -> BackendResult<()> {
        let Self {
            mut file,
            temp_path,
            final_path,
        } = *self;
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&temp_path, &final_path).await?;
        Ok(())
    }

    async fn abort(self: Box<Self>) -> BackendResult<()> {
        let Self {
            file, temp_path, ..
        } = *self;
        drop(file);
        match tokio::fs::remove_file(&temp_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(name: &str) -> PackageManifest {
        PackageManifest::from_value(
            json!({
                "name": name,
                "dist-tags": { "latest": "1.0.0" },
                "versions": { "1.0.0": { "version": "1.0.0" } }
            }),
            name,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_document_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new(dir.path().to_path_buf());
        backend.create_package("pkg", &manifest("pkg")).await.unwrap();

        let mut tags = DistTags::new();
        tags.insert("next".to_string(), "1.0.0".to_string());
        backend.merge_tags("pkg", &tags).await.unwrap();

        // A fresh backend over the same root sees the same document
        let reopened = FsBackend::new(dir.path().to_path_buf());
        let doc = reopened.read_doc("pkg").await.unwrap().unwrap();
        assert_eq!(doc.manifest.name, "pkg");
        assert_eq!(doc.manifest.dist_tags.get("next").unwrap(), "1.0.0");
        assert!(doc.rev.starts_with("2-"), "rev should have bumped: {}", doc.rev);
        assert!(doc.time.contains_key("created"));
        assert!(doc.time.contains_key("1.0.0"));
    }

    #[tokio::test]
    async fn test_create_conflicts_when_directory_exists() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new(dir.path().to_path_buf());
        backend.create_package("pkg", &manifest("pkg")).await.unwrap();

        let err = backend
            .create_package("pkg", &manifest("pkg"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_sink_rename_on_done_cleanup_on_abort() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new(dir.path().to_path_buf());
        backend.create_package("pkg", &manifest("pkg")).await.unwrap();

        let mut sink = backend.open_tarball("pkg", "pkg-1.0.0.tgz").await.unwrap();
        sink.write(b"tarball ").await.unwrap();
        sink.write(b"bytes").await.unwrap();
        sink.done().await.unwrap();

        let stored = tokio::fs::read(dir.path().join("pkg").join("pkg-1.0.0.tgz"))
            .await
            .unwrap();
        assert_eq!(stored, b"tarball bytes");

        let mut sink = backend.open_tarball("pkg", "partial.tgz").await.unwrap();
        sink.write(b"half").await.unwrap();
        sink.abort().await.unwrap();

        // No tarball and no leftover temp file
        let mut entries = tokio::fs::read_dir(dir.path().join("pkg")).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            assert!(
                file_name == DOC_FILE || file_name == "pkg-1.0.0.tgz",
                "unexpected leftover file {file_name}"
            );
        }
    }

    #[tokio::test]
    async fn test_tarball_name_guard() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new(dir.path().to_path_buf());
        backend.create_package("pkg", &manifest("pkg")).await.unwrap();

        for bad in ["", "package.json", ".hidden.tgz", "a/b.tgz", "a\\b.tgz"] {
            assert!(
                backend.open_tarball("pkg", bad).await.is_err(),
                "file name {bad:?} should be refused"
            );
        }
    }

    #[tokio::test]
    async fn test_scoped_package_nests() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new(dir.path().to_path_buf());
        backend
            .create_package("@scope/pkg", &manifest("@scope/pkg"))
            .await
            .unwrap();

        assert!(
            dir.path().join("@scope").join("pkg").join(DOC_FILE).exists(),
            "scoped packages should nest under the scope directory"
        );

        backend.remove_package("@scope/pkg").await.unwrap();
        assert!(!dir.path().join("@scope").join("pkg").exists());
    }

    #[tokio::test]
    async fn test_remove_tarball_updates_document() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new(dir.path().to_path_buf());
        backend.create_package("pkg", &manifest("pkg")).await.unwrap();

        let mut sink = backend.open_tarball("pkg", "pkg-1.0.0.tgz").await.unwrap();
        sink.write(b"data").await.unwrap();
        sink.done().await.unwrap();

        let before = backend.read_doc("pkg").await.unwrap().unwrap().rev;
        backend
            .remove_tarball("pkg", "pkg-1.0.0.tgz", &before)
            .await
            .unwrap();
        let after = backend.read_doc("pkg").await.unwrap().unwrap().rev;
        assert_ne!(before, after);

        let err = backend
            .remove_tarball("pkg", "pkg-1.0.0.tgz", &after)
            .await
            .unwrap_err();
        assert_eq!(err.status, Some(404));
    }
}
