// src/publish.rs
//! Publish orchestration
//!
//! `Publisher` is the one component with cross-step sequencing logic. A
//! publish validates the manifest, dispatches create-or-change to the
//! backend, then (when the manifest bundles a tarball) drives decode,
//! tarball write, version record, and tag merge strictly in order. Every
//! step is awaited to completion before the next one starts; a failure
//! mid-sequence is fatal and nothing already written is rolled back.

use crate::attachment;
use crate::error::{RegistryError, Result};
use crate::ingest;
use crate::manifest::{self, DistTags, PackageManifest, VersionRecord};
use crate::notify::{Notifier, PublishEvent};
use crate::storage::RegistryBackend;
use futures::Stream;
use std::sync::Arc;

pub const MSG_PKG_CREATED: &str = "created new package";
pub const MSG_PKG_CHANGED: &str = "package changed";
pub const MSG_PKG_PUBLISHED: &str = "package published";
pub const MSG_PKG_REMOVED: &str = "package removed";
pub const MSG_TARBALL_REMOVED: &str = "tarball removed";
pub const MSG_TARBALL_UPLOADED: &str = "tarball uploaded successfully";

/// What a successful operation reports back to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub http_status: u16,
    pub message: &'static str,
}

impl PublishOutcome {
    fn created(message: &'static str) -> Self {
        Self {
            http_status: 201,
            message,
        }
    }
}

/// Top-level sequencer for the publish workflow
pub struct Publisher {
    backend: Arc<dyn RegistryBackend>,
    notifier: Arc<dyn Notifier>,
}

impl Publisher {
    pub fn new(backend: Arc<dyn RegistryBackend>, notifier: Arc<dyn Notifier>) -> Self {
        Self { backend, notifier }
    }

    /// Publish or update a package from a raw request body
    ///
    /// `revision` comes from the `-rev` URL form and selects change-package
    /// dispatch; without it the dispatch is create-package. A create that
    /// conflicts (409) is not fatal when the manifest bundles a tarball:
    /// the package already existing is exactly the situation in which a new
    /// version attaches to it. Every other dispatch error ends the flow.
    pub async fn publish(
        &self,
        package: &str,
        body: &[u8],
        revision: Option<&str>,
    ) -> Result<PublishOutcome> {
        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| RegistryError::invalid(format!("request body is not valid JSON: {e}")))?;

        // npm star/unstar reuses the publish route with a body whose only
        // key is `users`
        if manifest::is_star_body(&value) {
            return Err(RegistryError::NotImplemented);
        }

        let mut manifest = PackageManifest::from_value(value, package)?;

        let dispatch = match revision {
            Some(rev) => self.backend.change_package(package, &manifest, rev).await,
            None => self.backend.create_package(package, &manifest).await,
        };

        if !manifest.has_attachments() {
            dispatch?;
            let message = if revision.is_some() {
                MSG_PKG_CHANGED
            } else {
                MSG_PKG_CREATED
            };
            tracing::info!("Package {} accepted without attachments", package);
            return Ok(PublishOutcome::created(message));
        }

        match dispatch {
            Ok(()) => {}
            Err(e) if e.is_conflict() => {
                tracing::debug!("Package {} already exists, attaching new version", package);
            }
            Err(e) => return Err(e.into()),
        }

        if manifest.attachments.len() > 1 || manifest.versions.len() > 1 {
            return Err(RegistryError::unsupported(format!(
                "expected one version and one tarball per publish, got {} and {}",
                manifest.versions.len(),
                manifest.attachments.len()
            )));
        }
        let (Some((filename, payload)), Some((version, mut record))) = (
            manifest.attachments.pop_first(),
            manifest.versions.pop_first(),
        ) else {
            return Err(RegistryError::unsupported(
                "a publish with a tarball attachment must also carry its version entry",
            ));
        };

        let tarball = attachment::decode(&payload)?;
        let filename = attachment::base_file_name(&filename);
        ingest::write_attachment(self.backend.as_ref(), package, filename, &tarball).await?;

        record.readme = manifest.readme.clone().unwrap_or_default();
        self.record_version(package, &version, record, None).await?;
        self.merge_tags(package, &manifest.dist_tags).await?;

        self.spawn_notification(package, &version, &manifest.dist_tags);
        tracing::info!("Published {}@{}", package, version);
        Ok(PublishOutcome::created(MSG_PKG_CREATED))
    }

    /// Commit a single version record, optionally assigning a tag
    pub async fn record_version(
        &self,
        package: &str,
        version: &str,
        record: VersionRecord,
        tag: Option<&str>,
    ) -> Result<()> {
        self.backend
            .add_version(package, version, record, tag)
            .await?;
        Ok(())
    }

    /// Merge a tag mapping into the package, last writer wins per tag
    pub async fn merge_tags(&self, package: &str, tags: &DistTags) -> Result<()> {
        self.backend.merge_tags(package, tags).await?;
        Ok(())
    }

    /// The standalone add-version endpoint: record one version from a bare
    /// version-record body and point `tag` at it
    pub async fn add_version_with_tag(
        &self,
        package: &str,
        version: &str,
        body: &[u8],
        tag: &str,
    ) -> Result<PublishOutcome> {
        manifest::validate_name(package)?;
        let record: VersionRecord = serde_json::from_slice(body)
            .map_err(|e| RegistryError::invalid(format!("version record is not valid JSON: {e}")))?;

        self.record_version(package, version, record, Some(tag))
            .await?;
        tracing::info!("Recorded {}@{} under tag {}", package, version, tag);
        Ok(PublishOutcome::created(MSG_PKG_PUBLISHED))
    }

    /// Stream a raw tarball upload from the request body into the backend
    pub async fn upload_tarball<S, B, E>(
        &self,
        package: &str,
        filename: &str,
        stream: S,
    ) -> Result<PublishOutcome>
    where
        S: Stream<Item = std::result::Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        manifest::validate_name(package)?;
        let receipt = ingest::pipe_stream(self.backend.as_ref(), package, filename, stream).await?;
        tracing::info!(
            "Uploaded tarball {}/{} ({} bytes)",
            package,
            filename,
            receipt.bytes_written
        );
        Ok(PublishOutcome::created(MSG_TARBALL_UPLOADED))
    }

    /// Remove an entire package record
    pub async fn remove_package(&self, package: &str) -> Result<PublishOutcome> {
        manifest::validate_name(package)?;
        self.backend.remove_package(package).await?;
        tracing::info!("Removed package {}", package);
        Ok(PublishOutcome::created(MSG_PKG_REMOVED))
    }

    /// Remove one named tarball under a given revision
    pub async fn remove_tarball(
        &self,
        package: &str,
        filename: &str,
        revision: &str,
    ) -> Result<PublishOutcome> {
        manifest::validate_name(package)?;
        self.backend
            .remove_tarball(package, filename, revision)
            .await?;
        tracing::info!("Removed tarball {}/{}", package, filename);
        Ok(PublishOutcome::created(MSG_TARBALL_REMOVED))
    }

    /// Hand the publish event to the notifier without blocking the response
    fn spawn_notification(&self, package: &str, version: &str, dist_tags: &DistTags) {
        let notifier = Arc::clone(&self.notifier);
        let event = PublishEvent {
            package: package.to_string(),
            version: version.to_string(),
            dist_tags: dist_tags.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = notifier.package_published(&event).await {
                tracing::warn!(
                    "Publish notification for {}@{} failed: {:#}",
                    event.package,
                    event.version,
                    e
                );
            }
        });
    }
}
