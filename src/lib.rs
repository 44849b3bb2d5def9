// src/lib.rs

//! Wharf Package Registry
//!
//! Self-hosted package registry speaking the npm publish protocol:
//! manifest publishes with inline tarball attachments, streaming direct
//! tarball uploads, version recording, and distribution-tag merging.
//!
//! # Architecture
//!
//! - Orchestration-first: `publish::Publisher` owns all cross-step
//!   sequencing; storage, auth, and notification are trait collaborators
//! - Storage-agnostic: backends implement `storage::RegistryBackend`;
//!   the crate ships in-memory and filesystem reference backends
//! - Streaming uploads: tarball bytes flow through a `TarballSink` whose
//!   terminal transitions are consumed, so exactly one of done/abort fires
//! - Conflict-delegating: concurrent writers to one package are resolved
//!   by backend 409 signaling, not in-process locks

pub mod attachment;
pub mod auth;
mod error;
pub mod ingest;
pub mod manifest;
pub mod notify;
pub mod publish;
pub mod server;
pub mod storage;

pub use error::{BackendError, RegistryError, Result};
pub use manifest::{AttachmentPayload, DistTags, PackageManifest, VersionRecord};
pub use publish::{PublishOutcome, Publisher};
pub use storage::{FsBackend, MemoryBackend, RegistryBackend, TarballSink};
