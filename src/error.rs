// src/error.rs
//! Error types for the registry core
//!
//! Two layers:
//! - `BackendError` is what storage collaborators report: a message plus an
//!   optional HTTP-style status code. 409 is the one status the orchestrator
//!   inspects (package-already-exists).
//! - `RegistryError` is the client-facing taxonomy. Local validation errors
//!   never reach the backend; backend errors are never reinterpreted.

use thiserror::Error;

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Error reported by a storage backend collaborator
///
/// The status code is HTTP-shaped but optional: backends that cannot map a
/// failure to a status leave it unset and the server reports 500.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct BackendError {
    /// HTTP-style status code, if the backend can classify the failure
    pub status: Option<u16>,
    /// Human-readable description
    pub message: String,
}

impl BackendError {
    /// An unclassified backend failure (reported as HTTP 500)
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    /// A backend failure with an explicit HTTP-style status
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    /// The "already exists" conflict signal (HTTP 409)
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::with_status(409, message)
    }

    /// The "no such record" signal (HTTP 404)
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_status(404, message)
    }

    /// True when this is the 409 conflict the publish flow tolerates at the
    /// dispatch step
    pub fn is_conflict(&self) -> bool {
        self.status == Some(409)
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(err.to_string()),
            std::io::ErrorKind::AlreadyExists => Self::conflict(err.to_string()),
            _ => Self::new(err.to_string()),
        }
    }
}

/// Errors surfaced by the publish/upload workflows
#[derive(Debug, Error)]
pub enum RegistryError {
    /// npm star/unstar calls (body whose only key is `users`)
    ///
    /// Reported as 404 rather than 501 because the npm client does not
    /// surface 5xx error bodies.
    #[error("npm star support is not implemented")]
    NotImplemented,

    /// Structurally malformed manifest body (HTTP 422)
    #[error("invalid package manifest: {0}")]
    InvalidManifest(String),

    /// Attachment/version shape violated a publish precondition (HTTP 400)
    #[error("unsupported registry call: {0}")]
    UnsupportedRegistryCall(String),

    /// Backend failure, surfaced verbatim
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Direct upload connection closed before the stream ended
    #[error("upload interrupted: {0}")]
    UploadInterrupted(String),
}

impl RegistryError {
    /// Convenience constructor for `InvalidManifest`
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidManifest(reason.into())
    }

    /// Convenience constructor for `UnsupportedRegistryCall`
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::UnsupportedRegistryCall(reason.into())
    }

    /// The HTTP status this error is reported with
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotImplemented => 404,
            Self::InvalidManifest(_) => 422,
            Self::UnsupportedRegistryCall(_) => 400,
            Self::Backend(e) => e.status.unwrap_or(500),
            Self::UploadInterrupted(_) => 400,
        }
    }
}
