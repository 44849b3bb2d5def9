// src/auth.rs

//! Access control for registry writes
//!
//! Every mutating route passes through an `AccessGate` before any
//! orchestration runs. The stock gates are deliberately simple: open
//! access for trusted private deployments, or a single shared bearer
//! token checked against the `Authorization` header.

/// Mutating operations that require authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Publishing or updating a manifest
    Publish,
    /// Removing a package or tarball
    Unpublish,
    /// Direct tarball upload
    Upload,
    /// Adding a version and assigning a tag
    Tag,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Publish => "publish",
            Action::Unpublish => "unpublish",
            Action::Upload => "upload",
            Action::Tag => "tag",
        }
    }
}

/// Decides whether a request may perform a mutating action
pub trait AccessGate: Send + Sync {
    fn allows(&self, token: Option<&str>, package: &str, action: Action) -> bool;
}

/// Gate that lets everything through
pub struct OpenAccess;

impl AccessGate for OpenAccess {
    fn allows(&self, _token: Option<&str>, _package: &str, _action: Action) -> bool {
        true
    }
}

/// Gate that requires one shared bearer token for every write
pub struct TokenAccess {
    token: String,
}

impl TokenAccess {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl AccessGate for TokenAccess {
    fn allows(&self, token: Option<&str>, _package: &str, _action: Action) -> bool {
        token == Some(self.token.as_str())
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    header?.strip_prefix("Bearer ").map(str::trim)
}
