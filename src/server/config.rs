// src/server/config.rs
//! Configuration file parsing for the registry server
//!
//! Supports TOML configuration files with the following sections:
//! - [server] - Bind address, request body limit
//! - [storage] - Backend kind and root directory
//! - [auth] - Publish token
//! - [notify] - Publish webhook

use crate::server::ServerConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize)]
pub struct RegistryConfig {
    /// Server settings
    #[serde(default)]
    pub server: ServerSection,

    /// Storage settings
    #[serde(default)]
    pub storage: StorageSection,

    /// Authentication settings
    #[serde(default)]
    pub auth: AuthSection,

    /// Notification settings
    #[serde(default)]
    pub notify: NotifySection,
}

/// Server configuration section
#[derive(Debug, Deserialize)]
pub struct ServerSection {
    /// Bind address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Maximum publish body size (e.g., "50MB")
    ///
    /// Inline attachments arrive base64-encoded inside the manifest, so
    /// this bounds the manifest routes; direct tarball uploads stream and
    /// are not buffered against this limit.
    #[serde(default = "default_max_body_size")]
    pub max_body_size: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_size: default_max_body_size(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:4873".to_string()
}

fn default_max_body_size() -> String {
    "50MB".to_string()
}

/// Storage configuration section
#[derive(Debug, Deserialize)]
pub struct StorageSection {
    /// Backend kind: "fs" or "memory"
    #[serde(default = "default_kind")]
    pub kind: String,

    /// Root directory for the filesystem backend
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            root: default_root(),
        }
    }
}

fn default_kind() -> String {
    "fs".to_string()
}

fn default_root() -> PathBuf {
    PathBuf::from("/var/lib/wharf/packages")
}

/// Authentication configuration section
#[derive(Debug, Default, Deserialize)]
pub struct AuthSection {
    /// Shared bearer token required for every write (None = open access)
    #[serde(default)]
    pub token: Option<String>,
}

/// Notification configuration section
#[derive(Debug, Deserialize)]
pub struct NotifySection {
    /// Webhook URL to POST publish events to (None = disabled)
    #[serde(default)]
    pub webhook: Option<String>,

    /// Webhook request timeout (e.g., "10s")
    #[serde(default = "default_webhook_timeout")]
    pub timeout: String,
}

impl Default for NotifySection {
    fn default() -> Self {
        Self {
            webhook: None,
            timeout: default_webhook_timeout(),
        }
    }
}

fn default_webhook_timeout() -> String {
    "10s".to_string()
}

impl RegistryConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: RegistryConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.server
            .bind
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid server.bind address: {}", self.server.bind))?;

        parse_size(&self.server.max_body_size).with_context(|| {
            format!(
                "Invalid server.max_body_size: {}",
                self.server.max_body_size
            )
        })?;

        let valid_kinds = ["fs", "memory"];
        if !valid_kinds.contains(&self.storage.kind.as_str()) {
            anyhow::bail!(
                "storage.kind must be one of {:?}, got '{}'",
                valid_kinds,
                self.storage.kind
            );
        }

        if let Some(ref webhook) = self.notify.webhook {
            webhook
                .parse::<Url>()
                .with_context(|| format!("Invalid notify.webhook URL: {webhook}"))?;
        }
        parse_duration(&self.notify.timeout)
            .with_context(|| format!("Invalid notify.timeout: {}", self.notify.timeout))?;

        Ok(())
    }

    /// Convert to the internal ServerConfig structure
    pub fn to_server_config(&self) -> Result<ServerConfig> {
        let bind_addr = self.server.bind.parse()?;
        let max_body_bytes = parse_size(&self.server.max_body_size)? as usize;

        let storage_root = match self.storage.kind.as_str() {
            "memory" => None,
            _ => Some(self.storage.root.clone()),
        };

        let webhook_url = match &self.notify.webhook {
            Some(webhook) => Some(webhook.parse::<Url>()?),
            None => None,
        };
        let webhook_timeout = parse_duration(&self.notify.timeout)?;

        Ok(ServerConfig {
            bind_addr,
            max_body_bytes,
            storage_root,
            auth_token: self.auth.token.clone(),
            webhook_url,
            webhook_timeout,
        })
    }
}

/// Parse a human-readable size string (e.g., "50MB", "512KB")
pub fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim().to_uppercase();

    let (num_str, multiplier) = if s.ends_with("GB") {
        (&s[..s.len() - 2], 1024u64 * 1024 * 1024)
    } else if s.ends_with("MB") {
        (&s[..s.len() - 2], 1024u64 * 1024)
    } else if s.ends_with("KB") {
        (&s[..s.len() - 2], 1024u64)
    } else if s.ends_with('B') {
        (&s[..s.len() - 1], 1u64)
    } else {
        // Assume bytes
        (s.as_str(), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .with_context(|| format!("Invalid size number: {}", num_str))?;

    Ok((num * multiplier as f64) as u64)
}

/// Parse a human-readable duration string (e.g., "10s", "2m")
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();

    let (num_str, multiplier) = if s.ends_with('h') {
        (&s[..s.len() - 1], 60 * 60)
    } else if s.ends_with('m') {
        (&s[..s.len() - 1], 60)
    } else if s.ends_with('s') {
        (&s[..s.len() - 1], 1)
    } else {
        // Assume seconds
        (s.as_str(), 1)
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .with_context(|| format!("Invalid duration number: {}", num_str))?;

    Ok(Duration::from_secs(num * multiplier))
}
