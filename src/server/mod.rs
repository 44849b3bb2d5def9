// src/server/mod.rs
//! Wharf registry server
//!
//! This module provides the HTTP server that:
//! - Accepts manifest publishes (optionally with inline tarball attachments)
//! - Streams direct tarball uploads, handling client cancellation
//! - Records versions, merges distribution tags, removes packages/tarballs
//! - Gates every write through the configured access policy

mod config;
mod handlers;
mod routes;

pub use config::{parse_duration, parse_size, RegistryConfig};
pub use routes::create_router;

use crate::auth::{AccessGate, OpenAccess, TokenAccess};
use crate::notify::{Notifier, NullNotifier, WebhookNotifier};
use crate::publish::Publisher;
use crate::storage::{FsBackend, MemoryBackend, RegistryBackend};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,
    /// Maximum manifest body size in bytes
    pub max_body_bytes: usize,
    /// Root directory for the filesystem backend (None = in-memory store)
    pub storage_root: Option<PathBuf>,
    /// Shared bearer token for writes (None = open access)
    pub auth_token: Option<String>,
    /// Webhook to notify on publish (None = disabled)
    pub webhook_url: Option<Url>,
    /// Timeout for webhook deliveries
    pub webhook_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:4873".parse().expect("static bind address"),
            max_body_bytes: 50 * 1024 * 1024, // 50MB
            storage_root: Some(PathBuf::from("/var/lib/wharf/packages")),
            auth_token: None,
            webhook_url: None,
            webhook_timeout: Duration::from_secs(10),
        }
    }
}

/// Shared server state
///
/// There is no cross-request mutable state here; conflicting writers to
/// the same package are serialized by the storage backend and surface as
/// 409s, so a plain `Arc` is enough.
pub struct ServerState {
    pub config: ServerConfig,
    pub publisher: Publisher,
    pub gate: Arc<dyn AccessGate>,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Result<Self> {
        let backend: Arc<dyn RegistryBackend> = match &config.storage_root {
            Some(root) => Arc::new(FsBackend::new(root.clone())),
            None => Arc::new(MemoryBackend::new()),
        };

        let notifier: Arc<dyn Notifier> = match &config.webhook_url {
            Some(url) => Arc::new(
                WebhookNotifier::new(url.clone(), config.webhook_timeout)
                    .context("Failed to set up webhook notifier")?,
            ),
            None => Arc::new(NullNotifier),
        };

        let gate: Arc<dyn AccessGate> = match &config.auth_token {
            Some(token) => Arc::new(TokenAccess::new(token)),
            None => Arc::new(OpenAccess),
        };

        let publisher = Publisher::new(backend, notifier);

        Ok(Self {
            config,
            publisher,
            gate,
        })
    }
}

/// Start the registry server
pub async fn run_server(config: ServerConfig) -> Result<()> {
    tracing::info!("Starting wharf registry on {}", config.bind_addr);
    match &config.storage_root {
        Some(root) => tracing::info!("Package store: {:?}", root),
        None => tracing::info!("Package store: in-memory (ephemeral)"),
    }
    if config.auth_token.is_some() {
        tracing::info!("Write access: bearer token required");
    } else {
        tracing::warn!("Write access: open (no token configured)");
    }
    if let Some(ref webhook) = config.webhook_url {
        tracing::info!("Publish webhook: {}", webhook);
    }

    if let Some(ref root) = config.storage_root {
        tokio::fs::create_dir_all(root)
            .await
            .with_context(|| format!("Failed to create storage root {}", root.display()))?;
    }

    let state = Arc::new(ServerState::new(config.clone())?);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Registry is ready to accept publishes");

    axum::serve(listener, app).await?;
    Ok(())
}
