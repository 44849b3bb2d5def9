// src/notify.rs
//! Publish notifications
//!
//! After a version lands, the registry tells interested parties about it.
//! Delivery is fire-and-forget from the publish path's point of view; a
//! failed webhook never fails a publish.

use crate::manifest::DistTags;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use url::Url;

/// What gets posted to a webhook when a version is published
#[derive(Debug, Clone, Serialize)]
pub struct PublishEvent {
    pub package: String,
    pub version: String,
    #[serde(rename = "dist-tags")]
    pub dist_tags: DistTags,
}

/// Downstream consumer of publish events
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn package_published(&self, event: &PublishEvent) -> Result<()>;
}

/// Notifier that drops every event (the default)
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn package_published(&self, _event: &PublishEvent) -> Result<()> {
        Ok(())
    }
}

/// Posts publish events as JSON to a configured endpoint
pub struct WebhookNotifier {
    client: reqwest::Client,
    endpoint: Url,
}

impl WebhookNotifier {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("wharf/0.1")
            .build()
            .context("Failed to create webhook HTTP client")?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn package_published(&self, event: &PublishEvent) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(event)
            .send()
            .await
            .with_context(|| format!("posting publish event to {}", self.endpoint))?;
        response
            .error_for_status()
            .with_context(|| format!("webhook {} rejected publish event", self.endpoint))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_notifier_accepts_everything() {
        let event = PublishEvent {
            package: "pkg".to_string(),
            version: "1.0.0".to_string(),
            dist_tags: DistTags::new(),
        };
        NullNotifier.package_published(&event).await.unwrap();
    }

    #[test]
    fn test_event_wire_shape() {
        let mut dist_tags = DistTags::new();
        dist_tags.insert("latest".to_string(), "1.2.3".to_string());
        let event = PublishEvent {
            package: "@scope/pkg".to_string(),
            version: "1.2.3".to_string(),
            dist_tags,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["package"], "@scope/pkg");
        assert_eq!(json["version"], "1.2.3");
        assert_eq!(json["dist-tags"]["latest"], "1.2.3");
    }
}
