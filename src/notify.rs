//! Status notifications
//!
//! Delivery is best-effort: a failing webhook is logged and never affects the
//! update itself.

use crate::config::NotificationConfig;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Title attached to every notification
pub const NOTIFICATION_TITLE: &str = "photon-updater";

/// Receives human-readable status messages
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `message`; never fails
    async fn send(&self, message: &str);
}

/// Notifier that drops every message
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpNotifier;

#[async_trait]
impl Notifier for NoOpNotifier {
    async fn send(&self, message: &str) {
        tracing::trace!(message, "notification dropped, no targets configured");
    }
}

/// JSON body posted to webhooks
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    /// Always [`NOTIFICATION_TITLE`]
    pub title: String,
    /// The status message
    pub body: String,
    /// Unix timestamp in seconds
    pub timestamp: i64,
}

/// Posts each message to a list of webhook URLs
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    urls: Vec<String>,
    timeout: Duration,
}

impl WebhookNotifier {
    /// Create a notifier for `urls`
    pub fn new(urls: Vec<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            urls,
            timeout,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, message: &str) {
        let payload = NotificationPayload {
            title: NOTIFICATION_TITLE.to_string(),
            body: message.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        };

        // Awaited rather than spawned so messages sent right before exit still go out
        for url in &self.urls {
            let request = self.client.post(url).json(&payload).timeout(self.timeout).send();

            match tokio::time::timeout(self.timeout, request).await {
                Ok(Ok(response)) if response.status().is_success() => {
                    tracing::debug!(url = %url, "notification sent");
                }
                Ok(Ok(response)) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    tracing::warn!(url = %url, %status, body = %body, "notification webhook rejected message");
                }
                Ok(Err(e)) => {
                    tracing::warn!(url = %url, error = %e, "notification webhook failed");
                }
                Err(_) => {
                    tracing::warn!(url = %url, timeout = ?self.timeout, "notification webhook timed out");
                }
            }
        }
    }
}

/// Pick the notifier for the configured targets
pub fn from_config(config: &NotificationConfig) -> Arc<dyn Notifier> {
    if config.webhook_urls.is_empty() {
        Arc::new(NoOpNotifier)
    } else {
        Arc::new(WebhookNotifier::new(config.webhook_urls.clone(), config.timeout))
    }
}
