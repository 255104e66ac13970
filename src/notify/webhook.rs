//! Webhook notifier
//!
//! Posts each event as JSON `{"content": "<message>"}` to a chat webhook.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{NotificationEvent, Notifier};

/// Characters of a rejected response body kept for the log
const BODY_PREVIEW_CHARS: usize = 100;

/// Errors from a webhook post
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Webhook rejected post with {status}: {body}")]
    Rejected { status: StatusCode, body: String },
}

/// Webhook configuration
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Webhook endpoint
    pub url: String,
    /// Whole-request timeout
    pub timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
}

/// Posts notification events to a webhook
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(config: WebhookConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            client,
            url: config.url,
        })
    }

    /// Post a message and return the response status
    pub async fn post(&self, message: &str) -> Result<StatusCode, NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookPayload { content: message })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(status);
        }

        let body = match response.text().await {
            Ok(text) => text.chars().take(BODY_PREVIEW_CHARS).collect(),
            Err(e) => format!("<unreadable body: {}>", e),
        };
        Err(NotifyError::Rejected { status, body })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &NotificationEvent) {
        debug!("[NOTIFY] Posting {:?}", event.kind);
        match self.post(&event.message).await {
            Ok(status) => info!("[NOTIFY] Posted \"{}\" ({})", event, status),
            Err(e) => warn!("[NOTIFY] Failed to post \"{}\": {}", event, e),
        }
    }
}
