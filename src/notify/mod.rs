//! Outbound notifications for authorization events
//!
//! The engine hands every [`NotificationEvent`] to a [`Notifier`] and moves
//! on; delivery problems are logged by the notifier and never reach the
//! actuation logic.

mod webhook;

pub use webhook::{WebhookConfig, WebhookNotifier};

use async_trait::async_trait;
use std::fmt;
use tracing::info;

/// Kind of authorization event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    AuthorizedCard,
    UnknownCard,
}

impl NotificationKind {
    /// Human-readable message posted for this kind
    pub fn message(self) -> &'static str {
        match self {
            NotificationKind::AuthorizedCard => "Authorized card",
            NotificationKind::UnknownCard => "Unknown card",
        }
    }
}

/// A single authorization event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    pub message: String,
}

impl NotificationEvent {
    pub fn new(kind: NotificationKind) -> Self {
        Self {
            kind,
            message: kind.message().into(),
        }
    }

    pub fn authorized_card() -> Self {
        Self::new(NotificationKind::AuthorizedCard)
    }

    pub fn unknown_card() -> Self {
        Self::new(NotificationKind::UnknownCard)
    }
}

impl fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Fire-and-forget sink for notification events
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver an event; failures are handled (logged) by the notifier itself
    async fn notify(&self, event: &NotificationEvent);
}

#[async_trait]
impl<T: Notifier + ?Sized> Notifier for Box<T> {
    async fn notify(&self, event: &NotificationEvent) {
        (**self).notify(event).await
    }
}

/// Notifier used when no webhook is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn notify(&self, event: &NotificationEvent) {
        info!("[NOTIFY] Webhook disabled, not posting: {}", event);
    }
}

/// Notifier for the configured webhook, or [`DisabledNotifier`] without one
pub fn notifier_for(webhook: Option<WebhookConfig>) -> anyhow::Result<Box<dyn Notifier>> {
    Ok(match webhook {
        Some(config) => Box::new(WebhookNotifier::new(config)?),
        None => Box::new(DisabledNotifier),
    })
}
