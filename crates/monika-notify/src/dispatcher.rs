//! Notification fan-out.
//!
//! Routes a message to the sender registered for a channel's `type`.
//! Delivery is best effort: unknown types and sender failures are
//! logged and swallowed so the calling probe runner carries on.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, warn};

use monika_config::NotificationChannel;

use crate::discord::DiscordNotifier;
use crate::notifier::Notifier;
use crate::smtp::SmtpNotifier;

/// Maps channel types to their senders.
#[derive(Clone, Default)]
pub struct NotificationDispatcher {
    senders: HashMap<&'static str, Arc<dyn Notifier>>,
}

impl NotificationDispatcher {
    /// A dispatcher with no senders. Every channel is treated as unknown.
    pub fn new() -> Self {
        Self::default()
    }

    /// A dispatcher with the built-in Discord and SMTP senders.
    pub fn with_default_senders() -> Self {
        Self::new()
            .with_sender(Arc::new(DiscordNotifier::new()))
            .with_sender(Arc::new(SmtpNotifier::new()))
    }

    /// Register a sender, replacing any previous one for the same type.
    pub fn with_sender(mut self, sender: Arc<dyn Notifier>) -> Self {
        self.senders.insert(sender.kind(), sender);
        self
    }

    /// Channel types that have a sender.
    pub fn supported_kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.senders.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    /// Send `message` to a single channel.
    pub async fn dispatch(&self, channel: &NotificationChannel, message: &str) {
        let kind = channel.type_name();
        let Some(sender) = self.senders.get(kind) else {
            error!(channel = %channel.id, kind, "unsupported notification type");
            return;
        };

        match sender.send(channel, message).await {
            Ok(()) => debug!(channel = %channel.id, kind, "notification sent"),
            Err(e) => warn!(channel = %channel.id, kind, error = %e, "notification failed"),
        }
    }

    /// Send `message` to every channel, in order.
    pub async fn broadcast(&self, channels: &[NotificationChannel], message: &str) {
        for channel in channels {
            self.dispatch(channel, message).await;
        }
    }
}
