//! Discord webhook sender.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use monika_config::{ChannelKind, NotificationChannel};

use crate::error::{NotifyError, NotifyResult};
use crate::notifier::Notifier;

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Webhook body.
#[derive(Debug, Serialize)]
pub struct DiscordPayload<'a> {
    pub content: &'a str,
}

/// Posts messages to Discord-compatible webhooks.
pub struct DiscordNotifier {
    client: reqwest::Client,
}

impl DiscordNotifier {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for DiscordNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn kind(&self) -> &'static str {
        "discord"
    }

    async fn send(&self, channel: &NotificationChannel, message: &str) -> NotifyResult<()> {
        let ChannelKind::Discord { url } = &channel.kind else {
            return Err(NotifyError::WrongChannel {
                id: channel.id.clone(),
                expected: "discord",
                actual: channel.type_name().to_string(),
            });
        };
        if url.is_empty() {
            return Err(NotifyError::Config(format!(
                "discord channel {} has no webhook url",
                channel.id
            )));
        }

        let resp = self
            .client
            .post(url)
            .timeout(SEND_TIMEOUT)
            .json(&DiscordPayload { content: message })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }

        debug!(channel = %channel.id, status = status.as_u16(), "discord webhook accepted");
        Ok(())
    }
}
