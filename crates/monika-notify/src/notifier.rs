//! The sender seam between the probe engine and delivery mechanics.

use async_trait::async_trait;

use monika_config::NotificationChannel;

use crate::error::NotifyResult;

/// Delivers a message over one channel type.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// The channel `type` this sender handles, e.g. `"discord"`.
    fn kind(&self) -> &'static str;

    /// Send `message` to `channel`.
    async fn send(&self, channel: &NotificationChannel, message: &str) -> NotifyResult<()>;
}
