//! monika-notify — delivering transition messages to operators.
//!
//! # Architecture
//!
//! ```text
//! NotificationDispatcher
//!   ├── "discord" → DiscordNotifier (JSON webhook post)
//!   ├── "smtp"    → SmtpNotifier (HTML mail)
//!   └── anything else → logged and skipped
//! ```
//!
//! Senders report failures as [`NotifyError`]; the dispatcher logs them
//! and never hands them back to the caller. Nothing is retried.

pub mod discord;
pub mod dispatcher;
pub mod error;
pub mod notifier;
pub mod smtp;

pub use discord::DiscordNotifier;
pub use dispatcher::NotificationDispatcher;
pub use error::{NotifyError, NotifyResult};
pub use notifier::Notifier;
pub use smtp::SmtpNotifier;
