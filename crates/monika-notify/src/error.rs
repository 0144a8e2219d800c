//! Error types for notification delivery.

use thiserror::Error;

/// Result type alias for notifier operations.
pub type NotifyResult<T> = Result<T, NotifyError>;

/// Errors a channel sender can report.
///
/// These never reach a probe runner: the dispatcher logs and drops them.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The channel's settings are unusable (missing URL, host, recipients...).
    #[error("invalid channel configuration: {0}")]
    Config(String),

    /// A sender was handed a channel of another type.
    #[error("channel {id} has type {actual}, expected {expected}")]
    WrongChannel {
        id: String,
        expected: &'static str,
        actual: String,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook returned status {0}")]
    Status(u16),

    #[error("smtp error: {0}")]
    Smtp(String),
}
