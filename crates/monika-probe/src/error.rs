//! Error types for probe executors and the certificate check.

use thiserror::Error;

/// Result type alias for executor calls.
pub type ProbeResult<T> = Result<T, ProbeError>;

/// A failed request or ping. Always turned into a failing verdict,
/// never propagated out of a runner.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to resolve {host}: {reason}")]
    Resolve { host: String, reason: String },

    #[error("ping to {host} failed: {reason}")]
    Ping { host: String, reason: String },

    #[error("ping to {host} timed out after {timeout_ms}ms")]
    PingTimeout { host: String, timeout_ms: u64 },

    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("TLS connection to {addr} failed: {reason}")]
    Tls { addr: String, reason: String },

    #[error("certificate from {addr} is unreadable: {reason}")]
    Certificate { addr: String, reason: String },
}
