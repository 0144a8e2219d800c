//! Error types for configuration loading.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while loading or validating a config document.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("missing URL in probe request for probe ID: {probe_id}")]
    MissingUrl { probe_id: String },

    #[error("probe {probe_id} has neither requests nor a ping target")]
    NoRequests { probe_id: String },

    #[error("duplicate probe ID: {probe_id}")]
    DuplicateProbeId { probe_id: String },
}
