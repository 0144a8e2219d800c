//! monika-config — configuration model for the Monika agent.
//!
//! Parses `monika.yml`, fills in defaults for omitted fields, and yields
//! an immutable [`Config`] snapshot that the probe engine shares
//! read-only across all runners.

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, ConfigFile};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
