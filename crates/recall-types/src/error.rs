//! Configuration error types.

use thiserror::Error;

/// Errors raised while loading or validating [`Settings`](crate::Settings).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or deserialized
    #[error("Configuration error: {0}")]
    Load(#[from] config::ConfigError),

    /// A value was loaded but is out of range
    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
