//! Configuration errors.
//!
//! A missing or invalid configuration is never read as "no restriction".
//! Everything that depends on configuration fails closed with one of these
//! errors instead.

use thiserror::Error;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigurationError>;

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// The configuration document could not be read or parsed.
    #[error("failed to load configuration: {0}")]
    Load(String),

    /// A configuration value is present but invalid.
    #[error("invalid configuration value for `{field}`: {reason}")]
    InvalidValue {
        /// Dotted path of the offending field.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Required configuration is absent.
    #[error("missing configuration: {0}")]
    Missing(String),
}

impl ConfigurationError {
    /// Creates an [`ConfigurationError::InvalidValue`] error.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
