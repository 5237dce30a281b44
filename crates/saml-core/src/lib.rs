//! # saml-core
//!
//! Configuration and configuration errors shared by the SAML service
//! provider crates.
//!
//! Configuration is loaded once, validated once, and then handed to every
//! validation call as an immutable [`ValidatedConfig`]. Nothing in the
//! workspace keeps process-wide configuration state.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;

pub use config::{
    CertificateConfig, IdentityProviderConfig, SamlConfig, ServiceProviderConfig, ValidatedConfig,
};
pub use error::{ConfigResult, ConfigurationError};
