//! Inbound message processing.
//!
//! The consumers tie parsing, trust, decryption, validation and replay
//! protection together for the messages a service provider receives:
//! [`ResponseConsumer`] for authentication responses and
//! [`LogoutConsumer`] for single logout.

mod logout;
mod response;

pub use logout::*;
pub use response::*;

use std::sync::Arc;

use saml_core::{ConfigurationError, ValidatedConfig};
use saml_crypto::PublicKey;
use tracing::warn;

use crate::error::{SamlResult, TrustError};
use crate::signature::{CertificateSpecification, TrustStore, certificate_specifications, trusted_keys_for};

/// Resolves trusted keys for the identity providers a consumer talks to.
struct IssuerTrust {
    config: ValidatedConfig,
    trust_store: Arc<dyn TrustStore>,
    specifications: Vec<Box<dyn CertificateSpecification>>,
}

impl IssuerTrust {
    fn new(config: ValidatedConfig, trust_store: Arc<dyn TrustStore>) -> Self {
        let specifications = certificate_specifications(&config);
        Self {
            config,
            trust_store,
            specifications,
        }
    }

    /// Returns the keys trusted for `issuer`.
    ///
    /// The issuer must be a configured identity provider, and an identity
    /// provider without usable keys is a configuration error.
    fn keys_for(&self, issuer: Option<&str>) -> SamlResult<Vec<PublicKey>> {
        let issuer = issuer.unwrap_or_default();
        if self.config.identity_provider(issuer).is_none() {
            warn!(issuer, "Message from unknown issuer");
            return Err(TrustError::UnknownIssuer(issuer.to_string()).into());
        }

        let keys = trusted_keys_for(self.trust_store.as_ref(), issuer, &self.specifications);
        if keys.is_empty() {
            warn!(issuer, "No trusted keys for identity provider");
            return Err(ConfigurationError::Missing(format!("trusted keys for issuer {issuer}")).into());
        }
        Ok(keys)
    }
}
