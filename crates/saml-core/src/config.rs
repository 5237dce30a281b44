//! Service provider configuration.
//!
//! [`SamlConfig`] is the raw, deserializable form. It has to pass through
//! [`SamlConfig::validate`] once at startup; the resulting [`ValidatedConfig`]
//! is immutable and is what the protocol crate accepts.

use std::collections::HashSet;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ConfigResult, ConfigurationError};

/// Largest accepted clock skew (one day).
const MAX_CLOCK_SKEW_SECS: u64 = 86_400;

/// Main configuration structure for the service provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamlConfig {
    /// This service provider.
    pub service_provider: ServiceProviderConfig,

    /// Audience URIs this service accepts in `AudienceRestriction` conditions.
    ///
    /// An empty list means no audience restriction can ever be met.
    pub allowed_audiences: Vec<String>,

    /// Tolerated clock difference between this service and identity providers.
    pub clock_skew_secs: u64,

    /// Skip audience restriction evaluation entirely.
    pub omit_audience_check: bool,

    /// Show detailed validation messages to end users.
    pub show_error: bool,

    /// Require every assertion to carry its own signature.
    pub require_signed_assertions: bool,

    /// Require the enclosing `Response` to be signed.
    pub require_signed_responses: bool,

    /// Lifetime of a pending artifact-binding message.
    pub artifact_lifetime_secs: u64,

    /// Lifetime of a recorded outstanding request ID.
    pub request_lifetime_secs: u64,

    /// Certificate acceptance settings for metadata keys.
    pub certificates: CertificateConfig,

    /// Per identity provider settings.
    pub identity_providers: Vec<IdentityProviderConfig>,
}

/// Settings describing this service provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceProviderConfig {
    /// Entity ID of this service provider.
    pub entity_id: String,

    /// Assertion consumer service location.
    pub assertion_consumer_service_url: Option<String>,

    /// Single logout service location.
    pub single_logout_service_url: Option<String>,
}

/// Certificate acceptance settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateConfig {
    /// Reject certificates outside their validity period.
    pub check_validity_period: bool,

    /// Hex SHA-1 thumbprints of accepted certificates. Empty accepts any thumbprint.
    pub trusted_thumbprints: Vec<String>,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            check_validity_period: true,
            trusted_thumbprints: Vec::new(),
        }
    }
}

/// Settings for one identity provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityProviderConfig {
    /// Entity ID of the identity provider.
    pub entity_id: String,

    /// Accept unsigned assertions from this provider when the response is signed.
    pub omit_assertion_signature_check: bool,

    /// Artifact resolution service location.
    pub artifact_resolution_url: Option<String>,
}

impl Default for SamlConfig {
    fn default() -> Self {
        Self {
            service_provider: ServiceProviderConfig::default(),
            allowed_audiences: Vec::new(),
            clock_skew_secs: 180,
            omit_audience_check: false,
            show_error: false,
            require_signed_assertions: true,
            require_signed_responses: false,
            artifact_lifetime_secs: 300,
            request_lifetime_secs: 900,
            certificates: CertificateConfig::default(),
            identity_providers: Vec::new(),
        }
    }
}

impl SamlConfig {
    /// Parses configuration from a TOML document.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content)
            .map_err(|e| ConfigurationError::Load(format!("failed to parse config: {e}")))
    }

    /// Reads and parses a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::Load(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Checks the configuration and freezes it.
    pub fn validate(mut self) -> ConfigResult<ValidatedConfig> {
        let entity_id = self.service_provider.entity_id.trim();
        if entity_id.is_empty() {
            return Err(ConfigurationError::Missing(
                "service_provider.entity_id".to_string(),
            ));
        }
        require_absolute_uri("service_provider.entity_id", entity_id)?;

        if let Some(acs) = &self.service_provider.assertion_consumer_service_url {
            require_absolute_uri("service_provider.assertion_consumer_service_url", acs)?;
        }
        if let Some(slo) = &self.service_provider.single_logout_service_url {
            require_absolute_uri("service_provider.single_logout_service_url", slo)?;
        }

        for (index, audience) in self.allowed_audiences.iter().enumerate() {
            if audience.trim().is_empty() {
                return Err(ConfigurationError::invalid(
                    format!("allowed_audiences[{index}]"),
                    "must not be blank",
                ));
            }
        }

        if self.clock_skew_secs > MAX_CLOCK_SKEW_SECS {
            return Err(ConfigurationError::invalid(
                "clock_skew_secs",
                format!("must not exceed {MAX_CLOCK_SKEW_SECS} seconds"),
            ));
        }
        if self.artifact_lifetime_secs == 0 {
            return Err(ConfigurationError::invalid(
                "artifact_lifetime_secs",
                "must be greater than zero",
            ));
        }
        if self.request_lifetime_secs == 0 {
            return Err(ConfigurationError::invalid(
                "request_lifetime_secs",
                "must be greater than zero",
            ));
        }

        let mut thumbprints = Vec::with_capacity(self.certificates.trusted_thumbprints.len());
        for (index, raw) in self.certificates.trusted_thumbprints.iter().enumerate() {
            let normalized = normalize_thumbprint(raw);
            if normalized.len() != 40 || !normalized.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ConfigurationError::invalid(
                    format!("certificates.trusted_thumbprints[{index}]"),
                    "must be a hex encoded SHA-1 thumbprint",
                ));
            }
            thumbprints.push(normalized);
        }
        self.certificates.trusted_thumbprints = thumbprints;

        let mut seen = HashSet::new();
        for (index, idp) in self.identity_providers.iter().enumerate() {
            if idp.entity_id.trim().is_empty() {
                return Err(ConfigurationError::invalid(
                    format!("identity_providers[{index}].entity_id"),
                    "must not be blank",
                ));
            }
            if !seen.insert(idp.entity_id.as_str()) {
                return Err(ConfigurationError::invalid(
                    format!("identity_providers[{index}].entity_id"),
                    format!("duplicate identity provider '{}'", idp.entity_id),
                ));
            }
            if let Some(url) = &idp.artifact_resolution_url {
                require_absolute_uri(
                    &format!("identity_providers[{index}].artifact_resolution_url"),
                    url,
                )?;
            }
        }

        Ok(ValidatedConfig(Arc::new(self)))
    }
}

/// Normalizes a thumbprint to upper-case hex without separators.
#[must_use]
pub fn normalize_thumbprint(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect::<String>()
        .to_ascii_uppercase()
}

fn require_absolute_uri(field: &str, value: &str) -> ConfigResult<()> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|e| ConfigurationError::invalid(field, format!("not an absolute URI: {e}")))
}

/// Configuration that passed [`SamlConfig::validate`].
///
/// Cloning is cheap; all clones share the same frozen settings.
#[derive(Debug, Clone)]
pub struct ValidatedConfig(Arc<SamlConfig>);

impl ValidatedConfig {
    /// Allowed clock skew.
    #[must_use]
    pub fn clock_skew(&self) -> Duration {
        seconds(self.0.clock_skew_secs)
    }

    /// Lifetime of a pending artifact-binding message.
    #[must_use]
    pub fn artifact_lifetime(&self) -> Duration {
        seconds(self.0.artifact_lifetime_secs)
    }

    /// Lifetime of a recorded outstanding request ID.
    #[must_use]
    pub fn request_lifetime(&self) -> Duration {
        seconds(self.0.request_lifetime_secs)
    }

    /// Looks up the settings for an identity provider.
    #[must_use]
    pub fn identity_provider(&self, entity_id: &str) -> Option<&IdentityProviderConfig> {
        self.0
            .identity_providers
            .iter()
            .find(|idp| idp.entity_id == entity_id)
    }
}

fn seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

impl Deref for ValidatedConfig {
    type Target = SamlConfig;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
