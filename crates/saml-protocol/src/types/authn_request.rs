//! SAML `AuthnRequest`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{NameIdPolicy, SAML_VERSION, SamlBinding, generate_id};

/// Authentication request sent by this service provider.
///
/// Its ID is what the replay guard records and later expects in the
/// `InResponseTo` of the answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthnRequest {
    /// Unique identifier.
    pub id: String,

    /// Protocol version.
    pub version: String,

    /// When the request was issued.
    pub issue_instant: DateTime<Utc>,

    /// Entity ID of this service provider.
    pub issuer: String,

    /// Identity provider endpoint the request is sent to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// Where the response should be delivered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertion_consumer_service_url: Option<String>,

    /// Binding the response should use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_binding: Option<String>,

    /// Requested name identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_id_policy: Option<NameIdPolicy>,

    /// Requested authentication context classes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requested_authn_context: Vec<String>,

    /// The identity provider must authenticate the user again.
    #[serde(default)]
    pub force_authn: bool,

    /// The identity provider must not interact with the user.
    #[serde(default)]
    pub is_passive: bool,
}

impl AuthnRequest {
    /// Creates a request with a fresh ID.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            version: SAML_VERSION.to_string(),
            issue_instant: Utc::now(),
            issuer: issuer.into(),
            destination: None,
            assertion_consumer_service_url: None,
            protocol_binding: None,
            name_id_policy: None,
            requested_authn_context: Vec::new(),
            force_authn: false,
            is_passive: false,
        }
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Sets the assertion consumer service URL.
    #[must_use]
    pub fn with_acs_url(mut self, url: impl Into<String>) -> Self {
        self.assertion_consumer_service_url = Some(url.into());
        self
    }

    /// Sets the protocol binding for the response.
    #[must_use]
    pub fn with_binding(mut self, binding: SamlBinding) -> Self {
        self.protocol_binding = Some(binding.uri().to_string());
        self
    }

    /// Sets the name ID policy.
    #[must_use]
    pub fn with_name_id_policy(mut self, policy: NameIdPolicy) -> Self {
        self.name_id_policy = Some(policy);
        self
    }

    /// Requests an authentication context class.
    #[must_use]
    pub fn with_authn_context_class(mut self, class_ref: impl Into<String>) -> Self {
        self.requested_authn_context.push(class_ref.into());
        self
    }

    /// Sets `ForceAuthn`.
    #[must_use]
    pub const fn force_authn(mut self, force: bool) -> Self {
        self.force_authn = force;
        self
    }

    /// Sets `IsPassive`.
    #[must_use]
    pub const fn is_passive(mut self, passive: bool) -> Self {
        self.is_passive = passive;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NameIdFormat;

    #[test]
    fn builder() {
        let request = AuthnRequest::new("https://sp.example.org")
            .with_destination("https://idp.example.org/sso")
            .with_acs_url("https://sp.example.org/acs")
            .with_binding(SamlBinding::HttpPost)
            .with_name_id_policy(NameIdPolicy::new(NameIdFormat::Persistent).allow_create(true))
            .force_authn(true);

        assert!(request.id.starts_with('_'));
        assert_eq!(request.protocol_binding.as_deref(), Some(SamlBinding::HttpPost.uri()));
        assert!(request.force_authn);
        assert!(!request.is_passive);
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(AuthnRequest::new("a").id, AuthnRequest::new("a").id);
    }
}
