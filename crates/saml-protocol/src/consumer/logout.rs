//! Single logout processing.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use saml_core::ValidatedConfig;
use saml_crypto::PublicKey;
use tracing::{info, warn};

use super::IssuerTrust;
use crate::error::{FormatError, SamlError, SamlResult, TrustError};
use crate::replay::ReplayGuard;
use crate::signature::{SignedQuery, TrustStore, is_signed, verify_detached_signature, verify_signature};
use crate::types::{LogoutRequest, LogoutResponse, SAML_VERSION, Status};
use crate::validation::NameIdValidator;
use crate::xml::{XmlElement, logout_request_from_element, logout_response_from_element};

/// Validates inbound `LogoutRequest` and `LogoutResponse` messages.
///
/// Logout messages must be signed, either with an enveloped signature or,
/// over HTTP-Redirect, with a detached signature on the query string.
pub struct LogoutConsumer {
    trust: IssuerTrust,
    replay_guard: ReplayGuard,
    clock_skew: Duration,
}

impl std::fmt::Debug for LogoutConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogoutConsumer")
            .field("entity_id", &self.trust.config.service_provider.entity_id)
            .field("clock_skew", &self.clock_skew)
            .finish_non_exhaustive()
    }
}

impl LogoutConsumer {
    /// Creates a consumer.
    pub fn new(
        config: ValidatedConfig,
        trust_store: Arc<dyn TrustStore>,
        replay_guard: ReplayGuard,
    ) -> Self {
        let clock_skew = config.clock_skew();
        Self {
            trust: IssuerTrust::new(config, trust_store),
            replay_guard,
            clock_skew,
        }
    }

    /// Validates a logout request from an identity provider.
    ///
    /// `signed_query` is the detached signature of an HTTP-Redirect
    /// delivery; the caller must extract it from the same request the XML
    /// was decoded from.
    pub fn consume_logout_request(
        &self,
        xml: &str,
        signed_query: Option<&SignedQuery>,
    ) -> SamlResult<LogoutRequest> {
        self.consume_logout_request_at(xml, signed_query, Utc::now())
    }

    /// Validates a logout request as of `now`.
    pub fn consume_logout_request_at(
        &self,
        xml: &str,
        signed_query: Option<&SignedQuery>,
        now: DateTime<Utc>,
    ) -> SamlResult<LogoutRequest> {
        let root = XmlElement::parse(xml)?;
        let request = logout_request_from_element(&root)?;
        if request.version != SAML_VERSION {
            return Err(FormatError::new("Wrong value of version attribute on LogoutRequest element").into());
        }
        self.check_destination(request.destination.as_deref(), "LogoutRequest")?;

        let keys = self.trust.keys_for(request.issuer_value())?;
        verify_message_signature(xml, &root, signed_query, &keys)?;

        let name_id = request
            .name_id
            .as_ref()
            .ok_or_else(|| FormatError::new("LogoutRequest must contain a NameID"))?;
        NameIdValidator.validate(name_id)?;

        if let Some(not_on_or_after) = request.not_on_or_after {
            let earliest = now.checked_sub_signed(self.clock_skew).unwrap_or(DateTime::<Utc>::MIN_UTC);
            if not_on_or_after <= earliest {
                return Err(FormatError::new("LogoutRequest.NotOnOrAfter must not be in the past").into());
            }
        }

        info!(
            issuer = request.issuer_value().unwrap_or_default(),
            sessions = request.session_indexes.len(),
            "Accepted logout request"
        );
        Ok(request)
    }

    /// Validates a logout response answering the request recorded under
    /// `state_key`.
    pub fn consume_logout_response(
        &self,
        xml: &str,
        state_key: &str,
        signed_query: Option<&SignedQuery>,
    ) -> SamlResult<LogoutResponse> {
        let root = XmlElement::parse(xml)?;
        let response = logout_response_from_element(&root)?;
        if response.version != SAML_VERSION {
            return Err(FormatError::new("Wrong value of version attribute on LogoutResponse element").into());
        }
        self.check_destination(response.destination.as_deref(), "LogoutResponse")?;

        let keys = self.trust.keys_for(response.issuer.as_ref().map(|i| i.value.as_str()))?;
        verify_message_signature(xml, &root, signed_query, &keys)?;

        self.replay_guard
            .check_in_response_to(state_key, response.in_response_to.as_deref())?;

        if !response.status.is_success() {
            warn!(code = %response.status.status_code.value, "Logout was not successful");
            return Err(SamlError::Status {
                code: response.status.status_code.value.clone(),
                sub_code: response.status.sub_code().map(str::to_string),
                message: response.status.status_message.clone(),
            });
        }
        info!(in_response_to = response.in_response_to.as_deref(), "Accepted logout response");
        Ok(response)
    }

    /// Builds the answer to an accepted logout request.
    #[must_use]
    pub fn answer(&self, request: &LogoutRequest, status: Status) -> LogoutResponse {
        LogoutResponse::answering(
            self.trust.config.service_provider.entity_id.clone(),
            request.id.clone(),
            status,
        )
    }

    fn check_destination(&self, destination: Option<&str>, element: &str) -> SamlResult<()> {
        let expected = self.trust.config.service_provider.single_logout_service_url.as_deref();
        match (destination, expected) {
            (Some(actual), Some(expected)) if actual != expected => Err(FormatError::new(format!(
                "Destination of {element} does not match the single logout service"
            ))
            .into()),
            _ => Ok(()),
        }
    }
}

fn verify_message_signature(
    xml: &str,
    root: &XmlElement,
    signed_query: Option<&SignedQuery>,
    keys: &[PublicKey],
) -> Result<(), TrustError> {
    if is_signed(root) {
        verify_signature(xml, root, keys)
    } else if let Some(query) = signed_query {
        verify_detached_signature(query, keys)
    } else {
        Err(TrustError::NoSignature)
    }
}
