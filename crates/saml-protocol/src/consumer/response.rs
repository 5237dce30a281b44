//! Authentication response processing.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use saml_core::{ConfigurationError, ValidatedConfig};
use saml_crypto::{DecryptionKey, PublicKey};
use tracing::{debug, info, warn};

use super::IssuerTrust;
use crate::error::{FormatError, FormatResult, SamlError, SamlResult, TrustError};
use crate::replay::ReplayGuard;
use crate::signature::{DecryptedAssertion, TrustStore, decrypt_assertion, decrypt_attribute, verify_signature};
use crate::types::{
    Assertion, AttributeItem, NameId, SAML_NS, SAML_VERSION, SamlAttribute, Statement, Status,
};
use crate::validation::{AssertionValidator, validate_encrypted_element};
use crate::xml::{XmlElement, response_from_element};

/// An assertion that passed every check.
#[derive(Debug, Clone)]
pub struct ConsumedAssertion {
    /// The assertion.
    pub assertion: Assertion,
    /// Entity ID of the identity provider.
    pub issuer: String,
    /// The subject's name ID.
    pub name_id: Option<NameId>,
    /// Session index of the authentication statement.
    pub session_index: Option<String>,
    /// Clear-text and decrypted attributes.
    pub attributes: Vec<SamlAttribute>,
}

impl ConsumedAssertion {
    /// Returns the values of the first attribute called `name`.
    #[must_use]
    pub fn attribute_values(&self, name: &str) -> Option<&[String]> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.values.as_slice())
    }
}

/// Turns a `samlp:Response` into a trusted, validated assertion.
///
/// Processing stops at the first failure:
///
/// 1. parse the response and check its version and destination
/// 2. require a `Success` status
/// 3. match `InResponseTo` against the outstanding request, leaving it
///    outstanding
/// 4. resolve the issuer's trusted keys; none is a configuration error
/// 5. verify the response signature if present (required when configured)
/// 6. decrypt encrypted assertions
/// 7. require exactly one assertion
/// 8. verify the assertion signature unless the signed response covers it
/// 9. validate the assertion and its bearer confirmation
/// 10. consume the outstanding request and record the assertion ID so
///     neither is accepted twice
pub struct ResponseConsumer {
    trust: IssuerTrust,
    replay_guard: ReplayGuard,
    decryption_keys: Vec<DecryptionKey>,
    validator: AssertionValidator,
}

impl std::fmt::Debug for ResponseConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseConsumer")
            .field("entity_id", &self.trust.config.service_provider.entity_id)
            .field("decryption_keys", &self.decryption_keys.len())
            .finish_non_exhaustive()
    }
}

enum AssertionSource<'a> {
    Embedded(&'a XmlElement),
    Decrypted(String),
}

impl ResponseConsumer {
    /// Creates a consumer.
    pub fn new(
        config: ValidatedConfig,
        trust_store: Arc<dyn TrustStore>,
        replay_guard: ReplayGuard,
        decryption_keys: Vec<DecryptionKey>,
    ) -> Self {
        let validator = AssertionValidator::from_config(&config);
        Self {
            trust: IssuerTrust::new(config, trust_store),
            replay_guard,
            decryption_keys,
            validator,
        }
    }

    /// Processes a response received for the request recorded under
    /// `state_key`.
    pub fn consume(&self, xml: &str, state_key: &str) -> SamlResult<ConsumedAssertion> {
        self.consume_at(xml, state_key, Utc::now())
    }

    /// Processes a response as of `now`.
    pub fn consume_at(
        &self,
        xml: &str,
        state_key: &str,
        now: DateTime<Utc>,
    ) -> SamlResult<ConsumedAssertion> {
        let result = self.process(xml, state_key, now);
        match &result {
            Ok(consumed) => info!(
                issuer = %consumed.issuer,
                assertion_id = consumed.assertion.id.as_deref().unwrap_or_default(),
                "Accepted SAML response"
            ),
            Err(e) if e.is_security_event() => {
                warn!(kind = e.kind(), error = %e, "Rejected SAML response");
            }
            Err(e) => info!(kind = e.kind(), error = %e, "Rejected SAML response"),
        }
        result
    }

    fn process(&self, xml: &str, state_key: &str, now: DateTime<Utc>) -> SamlResult<ConsumedAssertion> {
        let config = &self.trust.config;
        let acs_url = config
            .service_provider
            .assertion_consumer_service_url
            .as_deref()
            .ok_or_else(|| {
                ConfigurationError::Missing("service_provider.assertion_consumer_service_url".to_string())
            })?;

        let root = XmlElement::parse(xml)?;
        let response = response_from_element(&root)?;
        if response.version != SAML_VERSION {
            return Err(FormatError::new("Wrong value of version attribute on Response element").into());
        }
        if response.destination.as_deref().is_some_and(|d| d != acs_url) {
            return Err(FormatError::new(
                "Destination of Response does not match the assertion consumer service",
            )
            .into());
        }

        if !response.status.is_success() {
            return Err(status_error(&response.status));
        }

        self.replay_guard
            .expect_in_response_to(state_key, response.in_response_to.as_deref())?;

        let keys = self.trust.keys_for(response.issuer_value())?;
        let issuer = response.issuer_value().unwrap_or_default().to_string();

        let response_signed = match verify_signature(xml, &root, &keys) {
            Ok(()) => true,
            Err(TrustError::NoSignature) if !config.require_signed_responses => false,
            Err(e) => return Err(e.into()),
        };

        let mut candidates: Vec<(Assertion, AssertionSource<'_>)> = root
            .children_named(SAML_NS, "Assertion")
            .zip(response.assertions)
            .map(|(element, assertion)| (assertion, AssertionSource::Embedded(element)))
            .collect();
        for encrypted in &response.encrypted_assertions {
            validate_encrypted_element(encrypted, "EncryptedAssertion")?;
            let DecryptedAssertion { assertion, xml: plaintext } =
                decrypt_assertion(encrypted, &self.decryption_keys)?;
            candidates.push((assertion, AssertionSource::Decrypted(plaintext)));
        }

        if candidates.len() != 1 {
            return Err(FormatError::new(format!(
                "Response must contain exactly one assertion, found {}",
                candidates.len()
            ))
            .into());
        }
        let Some((assertion, source)) = candidates.pop() else {
            return Err(FormatError::new("Response must contain exactly one assertion").into());
        };

        if assertion.issuer_value() != Some(issuer.as_str()) {
            return Err(TrustError::UnknownIssuer(
                assertion.issuer_value().unwrap_or_default().to_string(),
            )
            .into());
        }

        let omit_check = config
            .identity_provider(&issuer)
            .is_some_and(|idp| idp.omit_assertion_signature_check);
        let covered_by_response = response_signed && (omit_check || !config.require_signed_assertions);
        verify_assertion_signature(xml, &source, &keys, covered_by_response)?;

        self.validator.validate_at(&assertion, now)?;
        check_bearer_confirmation(
            &assertion,
            acs_url,
            response.in_response_to.as_deref(),
            config.clock_skew(),
            now,
        )?;

        let mut attributes: Vec<SamlAttribute> = assertion.attributes().cloned().collect();
        for encrypted in encrypted_attributes(&assertion) {
            attributes.push(decrypt_attribute(encrypted, &self.decryption_keys)?);
        }

        self.replay_guard
            .check_in_response_to(state_key, response.in_response_to.as_deref())?;
        if let Some(id) = assertion.id.as_deref() {
            self.replay_guard
                .check_one_time_use(id, assertion.not_on_or_after())?;
        }

        Ok(ConsumedAssertion {
            issuer,
            name_id: assertion.name_id().cloned(),
            session_index: assertion.session_index().map(str::to_string),
            attributes,
            assertion,
        })
    }
}

fn status_error(status: &Status) -> SamlError {
    SamlError::Status {
        code: status.status_code.value.clone(),
        sub_code: status.sub_code().map(str::to_string),
        message: status.status_message.clone(),
    }
}

fn verify_assertion_signature(
    xml: &str,
    source: &AssertionSource<'_>,
    keys: &[PublicKey],
    covered_by_response: bool,
) -> SamlResult<()> {
    let result = match source {
        AssertionSource::Embedded(element) => verify_signature(xml, element, keys),
        AssertionSource::Decrypted(plaintext) => {
            let element = XmlElement::parse(plaintext)?;
            verify_signature(plaintext, &element, keys)
        }
    };
    match result {
        Err(TrustError::NoSignature) if covered_by_response => {
            debug!("Unsigned assertion accepted under signed response");
            Ok(())
        }
        other => other.map_err(Into::into),
    }
}

fn encrypted_attributes(assertion: &Assertion) -> impl Iterator<Item = &crate::types::EncryptedElement> {
    assertion
        .statements
        .iter()
        .filter_map(|s| match s {
            Statement::Attribute(statement) => Some(statement),
            _ => None,
        })
        .flat_map(|statement| statement.items.iter())
        .filter_map(|item| match item {
            AttributeItem::EncryptedAttribute(encrypted) => Some(encrypted),
            AttributeItem::Attribute(_) => None,
        })
}

/// Checks that a bearer confirmation addresses this service.
///
/// At least one bearer `SubjectConfirmation` must name `recipient`, carry a
/// `NotOnOrAfter` that has not passed, and answer `in_response_to` when it
/// names a request.
pub fn check_bearer_confirmation(
    assertion: &Assertion,
    recipient: &str,
    in_response_to: Option<&str>,
    clock_skew: Duration,
    now: DateTime<Utc>,
) -> FormatResult {
    let subject = assertion
        .subject
        .as_ref()
        .ok_or_else(|| FormatError::new("Assertion must contain a Subject"))?;

    let earliest = now.checked_sub_signed(clock_skew).unwrap_or(DateTime::<Utc>::MIN_UTC);
    let mut bearers = subject.confirmations().filter(|c| c.is_bearer()).peekable();
    if bearers.peek().is_none() {
        return Err(FormatError::new("Assertion must contain a bearer SubjectConfirmation"));
    }

    let confirmed = bearers.any(|confirmation| {
        confirmation.data.as_ref().is_some_and(|data| {
            data.recipient.as_deref() == Some(recipient)
                && data.not_on_or_after.is_some_and(|t| t > earliest)
                && (data.in_response_to.is_none() || data.in_response_to.as_deref() == in_response_to)
        })
    });
    if confirmed {
        Ok(())
    } else {
        Err(FormatError::new(
            "No bearer SubjectConfirmationData is valid for this service",
        ))
    }
}

#[cfg(test)]
mod tests {
    use saml_cache::MemoryStore;
    use saml_core::{IdentityProviderConfig, SamlConfig, ServiceProviderConfig};

    use super::*;
    use crate::signature::StaticTrustStore;
    use crate::types::{Response, Subject, SubjectConfirmation, SubjectConfirmationData, status_codes, sub_status_codes};
    use crate::xml::write_response;

    const IDP: &str = "https://idp.example.org";
    const ACS: &str = "https://sp.example.org/acs";

    fn config() -> ValidatedConfig {
        SamlConfig {
            service_provider: ServiceProviderConfig {
                entity_id: "https://sp.example.org".to_string(),
                assertion_consumer_service_url: Some(ACS.to_string()),
                ..ServiceProviderConfig::default()
            },
            identity_providers: vec![IdentityProviderConfig {
                entity_id: IDP.to_string(),
                ..IdentityProviderConfig::default()
            }],
            ..SamlConfig::default()
        }
        .validate()
        .unwrap()
    }

    fn consumer(trust_store: StaticTrustStore) -> (ResponseConsumer, ReplayGuard) {
        let config = config();
        let guard = ReplayGuard::from_config(Arc::new(MemoryStore::new()), &config);
        let consumer = ResponseConsumer::new(config, Arc::new(trust_store), guard.clone(), Vec::new());
        (consumer, guard)
    }

    fn bearer_assertion(data: SubjectConfirmationData) -> Assertion {
        Assertion::new(IDP).with_subject(
            Subject::new(NameId::new("alice"))
                .with_confirmation(SubjectConfirmation::bearer().with_data(data)),
        )
    }

    #[test]
    fn non_success_status_is_reported() {
        let (consumer, guard) = consumer(StaticTrustStore::new());
        guard.record_expected_in_response_to("s", "_req").unwrap();
        let response = Response::success(IDP).in_response_to("_req").with_status(
            Status::error(status_codes::RESPONDER, Some(sub_status_codes::AUTHN_FAILED))
                .with_message("denied"),
        );

        match consumer.consume(&write_response(&response), "s") {
            Err(SamlError::Status { code, sub_code, message }) => {
                assert_eq!(code, status_codes::RESPONDER);
                assert_eq!(sub_code.as_deref(), Some(sub_status_codes::AUTHN_FAILED));
                assert_eq!(message.as_deref(), Some("denied"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn unsolicited_responses_are_rejected() {
        let (consumer, _) = consumer(StaticTrustStore::new());
        let response = Response::success(IDP).in_response_to("_req");
        assert!(matches!(
            consumer.consume(&write_response(&response), "s"),
            Err(SamlError::Replay(_))
        ));
    }

    #[test]
    fn unknown_issuer_and_missing_keys() {
        let (consumer, guard) = consumer(StaticTrustStore::new());

        guard.record_expected_in_response_to("s", "_req").unwrap();
        let stranger = Response::success("https://other.example.org").in_response_to("_req");
        assert!(matches!(
            consumer.consume(&write_response(&stranger), "s"),
            Err(SamlError::Trust(TrustError::UnknownIssuer(_)))
        ));

        guard.record_expected_in_response_to("s", "_req").unwrap();
        let known = Response::success(IDP).in_response_to("_req");
        assert!(matches!(
            consumer.consume(&write_response(&known), "s"),
            Err(SamlError::Configuration(ConfigurationError::Missing(_)))
        ));
    }

    #[test]
    fn wrong_destination() {
        let (consumer, _) = consumer(StaticTrustStore::new());
        let response = Response::success(IDP).with_destination("https://evil.example.org/acs");
        let err = consumer.consume(&write_response(&response), "s").unwrap_err();
        assert!(matches!(err, SamlError::Format(_)));
    }

    #[test]
    fn bearer_confirmation_rules() {
        let now = Utc::now();
        let skew = Duration::minutes(3);
        let valid = SubjectConfirmationData::for_request("_req", ACS, now + Duration::minutes(5));

        let assertion = bearer_assertion(valid.clone());
        assert!(check_bearer_confirmation(&assertion, ACS, Some("_req"), skew, now).is_ok());
        assert!(check_bearer_confirmation(&assertion, "https://other/acs", Some("_req"), skew, now).is_err());
        assert!(check_bearer_confirmation(&assertion, ACS, Some("_other"), skew, now).is_err());

        let late = bearer_assertion(SubjectConfirmationData {
            not_on_or_after: Some(now - Duration::minutes(1)),
            ..valid.clone()
        });
        assert!(check_bearer_confirmation(&late, ACS, Some("_req"), skew, now).is_ok());
        assert!(check_bearer_confirmation(&late, ACS, Some("_req"), Duration::zero(), now).is_err());

        let unsolicited = bearer_assertion(SubjectConfirmationData {
            in_response_to: None,
            ..valid.clone()
        });
        assert!(check_bearer_confirmation(&unsolicited, ACS, Some("_req"), skew, now).is_ok());

        let no_expiry = bearer_assertion(SubjectConfirmationData {
            not_on_or_after: None,
            ..valid
        });
        assert!(check_bearer_confirmation(&no_expiry, ACS, Some("_req"), skew, now).is_err());

        let no_bearer = Assertion::new(IDP).with_subject(Subject::new(NameId::new("alice")));
        let err = check_bearer_confirmation(&no_bearer, ACS, None, skew, now).unwrap_err();
        assert_eq!(err.message(), "Assertion must contain a bearer SubjectConfirmation");

        let no_subject = Assertion::new(IDP);
        assert!(check_bearer_confirmation(&no_subject, ACS, None, skew, now).is_err());
    }
}
