//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use saml_cache::MemoryStore;
use saml_core::{IdentityProviderConfig, SamlConfig, ServiceProviderConfig, ValidatedConfig};
use saml_crypto::{DecryptionKey, pem_to_der};
use saml_protocol::bindings::HttpRedirectBinding;
use saml_protocol::consumer::ResponseConsumer;
use saml_protocol::replay::ReplayGuard;
use saml_protocol::signature::{StaticTrustStore, XmlSigner};
use saml_protocol::types::{
    Assertion, AttributeStatement, AuthnRequest, AuthnStatement, Conditions, NameId, NameIdFormat, Response,
    SamlAttribute, Subject, SubjectConfirmation, SubjectConfirmationData, authn_context_classes,
};
use saml_protocol::xml::{write_assertion, write_authn_request, write_response_with_assertions};

pub const IDP: &str = "https://idp.example.org";
pub const SP: &str = "https://sp.example.org";
pub const ACS: &str = "https://sp.example.org/acs";

pub const IDP_KEY: &str = include_str!("../fixtures/idp-key.pem");
pub const IDP_CERT: &str = include_str!("../fixtures/idp-cert.pem");
pub const OTHER_KEY: &str = include_str!("../fixtures/other-key.pem");
pub const OTHER_CERT: &str = include_str!("../fixtures/other-cert.pem");
pub const EXPIRED_CERT: &str = include_str!("../fixtures/expired-cert.pem");

/// Routes library logs to the test output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("saml_protocol=debug,saml_cache=debug")
        .with_test_writer()
        .try_init();
}

pub fn der(pem: &str) -> Vec<u8> {
    pem_to_der(pem, "CERTIFICATE").unwrap()
}

pub fn raw_config() -> SamlConfig {
    SamlConfig {
        service_provider: ServiceProviderConfig {
            entity_id: SP.to_string(),
            assertion_consumer_service_url: Some(ACS.to_string()),
            single_logout_service_url: Some(format!("{SP}/slo")),
        },
        allowed_audiences: vec![SP.to_string()],
        identity_providers: vec![IdentityProviderConfig {
            entity_id: IDP.to_string(),
            ..IdentityProviderConfig::default()
        }],
        ..SamlConfig::default()
    }
}

pub fn config() -> ValidatedConfig {
    raw_config().validate().unwrap()
}

pub fn idp_signer() -> XmlSigner {
    XmlSigner::from_pem(IDP_KEY, Some(IDP_CERT)).unwrap()
}

pub fn trust_store() -> StaticTrustStore {
    StaticTrustStore::new().with_signing_certificate(IDP, der(IDP_CERT))
}

/// A service provider wired the way an application would wire it.
pub struct ServiceProvider {
    pub consumer: ResponseConsumer,
    pub guard: ReplayGuard,
}

impl ServiceProvider {
    pub fn new(config: ValidatedConfig, trust_store: StaticTrustStore) -> Self {
        init_tracing();
        let guard = ReplayGuard::from_config(Arc::new(MemoryStore::new()), &config);
        let keys = vec![DecryptionKey::from_pem(IDP_KEY).unwrap()];
        let consumer = ResponseConsumer::new(config, Arc::new(trust_store), guard.clone(), keys);
        Self { consumer, guard }
    }

    pub fn standard() -> Self {
        Self::new(config(), trust_store())
    }

    /// Sends an `AuthnRequest` over HTTP-Redirect, records it as
    /// outstanding and returns its ID.
    pub fn send_request(&self, state_key: &str) -> String {
        let request = AuthnRequest::new(SP)
            .with_destination(format!("{IDP}/sso"))
            .with_acs_url(ACS);
        let url = HttpRedirectBinding::encode_request(
            &write_authn_request(&request),
            &format!("{IDP}/sso"),
            Some(state_key),
            None,
        )
        .unwrap();
        assert!(url.contains("SAMLRequest="));
        self.guard
            .record_expected_in_response_to(state_key, &request.id)
            .unwrap();
        request.id
    }
}

/// An assertion answering `request_id`, valid for five minutes.
pub fn assertion(request_id: &str) -> Assertion {
    let now = Utc::now();
    let expiry = now + Duration::minutes(5);
    Assertion::new(IDP)
        .with_subject(
            Subject::new(NameId::with_format("alice@example.org", NameIdFormat::Email))
                .with_confirmation(
                    SubjectConfirmation::bearer()
                        .with_data(SubjectConfirmationData::for_request(request_id, ACS, expiry)),
                ),
        )
        .with_conditions(Conditions::valid_between(now - Duration::minutes(1), expiry).with_audience(SP))
        .with_statement(
            AuthnStatement::new(authn_context_classes::PASSWORD_PROTECTED_TRANSPORT)
                .with_session_index("_session1"),
        )
        .with_statement(
            AttributeStatement::new()
                .with_attribute(SamlAttribute::single("mail", "alice@example.org"))
                .with_attribute(SamlAttribute::multi(
                    "groups",
                    vec!["staff".to_string(), "admins".to_string()],
                )),
        )
}

pub fn signed_assertion_xml(assertion: &Assertion) -> String {
    let id = assertion.id.as_deref().unwrap();
    idp_signer().sign(&write_assertion(assertion), id).unwrap()
}

/// A response to `request_id` embedding `fragments`, optionally signed.
pub fn response_xml(request_id: &str, fragments: &[String], sign: bool) -> String {
    let response = Response::success(IDP)
        .in_response_to(request_id)
        .with_destination(ACS);
    let xml = write_response_with_assertions(&response, fragments);
    if sign {
        idp_signer().sign(&xml, &response.id).unwrap()
    } else {
        xml
    }
}
