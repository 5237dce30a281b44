//! Serializes the data model to XML.
//!
//! Output carries no XML declaration and no whitespace between elements.
//! Every top-level fragment declares the namespaces it uses, so a signed
//! assertion can be embedded into a response unchanged.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::escape::escape;

use super::XmlElement;
use crate::types::{
    ArtifactResolve, ArtifactResponse, Assertion, AttributeItem, AuthnContextItem, AuthnRequest,
    Condition, ConfirmationDataKind, EncryptedData, EncryptedElement, EncryptedKey, KeyInfo,
    KeyInfoClause, LogoutRequest, LogoutResponse, NameId, NameIdPolicy, Response, SAML_NS,
    SAMLP_NS, SamlAttribute, Statement, Status, StatusCode, SubjectConfirmation, SubjectItem,
    XMLDSIG_NS, XMLENC_NS, XSI_NS,
};

/// Formats a timestamp the way SAML messages carry it.
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Serializes an assertion.
pub fn write_assertion(assertion: &Assertion) -> String {
    let mut w = XmlWriter::default();
    assertion_into(&mut w, assertion);
    w.finish()
}

/// Serializes a response with its assertions and encrypted assertions.
pub fn write_response(response: &Response) -> String {
    let fragments: Vec<String> = response
        .assertions
        .iter()
        .map(write_assertion)
        .chain(
            response
                .encrypted_assertions
                .iter()
                .map(|e| write_encrypted_element("EncryptedAssertion", e)),
        )
        .collect();
    write_response_with_assertions(response, &fragments)
}

/// Serializes a response, embedding pre-serialized assertion fragments.
///
/// The model's own assertions are ignored. Use this to embed assertions
/// that were signed or encrypted after serialization.
pub fn write_response_with_assertions(response: &Response, fragments: &[String]) -> String {
    let instant = response.issue_instant.map(format_instant);
    let mut w = XmlWriter::default();
    w.open("samlp:Response")
        .attr("xmlns:samlp", SAMLP_NS)
        .attr("xmlns:saml", SAML_NS)
        .attr("ID", &response.id)
        .attr("Version", &response.version)
        .opt_attr("IssueInstant", instant.as_deref())
        .opt_attr("Destination", response.destination.as_deref())
        .opt_attr("InResponseTo", response.in_response_to.as_deref())
        .close();
    if let Some(issuer) = &response.issuer {
        name_id_into(&mut w, "saml:Issuer", issuer);
    }
    status_into(&mut w, &response.status);
    for fragment in fragments {
        w.raw(fragment);
    }
    w.end("samlp:Response");
    w.finish()
}

/// Serializes an authentication request.
pub fn write_authn_request(request: &AuthnRequest) -> String {
    let instant = format_instant(request.issue_instant);
    let mut w = XmlWriter::default();
    w.open("samlp:AuthnRequest")
        .attr("xmlns:samlp", SAMLP_NS)
        .attr("xmlns:saml", SAML_NS)
        .attr("ID", &request.id)
        .attr("Version", &request.version)
        .attr("IssueInstant", &instant)
        .opt_attr("Destination", request.destination.as_deref())
        .opt_attr(
            "AssertionConsumerServiceURL",
            request.assertion_consumer_service_url.as_deref(),
        )
        .opt_attr("ProtocolBinding", request.protocol_binding.as_deref())
        .opt_attr("ForceAuthn", request.force_authn.then_some("true"))
        .opt_attr("IsPassive", request.is_passive.then_some("true"))
        .close();
    w.text_element("saml:Issuer", &request.issuer);
    if let Some(policy) = &request.name_id_policy {
        name_id_policy_into(&mut w, policy);
    }
    if !request.requested_authn_context.is_empty() {
        w.open("samlp:RequestedAuthnContext")
            .attr("Comparison", "exact")
            .close();
        for class_ref in &request.requested_authn_context {
            w.text_element("saml:AuthnContextClassRef", class_ref);
        }
        w.end("samlp:RequestedAuthnContext");
    }
    w.end("samlp:AuthnRequest");
    w.finish()
}

/// Serializes a logout request.
pub fn write_logout_request(request: &LogoutRequest) -> String {
    let instant = request.issue_instant.map(format_instant);
    let not_on_or_after = request.not_on_or_after.map(format_instant);
    let mut w = XmlWriter::default();
    w.open("samlp:LogoutRequest")
        .attr("xmlns:samlp", SAMLP_NS)
        .attr("xmlns:saml", SAML_NS)
        .attr("ID", &request.id)
        .attr("Version", &request.version)
        .opt_attr("IssueInstant", instant.as_deref())
        .opt_attr("Destination", request.destination.as_deref())
        .opt_attr("Reason", request.reason.as_deref())
        .opt_attr("NotOnOrAfter", not_on_or_after.as_deref())
        .close();
    if let Some(issuer) = &request.issuer {
        name_id_into(&mut w, "saml:Issuer", issuer);
    }
    if let Some(name_id) = &request.name_id {
        name_id_into(&mut w, "saml:NameID", name_id);
    }
    for index in &request.session_indexes {
        w.text_element("samlp:SessionIndex", index);
    }
    w.end("samlp:LogoutRequest");
    w.finish()
}

/// Serializes a logout response.
pub fn write_logout_response(response: &LogoutResponse) -> String {
    let instant = response.issue_instant.map(format_instant);
    let mut w = XmlWriter::default();
    w.open("samlp:LogoutResponse")
        .attr("xmlns:samlp", SAMLP_NS)
        .attr("xmlns:saml", SAML_NS)
        .attr("ID", &response.id)
        .attr("Version", &response.version)
        .opt_attr("IssueInstant", instant.as_deref())
        .opt_attr("Destination", response.destination.as_deref())
        .opt_attr("InResponseTo", response.in_response_to.as_deref())
        .close();
    if let Some(issuer) = &response.issuer {
        name_id_into(&mut w, "saml:Issuer", issuer);
    }
    status_into(&mut w, &response.status);
    w.end("samlp:LogoutResponse");
    w.finish()
}

/// Serializes an artifact resolve request.
pub fn write_artifact_resolve(resolve: &ArtifactResolve) -> String {
    let instant = resolve.issue_instant.map(format_instant);
    let mut w = XmlWriter::default();
    w.open("samlp:ArtifactResolve")
        .attr("xmlns:samlp", SAMLP_NS)
        .attr("xmlns:saml", SAML_NS)
        .attr("ID", &resolve.id)
        .attr("Version", &resolve.version)
        .opt_attr("IssueInstant", instant.as_deref())
        .opt_attr("Destination", resolve.destination.as_deref())
        .close();
    if let Some(issuer) = &resolve.issuer {
        name_id_into(&mut w, "saml:Issuer", issuer);
    }
    w.text_element("samlp:Artifact", &resolve.artifact);
    w.end("samlp:ArtifactResolve");
    w.finish()
}

/// Serializes an artifact response, embedding the referenced message as is.
pub fn write_artifact_response(response: &ArtifactResponse) -> String {
    let instant = response.issue_instant.map(format_instant);
    let mut w = XmlWriter::default();
    w.open("samlp:ArtifactResponse")
        .attr("xmlns:samlp", SAMLP_NS)
        .attr("xmlns:saml", SAML_NS)
        .attr("ID", &response.id)
        .attr("Version", &response.version)
        .opt_attr("IssueInstant", instant.as_deref())
        .opt_attr("InResponseTo", response.in_response_to.as_deref())
        .close();
    if let Some(issuer) = &response.issuer {
        name_id_into(&mut w, "saml:Issuer", issuer);
    }
    status_into(&mut w, &response.status);
    if let Some(message) = &response.message {
        w.raw(message);
    }
    w.end("samlp:ArtifactResponse");
    w.finish()
}

/// Serializes an encrypted wrapper such as `EncryptedAssertion`.
pub fn write_encrypted_element(local_name: &str, element: &EncryptedElement) -> String {
    let mut w = XmlWriter::default();
    encrypted_element_into(&mut w, local_name, element);
    w.finish()
}

/// Serializes a generic element tree.
pub fn write_element(element: &XmlElement) -> String {
    let mut w = XmlWriter::default();
    element_into(&mut w, element, None);
    w.finish()
}

// ============================================================================
// Writer
// ============================================================================

#[derive(Default)]
struct XmlWriter {
    out: String,
}

impl XmlWriter {
    fn open(&mut self, tag: &str) -> &mut Self {
        self.out.push('<');
        self.out.push_str(tag);
        self
    }

    fn attr(&mut self, name: &str, value: &str) -> &mut Self {
        self.out.push(' ');
        self.out.push_str(name);
        self.out.push_str("=\"");
        self.out.push_str(&escape(value));
        self.out.push('"');
        self
    }

    fn opt_attr(&mut self, name: &str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value {
            self.attr(name, value);
        }
        self
    }

    fn close(&mut self) {
        self.out.push('>');
    }

    fn close_empty(&mut self) {
        self.out.push_str("/>");
    }

    fn end(&mut self, tag: &str) {
        self.out.push_str("</");
        self.out.push_str(tag);
        self.out.push('>');
    }

    fn text(&mut self, text: &str) {
        self.out.push_str(&escape(text));
    }

    fn text_element(&mut self, tag: &str, text: &str) {
        self.open(tag).close();
        self.text(text);
        self.end(tag);
    }

    fn raw(&mut self, xml: &str) {
        self.out.push_str(xml);
    }

    fn finish(self) -> String {
        self.out
    }
}

// ============================================================================
// Assertion
// ============================================================================

fn assertion_into(w: &mut XmlWriter, assertion: &Assertion) {
    let instant = assertion.issue_instant.map(format_instant);
    w.open("saml:Assertion")
        .attr("xmlns:saml", SAML_NS)
        .attr("xmlns:xsi", XSI_NS)
        .opt_attr("ID", assertion.id.as_deref())
        .attr("Version", &assertion.version)
        .opt_attr("IssueInstant", instant.as_deref())
        .close();

    if let Some(issuer) = &assertion.issuer {
        name_id_into(w, "saml:Issuer", issuer);
    }

    if let Some(subject) = &assertion.subject {
        w.open("saml:Subject").close();
        for item in &subject.items {
            match item {
                SubjectItem::NameId(name_id) => name_id_into(w, "saml:NameID", name_id),
                SubjectItem::EncryptedId(encrypted) => {
                    encrypted_element_into(w, "EncryptedID", encrypted);
                }
                SubjectItem::SubjectConfirmation(confirmation) => {
                    subject_confirmation_into(w, confirmation);
                }
                SubjectItem::Other(element) => element_into(w, element, None),
            }
        }
        w.end("saml:Subject");
    }

    if let Some(conditions) = &assertion.conditions {
        let not_before = conditions.not_before.map(format_instant);
        let not_on_or_after = conditions.not_on_or_after.map(format_instant);
        w.open("saml:Conditions")
            .opt_attr("NotBefore", not_before.as_deref())
            .opt_attr("NotOnOrAfter", not_on_or_after.as_deref())
            .close();
        for condition in &conditions.items {
            match condition {
                Condition::AudienceRestriction(restriction) => {
                    w.open("saml:AudienceRestriction").close();
                    for audience in &restriction.audiences {
                        w.text_element("saml:Audience", audience);
                    }
                    w.end("saml:AudienceRestriction");
                }
                Condition::OneTimeUse => w.open("saml:OneTimeUse").close_empty(),
                Condition::ProxyRestriction(restriction) => {
                    w.open("saml:ProxyRestriction")
                        .opt_attr("Count", restriction.count.as_deref())
                        .close();
                    for audience in &restriction.audiences {
                        w.text_element("saml:Audience", audience);
                    }
                    w.end("saml:ProxyRestriction");
                }
            }
        }
        w.end("saml:Conditions");
    }

    for statement in &assertion.statements {
        statement_into(w, statement);
    }

    w.end("saml:Assertion");
}

fn name_id_into(w: &mut XmlWriter, tag: &str, name_id: &NameId) {
    w.open(tag)
        .opt_attr("Format", name_id.format.as_deref())
        .opt_attr("NameQualifier", name_id.name_qualifier.as_deref())
        .opt_attr("SPNameQualifier", name_id.sp_name_qualifier.as_deref())
        .opt_attr("SPProvidedID", name_id.sp_provided_id.as_deref())
        .close();
    w.text(&name_id.value);
    w.end(tag);
}

fn name_id_policy_into(w: &mut XmlWriter, policy: &NameIdPolicy) {
    w.open("samlp:NameIDPolicy")
        .opt_attr("Format", policy.format.as_deref())
        .opt_attr("SPNameQualifier", policy.sp_name_qualifier.as_deref())
        .opt_attr(
            "AllowCreate",
            policy.allow_create.map(|allow| if allow { "true" } else { "false" }),
        )
        .close_empty();
}

fn subject_confirmation_into(w: &mut XmlWriter, confirmation: &SubjectConfirmation) {
    w.open("saml:SubjectConfirmation")
        .attr("Method", &confirmation.method)
        .close();
    if let Some(name_id) = &confirmation.name_id {
        name_id_into(w, "saml:NameID", name_id);
    }
    if let Some(data) = &confirmation.data {
        let not_before = data.not_before.map(format_instant);
        let not_on_or_after = data.not_on_or_after.map(format_instant);
        w.open("saml:SubjectConfirmationData")
            .opt_attr(
                "xsi:type",
                (data.kind == ConfirmationDataKind::KeyInfo)
                    .then_some("saml:KeyInfoConfirmationDataType"),
            )
            .opt_attr("NotBefore", not_before.as_deref())
            .opt_attr("NotOnOrAfter", not_on_or_after.as_deref())
            .opt_attr("Recipient", data.recipient.as_deref())
            .opt_attr("InResponseTo", data.in_response_to.as_deref())
            .opt_attr("Address", data.address.as_deref())
            .close();
        for element in &data.any_elements {
            element_into(w, element, None);
        }
        w.end("saml:SubjectConfirmationData");
    }
    w.end("saml:SubjectConfirmation");
}

fn statement_into(w: &mut XmlWriter, statement: &Statement) {
    match statement {
        Statement::Authn(authn) => {
            let instant = authn.authn_instant.map(format_instant);
            let session_end = authn.session_not_on_or_after.map(format_instant);
            w.open("saml:AuthnStatement")
                .opt_attr("AuthnInstant", instant.as_deref())
                .opt_attr("SessionIndex", authn.session_index.as_deref())
                .opt_attr("SessionNotOnOrAfter", session_end.as_deref())
                .close();
            if let Some(locality) = &authn.subject_locality {
                w.open("saml:SubjectLocality")
                    .opt_attr("Address", locality.address.as_deref())
                    .opt_attr("DNSName", locality.dns_name.as_deref())
                    .close_empty();
            }
            if let Some(context) = &authn.authn_context {
                w.open("saml:AuthnContext").close();
                for item in &context.items {
                    match item {
                        AuthnContextItem::ClassRef(uri) => {
                            w.text_element("saml:AuthnContextClassRef", uri);
                        }
                        AuthnContextItem::DeclRef(uri) => {
                            w.text_element("saml:AuthnContextDeclRef", uri);
                        }
                        AuthnContextItem::Decl(element) => element_into(w, element, None),
                    }
                }
                for authority in &context.authenticating_authorities {
                    w.text_element("saml:AuthenticatingAuthority", authority);
                }
                w.end("saml:AuthnContext");
            }
            w.end("saml:AuthnStatement");
        }
        Statement::Attribute(statement) => {
            w.open("saml:AttributeStatement").close();
            for item in &statement.items {
                match item {
                    AttributeItem::Attribute(attribute) => attribute_into(w, attribute),
                    AttributeItem::EncryptedAttribute(encrypted) => {
                        encrypted_element_into(w, "EncryptedAttribute", encrypted);
                    }
                }
            }
            w.end("saml:AttributeStatement");
        }
        Statement::AuthzDecision(authz) => {
            w.open("saml:AuthzDecisionStatement")
                .opt_attr("Resource", authz.resource.as_deref())
                .attr("Decision", authz.decision.as_str())
                .close();
            for action in &authz.actions {
                w.open("saml:Action")
                    .opt_attr("Namespace", action.namespace.as_deref())
                    .close();
                w.text(&action.value);
                w.end("saml:Action");
            }
            w.end("saml:AuthzDecisionStatement");
        }
    }
}

fn attribute_into(w: &mut XmlWriter, attribute: &SamlAttribute) {
    w.open("saml:Attribute")
        .attr("Name", &attribute.name)
        .opt_attr("NameFormat", attribute.name_format.as_deref())
        .opt_attr("FriendlyName", attribute.friendly_name.as_deref());
    for (index, extra) in attribute.any_attributes.iter().enumerate() {
        match &extra.namespace {
            Some(namespace) => {
                let prefix = format!("ext{index}");
                w.attr(&format!("xmlns:{prefix}"), namespace)
                    .attr(&format!("{prefix}:{}", extra.name), &extra.value);
            }
            None => {
                w.attr(&extra.name, &extra.value);
            }
        }
    }
    w.close();
    for value in &attribute.values {
        w.text_element("saml:AttributeValue", value);
    }
    w.end("saml:Attribute");
}

// ============================================================================
// Protocol parts
// ============================================================================

fn status_into(w: &mut XmlWriter, status: &Status) {
    w.open("samlp:Status").close();
    status_code_into(w, &status.status_code);
    if let Some(message) = &status.status_message {
        w.text_element("samlp:StatusMessage", message);
    }
    w.end("samlp:Status");
}

fn status_code_into(w: &mut XmlWriter, code: &StatusCode) {
    w.open("samlp:StatusCode").attr("Value", &code.value);
    match &code.sub_code {
        Some(nested) => {
            w.close();
            status_code_into(w, nested);
            w.end("samlp:StatusCode");
        }
        None => w.close_empty(),
    }
}

// ============================================================================
// Encryption and key info
// ============================================================================

fn encrypted_element_into(w: &mut XmlWriter, local_name: &str, element: &EncryptedElement) {
    let tag = format!("saml:{local_name}");
    w.open(&tag)
        .attr("xmlns:saml", SAML_NS)
        .attr("xmlns:xenc", XMLENC_NS)
        .attr("xmlns:ds", XMLDSIG_NS)
        .close();
    if let Some(data) = &element.encrypted_data {
        encrypted_data_into(w, data);
    }
    for key in &element.encrypted_keys {
        encrypted_key_into(w, key);
    }
    w.end(&tag);
}

fn encrypted_data_into(w: &mut XmlWriter, data: &EncryptedData) {
    w.open("xenc:EncryptedData")
        .opt_attr("Id", data.id.as_deref())
        .opt_attr("Type", data.data_type.as_deref())
        .close();
    if let Some(method) = &data.encryption_method {
        w.open("xenc:EncryptionMethod")
            .attr("Algorithm", method)
            .close_empty();
    }
    if let Some(key_info) = &data.key_info {
        key_info_into(w, key_info);
    }
    cipher_data_into(w, &data.cipher_value);
    w.end("xenc:EncryptedData");
}

fn encrypted_key_into(w: &mut XmlWriter, key: &EncryptedKey) {
    w.open("xenc:EncryptedKey")
        .opt_attr("Id", key.id.as_deref())
        .opt_attr("Recipient", key.recipient.as_deref())
        .close();
    if let Some(method) = &key.encryption_method {
        w.open("xenc:EncryptionMethod").attr("Algorithm", method);
        match &key.digest_method {
            Some(digest) => {
                w.close();
                w.open("ds:DigestMethod")
                    .attr("Algorithm", digest)
                    .close_empty();
                w.end("xenc:EncryptionMethod");
            }
            None => w.close_empty(),
        }
    }
    cipher_data_into(w, &key.cipher_value);
    w.end("xenc:EncryptedKey");
}

fn cipher_data_into(w: &mut XmlWriter, cipher_value: &[u8]) {
    w.open("xenc:CipherData").close();
    w.text_element("xenc:CipherValue", &STANDARD.encode(cipher_value));
    w.end("xenc:CipherData");
}

fn key_info_into(w: &mut XmlWriter, key_info: &KeyInfo) {
    w.open("ds:KeyInfo").close();
    for clause in &key_info.clauses {
        match clause {
            KeyInfoClause::X509Data(certificates) => {
                w.open("ds:X509Data").close();
                for der in certificates {
                    w.text_element("ds:X509Certificate", &STANDARD.encode(der));
                }
                w.end("ds:X509Data");
            }
            KeyInfoClause::RsaKeyValue { modulus, exponent } => {
                w.open("ds:KeyValue").close();
                w.open("ds:RSAKeyValue").close();
                w.text_element("ds:Modulus", &STANDARD.encode(modulus));
                w.text_element("ds:Exponent", &STANDARD.encode(exponent));
                w.end("ds:RSAKeyValue");
                w.end("ds:KeyValue");
            }
            KeyInfoClause::KeyName(name) => w.text_element("ds:KeyName", name),
            KeyInfoClause::EncryptedKey(key) => encrypted_key_into(w, key),
        }
    }
    w.end("ds:KeyInfo");
}

// ============================================================================
// Generic elements
// ============================================================================

/// Writes an element with its namespace as the default namespace.
///
/// `inherited` is the default namespace in scope at the insertion point;
/// an element in no namespace undeclares it.
fn element_into(w: &mut XmlWriter, element: &XmlElement, inherited: Option<&str>) {
    w.open(&element.name);
    match element.namespace.as_deref() {
        Some(namespace) if inherited != Some(namespace) => {
            w.attr("xmlns", namespace);
        }
        None if inherited.is_some() => {
            w.attr("xmlns", "");
        }
        _ => {}
    }
    for (index, attribute) in element.attributes.iter().enumerate() {
        match &attribute.namespace {
            Some(namespace) => {
                let prefix = format!("a{index}");
                w.attr(&format!("xmlns:{prefix}"), namespace)
                    .attr(&format!("{prefix}:{}", attribute.name), &attribute.value);
            }
            None => {
                w.attr(&attribute.name, &attribute.value);
            }
        }
    }

    if element.children.is_empty() && element.text.is_empty() {
        w.close_empty();
        return;
    }
    w.close();
    w.text(&element.text);
    for child in &element.children {
        element_into(w, child, element.namespace.as_deref());
    }
    w.end(&element.name);
}
