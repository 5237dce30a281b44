//! Maps parsed XML trees onto the SAML data model.
//!
//! The reader is lenient about content and strict about shape: a missing
//! `ID`, `Issuer` or `Subject` is carried into the model so the validators
//! can report it with the proper rule message, while a document that is not
//! the expected element at all, or has an unparseable timestamp, fails here.

use chrono::{DateTime, Utc};

use super::XmlElement;
use crate::error::{FormatError, SamlError, SamlResult};
use crate::types::{
    Action, ArtifactResolve, ArtifactResponse, Assertion, AttributeItem, AttributeStatement,
    AudienceRestriction, AuthnContext, AuthnContextItem, AuthnStatement, AuthzDecisionStatement,
    Condition, Conditions, ConfirmationDataKind, Decision, EncryptedElement, LogoutRequest,
    LogoutResponse, NameId, ProxyRestriction, Response, SAML_NS, SAMLP_NS, SamlAttribute,
    Statement, Status, StatusCode, Subject, SubjectConfirmation, SubjectConfirmationData,
    SubjectItem, SubjectLocality, XMLDSIG_NS, XSI_NS,
};

/// Local name of the `xsi:type` used for holder-of-key confirmation data.
const KEY_INFO_CONFIRMATION_TYPE: &str = "KeyInfoConfirmationDataType";

/// Parses a standalone `saml:Assertion` document.
pub fn parse_assertion(xml: &str) -> SamlResult<Assertion> {
    assertion_from_element(&XmlElement::parse(xml)?)
}

/// Parses a `samlp:Response` document.
pub fn parse_response(xml: &str) -> SamlResult<Response> {
    response_from_element(&XmlElement::parse(xml)?)
}

/// Parses a `samlp:LogoutRequest` document.
pub fn parse_logout_request(xml: &str) -> SamlResult<LogoutRequest> {
    logout_request_from_element(&XmlElement::parse(xml)?)
}

/// Parses a `samlp:LogoutResponse` document.
pub fn parse_logout_response(xml: &str) -> SamlResult<LogoutResponse> {
    logout_response_from_element(&XmlElement::parse(xml)?)
}

/// Parses a `samlp:ArtifactResolve` document.
pub fn parse_artifact_resolve(xml: &str) -> SamlResult<ArtifactResolve> {
    artifact_resolve_from_element(&XmlElement::parse(xml)?)
}

/// Parses a `samlp:ArtifactResponse` document.
///
/// The embedded protocol message is returned as its exact source text so
/// that its own signature can still be verified.
pub fn parse_artifact_response(xml: &str) -> SamlResult<ArtifactResponse> {
    artifact_response_from_element(&XmlElement::parse(xml)?, xml)
}

/// Reads a `saml:Assertion` element.
pub fn assertion_from_element(element: &XmlElement) -> SamlResult<Assertion> {
    expect_element(element, SAML_NS, "Assertion")?;

    let mut statements = Vec::new();
    for child in element.children.iter().filter(|c| in_saml(c)) {
        match child.name.as_str() {
            "AuthnStatement" => statements.push(Statement::Authn(authn_statement(child)?)),
            "AttributeStatement" => {
                statements.push(Statement::Attribute(attribute_statement(child)?));
            }
            "AuthzDecisionStatement" => {
                statements.push(Statement::AuthzDecision(authz_decision_statement(child)?));
            }
            "Statement" => {
                return Err(SamlError::XmlParse(
                    "extension statements are not supported".to_string(),
                ));
            }
            _ => {}
        }
    }

    Ok(Assertion {
        id: attr_string(element, "ID"),
        version: element.attr("Version").unwrap_or_default().to_string(),
        issue_instant: timestamp(element, "IssueInstant")?,
        issuer: element.child(SAML_NS, "Issuer").map(name_id),
        subject: element.child(SAML_NS, "Subject").map(subject).transpose()?,
        conditions: element
            .child(SAML_NS, "Conditions")
            .map(conditions)
            .transpose()?,
        statements,
    })
}

/// Reads a `samlp:Response` element.
pub fn response_from_element(element: &XmlElement) -> SamlResult<Response> {
    expect_element(element, SAMLP_NS, "Response")?;

    Ok(Response {
        id: message_id(element)?,
        version: element.attr("Version").unwrap_or_default().to_string(),
        issue_instant: timestamp(element, "IssueInstant")?,
        issuer: element.child(SAML_NS, "Issuer").map(name_id),
        in_response_to: attr_string(element, "InResponseTo"),
        destination: attr_string(element, "Destination"),
        status: required_status(element)?,
        assertions: element
            .children_named(SAML_NS, "Assertion")
            .map(assertion_from_element)
            .collect::<SamlResult<_>>()?,
        encrypted_assertions: element
            .children_named(SAML_NS, "EncryptedAssertion")
            .map(EncryptedElement::from_element)
            .collect::<SamlResult<_>>()?,
    })
}

/// Reads a `samlp:LogoutRequest` element.
pub fn logout_request_from_element(element: &XmlElement) -> SamlResult<LogoutRequest> {
    expect_element(element, SAMLP_NS, "LogoutRequest")?;

    Ok(LogoutRequest {
        id: message_id(element)?,
        version: element.attr("Version").unwrap_or_default().to_string(),
        issue_instant: timestamp(element, "IssueInstant")?,
        issuer: element.child(SAML_NS, "Issuer").map(name_id),
        destination: attr_string(element, "Destination"),
        name_id: element.child(SAML_NS, "NameID").map(name_id),
        session_indexes: element
            .children_named(SAMLP_NS, "SessionIndex")
            .map(|index| index.trimmed_text().to_string())
            .collect(),
        reason: attr_string(element, "Reason"),
        not_on_or_after: timestamp(element, "NotOnOrAfter")?,
    })
}

/// Reads a `samlp:LogoutResponse` element.
pub fn logout_response_from_element(element: &XmlElement) -> SamlResult<LogoutResponse> {
    expect_element(element, SAMLP_NS, "LogoutResponse")?;

    Ok(LogoutResponse {
        id: message_id(element)?,
        version: element.attr("Version").unwrap_or_default().to_string(),
        issue_instant: timestamp(element, "IssueInstant")?,
        issuer: element.child(SAML_NS, "Issuer").map(name_id),
        in_response_to: attr_string(element, "InResponseTo"),
        destination: attr_string(element, "Destination"),
        status: required_status(element)?,
    })
}

/// Reads a `samlp:ArtifactResolve` element.
pub fn artifact_resolve_from_element(element: &XmlElement) -> SamlResult<ArtifactResolve> {
    expect_element(element, SAMLP_NS, "ArtifactResolve")?;

    let artifact = element
        .child(SAMLP_NS, "Artifact")
        .map(|a| a.trimmed_text().to_string())
        .ok_or_else(|| FormatError::new("ArtifactResolve element must contain an Artifact"))?;

    Ok(ArtifactResolve {
        id: message_id(element)?,
        version: element.attr("Version").unwrap_or_default().to_string(),
        issue_instant: timestamp(element, "IssueInstant")?,
        issuer: element.child(SAML_NS, "Issuer").map(name_id),
        destination: attr_string(element, "Destination"),
        artifact,
    })
}

/// Reads a `samlp:ArtifactResponse` element parsed from `source`.
pub fn artifact_response_from_element(
    element: &XmlElement,
    source: &str,
) -> SamlResult<ArtifactResponse> {
    expect_element(element, SAMLP_NS, "ArtifactResponse")?;

    let message = element
        .children
        .iter()
        .find(|c| {
            !(c.is(SAML_NS, "Issuer")
                || c.is(XMLDSIG_NS, "Signature")
                || c.is(SAMLP_NS, "Extensions")
                || c.is(SAMLP_NS, "Status"))
        })
        .map(|c| {
            source
                .get(c.span.clone())
                .map(str::to_string)
                .ok_or_else(|| SamlError::XmlParse("embedded message outside source".to_string()))
        })
        .transpose()?;

    Ok(ArtifactResponse {
        id: message_id(element)?,
        version: element.attr("Version").unwrap_or_default().to_string(),
        issue_instant: timestamp(element, "IssueInstant")?,
        issuer: element.child(SAML_NS, "Issuer").map(name_id),
        in_response_to: attr_string(element, "InResponseTo"),
        status: required_status(element)?,
        message,
    })
}

// ============================================================================
// Assertion parts
// ============================================================================

fn name_id(element: &XmlElement) -> NameId {
    NameId {
        value: element.text.clone(),
        format: attr_string(element, "Format"),
        name_qualifier: attr_string(element, "NameQualifier"),
        sp_name_qualifier: attr_string(element, "SPNameQualifier"),
        sp_provided_id: attr_string(element, "SPProvidedID"),
    }
}

fn subject(element: &XmlElement) -> SamlResult<Subject> {
    let mut items = Vec::with_capacity(element.children.len());
    for child in &element.children {
        let item = if child.is(SAML_NS, "NameID") {
            SubjectItem::NameId(name_id(child))
        } else if child.is(SAML_NS, "EncryptedID") {
            SubjectItem::EncryptedId(EncryptedElement::from_element(child)?)
        } else if child.is(SAML_NS, "SubjectConfirmation") {
            SubjectItem::SubjectConfirmation(subject_confirmation(child)?)
        } else {
            SubjectItem::Other(child.clone())
        };
        items.push(item);
    }
    Ok(Subject { items })
}

fn subject_confirmation(element: &XmlElement) -> SamlResult<SubjectConfirmation> {
    Ok(SubjectConfirmation {
        method: element.attr("Method").unwrap_or_default().to_string(),
        name_id: element.child(SAML_NS, "NameID").map(name_id),
        data: element
            .child(SAML_NS, "SubjectConfirmationData")
            .map(confirmation_data)
            .transpose()?,
    })
}

fn confirmation_data(element: &XmlElement) -> SamlResult<SubjectConfirmationData> {
    let is_key_info = element
        .attr_ns(XSI_NS, "type")
        .and_then(|t| t.rsplit(':').next())
        .is_some_and(|local| local == KEY_INFO_CONFIRMATION_TYPE);

    Ok(SubjectConfirmationData {
        kind: if is_key_info {
            ConfirmationDataKind::KeyInfo
        } else {
            ConfirmationDataKind::Plain
        },
        not_before: timestamp(element, "NotBefore")?,
        not_on_or_after: timestamp(element, "NotOnOrAfter")?,
        recipient: attr_string(element, "Recipient"),
        in_response_to: attr_string(element, "InResponseTo"),
        address: attr_string(element, "Address"),
        any_elements: element.children.clone(),
    })
}

fn conditions(element: &XmlElement) -> SamlResult<Conditions> {
    let mut items = Vec::new();
    for child in element.children.iter().filter(|c| in_saml(c)) {
        match child.name.as_str() {
            "AudienceRestriction" => {
                items.push(Condition::AudienceRestriction(AudienceRestriction {
                    audiences: audiences(child),
                }));
            }
            "OneTimeUse" => items.push(Condition::OneTimeUse),
            "ProxyRestriction" => items.push(Condition::ProxyRestriction(ProxyRestriction {
                count: attr_string(child, "Count"),
                audiences: audiences(child),
            })),
            "Condition" => {
                return Err(SamlError::XmlParse(
                    "extension conditions are not supported".to_string(),
                ));
            }
            _ => {}
        }
    }

    Ok(Conditions {
        not_before: timestamp(element, "NotBefore")?,
        not_on_or_after: timestamp(element, "NotOnOrAfter")?,
        items,
    })
}

fn audiences(element: &XmlElement) -> Vec<String> {
    element
        .children_named(SAML_NS, "Audience")
        .map(|a| a.trimmed_text().to_string())
        .collect()
}

fn authn_statement(element: &XmlElement) -> SamlResult<AuthnStatement> {
    Ok(AuthnStatement {
        authn_instant: timestamp(element, "AuthnInstant")?,
        session_index: attr_string(element, "SessionIndex"),
        session_not_on_or_after: timestamp(element, "SessionNotOnOrAfter")?,
        subject_locality: element
            .child(SAML_NS, "SubjectLocality")
            .map(|locality| SubjectLocality {
                address: attr_string(locality, "Address"),
                dns_name: attr_string(locality, "DNSName"),
            }),
        authn_context: element.child(SAML_NS, "AuthnContext").map(authn_context),
    })
}

fn authn_context(element: &XmlElement) -> AuthnContext {
    let mut context = AuthnContext::default();
    for child in element.children.iter().filter(|c| in_saml(c)) {
        match child.name.as_str() {
            "AuthnContextClassRef" => context
                .items
                .push(AuthnContextItem::ClassRef(child.trimmed_text().to_string())),
            "AuthnContextDeclRef" => context
                .items
                .push(AuthnContextItem::DeclRef(child.trimmed_text().to_string())),
            "AuthnContextDecl" => context.items.push(AuthnContextItem::Decl(child.clone())),
            "AuthenticatingAuthority" => context
                .authenticating_authorities
                .push(child.trimmed_text().to_string()),
            _ => {}
        }
    }
    context
}

fn attribute_statement(element: &XmlElement) -> SamlResult<AttributeStatement> {
    let mut items = Vec::new();
    for child in element.children.iter().filter(|c| in_saml(c)) {
        match child.name.as_str() {
            "Attribute" => items.push(AttributeItem::Attribute(saml_attribute(child))),
            "EncryptedAttribute" => items.push(AttributeItem::EncryptedAttribute(
                EncryptedElement::from_element(child)?,
            )),
            _ => {}
        }
    }
    Ok(AttributeStatement { items })
}

/// Reads a `saml:Attribute` element.
pub(crate) fn saml_attribute(element: &XmlElement) -> SamlAttribute {
    SamlAttribute {
        name: element.attr("Name").unwrap_or_default().to_string(),
        name_format: attr_string(element, "NameFormat"),
        friendly_name: attr_string(element, "FriendlyName"),
        values: element
            .children_named(SAML_NS, "AttributeValue")
            .map(|v| v.text.clone())
            .collect(),
        any_attributes: element
            .attributes
            .iter()
            .filter(|a| {
                a.namespace.is_some()
                    || !matches!(a.name.as_str(), "Name" | "NameFormat" | "FriendlyName")
            })
            .cloned()
            .collect(),
    }
}

fn authz_decision_statement(element: &XmlElement) -> SamlResult<AuthzDecisionStatement> {
    let decision = element.attr("Decision").unwrap_or_default();
    Ok(AuthzDecisionStatement {
        resource: attr_string(element, "Resource"),
        decision: Decision::parse(decision)
            .ok_or_else(|| SamlError::XmlParse(format!("invalid Decision '{decision}'")))?,
        actions: element
            .children_named(SAML_NS, "Action")
            .map(|action| Action {
                namespace: attr_string(action, "Namespace"),
                value: action.trimmed_text().to_string(),
            })
            .collect(),
    })
}

// ============================================================================
// Protocol parts
// ============================================================================

fn required_status(element: &XmlElement) -> SamlResult<Status> {
    let status = element.child(SAMLP_NS, "Status").ok_or_else(|| {
        FormatError::new(format!("{} element must contain a Status element", element.name))
    })?;
    let code = status
        .child(SAMLP_NS, "StatusCode")
        .ok_or_else(|| FormatError::new("Status element must contain a StatusCode element"))?;

    Ok(Status {
        status_code: status_code(code),
        status_message: status
            .child_text(SAMLP_NS, "StatusMessage")
            .map(str::to_string),
    })
}

fn status_code(element: &XmlElement) -> StatusCode {
    StatusCode {
        value: element.attr("Value").unwrap_or_default().to_string(),
        sub_code: element
            .child(SAMLP_NS, "StatusCode")
            .map(|nested| Box::new(status_code(nested))),
    }
}

fn message_id(element: &XmlElement) -> SamlResult<String> {
    attr_string(element, "ID").ok_or_else(|| {
        FormatError::new(format!("{} element must have the ID attribute set.", element.name)).into()
    })
}

// ============================================================================
// Helpers
// ============================================================================

fn expect_element(element: &XmlElement, namespace: &str, name: &str) -> SamlResult<()> {
    if element.is(namespace, name) {
        Ok(())
    } else {
        Err(SamlError::XmlParse(format!(
            "expected {name} element, found {}",
            element.name
        )))
    }
}

fn in_saml(element: &XmlElement) -> bool {
    element.namespace.as_deref() == Some(SAML_NS)
}

fn attr_string(element: &XmlElement, name: &str) -> Option<String> {
    element.attr(name).map(str::to_string)
}

fn timestamp(element: &XmlElement, name: &str) -> SamlResult<Option<DateTime<Utc>>> {
    element
        .attr(name)
        .map(|value| {
            DateTime::parse_from_rfc3339(value.trim())
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| {
                    SamlError::XmlParse(format!("invalid {name} timestamp '{value}': {e}"))
                })
        })
        .transpose()
}
