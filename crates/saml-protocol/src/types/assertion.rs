//! SAML assertion types.
//!
//! An assertion is a package of statements an issuer makes about a subject.
//! The polymorphic parts of the schema (subject items, conditions,
//! statements, authentication context items, attribute items) are sum types
//! so the validators can match on them exhaustively.
//!
//! Fields the schema requires but that may be missing from a received
//! document (`ID`, `Issuer`, `IssueInstant`, `AuthnInstant`, `Resource`)
//! are `Option`s: reporting their absence is the validators' job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EncryptedElement, NameId, SAML_VERSION, confirmation_methods, generate_id};
use crate::xml::{XmlAttribute, XmlElement};

/// SAML assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assertion {
    /// The `ID` attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The `Version` attribute as received.
    pub version: String,

    /// The `IssueInstant` attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_instant: Option<DateTime<Utc>>,

    /// The issuing authority.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<NameId>,

    /// The subject of the statements.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Subject>,

    /// Conditions of use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Conditions>,

    /// Statements in document order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statements: Vec<Statement>,
}

impl Assertion {
    /// Creates an assertion issued now with a fresh ID.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            id: Some(generate_id()),
            version: SAML_VERSION.to_string(),
            issue_instant: Some(Utc::now()),
            issuer: Some(NameId::new(issuer)),
            subject: None,
            conditions: None,
            statements: Vec::new(),
        }
    }

    /// Replaces the generated ID.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the subject.
    #[must_use]
    pub fn with_subject(mut self, subject: Subject) -> Self {
        self.subject = Some(subject);
        self
    }

    /// Sets the conditions.
    #[must_use]
    pub fn with_conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = Some(conditions);
        self
    }

    /// Appends a statement.
    #[must_use]
    pub fn with_statement(mut self, statement: impl Into<Statement>) -> Self {
        self.statements.push(statement.into());
        self
    }

    /// Returns the issuer value, if any.
    #[must_use]
    pub fn issuer_value(&self) -> Option<&str> {
        self.issuer.as_ref().map(|issuer| issuer.value.as_str())
    }

    /// Returns the subject's `NameID`, if present in clear.
    #[must_use]
    pub fn name_id(&self) -> Option<&NameId> {
        self.subject.as_ref().and_then(Subject::name_id)
    }

    /// Iterates over the authentication statements.
    pub fn authn_statements(&self) -> impl Iterator<Item = &AuthnStatement> {
        self.statements.iter().filter_map(|s| match s {
            Statement::Authn(statement) => Some(statement),
            _ => None,
        })
    }

    /// Iterates over every clear-text attribute of every attribute statement.
    pub fn attributes(&self) -> impl Iterator<Item = &SamlAttribute> {
        self.statements
            .iter()
            .filter_map(|s| match s {
                Statement::Attribute(statement) => Some(statement),
                _ => None,
            })
            .flat_map(|statement| statement.attributes())
    }

    /// Session index of the first authentication statement that has one.
    #[must_use]
    pub fn session_index(&self) -> Option<&str> {
        self.authn_statements()
            .find_map(|statement| statement.session_index.as_deref())
    }

    /// `Conditions/@NotOnOrAfter`, if set.
    #[must_use]
    pub fn not_on_or_after(&self) -> Option<DateTime<Utc>> {
        self.conditions.as_ref().and_then(|c| c.not_on_or_after)
    }

    /// Returns true if the conditions contain `OneTimeUse`.
    #[must_use]
    pub fn is_one_time_use(&self) -> bool {
        self.conditions
            .as_ref()
            .is_some_and(|c| c.items.iter().any(|item| matches!(item, Condition::OneTimeUse)))
    }
}

// ============================================================================
// Subject
// ============================================================================

/// Subject of an assertion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Child elements in document order.
    pub items: Vec<SubjectItem>,
}

/// A child of `Subject`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubjectItem {
    /// A clear-text `NameID`.
    NameId(NameId),
    /// An `EncryptedID`.
    EncryptedId(EncryptedElement),
    /// A `SubjectConfirmation`.
    SubjectConfirmation(SubjectConfirmation),
    /// Any other element (`BaseID`, extensions). Never valid.
    Other(XmlElement),
}

impl Subject {
    /// Creates a subject identified by a name ID.
    #[must_use]
    pub fn new(name_id: NameId) -> Self {
        Self {
            items: vec![SubjectItem::NameId(name_id)],
        }
    }

    /// Appends a confirmation.
    #[must_use]
    pub fn with_confirmation(mut self, confirmation: SubjectConfirmation) -> Self {
        self.items.push(SubjectItem::SubjectConfirmation(confirmation));
        self
    }

    /// Returns the first clear-text name ID.
    #[must_use]
    pub fn name_id(&self) -> Option<&NameId> {
        self.items.iter().find_map(|item| match item {
            SubjectItem::NameId(name_id) => Some(name_id),
            _ => None,
        })
    }

    /// Iterates over the confirmations.
    pub fn confirmations(&self) -> impl Iterator<Item = &SubjectConfirmation> {
        self.items.iter().filter_map(|item| match item {
            SubjectItem::SubjectConfirmation(confirmation) => Some(confirmation),
            _ => None,
        })
    }
}

/// `SubjectConfirmation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectConfirmation {
    /// The `Method` URI.
    pub method: String,

    /// Identifier of the expected presenter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_id: Option<NameId>,

    /// Confirmation data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<SubjectConfirmationData>,
}

impl SubjectConfirmation {
    /// Creates a confirmation with the given method URI.
    #[must_use]
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            name_id: None,
            data: None,
        }
    }

    /// Creates a bearer confirmation.
    #[must_use]
    pub fn bearer() -> Self {
        Self::new(confirmation_methods::BEARER)
    }

    /// Creates a holder-of-key confirmation.
    #[must_use]
    pub fn holder_of_key() -> Self {
        Self::new(confirmation_methods::HOLDER_OF_KEY)
    }

    /// Sets the confirmation data.
    #[must_use]
    pub fn with_data(mut self, data: SubjectConfirmationData) -> Self {
        self.data = Some(data);
        self
    }

    /// Returns true for the bearer method.
    #[must_use]
    pub fn is_bearer(&self) -> bool {
        self.method == confirmation_methods::BEARER
    }
}

/// The schema type of a `SubjectConfirmationData` element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationDataKind {
    /// Plain `SubjectConfirmationDataType`.
    #[default]
    Plain,
    /// `KeyInfoConfirmationDataType`, used for holder-of-key.
    KeyInfo,
}

/// `SubjectConfirmationData`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectConfirmationData {
    /// Declared schema type.
    pub kind: ConfirmationDataKind,

    /// Earliest time the subject may be confirmed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,

    /// Time from which the subject can no longer be confirmed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_on_or_after: Option<DateTime<Utc>>,

    /// Where the assertion may be presented.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,

    /// ID of the request the assertion answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,

    /// Network address the subject may present from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Extension elements, such as `ds:KeyInfo` for holder-of-key.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub any_elements: Vec<XmlElement>,
}

impl SubjectConfirmationData {
    /// Bearer confirmation data answering a request.
    #[must_use]
    pub fn for_request(
        request_id: impl Into<String>,
        recipient: impl Into<String>,
        not_on_or_after: DateTime<Utc>,
    ) -> Self {
        Self {
            in_response_to: Some(request_id.into()),
            recipient: Some(recipient.into()),
            not_on_or_after: Some(not_on_or_after),
            ..Self::default()
        }
    }

    /// Holder-of-key confirmation data carrying `ds:KeyInfo` elements.
    #[must_use]
    pub fn key_info(key_infos: Vec<XmlElement>) -> Self {
        Self {
            kind: ConfirmationDataKind::KeyInfo,
            any_elements: key_infos,
            ..Self::default()
        }
    }
}

// ============================================================================
// Conditions
// ============================================================================

/// `Conditions`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    /// Start of the validity window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,

    /// End of the validity window, exclusive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_on_or_after: Option<DateTime<Utc>>,

    /// Conditions in document order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<Condition>,
}

/// A single condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    /// `AudienceRestriction`.
    AudienceRestriction(AudienceRestriction),
    /// `OneTimeUse`.
    OneTimeUse,
    /// `ProxyRestriction`.
    ProxyRestriction(ProxyRestriction),
}

impl Conditions {
    /// Creates conditions with a validity window.
    #[must_use]
    pub fn valid_between(not_before: DateTime<Utc>, not_on_or_after: DateTime<Utc>) -> Self {
        Self {
            not_before: Some(not_before),
            not_on_or_after: Some(not_on_or_after),
            items: Vec::new(),
        }
    }

    /// Adds an audience restriction with a single audience.
    #[must_use]
    pub fn with_audience(self, audience: impl Into<String>) -> Self {
        self.with_condition(Condition::AudienceRestriction(AudienceRestriction::new([
            audience.into(),
        ])))
    }

    /// Adds a condition.
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.items.push(condition);
        self
    }

    /// Iterates over the audience restrictions.
    pub fn audience_restrictions(&self) -> impl Iterator<Item = &AudienceRestriction> {
        self.items.iter().filter_map(|item| match item {
            Condition::AudienceRestriction(restriction) => Some(restriction),
            _ => None,
        })
    }
}

/// `AudienceRestriction`: any one of the audiences satisfies it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudienceRestriction {
    /// Audience URIs.
    pub audiences: Vec<String>,
}

impl AudienceRestriction {
    /// Creates a restriction from audience URIs.
    #[must_use]
    pub fn new(audiences: impl IntoIterator<Item = String>) -> Self {
        Self {
            audiences: audiences.into_iter().collect(),
        }
    }
}

/// `ProxyRestriction`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRestriction {
    /// The `Count` attribute as received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<String>,

    /// Audiences allowed to receive derived assertions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audiences: Vec<String>,
}

// ============================================================================
// Statements
// ============================================================================

/// A statement of an assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statement {
    /// `AuthnStatement`.
    Authn(AuthnStatement),
    /// `AttributeStatement`.
    Attribute(AttributeStatement),
    /// `AuthzDecisionStatement`.
    AuthzDecision(AuthzDecisionStatement),
}

impl From<AuthnStatement> for Statement {
    fn from(statement: AuthnStatement) -> Self {
        Self::Authn(statement)
    }
}

impl From<AttributeStatement> for Statement {
    fn from(statement: AttributeStatement) -> Self {
        Self::Attribute(statement)
    }
}

impl From<AuthzDecisionStatement> for Statement {
    fn from(statement: AuthzDecisionStatement) -> Self {
        Self::AuthzDecision(statement)
    }
}

/// `AuthnStatement`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthnStatement {
    /// When the subject authenticated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authn_instant: Option<DateTime<Utc>>,

    /// Session index at the identity provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_index: Option<String>,

    /// When the session at the identity provider ends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_not_on_or_after: Option<DateTime<Utc>>,

    /// Where the subject authenticated from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_locality: Option<SubjectLocality>,

    /// How the subject authenticated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authn_context: Option<AuthnContext>,
}

impl AuthnStatement {
    /// Creates a statement for an authentication that happened now.
    #[must_use]
    pub fn new(class_ref: impl Into<String>) -> Self {
        Self {
            authn_instant: Some(Utc::now()),
            authn_context: Some(AuthnContext::class_ref(class_ref)),
            ..Self::default()
        }
    }

    /// Sets the session index.
    #[must_use]
    pub fn with_session_index(mut self, index: impl Into<String>) -> Self {
        self.session_index = Some(index.into());
        self
    }
}

/// `SubjectLocality`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectLocality {
    /// Network address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// DNS name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_name: Option<String>,
}

/// `AuthnContext`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthnContext {
    /// Class reference, declaration reference and declaration, in document order.
    pub items: Vec<AuthnContextItem>,

    /// `AuthenticatingAuthority` URIs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authenticating_authorities: Vec<String>,
}

/// A child of `AuthnContext`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthnContextItem {
    /// `AuthnContextClassRef`.
    ClassRef(String),
    /// `AuthnContextDeclRef`.
    DeclRef(String),
    /// Inline `AuthnContextDecl`.
    Decl(XmlElement),
}

impl AuthnContext {
    /// Creates a context holding only a class reference.
    #[must_use]
    pub fn class_ref(uri: impl Into<String>) -> Self {
        Self {
            items: vec![AuthnContextItem::ClassRef(uri.into())],
            authenticating_authorities: Vec::new(),
        }
    }
}

/// `AttributeStatement`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeStatement {
    /// Attributes in document order.
    pub items: Vec<AttributeItem>,
}

/// A child of `AttributeStatement`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeItem {
    /// A clear-text `Attribute`.
    Attribute(SamlAttribute),
    /// An `EncryptedAttribute`.
    EncryptedAttribute(EncryptedElement),
}

impl AttributeStatement {
    /// Creates an empty statement.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Appends an attribute.
    #[must_use]
    pub fn with_attribute(mut self, attribute: SamlAttribute) -> Self {
        self.items.push(AttributeItem::Attribute(attribute));
        self
    }

    /// Iterates over the clear-text attributes.
    pub fn attributes(&self) -> impl Iterator<Item = &SamlAttribute> {
        self.items.iter().filter_map(|item| match item {
            AttributeItem::Attribute(attribute) => Some(attribute),
            AttributeItem::EncryptedAttribute(_) => None,
        })
    }
}

/// SAML `Attribute`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamlAttribute {
    /// The `Name` attribute.
    pub name: String,

    /// The `NameFormat` URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_format: Option<String>,

    /// The `FriendlyName` attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,

    /// Attribute values as text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,

    /// Extension XML attributes on the `Attribute` element.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub any_attributes: Vec<XmlAttribute>,
}

impl SamlAttribute {
    /// Creates a single-valued attribute.
    #[must_use]
    pub fn single(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::multi(name, vec![value.into()])
    }

    /// Creates a multi-valued attribute.
    #[must_use]
    pub fn multi(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
            ..Self::default()
        }
    }

    /// Sets the name format.
    #[must_use]
    pub fn with_name_format(mut self, format: impl Into<String>) -> Self {
        self.name_format = Some(format.into());
        self
    }

    /// Sets the friendly name.
    #[must_use]
    pub fn with_friendly_name(mut self, name: impl Into<String>) -> Self {
        self.friendly_name = Some(name.into());
        self
    }

    /// Adds an extension XML attribute.
    #[must_use]
    pub fn with_any_attribute(mut self, attribute: XmlAttribute) -> Self {
        self.any_attributes.push(attribute);
        self
    }
}

/// `AuthzDecisionStatement`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthzDecisionStatement {
    /// The `Resource` attribute. Required, but may be empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,

    /// The decision.
    pub decision: Decision,

    /// Actions the decision covers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
}

/// Authorization decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// Access is permitted.
    Permit,
    /// Access is denied.
    Deny,
    /// The issuer could not decide.
    Indeterminate,
}

impl Decision {
    /// Returns the schema value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Permit => "Permit",
            Self::Deny => "Deny",
            Self::Indeterminate => "Indeterminate",
        }
    }

    /// Parses the schema value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        [Self::Permit, Self::Deny, Self::Indeterminate]
            .into_iter()
            .find(|d| d.as_str() == value)
    }
}

/// `Action` of an authorization decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// The `Namespace` attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// The action name.
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::authn_context_classes;

    #[test]
    fn new_assertion_defaults() {
        let assertion = Assertion::new("urn:idp");
        assert!(assertion.id.as_deref().is_some_and(|id| id.starts_with('_')));
        assert_eq!(assertion.version, "2.0");
        assert_eq!(assertion.issuer_value(), Some("urn:idp"));
        assert!(!assertion.is_one_time_use());
    }

    #[test]
    fn accessors() {
        let assertion = Assertion::new("urn:idp")
            .with_subject(Subject::new(NameId::new("user")).with_confirmation(SubjectConfirmation::bearer()))
            .with_conditions(Conditions::default().with_condition(Condition::OneTimeUse))
            .with_statement(
                AuthnStatement::new(authn_context_classes::PASSWORD_PROTECTED_TRANSPORT)
                    .with_session_index("s1"),
            )
            .with_statement(AttributeStatement::new().with_attribute(SamlAttribute::single("mail", "a@b")));

        assert_eq!(assertion.name_id().map(|n| n.value.as_str()), Some("user"));
        assert_eq!(assertion.session_index(), Some("s1"));
        assert_eq!(assertion.attributes().count(), 1);
        assert!(assertion.is_one_time_use());
        assert!(assertion.subject.as_ref().unwrap().confirmations().all(SubjectConfirmation::is_bearer));
    }

    #[test]
    fn decision_values() {
        assert_eq!(Decision::parse("Deny"), Some(Decision::Deny));
        assert_eq!(Decision::parse("deny"), None);
    }
}
