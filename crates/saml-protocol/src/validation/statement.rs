//! Statement rules.

use super::{contains_non_whitespace, is_absolute_uri, validate_encrypted_element};
use crate::error::{FormatError, FormatResult};
use crate::types::{
    AttributeItem, AttributeStatement, AuthnContextItem, AuthnStatement, AuthzDecisionStatement,
    RESERVED_NAMESPACES, SamlAttribute, Statement,
};

/// Validates statements, dispatching on the statement kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatementValidator;

impl StatementValidator {
    /// Checks a single statement.
    pub fn validate(&self, statement: &Statement) -> FormatResult {
        match statement {
            Statement::Authn(authn) => validate_authn_statement(authn),
            Statement::Attribute(attributes) => validate_attribute_statement(attributes),
            Statement::AuthzDecision(authz) => validate_authz_decision_statement(authz),
        }
    }

    /// Checks a single attribute.
    pub fn validate_attribute(&self, attribute: &SamlAttribute) -> FormatResult {
        if !contains_non_whitespace(&attribute.name) {
            return Err(FormatError::new(
                "Name attribute of SAML Attribute element MUST contain at least one non-whitespace character",
            ));
        }
        for extra in &attribute.any_attributes {
            let Some(namespace) = extra.namespace.as_deref().filter(|ns| !ns.is_empty()) else {
                return Err(FormatError::new(
                    "Attribute extension xml attributes MUST BE namespace qualified",
                ));
            };
            if RESERVED_NAMESPACES.contains(&namespace) {
                return Err(FormatError::new(
                    "Attribute extension xml attributes MUST NOT use a namespace reserved by SAML",
                ));
            }
        }
        Ok(())
    }
}

fn validate_authn_statement(statement: &AuthnStatement) -> FormatResult {
    if statement.authn_instant.is_none() {
        return Err(FormatError::new("AuthnStatement MUST have an AuthnInstant attribute"));
    }
    let context = statement
        .authn_context
        .as_ref()
        .ok_or_else(|| FormatError::new("AuthnStatement MUST have an AuthnContext element"))?;

    if context.items.is_empty() {
        return Err(FormatError::new(
            "AuthnContext element MUST contain at least one AuthnContextClassRef, AuthnContextDecl or AuthnContextDeclRef element",
        ));
    }
    if context.items.len() > 2 {
        return Err(FormatError::new(
            "AuthnContext MUST NOT contain more than two elements.",
        ));
    }

    for (index, item) in context.items.iter().enumerate() {
        match item {
            AuthnContextItem::ClassRef(uri) => {
                if index > 0 {
                    return Err(FormatError::new("AuthnContextClassRef must be in the first element"));
                }
                if !is_absolute_uri(uri) {
                    return Err(FormatError::new(
                        "AuthnContextClassRef has a value which is not a wellformed absolute uri",
                    ));
                }
            }
            AuthnContextItem::DeclRef(uri) => {
                if !is_absolute_uri(uri) {
                    return Err(FormatError::new(
                        "AuthnContextDeclRef has a value which is not a wellformed absolute uri",
                    ));
                }
            }
            AuthnContextItem::Decl(_) => {
                return Err(FormatError::new(
                    "AuthnContextDecl elements are not allowed in this implementation",
                ));
            }
        }
    }

    if context
        .authenticating_authorities
        .iter()
        .any(|authority| !is_absolute_uri(authority))
    {
        return Err(FormatError::new(
            "AuthenticatingAuthority array contains a value which is not a wellformed absolute uri",
        ));
    }
    Ok(())
}

fn validate_attribute_statement(statement: &AttributeStatement) -> FormatResult {
    if statement.items.is_empty() {
        return Err(FormatError::new(
            "AttributeStatement MUST contain at least one Attribute or EncryptedAttribute",
        ));
    }
    for item in &statement.items {
        match item {
            AttributeItem::Attribute(attribute) => StatementValidator.validate_attribute(attribute)?,
            AttributeItem::EncryptedAttribute(encrypted) => {
                validate_encrypted_element(encrypted, "EncryptedAttribute")?;
            }
        }
    }
    Ok(())
}

fn validate_authz_decision_statement(statement: &AuthzDecisionStatement) -> FormatResult {
    let resource = statement
        .resource
        .as_deref()
        .ok_or_else(|| FormatError::new("Resource attribute of AuthzDecisionStatement is REQUIRED"))?;

    if !resource.is_empty() && !is_absolute_uri(resource) {
        return Err(FormatError::new(
            "Resource attribute of AuthzDecisionStatement has a value which is not a wellformed absolute uri",
        ));
    }
    Ok(())
}
