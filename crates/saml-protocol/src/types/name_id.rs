//! Name identifiers.
//!
//! A `NameID` names a subject or an issuer. Its `Format` URI decides which
//! value rules apply; see [`crate::validation::NameIdValidator`].

use serde::{Deserialize, Serialize};

use super::NameIdFormat;

/// SAML `NameID` (also used for `Issuer`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameId {
    /// The identifier value, unmodified.
    pub value: String,

    /// Format URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Security or administrative domain qualifying the name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_qualifier: Option<String>,

    /// Service provider qualifying the name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sp_name_qualifier: Option<String>,

    /// Alternative identifier established by the service provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sp_provided_id: Option<String>,
}

impl NameId {
    /// Creates a name ID without a format.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            format: None,
            name_qualifier: None,
            sp_name_qualifier: None,
            sp_provided_id: None,
        }
    }

    /// Creates a name ID with the given format.
    #[must_use]
    pub fn with_format(value: impl Into<String>, format: NameIdFormat) -> Self {
        Self {
            format: Some(format.uri().to_string()),
            ..Self::new(value)
        }
    }

    /// Creates an issuer name, which uses the entity format.
    #[must_use]
    pub fn entity(entity_id: impl Into<String>) -> Self {
        Self::with_format(entity_id, NameIdFormat::Entity)
    }

    /// Sets the name qualifier.
    #[must_use]
    pub fn name_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.name_qualifier = Some(qualifier.into());
        self
    }

    /// Sets the SP name qualifier.
    #[must_use]
    pub fn sp_name_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.sp_name_qualifier = Some(qualifier.into());
        self
    }

    /// Sets the SP provided ID.
    #[must_use]
    pub fn sp_provided_id(mut self, id: impl Into<String>) -> Self {
        self.sp_provided_id = Some(id.into());
        self
    }

    /// Returns the known format, if the URI is one.
    #[must_use]
    pub fn known_format(&self) -> Option<NameIdFormat> {
        self.format.as_deref().and_then(NameIdFormat::from_uri)
    }

    /// Returns true if any qualifier attribute is set.
    #[must_use]
    pub fn has_qualifiers(&self) -> bool {
        self.name_qualifier.is_some()
            || self.sp_name_qualifier.is_some()
            || self.sp_provided_id.is_some()
    }
}

/// `NameIDPolicy` of an authentication request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameIdPolicy {
    /// Requested format URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Requested SP name qualifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sp_name_qualifier: Option<String>,

    /// Whether the identity provider may create a new identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_create: Option<bool>,
}

impl NameIdPolicy {
    /// Creates a policy requesting the given format.
    #[must_use]
    pub fn new(format: NameIdFormat) -> Self {
        Self {
            format: Some(format.uri().to_string()),
            ..Self::default()
        }
    }

    /// Sets `AllowCreate`.
    #[must_use]
    pub const fn allow_create(mut self, allow: bool) -> Self {
        self.allow_create = Some(allow);
        self
    }
}
