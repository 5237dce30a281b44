//! SAML 2.0 constants and URIs.
//!
//! Namespace URIs, binding URIs, name identifier formats, confirmation
//! methods and status codes from SAML 2.0 core and bindings, plus the
//! XML-DSig and XML-Enc identifiers the trust layer needs.

/// The only protocol version accepted.
pub const SAML_VERSION: &str = "2.0";

/// SAML 2.0 assertion namespace.
pub const SAML_NS: &str = "urn:oasis:names:tc:SAML:2.0:assertion";

/// SAML 2.0 protocol namespace.
pub const SAMLP_NS: &str = "urn:oasis:names:tc:SAML:2.0:protocol";

/// SAML 2.0 metadata namespace.
pub const SAMLMD_NS: &str = "urn:oasis:names:tc:SAML:2.0:metadata";

/// XML Digital Signature namespace.
pub const XMLDSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

/// XML Encryption namespace.
pub const XMLENC_NS: &str = "http://www.w3.org/2001/04/xmlenc#";

/// XML Encryption 1.1 namespace.
pub const XMLENC11_NS: &str = "http://www.w3.org/2009/xmlenc11#";

/// XML Schema instance namespace.
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Namespaces SAML reserves for itself. Extension attributes on an
/// `Attribute` must not use them.
pub const RESERVED_NAMESPACES: [&str; 3] = [SAML_NS, SAMLP_NS, SAMLMD_NS];

/// `Type` of an `EncryptedData` that wraps a whole element.
pub const XMLENC_ELEMENT_TYPE: &str = "http://www.w3.org/2001/04/xmlenc#Element";

// ============================================================================
// Binding URIs
// ============================================================================

/// SAML protocol bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamlBinding {
    /// HTTP-POST binding.
    HttpPost,
    /// HTTP-Redirect binding.
    HttpRedirect,
    /// HTTP-Artifact binding.
    HttpArtifact,
    /// SOAP binding, used for artifact resolution.
    Soap,
}

impl SamlBinding {
    /// Returns the binding URI.
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::HttpPost => "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST",
            Self::HttpRedirect => "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect",
            Self::HttpArtifact => "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Artifact",
            Self::Soap => "urn:oasis:names:tc:SAML:2.0:bindings:SOAP",
        }
    }

    /// Parses a binding from its URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        [Self::HttpPost, Self::HttpRedirect, Self::HttpArtifact, Self::Soap]
            .into_iter()
            .find(|binding| binding.uri() == uri)
    }
}

// ============================================================================
// Name ID Formats
// ============================================================================

/// Name identifier formats with validation rules.
///
/// Formats not listed here are carried as raw URIs and never validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameIdFormat {
    /// Unspecified format.
    Unspecified,
    /// Email address.
    Email,
    /// X.509 subject name.
    X509SubjectName,
    /// Windows domain qualified name.
    Windows,
    /// Kerberos principal name.
    Kerberos,
    /// Entity identifier of a SAML provider.
    Entity,
    /// Persistent pseudonymous identifier.
    Persistent,
    /// Transient identifier.
    Transient,
}

impl NameIdFormat {
    const ALL: [Self; 8] = [
        Self::Unspecified,
        Self::Email,
        Self::X509SubjectName,
        Self::Windows,
        Self::Kerberos,
        Self::Entity,
        Self::Persistent,
        Self::Transient,
    ];

    /// Returns the format URI.
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::Unspecified => "urn:oasis:names:tc:SAML:1.1:nameid-format:unspecified",
            Self::Email => "urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress",
            Self::X509SubjectName => "urn:oasis:names:tc:SAML:1.1:nameid-format:X509SubjectName",
            Self::Windows => "urn:oasis:names:tc:SAML:1.1:nameid-format:WindowsDomainQualifiedName",
            Self::Kerberos => "urn:oasis:names:tc:SAML:2.0:nameid-format:kerberos",
            Self::Entity => "urn:oasis:names:tc:SAML:2.0:nameid-format:entity",
            Self::Persistent => "urn:oasis:names:tc:SAML:2.0:nameid-format:persistent",
            Self::Transient => "urn:oasis:names:tc:SAML:2.0:nameid-format:transient",
        }
    }

    /// Parses a format from its URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|format| format.uri() == uri)
    }
}

/// Authentication context class URIs.
pub mod authn_context_classes {
    /// Password over a protected transport.
    pub const PASSWORD_PROTECTED_TRANSPORT: &str =
        "urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport";
    /// X.509 certificate.
    pub const X509: &str = "urn:oasis:names:tc:SAML:2.0:ac:classes:X509";
    /// Unspecified.
    pub const UNSPECIFIED: &str = "urn:oasis:names:tc:SAML:2.0:ac:classes:unspecified";
}

/// Subject confirmation method URIs.
pub mod confirmation_methods {
    /// Bearer confirmation.
    pub const BEARER: &str = "urn:oasis:names:tc:SAML:2.0:cm:bearer";
    /// Holder-of-key confirmation. Requires `KeyInfo` in the confirmation data.
    pub const HOLDER_OF_KEY: &str = "urn:oasis:names:tc:SAML:2.0:cm:holder-of-key";
    /// Sender-vouches confirmation.
    pub const SENDER_VOUCHES: &str = "urn:oasis:names:tc:SAML:2.0:cm:sender-vouches";
}

/// Attribute name format URIs.
pub mod attribute_name_formats {
    /// Basic name format.
    pub const BASIC: &str = "urn:oasis:names:tc:SAML:2.0:attrname-format:basic";
    /// URI name format.
    pub const URI: &str = "urn:oasis:names:tc:SAML:2.0:attrname-format:uri";
}

// ============================================================================
// Status Codes
// ============================================================================

/// Top-level status codes.
pub mod status_codes {
    /// The request succeeded.
    pub const SUCCESS: &str = "urn:oasis:names:tc:SAML:2.0:status:Success";
    /// The request failed due to an error by the requester.
    pub const REQUESTER: &str = "urn:oasis:names:tc:SAML:2.0:status:Requester";
    /// The request failed due to an error by the responder.
    pub const RESPONDER: &str = "urn:oasis:names:tc:SAML:2.0:status:Responder";
    /// The protocol version was not accepted.
    pub const VERSION_MISMATCH: &str = "urn:oasis:names:tc:SAML:2.0:status:VersionMismatch";
}

/// Second-level status codes.
pub mod sub_status_codes {
    /// Authentication failed.
    pub const AUTHN_FAILED: &str = "urn:oasis:names:tc:SAML:2.0:status:AuthnFailed";
    /// Only some session participants were logged out.
    pub const PARTIAL_LOGOUT: &str = "urn:oasis:names:tc:SAML:2.0:status:PartialLogout";
    /// The request was denied.
    pub const REQUEST_DENIED: &str = "urn:oasis:names:tc:SAML:2.0:status:RequestDenied";
    /// The principal is unknown.
    pub const UNKNOWN_PRINCIPAL: &str = "urn:oasis:names:tc:SAML:2.0:status:UnknownPrincipal";
}

/// Logout reason URIs.
pub mod logout_reasons {
    /// The user ended the session.
    pub const USER: &str = "urn:oasis:names:tc:SAML:2.0:logout:user";
    /// An administrator ended the session.
    pub const ADMIN: &str = "urn:oasis:names:tc:SAML:2.0:logout:admin";
}

/// XML-DSig transform and canonicalization URIs.
pub mod transforms {
    /// Enveloped signature transform.
    pub const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
    /// Exclusive C14N without comments.
    pub const EXCLUSIVE_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
    /// Inclusive C14N 1.0 without comments.
    pub const C14N: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";
}
