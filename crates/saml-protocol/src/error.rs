//! SAML error types.
//!
//! Received messages fail in one of four ways, each with its own type:
//!
//! - [`FormatError`]: a SAML core rule is violated (wrong version, missing
//!   required element, malformed URI, bad cardinality, time window)
//! - [`TrustError`]: no trusted key verifies the signature, or key material
//!   needed to decrypt is missing
//! - [`ReplayError`]: InResponseTo mismatch or a reused one-time assertion
//! - [`ConfigurationError`]: required configuration is missing, which is
//!   never treated as "no restriction"
//!
//! [`SamlError`] aggregates them together with transport failures.

use saml_cache::CacheError;
use saml_core::ConfigurationError;
use saml_crypto::CryptoError;
use thiserror::Error;

use crate::types::status_codes;

/// Result type for SAML operations.
pub type SamlResult<T> = Result<T, SamlError>;

/// A violated SAML rule.
///
/// `Display` prints the rule message unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct FormatError(String);

impl FormatError {
    /// Creates a format error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// Returns the rule message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Result type for the validators.
pub type FormatResult<T = ()> = Result<T, FormatError>;

/// Signature and key errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrustError {
    /// The element carries no enveloped signature.
    #[error("message is not signed")]
    NoSignature,

    /// No trusted key verified the signature.
    #[error("signature does not verify against any trusted key")]
    InvalidSignature,

    /// The issuer is absent or not a configured identity provider.
    #[error("unknown issuer: {0}")]
    UnknownIssuer(String),

    /// None of the configured keys could unwrap an `EncryptedKey`.
    #[error("no usable decryption key for encrypted element")]
    NoDecryptionKey,

    /// A key was found but the content could not be decrypted.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// A metadata certificate could not be parsed.
    #[error("certificate error: {0}")]
    Certificate(String),
}

/// Anti-replay failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    /// The response carries no InResponseTo attribute.
    #[error("InResponseTo attribute is missing")]
    MissingInResponseTo,

    /// The InResponseTo attribute is empty.
    #[error("InResponseTo attribute is empty")]
    EmptyInResponseTo,

    /// No request was recorded for this state.
    #[error("no outstanding request recorded for this state")]
    NoExpectedRequest,

    /// InResponseTo does not name the recorded request.
    #[error("InResponseTo mismatch: expected '{expected}', received '{actual}'")]
    InResponseToMismatch {
        /// The recorded request id.
        expected: String,
        /// The InResponseTo value received.
        actual: String,
    },

    /// A one-time-use assertion id was seen before.
    #[error("assertion '{id}' has already been consumed")]
    AssertionReplayed {
        /// The assertion id.
        id: String,
    },

    /// The artifact is unknown, expired or already resolved.
    #[error("artifact is unknown or has already been resolved")]
    UnknownArtifact,

    /// The artifact was resolved by someone other than its recipient.
    #[error("artifact was issued to '{expected}', not '{actual}'")]
    ArtifactRecipientMismatch {
        /// Entity ID the artifact was issued to.
        expected: String,
        /// Entity ID that tried to resolve it.
        actual: String,
    },

    /// The replay store failed; the message is rejected.
    #[error("replay store error: {0}")]
    Store(String),
}

impl From<CacheError> for ReplayError {
    fn from(err: CacheError) -> Self {
        Self::Store(err.to_string())
    }
}

/// SAML protocol errors.
#[derive(Debug, Error)]
pub enum SamlError {
    /// A SAML rule is violated.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// Signature or key failure.
    #[error(transparent)]
    Trust(#[from] TrustError),

    /// Replay detected.
    #[error(transparent)]
    Replay(#[from] ReplayError),

    /// Missing or invalid configuration.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The identity provider answered with a non-success status.
    #[error("response status is {code}")]
    Status {
        /// Top-level status code.
        code: String,
        /// Second-level status code.
        sub_code: Option<String>,
        /// Status message, if any.
        message: Option<String>,
    },

    /// Invalid binding request (missing parameters, bad encoding).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// XML parsing error.
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    /// Base64 decoding error.
    #[error("base64 decode error: {0}")]
    Base64Decode(String),

    /// Deflate compression or decompression error.
    #[error("deflate error: {0}")]
    Deflate(String),

    /// Cryptographic operation error.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl SamlError {
    /// Returns the SAML status code to answer with.
    #[must_use]
    pub fn status_code(&self) -> &'static str {
        match self {
            Self::Format(_)
            | Self::Trust(_)
            | Self::Replay(_)
            | Self::InvalidRequest(_)
            | Self::XmlParse(_)
            | Self::Base64Decode(_)
            | Self::Deflate(_) => status_codes::REQUESTER,
            Self::Status { .. } | Self::Configuration(_) | Self::Crypto(_) => {
                status_codes::RESPONDER
            }
        }
    }

    /// Returns true for trust and replay failures.
    ///
    /// These point at tampering or misconfiguration and deserve a louder
    /// log line than malformed input.
    #[must_use]
    pub const fn is_security_event(&self) -> bool {
        matches!(self, Self::Trust(_) | Self::Replay(_))
    }

    /// Short name of the error kind, for structured log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Format(_) => "format",
            Self::Trust(_) => "trust",
            Self::Replay(_) => "replay",
            Self::Configuration(_) => "configuration",
            Self::Status { .. } => "status",
            Self::InvalidRequest(_) | Self::XmlParse(_) | Self::Base64Decode(_) | Self::Deflate(_) => {
                "transport"
            }
            Self::Crypto(_) => "crypto",
        }
    }

    /// Returns the message to show the user.
    ///
    /// The detailed message is only revealed when `show_error` is set.
    #[must_use]
    pub fn public_message(&self, show_error: bool) -> String {
        if show_error {
            self.to_string()
        } else {
            "The SAML message could not be processed.".to_string()
        }
    }
}

impl From<quick_xml::Error> for SamlError {
    fn from(err: quick_xml::Error) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for SamlError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<base64::DecodeError> for SamlError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Base64Decode(err.to_string())
    }
}

impl From<CacheError> for SamlError {
    fn from(err: CacheError) -> Self {
        Self::Replay(err.into())
    }
}
