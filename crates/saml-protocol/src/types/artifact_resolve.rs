//! Artifact resolution protocol messages.
//!
//! The relying party sends an `ArtifactResolve` over the back channel and
//! receives the referenced message wrapped in an `ArtifactResponse`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{NameId, SAML_VERSION, Status, generate_id};

/// `samlp:ArtifactResolve`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactResolve {
    /// Unique identifier.
    pub id: String,

    /// Protocol version as received.
    pub version: String,

    /// When the request was issued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_instant: Option<DateTime<Utc>>,

    /// The requester.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<NameId>,

    /// Artifact resolution endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// The base64 artifact to resolve.
    pub artifact: String,
}

impl ArtifactResolve {
    /// Creates a resolve request for an artifact.
    #[must_use]
    pub fn new(issuer: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            version: SAML_VERSION.to_string(),
            issue_instant: Some(Utc::now()),
            issuer: Some(NameId::new(issuer)),
            destination: None,
            artifact: artifact.into(),
        }
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }
}

/// `samlp:ArtifactResponse`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactResponse {
    /// Unique identifier.
    pub id: String,

    /// Protocol version as received.
    pub version: String,

    /// When the response was issued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_instant: Option<DateTime<Utc>>,

    /// The responder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<NameId>,

    /// ID of the `ArtifactResolve` this answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,

    /// Outcome of the resolution.
    pub status: Status,

    /// The referenced protocol message, as XML text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ArtifactResponse {
    /// Creates a response to a resolve request.
    #[must_use]
    pub fn answering(
        issuer: impl Into<String>,
        request_id: impl Into<String>,
        message: Option<String>,
    ) -> Self {
        Self {
            id: generate_id(),
            version: SAML_VERSION.to_string(),
            issue_instant: Some(Utc::now()),
            issuer: Some(NameId::new(issuer)),
            in_response_to: Some(request_id.into()),
            status: Status::success(),
            message,
        }
    }
}
