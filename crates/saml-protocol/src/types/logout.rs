//! Single Logout messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{NameId, SAML_VERSION, Status, generate_id};

/// `samlp:LogoutRequest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutRequest {
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

    /// Where the request was sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// The principal to log out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_id: Option<NameId>,

    /// Sessions to terminate; empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub session_indexes: Vec<String>,

    /// Logout reason URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Time after which the request must be discarded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_on_or_after: Option<DateTime<Utc>>,
}

impl LogoutRequest {
    /// Creates a logout request for a principal.
    #[must_use]
    pub fn new(issuer: impl Into<String>, name_id: NameId) -> Self {
        Self {
            id: generate_id(),
            version: SAML_VERSION.to_string(),
            issue_instant: Some(Utc::now()),
            issuer: Some(NameId::new(issuer)),
            destination: None,
            name_id: Some(name_id),
            session_indexes: Vec::new(),
            reason: None,
            not_on_or_after: None,
        }
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Adds a session index.
    #[must_use]
    pub fn with_session_index(mut self, index: impl Into<String>) -> Self {
        self.session_indexes.push(index.into());
        self
    }

    /// Sets the logout reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the expiry.
    #[must_use]
    pub fn valid_until(mut self, not_on_or_after: DateTime<Utc>) -> Self {
        self.not_on_or_after = Some(not_on_or_after);
        self
    }

    /// Returns the issuer value, if any.
    #[must_use]
    pub fn issuer_value(&self) -> Option<&str> {
        self.issuer.as_ref().map(|issuer| issuer.value.as_str())
    }
}

/// `samlp:LogoutResponse`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutResponse {
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

    /// ID of the logout request this answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,

    /// Where the response was sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// Outcome of the logout.
    pub status: Status,
}

impl LogoutResponse {
    /// Creates a response to a logout request.
    #[must_use]
    pub fn answering(issuer: impl Into<String>, request_id: impl Into<String>, status: Status) -> Self {
        Self {
            id: generate_id(),
            version: SAML_VERSION.to_string(),
            issue_instant: Some(Utc::now()),
            issuer: Some(NameId::new(issuer)),
            in_response_to: Some(request_id.into()),
            destination: None,
            status,
        }
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::logout_reasons;

    #[test]
    fn logout_request_builder() {
        let request = LogoutRequest::new("https://sp.example.org", NameId::new("user"))
            .with_session_index("s1")
            .with_reason(logout_reasons::USER);
        assert_eq!(request.issuer_value(), Some("https://sp.example.org"));
        assert_eq!(request.session_indexes, vec!["s1".to_string()]);
    }

    #[test]
    fn logout_response_answers_request() {
        let response = LogoutResponse::answering("urn:sp", "_req", Status::success());
        assert_eq!(response.in_response_to.as_deref(), Some("_req"));
        assert!(response.status.is_success());
    }
}
