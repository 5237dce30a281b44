//! SAML `Response`.
//!
//! Sent by an identity provider to the assertion consumer service in answer
//! to an authentication request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Assertion, EncryptedElement, NameId, SAML_VERSION, Status, generate_id};

/// SAML `Response`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Unique identifier.
    pub id: String,

    /// Protocol version as received.
    pub version: String,

    /// When the response was issued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_instant: Option<DateTime<Utc>>,

    /// The identity provider that issued the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<NameId>,

    /// ID of the request this response answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,

    /// Where the response was sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// Outcome of the request.
    pub status: Status,

    /// Clear-text assertions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertions: Vec<Assertion>,

    /// Encrypted assertions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub encrypted_assertions: Vec<EncryptedElement>,
}

impl Response {
    /// Creates a success response.
    #[must_use]
    pub fn success(issuer: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            version: SAML_VERSION.to_string(),
            issue_instant: Some(Utc::now()),
            issuer: Some(NameId::new(issuer)),
            in_response_to: None,
            destination: None,
            status: Status::success(),
            assertions: Vec::new(),
            encrypted_assertions: Vec::new(),
        }
    }

    /// Sets the request ID this response answers.
    #[must_use]
    pub fn in_response_to(mut self, request_id: impl Into<String>) -> Self {
        self.in_response_to = Some(request_id.into());
        self
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    /// Adds an assertion.
    #[must_use]
    pub fn with_assertion(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    /// Returns the issuer value, if any.
    #[must_use]
    pub fn issuer_value(&self) -> Option<&str> {
        self.issuer.as_ref().map(|issuer| issuer.value.as_str())
    }

    /// Number of assertions, clear-text and encrypted.
    #[must_use]
    pub fn assertion_count(&self) -> usize {
        self.assertions.len() + self.encrypted_assertions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_builder() {
        let response = Response::success("urn:idp")
            .in_response_to("_req1")
            .with_destination("https://sp.example.org/acs")
            .with_assertion(Assertion::new("urn:idp"));

        assert!(response.status.is_success());
        assert_eq!(response.issuer_value(), Some("urn:idp"));
        assert_eq!(response.in_response_to.as_deref(), Some("_req1"));
        assert_eq!(response.assertion_count(), 1);
        assert_ne!(response.id, response.assertions[0].id.clone().unwrap());
    }
}
