//! Protocol status.

use serde::{Deserialize, Serialize};

use super::status_codes;

/// `samlp:Status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// The status code.
    pub status_code: StatusCode,

    /// Optional status message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

impl Status {
    /// Success status.
    #[must_use]
    pub fn success() -> Self {
        Self {
            status_code: StatusCode::new(status_codes::SUCCESS),
            status_message: None,
        }
    }

    /// Error status with a second-level code.
    #[must_use]
    pub fn error(code: &str, sub_code: Option<&str>) -> Self {
        Self {
            status_code: StatusCode {
                value: code.to_string(),
                sub_code: sub_code.map(|sub| Box::new(StatusCode::new(sub))),
            },
            status_message: None,
        }
    }

    /// Sets the status message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.status_message = Some(message.into());
        self
    }

    /// Returns true if the top-level code is `Success`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status_code.value == status_codes::SUCCESS
    }

    /// Returns the second-level code value, if any.
    #[must_use]
    pub fn sub_code(&self) -> Option<&str> {
        self.status_code.sub_code.as_deref().map(|c| c.value.as_str())
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::success()
    }
}

/// `samlp:StatusCode`, optionally nesting a more specific code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCode {
    /// The status code URI.
    pub value: String,

    /// Nested status code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_code: Option<Box<StatusCode>>,
}

impl StatusCode {
    /// Creates a status code without a nested code.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            sub_code: None,
        }
    }
}
