//! SAML bindings.
//!
//! Transport encodings for inbound and outbound messages:
//!
//! - **HTTP-Redirect** - messages are deflated, base64 encoded and URL
//!   encoded into the query string, with an optional detached signature
//! - **HTTP-POST** - messages are base64 encoded form values
//! - **HTTP-Artifact** - a short artifact travels through the browser and
//!   the message itself is fetched over a back channel
//!
//! # Usage
//!
//! ```rust,ignore
//! use saml_protocol::bindings::{HttpPostBinding, HttpRedirectBinding};
//!
//! let url = HttpRedirectBinding::encode_request(&request_xml, "https://idp.example.org/sso", Some("state"), None)?;
//! let message = HttpPostBinding::decode(None, Some(&form_value), relay_state)?;
//! ```

mod artifact;
mod post;
mod redirect;

pub use artifact::*;
pub use post::*;
pub use redirect::*;

/// SAML message direction for binding operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamlMessageType {
    /// A request (`AuthnRequest`, `LogoutRequest`).
    Request,
    /// A response (`Response`, `LogoutResponse`).
    Response,
}

impl SamlMessageType {
    /// Returns the form parameter name for this message type.
    #[must_use]
    pub const fn form_param(&self) -> &'static str {
        match self {
            Self::Request => "SAMLRequest",
            Self::Response => "SAMLResponse",
        }
    }
}

/// Decoded SAML binding message.
#[derive(Debug, Clone)]
pub struct DecodedMessage {
    /// The decoded XML message.
    pub xml: String,
    /// Request or response.
    pub message_type: SamlMessageType,
    /// RelayState parameter, if present.
    pub relay_state: Option<String>,
    /// Signature parameter (HTTP-Redirect only), still base64 encoded.
    pub signature: Option<String>,
    /// SigAlg parameter (HTTP-Redirect only).
    pub sig_alg: Option<String>,
}
