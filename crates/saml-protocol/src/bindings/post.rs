//! HTTP-POST binding.
//!
//! Messages are base64 encoded form values. Rendering the auto-submit
//! page is left to the host application.

use base64::Engine;
use tracing::debug;

use super::{DecodedMessage, SamlMessageType};
use crate::error::{SamlError, SamlResult};

/// HTTP-POST binding encoder/decoder.
pub struct HttpPostBinding;

impl HttpPostBinding {
    /// Encodes a message as a form value.
    #[must_use]
    pub fn encode_message(xml: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(xml.as_bytes())
    }

    /// Decodes a SAML message from POST form parameters.
    ///
    /// Line breaks inside the base64 value are tolerated.
    pub fn decode(
        saml_request: Option<&str>,
        saml_response: Option<&str>,
        relay_state: Option<&str>,
    ) -> SamlResult<DecodedMessage> {
        let (encoded, message_type) = if let Some(req) = saml_request {
            (req, SamlMessageType::Request)
        } else if let Some(resp) = saml_response {
            (resp, SamlMessageType::Response)
        } else {
            return Err(SamlError::InvalidRequest(
                "No SAMLRequest or SAMLResponse parameter".to_string(),
            ));
        };

        let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| {
                debug!(error = %e, "POST message is not valid base64");
                SamlError::Base64Decode(e.to_string())
            })?;
        let xml = String::from_utf8(decoded)
            .map_err(|e| SamlError::InvalidRequest(format!("Invalid UTF-8 in message: {e}")))?;

        Ok(DecodedMessage {
            xml,
            message_type,
            relay_state: relay_state.map(String::from),
            signature: None,
            sig_alg: None,
        })
    }

    /// Decodes a message from `application/x-www-form-urlencoded` pairs.
    pub fn decode_form<'a, I>(pairs: I) -> SamlResult<DecodedMessage>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut saml_request = None;
        let mut saml_response = None;
        let mut relay_state = None;
        for (key, value) in pairs {
            match key {
                "SAMLRequest" => saml_request = Some(value),
                "SAMLResponse" => saml_response = Some(value),
                "RelayState" => relay_state = Some(value),
                _ => {}
            }
        }
        Self::decode(saml_request, saml_response, relay_state)
    }
}
