//! HTTP-Redirect binding.
//!
//! Messages travel in the query string: DEFLATE compressed, base64 encoded
//! and URL encoded. A signed message carries a detached `Signature` over
//! the raw `SAMLRequest|SAMLResponse[&RelayState]&SigAlg` octets.

use std::io::{Read, Write};

use base64::Engine;
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use tracing::debug;

use super::{DecodedMessage, SamlMessageType};
use crate::error::{SamlError, SamlResult};
use crate::signature::{SignedQuery, XmlSigner};

/// Upper bound on an inflated message.
pub const MAX_INFLATED_LEN: u64 = 1024 * 1024;

/// HTTP-Redirect binding encoder/decoder.
pub struct HttpRedirectBinding;

impl HttpRedirectBinding {
    /// Encodes a request and returns the redirect URL.
    ///
    /// With a signer, `SigAlg` and `Signature` are appended.
    pub fn encode_request(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
        signer: Option<&XmlSigner>,
    ) -> SamlResult<String> {
        Self::encode(xml, destination, relay_state, signer, SamlMessageType::Request)
    }

    /// Encodes a response and returns the redirect URL.
    pub fn encode_response(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
        signer: Option<&XmlSigner>,
    ) -> SamlResult<String> {
        Self::encode(xml, destination, relay_state, signer, SamlMessageType::Response)
    }

    fn encode(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
        signer: Option<&XmlSigner>,
        message_type: SamlMessageType,
    ) -> SamlResult<String> {
        let compressed = deflate_compress(xml.as_bytes())?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&compressed);

        let query = match signer {
            Some(signer) => signer.sign_redirect_binding(
                &encoded,
                relay_state,
                message_type == SamlMessageType::Request,
            )?,
            None => {
                let mut query = format!(
                    "{}={}",
                    message_type.form_param(),
                    urlencoding::encode(&encoded)
                );
                if let Some(rs) = relay_state {
                    query.push_str(&format!("&RelayState={}", urlencoding::encode(rs)));
                }
                query
            }
        };

        let separator = if destination.contains('?') { '&' } else { '?' };
        Ok(format!("{destination}{separator}{query}"))
    }

    /// Decodes a message from HTTP-Redirect query parameters.
    ///
    /// The values may still be URL encoded; web frameworks differ on this.
    pub fn decode(
        saml_request: Option<&str>,
        saml_response: Option<&str>,
        relay_state: Option<&str>,
        signature: Option<&str>,
        sig_alg: Option<&str>,
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

        let url_decoded = urlencoding::decode(encoded)
            .map_err(|e| SamlError::InvalidRequest(format!("URL decode error: {e}")))?;
        let compressed = base64::engine::general_purpose::STANDARD
            .decode(url_decoded.trim())
            .map_err(|e| {
                debug!(error = %e, "Redirect message is not valid base64");
                SamlError::Base64Decode(e.to_string())
            })?;
        let xml_bytes = deflate_decompress(&compressed)?;
        let xml = String::from_utf8(xml_bytes)
            .map_err(|e| SamlError::InvalidRequest(format!("Invalid UTF-8 in message: {e}")))?;

        Ok(DecodedMessage {
            xml,
            message_type,
            relay_state: relay_state.map(String::from),
            signature: signature.map(String::from),
            sig_alg: sig_alg.map(String::from),
        })
    }

    /// Decodes a message from a full URL.
    pub fn decode_url(url: &str) -> SamlResult<DecodedMessage> {
        let parsed = parse_url(url)?;

        let mut saml_request = None;
        let mut saml_response = None;
        let mut relay_state = None;
        let mut signature = None;
        let mut sig_alg = None;

        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "SAMLRequest" => saml_request = Some(value.into_owned()),
                "SAMLResponse" => saml_response = Some(value.into_owned()),
                "RelayState" => relay_state = Some(value.into_owned()),
                "Signature" => signature = Some(value.into_owned()),
                "SigAlg" => sig_alg = Some(value.into_owned()),
                _ => {}
            }
        }

        Self::decode(
            saml_request.as_deref(),
            saml_response.as_deref(),
            relay_state.as_deref(),
            signature.as_deref(),
            sig_alg.as_deref(),
        )
    }

    /// Extracts the signed part of a redirect URL.
    ///
    /// Returns `None` when the URL carries no `Signature`.
    pub fn signed_query(url: &str) -> SamlResult<Option<SignedQuery>> {
        let parsed = parse_url(url)?;
        Self::signed_query_string(parsed.query().unwrap_or_default())
    }

    /// Extracts the signed part of a raw query string.
    ///
    /// The signed content is rebuilt from the parameter values exactly as
    /// they were received, never re-encoded, in the order the binding
    /// prescribes.
    pub fn signed_query_string(query: &str) -> SamlResult<Option<SignedQuery>> {
        let mut message = None;
        let mut relay_state = None;
        let mut sig_alg = None;
        let mut signature = None;

        for part in query.split('&') {
            let (key, value) = part.split_once('=').unwrap_or((part, ""));
            match key {
                "SAMLRequest" | "SAMLResponse" => message = Some(part),
                "RelayState" => relay_state = Some(part),
                "SigAlg" => sig_alg = Some((part, value)),
                "Signature" => signature = Some(value),
                _ => {}
            }
        }

        let Some(signature) = signature else {
            return Ok(None);
        };
        let message = message.ok_or_else(|| {
            SamlError::InvalidRequest("No SAMLRequest or SAMLResponse parameter".to_string())
        })?;
        let (sig_alg_part, sig_alg) = sig_alg.ok_or_else(|| {
            SamlError::InvalidRequest("Signature present without SigAlg".to_string())
        })?;

        let mut signed_content = message.to_string();
        if let Some(rs) = relay_state {
            signed_content.push('&');
            signed_content.push_str(rs);
        }
        signed_content.push('&');
        signed_content.push_str(sig_alg_part);

        let signature = form_decode(signature);
        let signature = base64::engine::general_purpose::STANDARD
            .decode(signature.trim())
            .map_err(|e| SamlError::Base64Decode(format!("Signature: {e}")))?;

        Ok(Some(SignedQuery {
            signed_content,
            sig_alg: form_decode(sig_alg),
            signature,
        }))
    }
}

fn parse_url(url: &str) -> SamlResult<url::Url> {
    url::Url::parse(url).map_err(|e| SamlError::InvalidRequest(format!("Invalid URL: {e}")))
}

fn form_decode(value: &str) -> String {
    url::form_urlencoded::parse(format!("v={value}").as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default()
}

/// Compresses data using DEFLATE (raw, no zlib header).
fn deflate_compress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| SamlError::Deflate(format!("Compression error: {e}")))?;
    encoder
        .finish()
        .map_err(|e| SamlError::Deflate(format!("Compression finish error: {e}")))
}

/// Decompresses DEFLATE data, refusing output above [`MAX_INFLATED_LEN`].
fn deflate_decompress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut decompressed = Vec::new();
    DeflateDecoder::new(data)
        .take(MAX_INFLATED_LEN + 1)
        .read_to_end(&mut decompressed)
        .map_err(|e| SamlError::Deflate(format!("Decompression error: {e}")))?;
    if decompressed.len() as u64 > MAX_INFLATED_LEN {
        debug!(limit = MAX_INFLATED_LEN, "Inflated redirect message too large");
        return Err(SamlError::Deflate(format!(
            "Inflated message exceeds {MAX_INFLATED_LEN} bytes"
        )));
    }
    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use saml_crypto::{SignatureAlgorithm, SigningKey};

    use super::*;
    use crate::signature::check_detached_signature;

    const IDP_KEY: &str = include_str!("../../tests/fixtures/idp-key.pem");
    const OTHER_KEY: &str = include_str!("../../tests/fixtures/other-key.pem");

    #[test]
    fn encode_and_decode_request() {
        let xml = r#"<samlp:AuthnRequest>test content here</samlp:AuthnRequest>"#;
        let url = HttpRedirectBinding::encode_request(
            xml,
            "https://idp.example.org/sso",
            Some("state 123"),
            None,
        )
        .unwrap();

        assert!(url.starts_with("https://idp.example.org/sso?SAMLRequest="));
        assert!(url.contains("RelayState=state%20123"));

        let decoded = HttpRedirectBinding::decode_url(&url).unwrap();
        assert_eq!(decoded.xml, xml);
        assert_eq!(decoded.message_type, SamlMessageType::Request);
        assert_eq!(decoded.relay_state.as_deref(), Some("state 123"));
        assert!(decoded.signature.is_none());
        assert_eq!(HttpRedirectBinding::signed_query(&url).unwrap(), None);
    }

    #[test]
    fn encode_and_decode_response() {
        let xml = r#"<samlp:LogoutResponse>test response</samlp:LogoutResponse>"#;
        let url =
            HttpRedirectBinding::encode_response(xml, "https://sp.example.org/slo", None, None)
                .unwrap();
        assert!(url.contains("SAMLResponse="));

        let decoded = HttpRedirectBinding::decode_url(&url).unwrap();
        assert_eq!(decoded.xml, xml);
        assert_eq!(decoded.message_type, SamlMessageType::Response);
    }

    #[test]
    fn url_with_existing_query() {
        let url = HttpRedirectBinding::encode_request(
            "<Test/>",
            "https://idp.example.org/sso?existing=param",
            None,
            None,
        )
        .unwrap();
        assert!(url.contains("?existing=param&SAMLRequest="));
    }

    #[test]
    fn signed_round_trip() {
        let signer = XmlSigner::new(SigningKey::from_pem(IDP_KEY).unwrap(), None);
        let url = HttpRedirectBinding::encode_request(
            "<samlp:LogoutRequest/>",
            "https://idp.example.org/slo",
            Some("rs/1"),
            Some(&signer),
        )
        .unwrap();

        let decoded = HttpRedirectBinding::decode_url(&url).unwrap();
        assert_eq!(decoded.sig_alg.as_deref(), Some(SignatureAlgorithm::RsaSha256.uri()));
        assert!(decoded.signature.is_some());

        let query = HttpRedirectBinding::signed_query(&url).unwrap().unwrap();
        assert!(query.signed_content.starts_with("SAMLRequest="));
        assert!(query.signed_content.contains("&RelayState=rs%2F1&SigAlg="));
        assert_eq!(query.sig_alg, SignatureAlgorithm::RsaSha256.uri());

        let idp = SigningKey::from_pem(IDP_KEY).unwrap().public_key();
        let other = SigningKey::from_pem(OTHER_KEY).unwrap().public_key();
        assert!(check_detached_signature(&query, &[idp]));
        assert!(!check_detached_signature(&query, &[other]));
    }

    #[test]
    fn signed_content_uses_raw_octets_in_binding_order() {
        let query = "Signature=AAAA&SigAlg=urn%3Aalg&Foo=bar&RelayState=a%2fb&SAMLRequest=x%2By";
        let signed = HttpRedirectBinding::signed_query_string(query).unwrap().unwrap();
        assert_eq!(signed.signed_content, "SAMLRequest=x%2By&RelayState=a%2fb&SigAlg=urn%3Aalg");
        assert_eq!(signed.sig_alg, "urn:alg");
        assert_eq!(signed.signature, vec![0, 0, 0]);
    }

    #[test]
    fn signed_query_errors() {
        assert!(HttpRedirectBinding::signed_query_string("SAMLRequest=x&Signature=AAAA").is_err());
        assert!(HttpRedirectBinding::signed_query_string("SigAlg=a&Signature=AAAA").is_err());
        assert!(HttpRedirectBinding::signed_query_string("SAMLRequest=x&SigAlg=a&Signature=!!").is_err());
        assert!(HttpRedirectBinding::signed_query("not a url").is_err());
    }

    #[test]
    fn decode_errors() {
        assert!(matches!(
            HttpRedirectBinding::decode(None, None, None, None, None),
            Err(SamlError::InvalidRequest(_))
        ));
        assert!(matches!(
            HttpRedirectBinding::decode(Some("!!!"), None, None, None, None),
            Err(SamlError::Base64Decode(_))
        ));
        assert!(matches!(
            HttpRedirectBinding::decode(Some("////"), None, None, None, None),
            Err(SamlError::Deflate(_))
        ));
    }

    #[test]
    fn inflate_is_bounded() {
        let bomb = deflate_compress(&vec![b'a'; MAX_INFLATED_LEN as usize + 1]).unwrap();
        assert!(matches!(deflate_decompress(&bomb), Err(SamlError::Deflate(_))));

        let fits = deflate_compress(&vec![b'a'; MAX_INFLATED_LEN as usize]).unwrap();
        assert_eq!(deflate_decompress(&fits).unwrap().len(), MAX_INFLATED_LEN as usize);
    }
}
