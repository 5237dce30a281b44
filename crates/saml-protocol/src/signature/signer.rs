//! XML Signature creation.
//!
//! Signs SAML documents with an enveloped signature in the profile the
//! verifier accepts, and produces detached HTTP-Redirect signatures.

use base64::Engine;
use saml_crypto::{CryptoError, SignatureAlgorithm, SigningKey, pem_to_der};

use crate::error::{SamlError, SamlResult};
use crate::types::{SAML_NS, XMLDSIG_NS, transforms};
use crate::xml::{C14nMethod, XmlElement, canonicalize};

/// XML document signer.
///
/// Signs SAML documents using the configured private key.
pub struct XmlSigner {
    key: SigningKey,
    /// The X.509 certificate in DER format, embedded in `ds:KeyInfo`.
    certificate_der: Option<Vec<u8>>,
    algorithm: SignatureAlgorithm,
}

impl std::fmt::Debug for XmlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlSigner")
            .field("algorithm", &self.algorithm)
            .field("has_certificate", &self.certificate_der.is_some())
            .finish_non_exhaustive()
    }
}

impl XmlSigner {
    /// Creates a signer using RSA-SHA256.
    #[must_use]
    pub fn new(key: SigningKey, certificate_der: Option<Vec<u8>>) -> Self {
        Self {
            key,
            certificate_der,
            algorithm: SignatureAlgorithm::RsaSha256,
        }
    }

    /// Creates a signer from a PEM private key and an optional PEM certificate.
    pub fn from_pem(private_key_pem: &str, certificate_pem: Option<&str>) -> SamlResult<Self> {
        let key = SigningKey::from_pem(private_key_pem)?;
        let certificate_der = certificate_pem
            .map(|pem| {
                pem_to_der(pem, "CERTIFICATE")
                    .ok_or_else(|| CryptoError::InvalidKey("Invalid certificate PEM".to_string()))
            })
            .transpose()?;
        Ok(Self::new(key, certificate_der))
    }

    /// Sets the signature algorithm.
    #[must_use]
    pub const fn with_algorithm(mut self, algorithm: SignatureAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// The signature algorithm in use.
    #[must_use]
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// Signs the element with the given `ID` and returns the document with
    /// the `ds:Signature` inserted after the element's `Issuer`, or as its
    /// first child when it has none.
    pub fn sign(&self, xml: &str, reference_id: &str) -> SamlResult<String> {
        let root = XmlElement::parse(xml)?;
        let element = match root.find_by_id(reference_id).as_slice() {
            [element] => *element,
            [] => {
                return Err(signing_error(format!(
                    "Element with ID '{reference_id}' not found"
                )));
            }
            _ => {
                return Err(signing_error(format!(
                    "Element ID '{reference_id}' is not unique"
                )));
            }
        };

        let insert_position = match element.children.first() {
            Some(first) if first.is(SAML_NS, "Issuer") => first.span.end,
            _ if element.content_start < element.span.end => element.content_start,
            _ => return Err(signing_error("Cannot sign an empty element".to_string())),
        };

        let method = C14nMethod::exclusive();
        let content = canonicalize(xml, element.span.clone(), None, &method)?;
        let digest = saml_crypto::digest(self.algorithm.digest(), content.as_bytes());
        let signed_info = build_signed_info(reference_id, &encode(&digest), self.algorithm);

        // SignedInfo declares its own prefix, so its exclusive form is the
        // same standalone as inside the finished document.
        let canonical_signed_info = canonicalize(&signed_info, 0..signed_info.len(), None, &method)?;
        let signature_value = self.sign_data(canonical_signed_info.as_bytes())?;
        let signature_element = build_signature_element(
            &signed_info,
            &encode(&signature_value),
            self.certificate_der.as_deref(),
        );

        Ok(format!(
            "{}{}{}",
            &xml[..insert_position],
            signature_element,
            &xml[insert_position..]
        ))
    }

    /// Signs an HTTP-Redirect message and returns the complete query string.
    ///
    /// `saml_message` is the deflated, base64 encoded message; it is URL
    /// encoded here. The signature covers
    /// `SAMLRequest|SAMLResponse=..[&RelayState=..]&SigAlg=..`.
    pub fn sign_redirect_binding(
        &self,
        saml_message: &str,
        relay_state: Option<&str>,
        is_request: bool,
    ) -> SamlResult<String> {
        let param_name = if is_request { "SAMLRequest" } else { "SAMLResponse" };

        let mut to_sign = format!("{}={}", param_name, urlencoding::encode(saml_message));
        if let Some(rs) = relay_state {
            to_sign.push_str(&format!("&RelayState={}", urlencoding::encode(rs)));
        }
        to_sign.push_str(&format!(
            "&SigAlg={}",
            urlencoding::encode(self.algorithm.uri())
        ));

        let signature = self.sign_data(to_sign.as_bytes())?;
        Ok(format!(
            "{}&Signature={}",
            to_sign,
            urlencoding::encode(&encode(&signature))
        ))
    }

    fn sign_data(&self, data: &[u8]) -> SamlResult<Vec<u8>> {
        if !self.algorithm.is_rsa() || self.algorithm.is_deprecated() {
            return Err(signing_error(format!(
                "Unsupported signing algorithm: {}",
                self.algorithm.uri()
            )));
        }
        Ok(self.key.sign(self.algorithm, data)?)
    }
}

fn signing_error(message: String) -> SamlError {
    SamlError::Crypto(CryptoError::Signing(message))
}

fn encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn build_signed_info(reference_id: &str, digest_b64: &str, algorithm: SignatureAlgorithm) -> String {
    format!(
        r##"<ds:SignedInfo xmlns:ds="{ds}">
<ds:CanonicalizationMethod Algorithm="{c14n}"/>
<ds:SignatureMethod Algorithm="{sig}"/>
<ds:Reference URI="#{reference_id}">
<ds:Transforms>
<ds:Transform Algorithm="{enveloped}"/>
<ds:Transform Algorithm="{c14n}"/>
</ds:Transforms>
<ds:DigestMethod Algorithm="{digest}"/>
<ds:DigestValue>{digest_b64}</ds:DigestValue>
</ds:Reference>
</ds:SignedInfo>"##,
        ds = XMLDSIG_NS,
        c14n = transforms::EXCLUSIVE_C14N,
        sig = algorithm.uri(),
        enveloped = transforms::ENVELOPED_SIGNATURE,
        digest = algorithm.digest().uri(),
    )
}

fn build_signature_element(
    signed_info: &str,
    signature_value: &str,
    certificate_der: Option<&[u8]>,
) -> String {
    let mut signature = format!(
        r#"<ds:Signature xmlns:ds="{XMLDSIG_NS}">
{signed_info}
<ds:SignatureValue>{signature_value}</ds:SignatureValue>"#
    );

    if let Some(cert) = certificate_der {
        signature.push_str(&format!(
            r#"
<ds:KeyInfo>
<ds:X509Data>
<ds:X509Certificate>{}</ds:X509Certificate>
</ds:X509Data>
</ds:KeyInfo>"#,
            encode(cert)
        ));
    }

    signature.push_str("\n</ds:Signature>");
    signature
}
