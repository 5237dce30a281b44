//! Signature verification against trusted keys.

use std::ops::Range;

use saml_crypto::{DigestAlgorithm, PublicKey, SignatureAlgorithm};
use tracing::debug;

use crate::error::{SamlError, TrustError};
use crate::types::{SAMLP_NS, XMLDSIG_NS, decode_base64, transforms};
use crate::xml::{C14nMethod, XmlElement, canonicalize};

/// Returns true if the element carries an enveloped signature.
#[must_use]
pub fn is_signed(element: &XmlElement) -> bool {
    element.child(XMLDSIG_NS, "Signature").is_some()
}

/// Verifies the enveloped signature of `element`.
///
/// `element` must come from parsing `xml`; the byte spans recorded by the
/// parser locate the signed content. Keys are tried in order and the first
/// one that verifies wins.
pub fn verify_signature(
    xml: &str,
    element: &XmlElement,
    keys: &[PublicKey],
) -> Result<(), TrustError> {
    let signature = element
        .child(XMLDSIG_NS, "Signature")
        .ok_or(TrustError::NoSignature)?;

    let parts = EnvelopedSignature::read(xml, element, signature).map_err(|reason| {
        debug!(element = %element.name, reason, "Rejecting malformed signature");
        TrustError::InvalidSignature
    })?;

    let unreadable = |e: SamlError| {
        debug!(element = %element.name, error = %e, "Cannot canonicalize signed content");
        TrustError::InvalidSignature
    };
    let content = canonicalize(
        xml,
        element.span.clone(),
        Some(signature.span.clone()),
        &parts.reference_method,
    )
    .map_err(unreadable)?;
    let digest = saml_crypto::digest(parts.digest_algorithm, content.as_bytes());
    if digest != parts.digest_value {
        debug!(element = %element.name, "Reference digest does not match signed content");
        return Err(TrustError::InvalidSignature);
    }

    let signed_info = canonicalize(xml, parts.signed_info, None, &parts.signed_info_method)
        .map_err(unreadable)?;
    verify_with_any(parts.algorithm, signed_info.as_bytes(), &parts.signature_value, keys)
}

/// Returns true if the enveloped signature of `element` verifies against
/// one of `keys`.
///
/// Unsigned elements yield false; use [`is_signed`] to tell the cases apart.
#[must_use]
pub fn check_signature(xml: &str, element: &XmlElement, keys: &[PublicKey]) -> bool {
    verify_signature(xml, element, keys).is_ok()
}

/// Checks the enveloped signature on the document element of a SOAP
/// `ArtifactResponse` payload.
#[must_use]
pub fn check_artifact_signature(xml: &str, keys: &[PublicKey]) -> bool {
    match XmlElement::parse(xml) {
        Ok(root) if root.is(SAMLP_NS, "ArtifactResponse") => check_signature(xml, &root, keys),
        Ok(root) => {
            debug!(element = %root.name, "Expected an ArtifactResponse");
            false
        }
        Err(e) => {
            debug!(error = %e, "Unreadable ArtifactResponse");
            false
        }
    }
}

/// The signed part of an HTTP-Redirect query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedQuery {
    /// `SAMLRequest=..[&RelayState=..]&SigAlg=..` exactly as received.
    pub signed_content: String,
    /// The decoded `SigAlg` parameter.
    pub sig_alg: String,
    /// The decoded `Signature` parameter.
    pub signature: Vec<u8>,
}

/// Verifies a detached HTTP-Redirect signature.
pub fn verify_detached_signature(query: &SignedQuery, keys: &[PublicKey]) -> Result<(), TrustError> {
    let algorithm = SignatureAlgorithm::from_uri(&query.sig_alg).map_err(|e| {
        debug!(error = %e, "Unsupported SigAlg");
        TrustError::InvalidSignature
    })?;
    verify_with_any(algorithm, query.signed_content.as_bytes(), &query.signature, keys)
}

/// Returns true if a detached HTTP-Redirect signature verifies against one
/// of `keys`.
#[must_use]
pub fn check_detached_signature(query: &SignedQuery, keys: &[PublicKey]) -> bool {
    verify_detached_signature(query, keys).is_ok()
}

fn verify_with_any(
    algorithm: SignatureAlgorithm,
    data: &[u8],
    signature: &[u8],
    keys: &[PublicKey],
) -> Result<(), TrustError> {
    if algorithm.is_deprecated() {
        debug!(algorithm = algorithm.uri(), "Verifying legacy signature algorithm");
    }
    let verified = keys
        .iter()
        .find(|key| key.verify(algorithm, data, signature).is_ok());
    match verified {
        Some(key) => {
            debug!(key = %key.fingerprint(), "Signature verified");
            Ok(())
        }
        None => {
            debug!(key_count = keys.len(), "No trusted key verified the signature");
            Err(TrustError::InvalidSignature)
        }
    }
}

struct EnvelopedSignature {
    algorithm: SignatureAlgorithm,
    digest_algorithm: DigestAlgorithm,
    digest_value: Vec<u8>,
    signature_value: Vec<u8>,
    signed_info: Range<usize>,
    signed_info_method: C14nMethod,
    reference_method: C14nMethod,
}

impl EnvelopedSignature {
    fn read(xml: &str, element: &XmlElement, signature: &XmlElement) -> Result<Self, &'static str> {
        if element.children_named(XMLDSIG_NS, "Signature").count() > 1 {
            return Err("more than one enveloped signature");
        }
        let signed_info = signature
            .child(XMLDSIG_NS, "SignedInfo")
            .ok_or("missing SignedInfo")?;

        let signed_info_method = signed_info
            .child(XMLDSIG_NS, "CanonicalizationMethod")
            .ok_or("missing CanonicalizationMethod")
            .and_then(c14n_method)?
            .ok_or("unsupported canonicalization")?;

        let algorithm = signed_info
            .child(XMLDSIG_NS, "SignatureMethod")
            .and_then(|m| m.attr("Algorithm"))
            .ok_or("missing SignatureMethod")
            .and_then(|uri| SignatureAlgorithm::from_uri(uri).map_err(|_| "unsupported SignatureMethod"))?;

        let mut references = signed_info.children_named(XMLDSIG_NS, "Reference");
        let reference = references.next().ok_or("missing Reference")?;
        if references.next().is_some() {
            return Err("more than one Reference");
        }

        let id = element.attr("ID").ok_or("signed element has no ID")?;
        if reference.attr("URI").and_then(|uri| uri.strip_prefix('#')) != Some(id) {
            return Err("Reference does not point at the signed element");
        }
        if element.find_by_id(id).len() != 1 {
            return Err("signed element ID is not unique");
        }

        // Without an explicit canonicalization transform the enveloped
        // output is serialized with inclusive C14N.
        let mut reference_method = C14nMethod::Inclusive;
        let mut enveloped = false;
        if let Some(list) = reference.child(XMLDSIG_NS, "Transforms") {
            for transform in list.children_named(XMLDSIG_NS, "Transform") {
                if transform.attr("Algorithm") == Some(transforms::ENVELOPED_SIGNATURE) {
                    enveloped = true;
                } else {
                    reference_method = c14n_method(transform)?.ok_or("unsupported transform")?;
                }
            }
        }
        if !enveloped {
            return Err("missing enveloped-signature transform");
        }

        let digest_algorithm = reference
            .child(XMLDSIG_NS, "DigestMethod")
            .and_then(|m| m.attr("Algorithm"))
            .ok_or("missing DigestMethod")
            .and_then(|uri| DigestAlgorithm::from_uri(uri).map_err(|_| "unsupported DigestMethod"))?;
        let digest_value = reference
            .child(XMLDSIG_NS, "DigestValue")
            .ok_or("missing DigestValue")
            .and_then(|v| decode_base64(&v.text).map_err(|_| "DigestValue is not base64"))?;
        let signature_value = signature
            .child(XMLDSIG_NS, "SignatureValue")
            .ok_or("missing SignatureValue")
            .and_then(|v| decode_base64(&v.text).map_err(|_| "SignatureValue is not base64"))?;

        if signed_info.span.is_empty() || xml.get(signed_info.span.clone()).is_none() {
            return Err("SignedInfo is not part of this document");
        }
        if element.span.is_empty() || xml.get(element.span.clone()).is_none() {
            return Err("signed element is not part of this document");
        }

        Ok(Self {
            algorithm,
            digest_algorithm,
            digest_value,
            signature_value,
            signed_info: signed_info.span.clone(),
            signed_info_method,
            reference_method,
        })
    }
}

/// Reads a `CanonicalizationMethod` or `Transform` element. `None` means the
/// algorithm is not a supported canonicalization.
fn c14n_method(method: &XmlElement) -> Result<Option<C14nMethod>, &'static str> {
    match method.attr("Algorithm").ok_or("missing Algorithm")? {
        transforms::C14N => Ok(Some(C14nMethod::Inclusive)),
        transforms::EXCLUSIVE_C14N => {
            let inclusive_prefixes = method
                .child(transforms::EXCLUSIVE_C14N, "InclusiveNamespaces")
                .and_then(|list| list.attr("PrefixList"))
                .map(|list| list.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default();
            Ok(Some(C14nMethod::Exclusive { inclusive_prefixes }))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use saml_crypto::SigningKey;

    use super::*;
    use crate::signature::XmlSigner;

    const IDP_KEY: &str = include_str!("../../tests/fixtures/idp-key.pem");
    const OTHER_KEY: &str = include_str!("../../tests/fixtures/other-key.pem");

    const DOC: &str = r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_a1" Version="2.0" IssueInstant="2026-01-01T00:00:00Z">
  <saml:Issuer>urn:idp</saml:Issuer>
  <saml:Subject><saml:NameID>alice</saml:NameID></saml:Subject>
</saml:Assertion>"#;

    fn signer() -> XmlSigner {
        XmlSigner::new(SigningKey::from_pem(IDP_KEY).unwrap(), None)
    }

    fn idp_key() -> PublicKey {
        SigningKey::from_pem(IDP_KEY).unwrap().public_key()
    }

    fn other_key() -> PublicKey {
        SigningKey::from_pem(OTHER_KEY).unwrap().public_key()
    }

    #[test]
    fn verifies_signed_element() {
        let signed = signer().sign(DOC, "_a1").unwrap();
        let root = XmlElement::parse(&signed).unwrap();

        assert!(is_signed(&root));
        assert!(verify_signature(&signed, &root, &[idp_key()]).is_ok());
        assert!(check_signature(&signed, &root, &[other_key(), idp_key()]));
        assert_eq!(
            verify_signature(&signed, &root, &[other_key()]),
            Err(TrustError::InvalidSignature)
        );
        assert!(!check_signature(&signed, &root, &[]));
    }

    #[test]
    fn unsigned_is_distinct_from_invalid() {
        let root = XmlElement::parse(DOC).unwrap();
        assert!(!is_signed(&root));
        assert_eq!(
            verify_signature(DOC, &root, &[idp_key()]),
            Err(TrustError::NoSignature)
        );
        assert!(!check_signature(DOC, &root, &[idp_key()]));
    }

    #[test]
    fn detects_tampering() {
        let signed = signer().sign(DOC, "_a1").unwrap();
        let tampered = signed.replace(">alice<", ">mallory<");
        let root = XmlElement::parse(&tampered).unwrap();
        assert_eq!(
            verify_signature(&tampered, &root, &[idp_key()]),
            Err(TrustError::InvalidSignature)
        );
    }

    #[test]
    fn whitespace_is_signed() {
        let signed = signer().sign(DOC, "_a1").unwrap();
        let reindented = signed.replace("\n  <saml:Subject>", "\n\n\t<saml:Subject>");
        let root = XmlElement::parse(&reindented).unwrap();
        assert!(!check_signature(&reindented, &root, &[idp_key()]));

        let padded = signed.replace(">alice<", ">  alice\n<");
        let root = XmlElement::parse(&padded).unwrap();
        assert!(!check_signature(&padded, &root, &[idp_key()]));
    }

    #[test]
    fn serialization_details_are_not_signed() {
        let signed = signer().sign(DOC, "_a1").unwrap();
        let requoted = signed.replace(r#"Version="2.0""#, "Version='2.0'");
        let root = XmlElement::parse(&requoted).unwrap();
        assert!(check_signature(&requoted, &root, &[idp_key()]));

        let expanded = signed.replace("<saml:NameID>alice</saml:NameID>", "<saml:NameID>al&#105;ce</saml:NameID>");
        let root = XmlElement::parse(&expanded).unwrap();
        assert!(check_signature(&expanded, &root, &[idp_key()]));
    }

    #[test]
    fn namespaces_inherited_from_the_response() {
        let signed = signer().sign(DOC, "_a1").unwrap();
        let inherited = signed.replacen(r#" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion""#, "", 1);
        let response = format!(
            r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_r1">{inherited}</samlp:Response>"#
        );
        let root = XmlElement::parse(&response).unwrap();
        let assertion = &root.children[0];
        assert_eq!(assertion.attr("ID"), Some("_a1"));
        assert!(check_signature(&response, assertion, &[idp_key()]));

        let rebound = response.replacen(
            r#"xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion""#,
            r#"xmlns:saml="urn:example:other""#,
            1,
        );
        let root = XmlElement::parse(&rebound).unwrap();
        assert!(!check_signature(&rebound, &root.children[0], &[idp_key()]));
    }

    #[test]
    fn reference_must_point_at_element() {
        let signed = signer().sign(DOC, "_a1").unwrap();
        let moved = signed.replace("URI=\"#_a1\"", "URI=\"#_other\"");
        let root = XmlElement::parse(&moved).unwrap();
        assert!(!check_signature(&moved, &root, &[idp_key()]));
    }

    #[test]
    fn built_trees_have_no_source() {
        let signed = signer().sign(DOC, "_a1").unwrap();
        let mut root = XmlElement::parse(&signed).unwrap();
        root.span = 0..0;
        assert!(!check_signature(&signed, &root, &[idp_key()]));
    }

    #[test]
    fn detached_signatures() {
        let query = signer()
            .sign_redirect_binding("fZBBT4NAEIX/", Some("state-1"), true)
            .unwrap();
        let (content, signature) = query.rsplit_once("&Signature=").unwrap();
        let signed = SignedQuery {
            signed_content: content.to_string(),
            sig_alg: SignatureAlgorithm::RsaSha256.uri().to_string(),
            signature: decode_base64(&urlencoding::decode(signature).unwrap()).unwrap(),
        };

        assert!(check_detached_signature(&signed, &[idp_key()]));
        assert!(!check_detached_signature(&signed, &[other_key()]));

        let altered = SignedQuery {
            signed_content: content.replace("state-1", "state-2"),
            ..signed.clone()
        };
        assert!(!check_detached_signature(&altered, &[idp_key()]));

        let bad_alg = SignedQuery {
            sig_alg: "urn:unknown".to_string(),
            ..signed
        };
        assert_eq!(
            verify_detached_signature(&bad_alg, &[idp_key()]),
            Err(TrustError::InvalidSignature)
        );
    }

    #[test]
    fn artifact_response_signature() {
        let xml = r#"<samlp:ArtifactResponse xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_ar1" Version="2.0"><saml:Issuer>urn:idp</saml:Issuer><samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status></samlp:ArtifactResponse>"#;
        let signed = signer().sign(xml, "_ar1").unwrap();
        assert!(check_artifact_signature(&signed, &[idp_key()]));
        assert!(!check_artifact_signature(xml, &[idp_key()]));

        let assertion = signer().sign(DOC, "_a1").unwrap();
        assert!(!check_artifact_signature(&assertion, &[idp_key()]));
        assert!(!check_artifact_signature("not xml", &[idp_key()]));
    }
}
