//! XML Encryption of assertions and attributes.
//!
//! The service provider holds one or more RSA decryption keys. Every
//! `EncryptedKey` clause of an encrypted element is tried against every
//! key, and the first content key that unwraps to the right length is used.

use saml_crypto::{
    BlockCipherAlgorithm, DecryptionKey, DigestAlgorithm, EncryptionKey, KeyTransportAlgorithm,
    decrypt_content, encrypt_content, random_bytes,
};
use tracing::debug;

use crate::error::{SamlError, SamlResult, TrustError};
use crate::types::{
    Assertion, EncryptedData, EncryptedElement, EncryptedKey, KeyInfo, KeyInfoClause, SAML_NS,
    SamlAttribute, XMLENC_ELEMENT_TYPE,
};
use crate::xml::{XmlElement, assertion_from_element, reader, write_encrypted_element};

/// A decrypted assertion with its plaintext XML.
///
/// The XML is kept so the assertion's own signature can be verified.
#[derive(Debug, Clone)]
pub struct DecryptedAssertion {
    /// The assertion.
    pub assertion: Assertion,
    /// The plaintext `saml:Assertion` document.
    pub xml: String,
}

/// Decrypts an encrypted element and returns the plaintext XML.
pub fn decrypt_element(encrypted: &EncryptedElement, keys: &[DecryptionKey]) -> SamlResult<String> {
    let data = encrypted
        .encrypted_data
        .as_ref()
        .ok_or_else(|| TrustError::Decryption("missing EncryptedData".to_string()))?;
    let method = data
        .encryption_method
        .as_deref()
        .ok_or_else(|| TrustError::Decryption("EncryptedData has no EncryptionMethod".to_string()))?;
    let cipher = BlockCipherAlgorithm::from_uri(method)
        .map_err(|e| TrustError::Decryption(e.to_string()))?;

    let content_key = unwrap_content_key(encrypted, keys, cipher)?;
    let plaintext = decrypt_content(cipher, &content_key, &data.cipher_value)
        .map_err(|e| TrustError::Decryption(e.to_string()))?;
    String::from_utf8(plaintext)
        .map_err(|_| TrustError::Decryption("plaintext is not UTF-8".to_string()).into())
}

fn unwrap_content_key(
    encrypted: &EncryptedElement,
    keys: &[DecryptionKey],
    cipher: BlockCipherAlgorithm,
) -> Result<Vec<u8>, TrustError> {
    for (clause, encrypted_key) in encrypted.candidate_keys().enumerate() {
        let Some(method) = encrypted_key.encryption_method.as_deref() else {
            continue;
        };
        let Ok(transport) = KeyTransportAlgorithm::from_uri(method, encrypted_key.digest_method.as_deref())
        else {
            debug!(clause, method, "Skipping EncryptedKey with unsupported transport");
            continue;
        };
        for (index, key) in keys.iter().enumerate() {
            match key.unwrap_key(transport, &encrypted_key.cipher_value) {
                Ok(content_key) if content_key.len() == cipher.key_len() => {
                    debug!(clause, key = index, "Unwrapped content encryption key");
                    return Ok(content_key);
                }
                _ => {}
            }
        }
    }
    Err(TrustError::NoDecryptionKey)
}

/// Decrypts an `EncryptedAssertion`.
pub fn decrypt_assertion(
    encrypted: &EncryptedElement,
    keys: &[DecryptionKey],
) -> SamlResult<DecryptedAssertion> {
    let xml = decrypt_element(encrypted, keys)?;
    let root = XmlElement::parse(&xml)?;
    if !root.is(SAML_NS, "Assertion") {
        return Err(SamlError::XmlParse(format!(
            "EncryptedAssertion decrypts to {}, not an Assertion",
            root.name
        )));
    }
    let assertion = assertion_from_element(&root)?;
    Ok(DecryptedAssertion { assertion, xml })
}

/// Decrypts an `EncryptedAttribute`.
pub fn decrypt_attribute(
    encrypted: &EncryptedElement,
    keys: &[DecryptionKey],
) -> SamlResult<SamlAttribute> {
    let xml = decrypt_element(encrypted, keys)?;
    let root = XmlElement::parse(&xml)?;
    if !root.is(SAML_NS, "Attribute") {
        return Err(SamlError::XmlParse(format!(
            "EncryptedAttribute decrypts to {}, not an Attribute",
            root.name
        )));
    }
    Ok(reader::saml_attribute(&root))
}

/// Encrypts an XML element for a recipient.
///
/// A fresh content key is generated, wrapped with the recipient's key and
/// carried inside the `EncryptedData` key info.
pub fn encrypt_element(
    xml: &str,
    recipient: &EncryptionKey,
    transport: KeyTransportAlgorithm,
    cipher: BlockCipherAlgorithm,
) -> SamlResult<EncryptedElement> {
    let content_key = random_bytes(cipher.key_len());
    let cipher_value = encrypt_content(cipher, &content_key, xml.as_bytes())?;
    let wrapped = recipient.wrap_key(transport, &content_key)?;

    let encrypted_key = EncryptedKey {
        encryption_method: Some(transport.uri().to_string()),
        digest_method: match transport {
            KeyTransportAlgorithm::RsaOaepSha1 => None,
            KeyTransportAlgorithm::RsaOaepSha256 => Some(DigestAlgorithm::Sha256.uri().to_string()),
        },
        cipher_value: wrapped,
        ..EncryptedKey::default()
    };
    Ok(EncryptedElement {
        encrypted_data: Some(EncryptedData {
            data_type: Some(XMLENC_ELEMENT_TYPE.to_string()),
            encryption_method: Some(cipher.uri().to_string()),
            key_info: Some(KeyInfo {
                clauses: vec![KeyInfoClause::EncryptedKey(encrypted_key)],
            }),
            cipher_value,
            ..EncryptedData::default()
        }),
        encrypted_keys: Vec::new(),
    })
}

/// Encrypts an assertion document and returns the `saml:EncryptedAssertion` XML.
pub fn encrypt_assertion(
    xml: &str,
    recipient: &EncryptionKey,
    transport: KeyTransportAlgorithm,
    cipher: BlockCipherAlgorithm,
) -> SamlResult<String> {
    let encrypted = encrypt_element(xml, recipient, transport, cipher)?;
    Ok(write_encrypted_element("EncryptedAssertion", &encrypted))
}
