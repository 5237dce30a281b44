//! Key material carried in metadata and messages.
//!
//! `ds:KeyInfo` appears in metadata `KeyDescriptor`s (signing and
//! encryption keys of a provider) and inside encrypted elements, where it
//! transports the content-encryption key.

use base64::Engine;
use serde::{Deserialize, Serialize};

use super::{XMLDSIG_NS, XMLENC_NS};
use crate::error::{SamlError, SamlResult};
use crate::xml::XmlElement;

/// `use` attribute of a metadata `KeyDescriptor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyUse {
    /// Signing key.
    Signing,
    /// Encryption key.
    Encryption,
}

/// A metadata `KeyDescriptor`.
///
/// A descriptor without `use` serves both purposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDescriptor {
    /// Declared usage.
    pub usage: Option<KeyUse>,
    /// The key material.
    pub key_info: KeyInfo,
}

impl KeyDescriptor {
    /// Signing descriptor with a single DER certificate.
    #[must_use]
    pub fn signing_certificate(der: Vec<u8>) -> Self {
        Self {
            usage: Some(KeyUse::Signing),
            key_info: KeyInfo {
                clauses: vec![KeyInfoClause::X509Data(vec![der])],
            },
        }
    }
}

/// `ds:KeyInfo`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    /// Clauses in document order. Unknown clauses are dropped.
    pub clauses: Vec<KeyInfoClause>,
}

/// A `ds:KeyInfo` child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyInfoClause {
    /// `X509Data` with its DER certificates.
    X509Data(Vec<Vec<u8>>),
    /// `KeyValue/RSAKeyValue` as big-endian integers.
    RsaKeyValue {
        /// Modulus.
        modulus: Vec<u8>,
        /// Public exponent.
        exponent: Vec<u8>,
    },
    /// `KeyName`.
    KeyName(String),
    /// `xenc:EncryptedKey`.
    EncryptedKey(EncryptedKey),
}

impl KeyInfo {
    /// Reads a `ds:KeyInfo` element.
    pub fn from_element(element: &XmlElement) -> SamlResult<Self> {
        let mut clauses = Vec::new();
        for child in &element.children {
            if child.is(XMLDSIG_NS, "X509Data") {
                let certs = child
                    .children_named(XMLDSIG_NS, "X509Certificate")
                    .map(|cert| decode_base64(&cert.text))
                    .collect::<SamlResult<Vec<_>>>()?;
                clauses.push(KeyInfoClause::X509Data(certs));
            } else if child.is(XMLDSIG_NS, "KeyValue") {
                if let Some(rsa) = child.child(XMLDSIG_NS, "RSAKeyValue") {
                    clauses.push(KeyInfoClause::RsaKeyValue {
                        modulus: decode_base64(rsa.child_text(XMLDSIG_NS, "Modulus").unwrap_or_default())?,
                        exponent: decode_base64(rsa.child_text(XMLDSIG_NS, "Exponent").unwrap_or_default())?,
                    });
                }
            } else if child.is(XMLDSIG_NS, "KeyName") {
                clauses.push(KeyInfoClause::KeyName(child.trimmed_text().to_string()));
            } else if child.is(XMLENC_NS, "EncryptedKey") {
                clauses.push(KeyInfoClause::EncryptedKey(EncryptedKey::from_element(child)?));
            }
        }
        Ok(Self { clauses })
    }

    /// Iterates over the encrypted keys.
    pub fn encrypted_keys(&self) -> impl Iterator<Item = &EncryptedKey> {
        self.clauses.iter().filter_map(|clause| match clause {
            KeyInfoClause::EncryptedKey(key) => Some(key),
            _ => None,
        })
    }
}

/// `xenc:EncryptedKey`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedKey {
    /// The `Id` attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The `Recipient` attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,

    /// Key transport algorithm URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_method: Option<String>,

    /// OAEP digest algorithm URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest_method: Option<String>,

    /// The wrapped key.
    pub cipher_value: Vec<u8>,
}

impl EncryptedKey {
    /// Reads an `xenc:EncryptedKey` element.
    pub fn from_element(element: &XmlElement) -> SamlResult<Self> {
        let method = element.child(XMLENC_NS, "EncryptionMethod");
        Ok(Self {
            id: element.attr("Id").map(str::to_string),
            recipient: element.attr("Recipient").map(str::to_string),
            encryption_method: method.and_then(|m| m.attr("Algorithm")).map(str::to_string),
            digest_method: method
                .and_then(|m| m.child(XMLDSIG_NS, "DigestMethod"))
                .and_then(|d| d.attr("Algorithm"))
                .map(str::to_string),
            cipher_value: cipher_value(element)?,
        })
    }
}

/// An element that wraps `xenc:EncryptedData`: `EncryptedAssertion`,
/// `EncryptedAttribute` or `EncryptedID`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedElement {
    /// The encrypted content. Required by the schema.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_data: Option<EncryptedData>,

    /// `EncryptedKey` siblings of the `EncryptedData`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub encrypted_keys: Vec<EncryptedKey>,
}

impl EncryptedElement {
    /// Reads an encrypted wrapper element.
    pub fn from_element(element: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            encrypted_data: element
                .child(XMLENC_NS, "EncryptedData")
                .map(EncryptedData::from_element)
                .transpose()?,
            encrypted_keys: element
                .children_named(XMLENC_NS, "EncryptedKey")
                .map(EncryptedKey::from_element)
                .collect::<SamlResult<_>>()?,
        })
    }

    /// All encrypted keys, inside `EncryptedData/KeyInfo` first, then siblings.
    pub fn candidate_keys(&self) -> impl Iterator<Item = &EncryptedKey> {
        self.encrypted_data
            .iter()
            .filter_map(|data| data.key_info.as_ref())
            .flat_map(KeyInfo::encrypted_keys)
            .chain(self.encrypted_keys.iter())
    }
}

/// `xenc:EncryptedData`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    /// The `Id` attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The `Type` attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,

    /// Block cipher URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_method: Option<String>,

    /// Key information, usually an `EncryptedKey`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_info: Option<KeyInfo>,

    /// The cipher text.
    pub cipher_value: Vec<u8>,
}

impl EncryptedData {
    /// Reads an `xenc:EncryptedData` element.
    pub fn from_element(element: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            id: element.attr("Id").map(str::to_string),
            data_type: element.attr("Type").map(str::to_string),
            encryption_method: element
                .child(XMLENC_NS, "EncryptionMethod")
                .and_then(|m| m.attr("Algorithm"))
                .map(str::to_string),
            key_info: element
                .child(XMLDSIG_NS, "KeyInfo")
                .map(KeyInfo::from_element)
                .transpose()?,
            cipher_value: cipher_value(element)?,
        })
    }
}

fn cipher_value(element: &XmlElement) -> SamlResult<Vec<u8>> {
    let value = element
        .child(XMLENC_NS, "CipherData")
        .and_then(|data| data.child(XMLENC_NS, "CipherValue"))
        .ok_or_else(|| SamlError::XmlParse(format!("{} has no CipherValue", element.name)))?;
    decode_base64(&value.text)
}

/// Decodes base64 text that may be wrapped over several lines.
pub(crate) fn decode_base64(text: &str) -> SamlResult<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(base64::engine::general_purpose::STANDARD.decode(compact)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_key_info_clauses() {
        let xml = r#"<ds:KeyInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
            <ds:KeyName>idp-2024</ds:KeyName>
            <ds:X509Data><ds:X509Certificate>
                TUlJ
            </ds:X509Certificate></ds:X509Data>
            <ds:KeyValue><ds:RSAKeyValue><ds:Modulus>AQAB</ds:Modulus><ds:Exponent>AQAB</ds:Exponent></ds:RSAKeyValue></ds:KeyValue>
            <ds:Unknown/>
        </ds:KeyInfo>"#;
        let key_info = KeyInfo::from_element(&XmlElement::parse(xml).unwrap()).unwrap();

        assert_eq!(key_info.clauses.len(), 3);
        assert_eq!(key_info.clauses[0], KeyInfoClause::KeyName("idp-2024".to_string()));
        assert_eq!(key_info.clauses[1], KeyInfoClause::X509Data(vec![b"MII".to_vec()]));
        assert!(matches!(key_info.clauses[2], KeyInfoClause::RsaKeyValue { .. }));
    }

    #[test]
    fn reads_encrypted_element() {
        let xml = r#"<saml:EncryptedAssertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion"
                xmlns:xenc="http://www.w3.org/2001/04/xmlenc#" xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
            <xenc:EncryptedData Type="http://www.w3.org/2001/04/xmlenc#Element">
                <xenc:EncryptionMethod Algorithm="http://www.w3.org/2009/xmlenc11#aes128-gcm"/>
                <ds:KeyInfo><xenc:EncryptedKey>
                    <xenc:EncryptionMethod Algorithm="http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p"/>
                    <xenc:CipherData><xenc:CipherValue>AAEC</xenc:CipherValue></xenc:CipherData>
                </xenc:EncryptedKey></ds:KeyInfo>
                <xenc:CipherData><xenc:CipherValue>AwQF</xenc:CipherValue></xenc:CipherData>
            </xenc:EncryptedData>
            <xenc:EncryptedKey>
                <xenc:CipherData><xenc:CipherValue>BgcI</xenc:CipherValue></xenc:CipherData>
            </xenc:EncryptedKey>
        </saml:EncryptedAssertion>"#;
        let encrypted = EncryptedElement::from_element(&XmlElement::parse(xml).unwrap()).unwrap();
        let data = encrypted.encrypted_data.as_ref().unwrap();

        assert_eq!(data.cipher_value, vec![3, 4, 5]);
        assert_eq!(data.data_type.as_deref(), Some(crate::types::XMLENC_ELEMENT_TYPE));
        let keys: Vec<_> = encrypted.candidate_keys().map(|k| k.cipher_value.clone()).collect();
        assert_eq!(keys, vec![vec![0, 1, 2], vec![6, 7, 8]]);
    }

    #[test]
    fn missing_cipher_value_is_an_error() {
        let xml = r#"<xenc:EncryptedKey xmlns:xenc="http://www.w3.org/2001/04/xmlenc#"/>"#;
        assert!(EncryptedKey::from_element(&XmlElement::parse(xml).unwrap()).is_err());
    }
}
