//! Algorithm identifiers.
//!
//! Every algorithm maps to exactly one URI from XML-DSig, XML-DSig-more or
//! XML-Enc (1.0 and 1.1). Lookups by URI are exact string matches.

use crate::error::{CryptoError, CryptoResult};

/// Digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    /// SHA-1 (legacy, verification only).
    Sha1,
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl DigestAlgorithm {
    /// Returns the XML-DSig/XML-Enc URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::Sha1 => "http://www.w3.org/2000/09/xmldsig#sha1",
            Self::Sha256 => "http://www.w3.org/2001/04/xmlenc#sha256",
            Self::Sha384 => "http://www.w3.org/2001/04/xmldsig-more#sha384",
            Self::Sha512 => "http://www.w3.org/2001/04/xmlenc#sha512",
        }
    }

    /// Parses a digest URI.
    pub fn from_uri(uri: &str) -> CryptoResult<Self> {
        match uri {
            "http://www.w3.org/2000/09/xmldsig#sha1" => Ok(Self::Sha1),
            "http://www.w3.org/2001/04/xmlenc#sha256" => Ok(Self::Sha256),
            "http://www.w3.org/2001/04/xmldsig-more#sha384" => Ok(Self::Sha384),
            "http://www.w3.org/2001/04/xmlenc#sha512" => Ok(Self::Sha512),
            _ => Err(CryptoError::UnsupportedAlgorithm(format!("digest: {uri}"))),
        }
    }

    /// Returns the output length in bytes.
    #[must_use]
    pub const fn output_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

/// Signature algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SignatureAlgorithm {
    /// RSA PKCS#1 v1.5 with SHA-1 (legacy, verification only).
    RsaSha1,
    /// RSA PKCS#1 v1.5 with SHA-256.
    #[default]
    RsaSha256,
    /// RSA PKCS#1 v1.5 with SHA-384.
    RsaSha384,
    /// RSA PKCS#1 v1.5 with SHA-512.
    RsaSha512,
    /// ECDSA with SHA-256.
    EcdsaSha256,
    /// ECDSA with SHA-384.
    EcdsaSha384,
    /// ECDSA with SHA-512.
    EcdsaSha512,
}

impl SignatureAlgorithm {
    /// Returns the XML-DSig URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::RsaSha1 => "http://www.w3.org/2000/09/xmldsig#rsa-sha1",
            Self::RsaSha256 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
            Self::RsaSha384 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384",
            Self::RsaSha512 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512",
            Self::EcdsaSha256 => "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256",
            Self::EcdsaSha384 => "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha384",
            Self::EcdsaSha512 => "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha512",
        }
    }

    /// Parses a signature algorithm URI.
    pub fn from_uri(uri: &str) -> CryptoResult<Self> {
        [
            Self::RsaSha1,
            Self::RsaSha256,
            Self::RsaSha384,
            Self::RsaSha512,
            Self::EcdsaSha256,
            Self::EcdsaSha384,
            Self::EcdsaSha512,
        ]
        .into_iter()
        .find(|alg| alg.uri() == uri)
        .ok_or_else(|| CryptoError::UnsupportedAlgorithm(format!("signature: {uri}")))
    }

    /// Returns the digest used by this algorithm.
    #[must_use]
    pub const fn digest(self) -> DigestAlgorithm {
        match self {
            Self::RsaSha1 => DigestAlgorithm::Sha1,
            Self::RsaSha256 | Self::EcdsaSha256 => DigestAlgorithm::Sha256,
            Self::RsaSha384 | Self::EcdsaSha384 => DigestAlgorithm::Sha384,
            Self::RsaSha512 | Self::EcdsaSha512 => DigestAlgorithm::Sha512,
        }
    }

    /// Returns whether this is an RSA algorithm.
    #[must_use]
    pub const fn is_rsa(self) -> bool {
        matches!(
            self,
            Self::RsaSha1 | Self::RsaSha256 | Self::RsaSha384 | Self::RsaSha512
        )
    }

    /// Returns whether this is an ECDSA algorithm.
    #[must_use]
    pub const fn is_ecdsa(self) -> bool {
        !self.is_rsa()
    }

    /// Returns whether the algorithm is deprecated and must not be used for signing.
    #[must_use]
    pub const fn is_deprecated(self) -> bool {
        matches!(self, Self::RsaSha1)
    }
}

/// Key transport algorithms for `EncryptedKey`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyTransportAlgorithm {
    /// RSA-OAEP with SHA-1 digest and MGF1 with SHA-1.
    RsaOaepSha1,
    /// RSA-OAEP (XML-Enc 1.1) with SHA-256 digest and MGF1 with SHA-256.
    RsaOaepSha256,
}

/// XML-Enc 1.0 RSA-OAEP URI. The MGF is fixed to MGF1 with SHA-1.
pub const RSA_OAEP_MGF1P: &str = "http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p";

/// XML-Enc 1.1 RSA-OAEP URI. The digest comes from `DigestMethod`.
pub const RSA_OAEP_ENC11: &str = "http://www.w3.org/2009/xmlenc11#rsa-oaep";

impl KeyTransportAlgorithm {
    /// Returns the XML-Enc URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::RsaOaepSha1 => RSA_OAEP_MGF1P,
            Self::RsaOaepSha256 => RSA_OAEP_ENC11,
        }
    }

    /// Resolves the algorithm from its URI and an optional `DigestMethod` URI.
    pub fn from_uri(uri: &str, digest_uri: Option<&str>) -> CryptoResult<Self> {
        let digest = digest_uri
            .map(DigestAlgorithm::from_uri)
            .transpose()?
            .unwrap_or(DigestAlgorithm::Sha1);

        match (uri, digest) {
            (RSA_OAEP_MGF1P | RSA_OAEP_ENC11, DigestAlgorithm::Sha1) => Ok(Self::RsaOaepSha1),
            (RSA_OAEP_ENC11, DigestAlgorithm::Sha256) => Ok(Self::RsaOaepSha256),
            _ => Err(CryptoError::UnsupportedAlgorithm(format!(
                "key transport: {uri} with {digest:?}"
            ))),
        }
    }
}

/// Block encryption algorithms for `EncryptedData`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockCipherAlgorithm {
    /// AES-128 in CBC mode.
    Aes128Cbc,
    /// AES-192 in CBC mode.
    Aes192Cbc,
    /// AES-256 in CBC mode.
    Aes256Cbc,
    /// AES-128 in GCM mode.
    Aes128Gcm,
    /// AES-256 in GCM mode.
    Aes256Gcm,
}

impl BlockCipherAlgorithm {
    /// Returns the XML-Enc URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::Aes128Cbc => "http://www.w3.org/2001/04/xmlenc#aes128-cbc",
            Self::Aes192Cbc => "http://www.w3.org/2001/04/xmlenc#aes192-cbc",
            Self::Aes256Cbc => "http://www.w3.org/2001/04/xmlenc#aes256-cbc",
            Self::Aes128Gcm => "http://www.w3.org/2009/xmlenc11#aes128-gcm",
            Self::Aes256Gcm => "http://www.w3.org/2009/xmlenc11#aes256-gcm",
        }
    }

    /// Parses a block encryption URI.
    pub fn from_uri(uri: &str) -> CryptoResult<Self> {
        [
            Self::Aes128Cbc,
            Self::Aes192Cbc,
            Self::Aes256Cbc,
            Self::Aes128Gcm,
            Self::Aes256Gcm,
        ]
        .into_iter()
        .find(|alg| alg.uri() == uri)
        .ok_or_else(|| CryptoError::UnsupportedAlgorithm(format!("cipher: {uri}")))
    }

    /// Returns the key length in bytes.
    #[must_use]
    pub const fn key_len(self) -> usize {
        match self {
            Self::Aes128Cbc | Self::Aes128Gcm => 16,
            Self::Aes192Cbc => 24,
            Self::Aes256Cbc | Self::Aes256Gcm => 32,
        }
    }

    /// Returns whether this is an authenticated (GCM) mode.
    #[must_use]
    pub const fn is_gcm(self) -> bool {
        matches!(self, Self::Aes128Gcm | Self::Aes256Gcm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_uri_lookup() {
        for alg in [
            SignatureAlgorithm::RsaSha1,
            SignatureAlgorithm::RsaSha256,
            SignatureAlgorithm::RsaSha512,
            SignatureAlgorithm::EcdsaSha384,
        ] {
            assert_eq!(SignatureAlgorithm::from_uri(alg.uri()).unwrap(), alg);
        }
        assert!(SignatureAlgorithm::from_uri("http://example.com/alg").is_err());
    }

    #[test]
    fn signature_properties() {
        assert!(SignatureAlgorithm::RsaSha1.is_deprecated());
        assert!(!SignatureAlgorithm::RsaSha256.is_deprecated());
        assert!(SignatureAlgorithm::EcdsaSha256.is_ecdsa());
        assert_eq!(
            SignatureAlgorithm::RsaSha384.digest(),
            DigestAlgorithm::Sha384
        );
    }

    #[test]
    fn key_transport_defaults_to_sha1() {
        assert_eq!(
            KeyTransportAlgorithm::from_uri(RSA_OAEP_MGF1P, None).unwrap(),
            KeyTransportAlgorithm::RsaOaepSha1
        );
        assert_eq!(
            KeyTransportAlgorithm::from_uri(
                RSA_OAEP_ENC11,
                Some("http://www.w3.org/2001/04/xmlenc#sha256")
            )
            .unwrap(),
            KeyTransportAlgorithm::RsaOaepSha256
        );
        assert!(
            KeyTransportAlgorithm::from_uri(
                RSA_OAEP_MGF1P,
                Some("http://www.w3.org/2001/04/xmlenc#sha256")
            )
            .is_err()
        );
    }

    #[test]
    fn cipher_key_lengths() {
        assert_eq!(
            BlockCipherAlgorithm::from_uri("http://www.w3.org/2001/04/xmlenc#aes256-cbc")
                .unwrap()
                .key_len(),
            32
        );
        assert!(BlockCipherAlgorithm::Aes128Gcm.is_gcm());
        assert!(!BlockCipherAlgorithm::Aes192Cbc.is_gcm());
    }
}
