//! Public verification keys and private signing keys.

use aws_lc_rs::rand::SystemRandom;
use aws_lc_rs::signature::{self, RsaKeyPair, RsaPublicKeyComponents, UnparsedPublicKey};
use base64::Engine;

use crate::algorithm::SignatureAlgorithm;
use crate::error::{CryptoError, CryptoResult};
use crate::hash::sha256;

/// A public key able to verify signatures.
///
/// Keys come from metadata: either an X.509 certificate or a bare
/// `RSAKeyValue`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    /// RSA key as a DER encoded PKCS#1 `RSAPublicKey`.
    Rsa {
        /// DER bytes.
        der: Vec<u8>,
    },
    /// RSA key as raw big-endian modulus and exponent.
    RsaComponents {
        /// Modulus.
        modulus: Vec<u8>,
        /// Public exponent.
        exponent: Vec<u8>,
    },
    /// Elliptic curve key as an uncompressed SEC1 point.
    Ec {
        /// Point bytes.
        point: Vec<u8>,
    },
}

impl PublicKey {
    /// Verifies `sig` over `data`.
    pub fn verify(&self, algorithm: SignatureAlgorithm, data: &[u8], sig: &[u8]) -> CryptoResult<()> {
        match self {
            Self::Rsa { der } => {
                let params = rsa_parameters(algorithm)?;
                UnparsedPublicKey::new(params, der)
                    .verify(data, sig)
                    .map_err(|_| CryptoError::Verification)
            }
            Self::RsaComponents { modulus, exponent } => {
                let params = rsa_parameters(algorithm)?;
                let components = RsaPublicKeyComponents {
                    n: strip_leading_zeros(modulus),
                    e: strip_leading_zeros(exponent),
                };
                components
                    .verify(params, data, sig)
                    .map_err(|_| CryptoError::Verification)
            }
            Self::Ec { point } => {
                let params = ecdsa_parameters(algorithm, point.len())?;
                UnparsedPublicKey::new(params, point)
                    .verify(data, sig)
                    .map_err(|_| CryptoError::Verification)
            }
        }
    }

    /// Short hex fingerprint of the key material, for log output.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let material = match self {
            Self::Rsa { der } => sha256(der),
            Self::RsaComponents { modulus, .. } => sha256(strip_leading_zeros(modulus)),
            Self::Ec { point } => sha256(point),
        };
        material.iter().take(8).map(|b| format!("{b:02x}")).collect()
    }
}

fn rsa_parameters(algorithm: SignatureAlgorithm) -> CryptoResult<&'static signature::RsaParameters> {
    match algorithm {
        SignatureAlgorithm::RsaSha1 => Ok(&signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY),
        SignatureAlgorithm::RsaSha256 => Ok(&signature::RSA_PKCS1_2048_8192_SHA256),
        SignatureAlgorithm::RsaSha384 => Ok(&signature::RSA_PKCS1_2048_8192_SHA384),
        SignatureAlgorithm::RsaSha512 => Ok(&signature::RSA_PKCS1_2048_8192_SHA512),
        _ => Err(CryptoError::UnsupportedAlgorithm(format!(
            "{} with an RSA key",
            algorithm.uri()
        ))),
    }
}

fn ecdsa_parameters(
    algorithm: SignatureAlgorithm,
    point_len: usize,
) -> CryptoResult<&'static signature::EcdsaVerificationAlgorithm> {
    // Uncompressed points: 0x04 || X || Y.
    match (algorithm, point_len) {
        (SignatureAlgorithm::EcdsaSha256, 65) => Ok(&signature::ECDSA_P256_SHA256_FIXED),
        (SignatureAlgorithm::EcdsaSha384, 97) => Ok(&signature::ECDSA_P384_SHA384_FIXED),
        (SignatureAlgorithm::EcdsaSha512, 133) => Ok(&signature::ECDSA_P521_SHA512_FIXED),
        _ => Err(CryptoError::UnsupportedAlgorithm(format!(
            "{} with a {point_len} byte EC point",
            algorithm.uri()
        ))),
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

/// RSA private key used to sign outbound messages.
pub struct SigningKey {
    key_pair: RsaKeyPair,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("modulus_len", &self.key_pair.public_modulus_len())
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Loads a key from PKCS#8 or PKCS#1 DER.
    pub fn from_der(der: &[u8]) -> CryptoResult<Self> {
        let key_pair = RsaKeyPair::from_pkcs8(der)
            .or_else(|_| RsaKeyPair::from_der(der))
            .map_err(|e| CryptoError::InvalidKey(format!("Invalid RSA key: {e}")))?;
        Ok(Self { key_pair })
    }

    /// Loads a key from a `PRIVATE KEY` or `RSA PRIVATE KEY` PEM block.
    pub fn from_pem(pem: &str) -> CryptoResult<Self> {
        let der = pem_to_der(pem, "PRIVATE KEY")
            .or_else(|| pem_to_der(pem, "RSA PRIVATE KEY"))
            .ok_or_else(|| CryptoError::InvalidKey("Invalid private key PEM".to_string()))?;
        Self::from_der(&der)
    }

    /// Signs `data`.
    pub fn sign(&self, algorithm: SignatureAlgorithm, data: &[u8]) -> CryptoResult<Vec<u8>> {
        let padding: &'static dyn signature::RsaEncoding = match algorithm {
            SignatureAlgorithm::RsaSha256 => &signature::RSA_PKCS1_SHA256,
            SignatureAlgorithm::RsaSha384 => &signature::RSA_PKCS1_SHA384,
            SignatureAlgorithm::RsaSha512 => &signature::RSA_PKCS1_SHA512,
            _ => {
                return Err(CryptoError::UnsupportedAlgorithm(format!(
                    "{} not supported for RSA signing",
                    algorithm.uri()
                )));
            }
        };

        let rng = SystemRandom::new();
        let mut sig = vec![0u8; self.key_pair.public_modulus_len()];
        self.key_pair
            .sign(padding, &rng, data, &mut sig)
            .map_err(|e| CryptoError::Signing(format!("RSA signing failed: {e}")))?;
        Ok(sig)
    }

    /// Returns the matching public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        use aws_lc_rs::signature::KeyPair;

        PublicKey::Rsa {
            der: self.key_pair.public_key().as_ref().to_vec(),
        }
    }
}

/// Extracts the DER payload of the first PEM block with the given label.
#[must_use]
pub fn pem_to_der(pem: &str, label: &str) -> Option<Vec<u8>> {
    let begin = format!("-----BEGIN {label}-----");
    let end = format!("-----END {label}-----");

    let start = pem.find(&begin)? + begin.len();
    let end_pos = start + pem[start..].find(&end)?;

    let b64_data: String = pem[start..end_pos]
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    base64::engine::general_purpose::STANDARD.decode(b64_data).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_lc_rs::rsa::KeySize;

    fn generated_key() -> SigningKey {
        SigningKey {
            key_pair: RsaKeyPair::generate(KeySize::Rsa2048).unwrap(),
        }
    }

    #[test]
    fn sign_and_verify() {
        let key = generated_key();
        let sig = key.sign(SignatureAlgorithm::RsaSha256, b"payload").unwrap();
        let public = key.public_key();

        assert!(public.verify(SignatureAlgorithm::RsaSha256, b"payload", &sig).is_ok());
        assert_eq!(
            public.verify(SignatureAlgorithm::RsaSha256, b"tampered", &sig),
            Err(CryptoError::Verification)
        );
        assert_eq!(
            public.verify(SignatureAlgorithm::RsaSha512, b"payload", &sig),
            Err(CryptoError::Verification)
        );
    }

    #[test]
    fn sha1_signing_refused() {
        let key = generated_key();
        assert!(matches!(
            key.sign(SignatureAlgorithm::RsaSha1, b"payload"),
            Err(CryptoError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn rsa_key_with_ecdsa_algorithm_is_unsupported() {
        let key = generated_key();
        let public = key.public_key();
        assert!(matches!(
            public.verify(SignatureAlgorithm::EcdsaSha256, b"x", b"y"),
            Err(CryptoError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn ec_point_length_selects_curve() {
        let key = PublicKey::Ec {
            point: vec![4u8; 80],
        };
        assert!(matches!(
            key.verify(SignatureAlgorithm::EcdsaSha256, b"x", b"y"),
            Err(CryptoError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn leading_zeros_stripped() {
        assert_eq!(strip_leading_zeros(&[0, 0, 1, 0]), &[1, 0]);
        assert!(strip_leading_zeros(&[0, 0]).is_empty());
    }

    #[test]
    fn pem_extraction() {
        let pem = "-----BEGIN CERTIFICATE-----\nTUlJ\n-----END CERTIFICATE-----";
        assert_eq!(pem_to_der(pem, "CERTIFICATE"), Some(b"MII".to_vec()));
        assert_eq!(pem_to_der(pem, "PRIVATE KEY"), None);
    }

    #[test]
    fn invalid_pem_rejected() {
        assert!(matches!(
            SigningKey::from_pem("not a key"),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn fingerprint_is_stable() {
        let key = generated_key().public_key();
        assert_eq!(key.fingerprint(), key.fingerprint());
        assert_eq!(key.fingerprint().len(), 16);
    }
}
