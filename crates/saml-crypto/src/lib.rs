//! # saml-crypto
//!
//! Cryptographic primitives used by SAML 2.0 message processing, built on
//! aws-lc-rs.
//!
//! ## Algorithms
//!
//! Algorithms are identified by their XML-DSig and XML-Enc URIs:
//!
//! - Digests: SHA-1 (verification only), SHA-256, SHA-384, SHA-512
//! - Signatures: RSA PKCS#1 v1.5 and ECDSA
//! - Key transport: RSA-OAEP
//! - Content encryption: AES-CBC and AES-GCM
//!
//! SHA-1 based signatures are accepted for verification because deployed
//! identity providers still emit them. They are never produced.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod algorithm;
pub mod encryption;
pub mod error;
pub mod hash;
pub mod keys;
pub mod random;

pub use algorithm::{
    BlockCipherAlgorithm, DigestAlgorithm, KeyTransportAlgorithm, SignatureAlgorithm,
};
pub use encryption::{DecryptionKey, EncryptionKey, decrypt_content, encrypt_content};
pub use error::{CryptoError, CryptoResult};
pub use hash::{digest, sha1, sha256, sha384, sha512};
pub use keys::{PublicKey, SigningKey, pem_to_der};
pub use random::{random_array, random_bytes};
