//! Error type for cryptographic operations.

use thiserror::Error;

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Error type for cryptographic operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// The signature does not verify with the given key.
    #[error("signature verification failed")]
    Verification,

    /// Invalid key material.
    #[error("invalid key format: {0}")]
    InvalidKey(String),

    /// Algorithm not supported.
    #[error("algorithm not supported: {0}")]
    UnsupportedAlgorithm(String),

    /// Decryption or key unwrapping failed.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Encryption or key wrapping failed.
    #[error("encryption failed: {0}")]
    Encryption(String),
}
