//! SAML 2.0 artifact codec.
//!
//! A type 0x0004 artifact is 44 bytes, base64 encoded for transport:
//!
//! ```text
//! bytes[0..2]   TypeCode        big-endian i16
//! bytes[2..4]   EndpointIndex   big-endian i16
//! bytes[4..24]  SourceID        SHA-1 of the issuer entity ID
//! bytes[24..44] MessageHandle   20 random bytes
//! ```
//!
//! The strict functions return an error on malformed input; the `try_`
//! variants return `None` instead and never fail loudly.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use saml_crypto::{random_array, sha1};
use thiserror::Error;

use crate::error::{FormatError, SamlError};

/// Length of the source ID hash and of the message handle.
pub const FIELD_LEN: usize = 20;

/// Length of a decoded artifact.
pub const ARTIFACT_LEN: usize = 4 + 2 * FIELD_LEN;

/// Type code of SAML 2.0 artifacts.
pub const TYPE_CODE: i16 = 0x0004;

/// Artifact codec errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtifactError {
    /// A caller-supplied buffer has the wrong length.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The artifact itself is malformed.
    #[error(transparent)]
    Format(#[from] FormatError),
}

impl From<ArtifactError> for SamlError {
    fn from(err: ArtifactError) -> Self {
        match err {
            ArtifactError::InvalidArgument(message) => Self::InvalidRequest(message),
            ArtifactError::Format(format) => Self::Format(format),
        }
    }
}

/// Decoded artifact fields.
pub type ArtifactParts = (i16, i16, [u8; FIELD_LEN], [u8; FIELD_LEN]);

/// Encodes the artifact fields.
///
/// `source_id_hash` and `message_handle` must be exactly 20 bytes.
pub fn encode(
    type_code: i16,
    endpoint_index: i16,
    source_id_hash: &[u8],
    message_handle: &[u8],
) -> Result<String, ArtifactError> {
    check_len("source_id_hash", source_id_hash)?;
    check_len("message_handle", message_handle)?;
    Ok(encode_fields(type_code, endpoint_index, source_id_hash, message_handle))
}

/// Lays out the fields; both slices are already known to be 20 bytes.
fn encode_fields(type_code: i16, endpoint_index: i16, source_id_hash: &[u8], message_handle: &[u8]) -> String {
    let mut bytes = Vec::with_capacity(ARTIFACT_LEN);
    bytes.extend_from_slice(&type_code.to_be_bytes());
    bytes.extend_from_slice(&endpoint_index.to_be_bytes());
    bytes.extend_from_slice(source_id_hash);
    bytes.extend_from_slice(message_handle);
    STANDARD.encode(bytes)
}

/// Decodes an artifact.
pub fn decode(artifact: &str) -> Result<ArtifactParts, ArtifactError> {
    let mut source_id_hash = [0u8; FIELD_LEN];
    let mut message_handle = [0u8; FIELD_LEN];
    let (type_code, endpoint_index) =
        decode_into(artifact, &mut source_id_hash, &mut message_handle)?;
    Ok((type_code, endpoint_index, source_id_hash, message_handle))
}

/// Decodes an artifact, returning `None` on any malformed input.
#[must_use]
pub fn try_decode(artifact: &str) -> Option<ArtifactParts> {
    decode(artifact).ok()
}

/// Decodes an artifact into caller buffers and returns the type code and
/// endpoint index.
///
/// Both buffers must be exactly 20 bytes; this is checked before the
/// artifact is looked at.
pub fn decode_into(
    artifact: &str,
    source_id_hash: &mut [u8],
    message_handle: &mut [u8],
) -> Result<(i16, i16), ArtifactError> {
    check_len("source_id_hash", source_id_hash)?;
    check_len("message_handle", message_handle)?;

    if artifact.is_empty() {
        return Err(FormatError::new("Artifact is empty").into());
    }
    let bytes = STANDARD
        .decode(artifact.trim())
        .map_err(|e| FormatError::new(format!("Artifact is not valid base64: {e}")))?;
    if bytes.len() != ARTIFACT_LEN {
        return Err(FormatError::new(format!(
            "Artifact must be {ARTIFACT_LEN} bytes, got {}",
            bytes.len()
        ))
        .into());
    }

    source_id_hash.copy_from_slice(&bytes[4..4 + FIELD_LEN]);
    message_handle.copy_from_slice(&bytes[4 + FIELD_LEN..]);
    Ok((
        i16::from_be_bytes([bytes[0], bytes[1]]),
        i16::from_be_bytes([bytes[2], bytes[3]]),
    ))
}

/// Like [`decode_into`], returning `None` instead of an error.
pub fn try_decode_into(
    artifact: &str,
    source_id_hash: &mut [u8],
    message_handle: &mut [u8],
) -> Option<(i16, i16)> {
    decode_into(artifact, source_id_hash, message_handle).ok()
}

fn check_len(name: &str, buffer: &[u8]) -> Result<(), ArtifactError> {
    if buffer.len() == FIELD_LEN {
        Ok(())
    } else {
        Err(ArtifactError::InvalidArgument(format!(
            "{name} must be {FIELD_LEN} bytes, got {}",
            buffer.len()
        )))
    }
}

/// A type 0x0004 artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Artifact {
    /// Type code.
    pub type_code: i16,
    /// Index of the issuer's artifact resolution endpoint.
    pub endpoint_index: i16,
    /// SHA-1 of the issuer entity ID.
    pub source_id_hash: [u8; FIELD_LEN],
    /// Random handle naming the pending message.
    pub message_handle: [u8; FIELD_LEN],
}

impl Artifact {
    /// Creates an artifact for `source_id` with a fresh random handle.
    #[must_use]
    pub fn new(endpoint_index: i16, source_id: &str) -> Self {
        Self {
            type_code: TYPE_CODE,
            endpoint_index,
            source_id_hash: sha1(source_id.as_bytes()),
            message_handle: random_array::<FIELD_LEN>(),
        }
    }

    /// Returns true if the artifact was issued by `entity_id`.
    #[must_use]
    pub fn source_matches(&self, entity_id: &str) -> bool {
        self.source_id_hash == sha1(entity_id.as_bytes())
    }

    /// Base64 wire form.
    #[must_use]
    pub fn encode(&self) -> String {
        encode_fields(
            self.type_code,
            self.endpoint_index,
            &self.source_id_hash,
            &self.message_handle,
        )
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Artifact {
    type Err = ArtifactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (type_code, endpoint_index, source_id_hash, message_handle) = decode(s)?;
        Ok(Self {
            type_code,
            endpoint_index,
            source_id_hash,
            message_handle,
        })
    }
}
