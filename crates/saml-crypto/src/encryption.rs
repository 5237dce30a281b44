//! XML Encryption primitives.
//!
//! Key transport uses RSA-OAEP through aws-lc-rs. Content encryption uses
//! AES-GCM through aws-lc-rs and AES-CBC through the RustCrypto `cbc` crate,
//! since aws-lc-rs exposes no unpadded CBC mode.
//!
//! Cipher text layouts follow XML-Enc: `IV || ciphertext` for CBC and
//! `nonce || ciphertext || tag` for GCM.

use aws_lc_rs::aead::{AES_128_GCM, AES_256_GCM, Aad, LessSafeKey, Nonce, UnboundKey};
use aws_lc_rs::rsa::{
    OAEP_SHA1_MGF1SHA1, OAEP_SHA256_MGF1SHA256, OaepAlgorithm, OaepPrivateDecryptingKey,
    OaepPublicEncryptingKey, PrivateDecryptingKey, PublicEncryptingKey,
};
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::algorithm::{BlockCipherAlgorithm, KeyTransportAlgorithm};
use crate::error::{CryptoError, CryptoResult};
use crate::keys::pem_to_der;
use crate::random::random_array;

const AES_BLOCK_LEN: usize = 16;
const GCM_NONCE_LEN: usize = 12;
const GCM_TAG_LEN: usize = 16;

fn oaep(algorithm: KeyTransportAlgorithm) -> &'static OaepAlgorithm {
    match algorithm {
        KeyTransportAlgorithm::RsaOaepSha1 => &OAEP_SHA1_MGF1SHA1,
        KeyTransportAlgorithm::RsaOaepSha256 => &OAEP_SHA256_MGF1SHA256,
    }
}

/// RSA private key that unwraps content-encryption keys.
pub struct DecryptionKey {
    key: OaepPrivateDecryptingKey,
}

impl std::fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionKey")
            .field("bits", &self.key.key_size_bits())
            .finish_non_exhaustive()
    }
}

impl DecryptionKey {
    /// Loads a PKCS#8 DER private key.
    pub fn from_pkcs8(der: &[u8]) -> CryptoResult<Self> {
        let private = PrivateDecryptingKey::from_pkcs8(der)
            .map_err(|e| CryptoError::InvalidKey(format!("Invalid RSA PKCS#8 key: {e}")))?;
        let key = OaepPrivateDecryptingKey::new(private)
            .map_err(|e| CryptoError::InvalidKey(format!("RSA key unusable for OAEP: {e}")))?;
        Ok(Self { key })
    }

    /// Loads a `PRIVATE KEY` PEM block.
    pub fn from_pem(pem: &str) -> CryptoResult<Self> {
        let der = pem_to_der(pem, "PRIVATE KEY")
            .ok_or_else(|| CryptoError::InvalidKey("Invalid private key PEM".to_string()))?;
        Self::from_pkcs8(&der)
    }

    /// Unwraps a transported content-encryption key.
    pub fn unwrap_key(
        &self,
        algorithm: KeyTransportAlgorithm,
        wrapped: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        let mut plaintext = vec![0u8; self.key.min_output_size()];
        let unwrapped = self
            .key
            .decrypt(oaep(algorithm), wrapped, &mut plaintext, None)
            .map_err(|e| CryptoError::Decryption(format!("RSA-OAEP unwrap failed: {e}")))?;
        Ok(unwrapped.to_vec())
    }
}

/// RSA public key that wraps content-encryption keys for a recipient.
pub struct EncryptionKey {
    key: OaepPublicEncryptingKey,
}

impl EncryptionKey {
    /// Loads an X.509 `SubjectPublicKeyInfo` DER key.
    pub fn from_spki_der(der: &[u8]) -> CryptoResult<Self> {
        let public = PublicEncryptingKey::from_der(der)
            .map_err(|e| CryptoError::InvalidKey(format!("Invalid RSA public key: {e}")))?;
        let key = OaepPublicEncryptingKey::new(public)
            .map_err(|e| CryptoError::InvalidKey(format!("RSA key unusable for OAEP: {e}")))?;
        Ok(Self { key })
    }

    /// Wraps a content-encryption key.
    pub fn wrap_key(&self, algorithm: KeyTransportAlgorithm, key: &[u8]) -> CryptoResult<Vec<u8>> {
        let mut ciphertext = vec![0u8; self.key.ciphertext_size()];
        let wrapped = self
            .key
            .encrypt(oaep(algorithm), key, &mut ciphertext, None)
            .map_err(|e| CryptoError::Encryption(format!("RSA-OAEP wrap failed: {e}")))?;
        Ok(wrapped.to_vec())
    }
}

/// Decrypts `EncryptedData` cipher text.
pub fn decrypt_content(
    algorithm: BlockCipherAlgorithm,
    key: &[u8],
    data: &[u8],
) -> CryptoResult<Vec<u8>> {
    check_key_len(algorithm, key)?;
    if algorithm.is_gcm() {
        gcm_decrypt(algorithm, key, data)
    } else {
        cbc_decrypt(algorithm, key, data)
    }
}

/// Encrypts content for an `EncryptedData` element with a fresh IV or nonce.
pub fn encrypt_content(
    algorithm: BlockCipherAlgorithm,
    key: &[u8],
    plaintext: &[u8],
) -> CryptoResult<Vec<u8>> {
    check_key_len(algorithm, key)?;
    if algorithm.is_gcm() {
        gcm_encrypt(algorithm, key, plaintext)
    } else {
        cbc_encrypt(algorithm, key, plaintext)
    }
}

fn check_key_len(algorithm: BlockCipherAlgorithm, key: &[u8]) -> CryptoResult<()> {
    if key.len() == algorithm.key_len() {
        Ok(())
    } else {
        Err(CryptoError::InvalidKey(format!(
            "expected {} byte key, got {}",
            algorithm.key_len(),
            key.len()
        )))
    }
}

fn gcm_key(algorithm: BlockCipherAlgorithm, key: &[u8]) -> CryptoResult<LessSafeKey> {
    let aead = match algorithm {
        BlockCipherAlgorithm::Aes128Gcm => &AES_128_GCM,
        BlockCipherAlgorithm::Aes256Gcm => &AES_256_GCM,
        _ => {
            return Err(CryptoError::UnsupportedAlgorithm(
                algorithm.uri().to_string(),
            ));
        }
    };
    let unbound = UnboundKey::new(aead, key)
        .map_err(|e| CryptoError::InvalidKey(format!("AES-GCM key: {e}")))?;
    Ok(LessSafeKey::new(unbound))
}

fn gcm_decrypt(algorithm: BlockCipherAlgorithm, key: &[u8], data: &[u8]) -> CryptoResult<Vec<u8>> {
    if data.len() < GCM_NONCE_LEN + GCM_TAG_LEN {
        return Err(CryptoError::Decryption("AES-GCM data too short".to_string()));
    }
    let key = gcm_key(algorithm, key)?;
    let nonce = Nonce::try_assume_unique_for_key(&data[..GCM_NONCE_LEN])
        .map_err(|e| CryptoError::Decryption(format!("AES-GCM nonce: {e}")))?;

    let mut buf = data[GCM_NONCE_LEN..].to_vec();
    let plaintext = key
        .open_in_place(nonce, Aad::empty(), &mut buf)
        .map_err(|_| CryptoError::Decryption("AES-GCM authentication failed".to_string()))?;
    Ok(plaintext.to_vec())
}

fn gcm_encrypt(
    algorithm: BlockCipherAlgorithm,
    key: &[u8],
    plaintext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let key = gcm_key(algorithm, key)?;
    let nonce_bytes = random_array::<GCM_NONCE_LEN>();
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let mut buf = plaintext.to_vec();
    key.seal_in_place_append_tag(nonce, Aad::empty(), &mut buf)
        .map_err(|e| CryptoError::Encryption(format!("AES-GCM seal: {e}")))?;

    let mut out = Vec::with_capacity(GCM_NONCE_LEN + buf.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&buf);
    Ok(out)
}

fn cbc_decrypt(algorithm: BlockCipherAlgorithm, key: &[u8], data: &[u8]) -> CryptoResult<Vec<u8>> {
    if data.len() < 2 * AES_BLOCK_LEN || data.len() % AES_BLOCK_LEN != 0 {
        return Err(CryptoError::Decryption(
            "AES-CBC data invalid length".to_string(),
        ));
    }
    let (iv, ciphertext) = data.split_at(AES_BLOCK_LEN);
    let mut buf = ciphertext.to_vec();

    macro_rules! do_decrypt {
        ($aes:ty) => {{
            cbc::Decryptor::<$aes>::new_from_slices(key, iv)
                .map_err(|e| CryptoError::InvalidKey(format!("AES-CBC init: {e}")))?
                .decrypt_padded_mut::<NoPadding>(&mut buf)
                .map_err(|e| CryptoError::Decryption(format!("AES-CBC decrypt: {e}")))?;
        }};
    }

    match algorithm {
        BlockCipherAlgorithm::Aes128Cbc => do_decrypt!(aes::Aes128),
        BlockCipherAlgorithm::Aes192Cbc => do_decrypt!(aes::Aes192),
        BlockCipherAlgorithm::Aes256Cbc => do_decrypt!(aes::Aes256),
        _ => {
            return Err(CryptoError::UnsupportedAlgorithm(
                algorithm.uri().to_string(),
            ));
        }
    }

    xmlenc_unpad(buf)
}

fn cbc_encrypt(
    algorithm: BlockCipherAlgorithm,
    key: &[u8],
    plaintext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let iv = random_array::<AES_BLOCK_LEN>();
    let mut buf = xmlenc_pad(plaintext);
    let len = buf.len();

    macro_rules! do_encrypt {
        ($aes:ty) => {{
            cbc::Encryptor::<$aes>::new_from_slices(key, &iv)
                .map_err(|e| CryptoError::InvalidKey(format!("AES-CBC init: {e}")))?
                .encrypt_padded_mut::<NoPadding>(&mut buf, len)
                .map_err(|e| CryptoError::Encryption(format!("AES-CBC encrypt: {e}")))?;
        }};
    }

    match algorithm {
        BlockCipherAlgorithm::Aes128Cbc => do_encrypt!(aes::Aes128),
        BlockCipherAlgorithm::Aes192Cbc => do_encrypt!(aes::Aes192),
        BlockCipherAlgorithm::Aes256Cbc => do_encrypt!(aes::Aes256),
        _ => {
            return Err(CryptoError::UnsupportedAlgorithm(
                algorithm.uri().to_string(),
            ));
        }
    }

    let mut out = Vec::with_capacity(AES_BLOCK_LEN + buf.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&buf);
    Ok(out)
}

/// Pads to the block size; the last byte holds the padding length.
fn xmlenc_pad(data: &[u8]) -> Vec<u8> {
    let pad_len = AES_BLOCK_LEN - (data.len() % AES_BLOCK_LEN);
    let mut padded = Vec::with_capacity(data.len() + pad_len);
    padded.extend_from_slice(data);
    // pad_len is in 1..=16
    padded.extend(std::iter::repeat_n(pad_len as u8, pad_len));
    padded
}

/// Removes XML-Enc padding. Only the last byte is inspected, which accepts
/// both PKCS#7 and ISO 10126 filler.
fn xmlenc_unpad(mut data: Vec<u8>) -> CryptoResult<Vec<u8>> {
    let pad_len = data.last().map_or(0, |b| usize::from(*b));
    if pad_len == 0 || pad_len > AES_BLOCK_LEN || pad_len > data.len() {
        return Err(CryptoError::Decryption("invalid padding".to_string()));
    }
    data.truncate(data.len() - pad_len);
    Ok(data)
}
