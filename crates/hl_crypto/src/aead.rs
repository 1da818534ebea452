//! Authenticated Encryption with Associated Data
//!
//! Uses AES-256-GCM.
//! Key size: 32 bytes.  IV: 12 bytes (random per call).  Tag: 16 bytes (detached).
//!
//! Compact at-rest format (`Sealed::encode`):
//!   base64( iv (12 bytes) | auth_tag (16 bytes) | ciphertext )

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce, Tag};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// 256-bit symmetric key. Drop clears memory via ZeroizeOnDrop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

/// Fresh key from the OS CSPRNG. Call once per message.
pub fn generate_symmetric_key() -> SymmetricKey {
    SymmetricKey::generate()
}

/// Output of one AEAD seal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; IV_LEN],
    pub auth_tag: [u8; TAG_LEN],
}

impl Sealed {
    pub fn encode(&self) -> String {
        let mut out = Vec::with_capacity(IV_LEN + TAG_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.auth_tag);
        out.extend_from_slice(&self.ciphertext);
        STANDARD.encode(out)
    }

    pub fn decode(b64: &str) -> Result<Self, CryptoError> {
        let raw = STANDARD.decode(b64)?;
        if raw.len() < IV_LEN + TAG_LEN {
            return Err(CryptoError::Integrity);
        }
        let (iv, rest) = raw.split_at(IV_LEN);
        let (tag, ct) = rest.split_at(TAG_LEN);
        let mut sealed = Sealed {
            ciphertext: ct.to_vec(),
            iv: [0u8; IV_LEN],
            auth_tag: [0u8; TAG_LEN],
        };
        sealed.iv.copy_from_slice(iv);
        sealed.auth_tag.copy_from_slice(tag);
        Ok(sealed)
    }
}

/// Encrypt `plaintext` under a 32-byte key with a fresh random IV.
/// `aad` is authenticated but not encrypted.
pub fn encrypt(plaintext: &[u8], key: &[u8], aad: &[u8]) -> Result<Sealed, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| {
        CryptoError::Encryption(format!("key must be {KEY_LEN} bytes, got {}", key.len()))
    })?;

    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&iv), aad, &mut buffer)
        .map_err(|_| CryptoError::Encryption("AES-GCM seal failed".into()))?;

    let mut auth_tag = [0u8; TAG_LEN];
    auth_tag.copy_from_slice(&tag);
    Ok(Sealed {
        ciphertext: buffer,
        iv,
        auth_tag,
    })
}

/// Decrypt and authenticate. Any mismatch yields `Integrity` and no bytes.
pub fn decrypt(
    ciphertext: &[u8],
    key: &[u8],
    iv: &[u8],
    auth_tag: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| {
        CryptoError::InvalidKey(format!("key must be {KEY_LEN} bytes, got {}", key.len()))
    })?;
    if iv.len() != IV_LEN || auth_tag.len() != TAG_LEN {
        return Err(CryptoError::Integrity);
    }

    let mut buffer = Zeroizing::new(ciphertext.to_vec());
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(iv),
            aad,
            &mut buffer,
            Tag::from_slice(auth_tag),
        )
        .map_err(|_| CryptoError::Integrity)?;
    Ok(buffer)
}
