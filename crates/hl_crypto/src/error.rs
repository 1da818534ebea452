use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("AEAD decryption failed (authentication tag mismatch, possible tampering)")]
    Integrity,

    #[error("Key unwrap failed")]
    Unwrap,

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}
