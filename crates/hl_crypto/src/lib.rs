//! hl_crypto — Hushline cryptographic primitives
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - One fresh symmetric key and one fresh IV per message, never reused.
//! - Decryption fails closed: no partial plaintext ever leaves this crate.
//!
//! # Module layout
//! - `keys`    — RSA identity keypairs, PEM interchange, fingerprints
//! - `aead`    — AES-256-GCM with detached tag
//! - `wrap`    — RSA-OAEP(SHA-256) key wrapping
//! - `sign`    — RSASSA-PKCS1-v1_5(SHA-256) signatures
//! - `hybrid`  — per-message key + AEAD body + wrapped key
//! - `kdf`     — Argon2id vault key derivation
//! - `error`   — unified error type

pub mod aead;
pub mod error;
pub mod hybrid;
pub mod kdf;
pub mod keys;
pub mod sign;
pub mod wrap;

pub use aead::{
    decrypt as decrypt_symmetric, encrypt as encrypt_symmetric, generate_symmetric_key, Sealed,
    SymmetricKey,
};
pub use error::CryptoError;
pub use hybrid::{decrypt as hybrid_decrypt, encrypt as hybrid_encrypt, HybridCiphertext};
pub use keys::{generate_identity_key_pair, IdentityKeyPair, PrivateIdentityKey, PublicIdentityKey};
pub use sign::{sign, verify};
pub use wrap::{decrypt as decrypt_asymmetric, encrypt as encrypt_asymmetric};

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::OnceLock;

    use crate::keys::IdentityKeyPair;

    static ALICE: OnceLock<IdentityKeyPair> = OnceLock::new();
    static BOB: OnceLock<IdentityKeyPair> = OnceLock::new();

    pub fn alice() -> &'static IdentityKeyPair {
        ALICE.get_or_init(|| IdentityKeyPair::generate(2048).unwrap())
    }

    pub fn bob() -> &'static IdentityKeyPair {
        BOB.get_or_init(|| IdentityKeyPair::generate(2048).unwrap())
    }
}
