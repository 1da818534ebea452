//! Hybrid encryption: the sole encryption path for message bodies.
//!
//! encrypt: fresh SymmetricKey -> AES-256-GCM(body, aad) -> RSA-OAEP(key)
//! decrypt: RSA-OAEP unwrap -> AES-256-GCM open
//!
//! `aad` carries the routing header so the body cannot be replayed under a
//! different sender/receiver/chat.

use zeroize::Zeroizing;

use crate::aead::{self, SymmetricKey, IV_LEN, KEY_LEN, TAG_LEN};
use crate::error::CryptoError;
use crate::keys::{PrivateIdentityKey, PublicIdentityKey};
use crate::wrap;

/// Envelope fragment produced by one hybrid seal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HybridCiphertext {
    pub ciphertext: Vec<u8>,
    pub wrapped_key: Vec<u8>,
    pub iv: [u8; IV_LEN],
    pub auth_tag: [u8; TAG_LEN],
}

pub fn encrypt(
    message: &[u8],
    receiver: &PublicIdentityKey,
    aad: &[u8],
) -> Result<HybridCiphertext, CryptoError> {
    let key = SymmetricKey::generate();
    let sealed = aead::encrypt(message, key.as_bytes(), aad)?;
    let wrapped_key = wrap::encrypt(key.as_bytes(), receiver)?;
    Ok(HybridCiphertext {
        ciphertext: sealed.ciphertext,
        wrapped_key,
        iv: sealed.iv,
        auth_tag: sealed.auth_tag,
    })
}

/// Unwrap then open. `Unwrap` and `Integrity` propagate untouched.
pub fn decrypt(
    ciphertext: &[u8],
    wrapped_key: &[u8],
    iv: &[u8],
    auth_tag: &[u8],
    receiver: &PrivateIdentityKey,
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let key = wrap::decrypt(wrapped_key, receiver)?;
    if key.len() != KEY_LEN {
        return Err(CryptoError::Unwrap);
    }
    aead::decrypt(ciphertext, &key, iv, auth_tag, aad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{alice, bob};

    fn open(ct: &HybridCiphertext, key: &PrivateIdentityKey, aad: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        decrypt(&ct.ciphertext, &ct.wrapped_key, &ct.iv, &ct.auth_tag, key, aad)
    }

    #[test]
    fn roundtrip() {
        let msg = "This is a secret message! ✓".as_bytes();
        let ct = encrypt(msg, &bob().public, b"").unwrap();
        assert_eq!(open(&ct, bob().private(), b"").unwrap().as_slice(), msg);
    }

    #[test]
    fn roundtrip_large_body() {
        let msg = vec![0x42u8; 64 * 1024];
        let ct = encrypt(&msg, &bob().public, b"hdr").unwrap();
        assert_eq!(open(&ct, bob().private(), b"hdr").unwrap().as_slice(), msg.as_slice());
    }

    #[test]
    fn same_message_twice_is_fresh() {
        let a = encrypt(b"hello", &bob().public, b"").unwrap();
        let b = encrypt(b"hello", &bob().public, b"").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
        assert_ne!(a.wrapped_key, b.wrapped_key);
    }

    #[test]
    fn wrong_recipient_is_unwrap_error() {
        let ct = encrypt(b"for bob", &bob().public, b"").unwrap();
        assert!(matches!(open(&ct, alice().private(), b""), Err(CryptoError::Unwrap)));
    }

    #[test]
    fn tampered_body_is_integrity_error() {
        let mut ct = encrypt(b"for bob", &bob().public, b"").unwrap();
        ct.ciphertext[0] ^= 0x80;
        assert!(matches!(open(&ct, bob().private(), b""), Err(CryptoError::Integrity)));
    }

    #[test]
    fn swapped_routing_header_is_integrity_error() {
        let ct = encrypt(b"for bob", &bob().public, b"alice|bob").unwrap();
        assert!(matches!(open(&ct, bob().private(), b"mallory|bob"), Err(CryptoError::Integrity)));
    }
}
