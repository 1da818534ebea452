//! Asymmetric key wrapping: RSA-OAEP with SHA-256.
//!
//! Only ever used to transport a per-message symmetric key. Capacity is
//! `k - 2*hLen - 2` bytes (190 bytes for 2048-bit, 446 for 4096-bit keys),
//! far below typical message sizes.

use rand::rngs::OsRng;
use rsa::Oaep;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::keys::{PrivateIdentityKey, PublicIdentityKey};

const HASH_LEN: usize = 32;

/// Largest input `encrypt` accepts for this key.
pub fn max_input_len(public: &PublicIdentityKey) -> usize {
    public.modulus_bytes().saturating_sub(2 * HASH_LEN + 2)
}

pub fn encrypt(data: &[u8], public: &PublicIdentityKey) -> Result<Vec<u8>, CryptoError> {
    let limit = max_input_len(public);
    if data.len() > limit {
        return Err(CryptoError::Encryption(format!(
            "wrap input is {} bytes, key allows at most {limit}",
            data.len()
        )));
    }
    public
        .inner()
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), data)
        .map_err(|e| CryptoError::Encryption(e.to_string()))
}

/// Unwrap. Every failure collapses to `Unwrap` so callers cannot tell a
/// wrong key from a malformed ciphertext.
pub fn decrypt(
    wrapped: &[u8],
    private: &PrivateIdentityKey,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    private
        .inner()
        .decrypt(Oaep::new::<Sha256>(), wrapped)
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::Unwrap)
}
