//! Key derivation functions
//!
//! `vault_key_from_passphrase` — Argon2id, derives the 32-byte key the server
//!   uses to encrypt private identity keys at rest.

use argon2::{Argon2, Params, Version};
use rand::{rngs::OsRng, RngCore};
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;

pub const SALT_LEN: usize = 16;

/// 32-byte vault key derived from a passphrase. Zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct VaultKey(pub [u8; 32]);

/// Argon2id parameters — tuned for a server that derives once at startup.
fn argon2_params() -> Result<Params, CryptoError> {
    Params::new(
        64 * 1024, // m_cost: 64 MiB
        3,         // t_cost: 3 iterations
        1,         // p_cost: 1 thread
        Some(32),  // output len
    )
    .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}

/// Derive a vault key from a passphrase + 16-byte salt.
/// The salt is stored alongside the encrypted data (not secret).
pub fn vault_key_from_passphrase(
    passphrase: &[u8],
    salt: &[u8; SALT_LEN],
) -> Result<VaultKey, CryptoError> {
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, argon2_params()?);
    let mut output = [0u8; 32];
    argon2
        .hash_password_into(passphrase, salt, &mut output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(VaultKey(output))
}

/// Generate a fresh random salt (once per database; store it).
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_same_key() {
        let salt = [9u8; SALT_LEN];
        let a = vault_key_from_passphrase(b"correct horse", &salt).unwrap();
        let b = vault_key_from_passphrase(b"correct horse", &salt).unwrap();
        assert_eq!(a.0, b.0);
    }

    #[test]
    fn salt_changes_key() {
        let a = vault_key_from_passphrase(b"correct horse", &[1u8; SALT_LEN]).unwrap();
        let b = vault_key_from_passphrase(b"correct horse", &[2u8; SALT_LEN]).unwrap();
        assert_ne!(a.0, b.0);
        assert_ne!(generate_salt(), generate_salt());
    }
}
