//! Vault: in-memory key that seals private identity keys at rest.
//!
//! The 32-byte key is derived from the server passphrase with Argon2id and
//! the per-database salt. It lives only in memory; `lock` zeroizes it.

use std::sync::Arc;

use tokio::sync::RwLock;
use zeroize::{ZeroizeOnDrop, Zeroizing};

use hl_crypto::kdf::{generate_salt, vault_key_from_passphrase, SALT_LEN};
use hl_crypto::Sealed;

use crate::error::StoreError;

#[derive(ZeroizeOnDrop)]
struct VaultKeyBytes([u8; 32]);

/// Thread-safe vault handle. Clone to share across tasks.
#[derive(Clone, Default)]
pub struct Vault {
    inner: Arc<RwLock<Option<VaultKeyBytes>>>,
}

impl Vault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive the key from `passphrase` and unlock. CPU-heavy (Argon2id).
    pub async fn unlock(&self, passphrase: &[u8], salt: &[u8; SALT_LEN]) -> Result<(), StoreError> {
        let key = vault_key_from_passphrase(passphrase, salt)?;
        *self.inner.write().await = Some(VaultKeyBytes(key.0));
        Ok(())
    }

    /// Unlock with an existing raw key.
    pub async fn unlock_with_key(&self, key: [u8; 32]) {
        *self.inner.write().await = Some(VaultKeyBytes(key));
    }

    /// Lock the vault, zeroizing the key.
    pub async fn lock(&self) {
        *self.inner.write().await = None;
    }

    pub async fn is_locked(&self) -> bool {
        self.inner.read().await.is_none()
    }

    /// Seal `plaintext`, binding it to `context` as associated data.
    pub async fn seal(&self, plaintext: &[u8], context: &[u8]) -> Result<String, StoreError> {
        let guard = self.inner.read().await;
        let key = guard.as_ref().ok_or(StoreError::VaultLocked)?;
        let sealed = hl_crypto::encrypt_symmetric(plaintext, &key.0, context)?;
        Ok(sealed.encode())
    }

    pub async fn open(&self, encoded: &str, context: &[u8]) -> Result<Zeroizing<Vec<u8>>, StoreError> {
        let sealed = Sealed::decode(encoded)?;
        let guard = self.inner.read().await;
        let key = guard.as_ref().ok_or(StoreError::VaultLocked)?;
        Ok(hl_crypto::decrypt_symmetric(
            &sealed.ciphertext,
            &key.0,
            &sealed.iv,
            &sealed.auth_tag,
            context,
        )?)
    }
}

/// Fresh salt for a new database. Stored in the clear.
pub fn new_vault_salt() -> [u8; SALT_LEN] {
    generate_salt()
}
