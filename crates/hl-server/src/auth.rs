//! Auth gateway: credentials in, verified identities out.
//!
//! Credentials are `<userId>.<hex HMAC-SHA256(secret, userId)>`. The tag is
//! checked in constant time, then the user must exist in the directory.
//! Registration generates the identity keypair on the crypto pool.

use std::sync::Arc;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::info;
use zeroize::Zeroizing;

use hl_crypto::{CryptoError, IdentityKeyPair};
use hl_proto::UserId;
use hl_store::{KeyVault, StoreError, UserDirectory};

use crate::error::CoreError;
use crate::pool::CryptoPool;

const CREDENTIAL_DOMAIN: &[u8] = b"hushline-credential-v1\0";

/// Result of registering a new identity.
#[derive(Debug, Clone)]
pub struct Registration {
    pub user_id: UserId,
    pub public_key_pem: String,
    pub fingerprint: String,
    pub credential: String,
}

#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// Map a credential to the identity it was issued for.
    async fn authenticate(&self, credential: &str) -> Result<UserId, CoreError>;

    /// Create the identity keypair for a new user and publish its public half.
    async fn register(&self, user: &UserId) -> Result<Registration, CoreError>;

    /// Credential for an existing user.
    async fn issue_credential(&self, user: &UserId) -> Result<String, CoreError>;
}

pub struct HmacGateway {
    secret: Zeroizing<Vec<u8>>,
    directory: Arc<dyn UserDirectory>,
    keys: Arc<dyn KeyVault>,
    pool: CryptoPool,
    modulus_bits: usize,
}

impl HmacGateway {
    pub fn new(
        secret: &[u8],
        directory: Arc<dyn UserDirectory>,
        keys: Arc<dyn KeyVault>,
        pool: CryptoPool,
        modulus_bits: usize,
    ) -> Self {
        Self {
            secret: Zeroizing::new(secret.to_vec()),
            directory,
            keys,
            pool,
            modulus_bits,
        }
    }

    fn mac(&self, user: &UserId) -> Result<Hmac<Sha256>, CoreError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.secret)
            .map_err(|_| CoreError::Unauthenticated)?;
        mac.update(CREDENTIAL_DOMAIN);
        mac.update(user.as_str().as_bytes());
        Ok(mac)
    }

    fn credential_for(&self, user: &UserId) -> Result<String, CoreError> {
        let tag = self.mac(user)?.finalize().into_bytes();
        Ok(format!("{user}.{}", hex::encode(tag)))
    }
}

#[async_trait]
impl AuthGateway for HmacGateway {
    async fn authenticate(&self, credential: &str) -> Result<UserId, CoreError> {
        let (raw_user, raw_tag) = credential
            .rsplit_once('.')
            .ok_or(CoreError::Unauthenticated)?;
        let user = UserId::parse(raw_user).map_err(|_| CoreError::Unauthenticated)?;
        let tag = hex::decode(raw_tag).map_err(|_| CoreError::Unauthenticated)?;
        self.mac(&user)?
            .verify_slice(&tag)
            .map_err(|_| CoreError::Unauthenticated)?;
        if !self.directory.exists(&user).await? {
            return Err(CoreError::Unauthenticated);
        }
        Ok(user)
    }

    async fn register(&self, user: &UserId) -> Result<Registration, CoreError> {
        if self.directory.exists(user).await? {
            return Err(CoreError::AlreadyRegistered(user.to_string()));
        }
        let bits = self.modulus_bits;
        let (public_key_pem, private_key_pem, fingerprint) = self
            .pool
            .run(move || -> Result<_, CryptoError> {
                let pair = IdentityKeyPair::generate(bits)?;
                let (public_pem, private_pem) = pair.to_pem_pair()?;
                Ok((public_pem, private_pem, pair.public.fingerprint()?))
            })
            .await??;

        let conflict = |e: StoreError| match e {
            StoreError::AlreadyExists(_) => CoreError::AlreadyRegistered(user.to_string()),
            other => CoreError::Store(other),
        };
        // Private half first: a published public key always has its private half stored.
        self.keys
            .store_private_key(user, &private_key_pem)
            .await
            .map_err(conflict)?;
        self.directory
            .create_user(user, &public_key_pem)
            .await
            .map_err(conflict)?;

        info!(user_id = %user, fingerprint = %fingerprint, "identity registered");
        Ok(Registration {
            user_id: user.clone(),
            credential: self.credential_for(user)?,
            public_key_pem,
            fingerprint,
        })
    }

    async fn issue_credential(&self, user: &UserId) -> Result<String, CoreError> {
        if !self.directory.exists(user).await? {
            return Err(CoreError::NotFound(format!("user {user}")));
        }
        self.credential_for(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hl_store::MemoryStore;

    const SECRET: &[u8] = b"test-secret-0123456789";

    async fn gateway() -> (Arc<MemoryStore>, HmacGateway) {
        let store = Arc::new(MemoryStore::new());
        store.create_user(&UserId::parse("alice").unwrap(), "PEM").await.unwrap();
        let gw = HmacGateway::new(SECRET, store.clone(), store.clone(), CryptoPool::new(1), 2048);
        (store, gw)
    }

    #[tokio::test]
    async fn issued_credential_authenticates() {
        let (_store, gw) = gateway().await;
        let alice = UserId::parse("alice").unwrap();
        let credential = gw.issue_credential(&alice).await.unwrap();
        assert!(credential.starts_with("alice."));
        assert_eq!(gw.authenticate(&credential).await.unwrap(), alice);
    }

    #[tokio::test]
    async fn forged_or_foreign_credentials_fail() {
        let (store, gw) = gateway().await;
        let alice = UserId::parse("alice").unwrap();
        let good = gw.issue_credential(&alice).await.unwrap();

        let mut flipped = good.clone();
        let last = flipped.pop().unwrap();
        flipped.push(if last == '0' { '1' } else { '0' });
        for bad in [flipped.as_str(), "alice", "alice.zz", ".00", "", "al!ce.00"] {
            assert!(matches!(gw.authenticate(bad).await, Err(CoreError::Unauthenticated)), "{bad}");
        }

        // Valid tag under another secret.
        let other = HmacGateway::new(b"another-secret-abcdef", store.clone(), store, CryptoPool::new(1), 2048);
        assert!(matches!(other.authenticate(&good).await, Err(CoreError::Unauthenticated)));
    }

    #[tokio::test]
    async fn unknown_user_is_rejected_even_with_valid_tag() {
        let (_store, gw) = gateway().await;
        let ghost = UserId::parse("ghost").unwrap();
        let credential = gw.credential_for(&ghost).unwrap();
        assert!(matches!(gw.authenticate(&credential).await, Err(CoreError::Unauthenticated)));
        assert!(matches!(gw.issue_credential(&ghost).await, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn register_creates_keys_once() {
        let (store, gw) = gateway().await;
        let bob = UserId::parse("bob").unwrap();
        let reg = gw.register(&bob).await.unwrap();
        assert!(reg.public_key_pem.contains("BEGIN PUBLIC KEY"));
        assert_eq!(store.public_key(&bob).await.unwrap(), reg.public_key_pem);
        assert!(store.private_key(&bob).await.unwrap().contains("BEGIN PRIVATE KEY"));
        assert_eq!(gw.authenticate(&reg.credential).await.unwrap(), bob);

        assert!(matches!(gw.register(&bob).await, Err(CoreError::AlreadyRegistered(_))));
        assert!(matches!(
            gw.register(&UserId::parse("alice").unwrap()).await,
            Err(CoreError::AlreadyRegistered(_))
        ));
    }
}
