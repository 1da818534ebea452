//! Collaborator contracts consumed by the messaging core.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use zeroize::Zeroizing;

use hl_proto::{ChatId, DeliveryState, Envelope, MessageId, MessageRecord, UserId};

use crate::error::StoreError;

/// Stored presence of a user, as last written by the presence edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PresenceRecord {
    pub online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Fails with `AlreadyExists` rather than replacing a published key.
    async fn create_user(&self, user: &UserId, public_key_pem: &str) -> Result<(), StoreError>;

    async fn exists(&self, user: &UserId) -> Result<bool, StoreError>;

    /// SPKI PEM, or `NotFound`.
    async fn public_key(&self, user: &UserId) -> Result<String, StoreError>;

    async fn set_online(&self, user: &UserId, online: bool) -> Result<(), StoreError>;

    async fn set_last_seen(&self, user: &UserId, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn presence(&self, user: &UserId) -> Result<PresenceRecord, StoreError>;
}

#[async_trait]
pub trait KeyVault: Send + Sync {
    /// Fails with `AlreadyExists` rather than replacing a key.
    async fn store_private_key(&self, user: &UserId, private_key_pem: &str)
        -> Result<(), StoreError>;

    /// PKCS#8 PEM, or `NotFound`.
    async fn private_key(&self, user: &UserId) -> Result<Zeroizing<String>, StoreError>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a sealed envelope and assign its id.
    async fn append(&self, envelope: &Envelope, state: DeliveryState)
        -> Result<MessageId, StoreError>;

    /// Tombstoned records are still returned here.
    async fn get(&self, id: MessageId) -> Result<MessageRecord, StoreError>;

    /// Advance the delivery state. Returns `false` without writing when
    /// `state` is not greater than the stored one.
    async fn update_state(
        &self,
        id: MessageId,
        state: DeliveryState,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Non-tombstoned records of `chat` created strictly before `before`,
    /// newest first, at most `limit`.
    async fn query_by_chat(
        &self,
        chat: &ChatId,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, StoreError>;

    async fn tombstone(&self, id: MessageId, at: DateTime<Utc>) -> Result<(), StoreError>;
}
