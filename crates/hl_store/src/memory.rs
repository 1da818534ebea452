//! In-memory implementation of every storage contract.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use zeroize::Zeroizing;

use hl_proto::{ChatId, DeliveryState, Envelope, MessageId, MessageRecord, UserId};

use crate::error::StoreError;
use crate::traits::{KeyVault, MessageStore, PresenceRecord, UserDirectory};

struct UserEntry {
    public_key_pem: String,
    presence: PresenceRecord,
}

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, UserEntry>,
    private_keys: HashMap<UserId, Zeroizing<String>>,
    /// Insertion sequence breaks ties between equal timestamps.
    messages: HashMap<MessageId, (u64, MessageRecord)>,
    next_seq: u64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_count(&self) -> usize {
        self.inner.lock().messages.len()
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn create_user(&self, user: &UserId, public_key_pem: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.users.contains_key(user) {
            return Err(StoreError::AlreadyExists(user.to_string()));
        }
        inner.users.insert(
            user.clone(),
            UserEntry {
                public_key_pem: public_key_pem.to_owned(),
                presence: PresenceRecord::default(),
            },
        );
        Ok(())
    }

    async fn exists(&self, user: &UserId) -> Result<bool, StoreError> {
        Ok(self.inner.lock().users.contains_key(user))
    }

    async fn public_key(&self, user: &UserId) -> Result<String, StoreError> {
        self.inner
            .lock()
            .users
            .get(user)
            .map(|u| u.public_key_pem.clone())
            .ok_or_else(|| StoreError::NotFound(user.to_string()))
    }

    async fn set_online(&self, user: &UserId, online: bool) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let entry = inner
            .users
            .get_mut(user)
            .ok_or_else(|| StoreError::NotFound(user.to_string()))?;
        entry.presence.online = online;
        Ok(())
    }

    async fn set_last_seen(&self, user: &UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let entry = inner
            .users
            .get_mut(user)
            .ok_or_else(|| StoreError::NotFound(user.to_string()))?;
        entry.presence.last_seen = Some(at);
        Ok(())
    }

    async fn presence(&self, user: &UserId) -> Result<PresenceRecord, StoreError> {
        self.inner
            .lock()
            .users
            .get(user)
            .map(|u| u.presence)
            .ok_or_else(|| StoreError::NotFound(user.to_string()))
    }
}

#[async_trait]
impl KeyVault for MemoryStore {
    async fn store_private_key(
        &self,
        user: &UserId,
        private_key_pem: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.private_keys.contains_key(user) {
            return Err(StoreError::AlreadyExists(user.to_string()));
        }
        inner
            .private_keys
            .insert(user.clone(), Zeroizing::new(private_key_pem.to_owned()));
        Ok(())
    }

    async fn private_key(&self, user: &UserId) -> Result<Zeroizing<String>, StoreError> {
        self.inner
            .lock()
            .private_keys
            .get(user)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(user.to_string()))
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append(
        &self,
        envelope: &Envelope,
        state: DeliveryState,
    ) -> Result<MessageId, StoreError> {
        let id = MessageId::new_v4();
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner
            .messages
            .insert(id, (seq, MessageRecord::new(id, envelope.clone(), state)));
        Ok(id)
    }

    async fn get(&self, id: MessageId) -> Result<MessageRecord, StoreError> {
        self.inner
            .lock()
            .messages
            .get(&id)
            .map(|(_, record)| record.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn update_state(
        &self,
        id: MessageId,
        state: DeliveryState,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        let (_, record) = inner
            .messages
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(record.advance(state, at))
    }

    async fn query_by_chat(
        &self,
        chat: &ChatId,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let inner = self.inner.lock();
        let mut hits: Vec<&(u64, MessageRecord)> = inner
            .messages
            .values()
            .filter(|(_, r)| !r.deleted && &r.envelope.chat_id == chat && r.envelope.created_at < before)
            .collect();
        hits.sort_by(|(sa, a), (sb, b)| {
            b.envelope
                .created_at
                .cmp(&a.envelope.created_at)
                .then(sb.cmp(sa))
        });
        Ok(hits.into_iter().take(limit).map(|(_, r)| r.clone()).collect())
    }

    async fn tombstone(&self, id: MessageId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let (_, record) = inner
            .messages
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        record.tombstone(at);
        Ok(())
    }
}
