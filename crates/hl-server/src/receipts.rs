//! Receipt tracker: the `sent -> delivered -> read` state machine plus the
//! sender-only tombstone.
//!
//! State only ever moves forward; the store enforces that atomically, so a
//! late `delivered` never undoes a `read`. Acks from anyone but the
//! message's receiver are ignored.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use hl_proto::{DeliveryState, MessageId, MessageRecord, ServerEvent, UserId};
use hl_store::{MessageStore, StoreError};

use crate::error::CoreError;
use crate::presence::PresenceRegistry;
use crate::retry::RetryPolicy;

pub struct ReceiptTracker {
    messages: Arc<dyn MessageStore>,
    presence: Arc<PresenceRegistry>,
    retry: RetryPolicy,
}

impl ReceiptTracker {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        presence: Arc<PresenceRegistry>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            messages,
            presence,
            retry,
        }
    }

    /// `sent -> delivered`. Returns whether the state moved; already
    /// delivered or read is a no-op.
    pub async fn mark_delivered(&self, id: MessageId) -> Result<bool, CoreError> {
        let advanced = self
            .retry
            .run("update_state", || {
                self.messages
                    .update_state(id, DeliveryState::Delivered, Utc::now())
            })
            .await
            .map_err(|e| not_found_or(e, id))?;
        if advanced {
            debug!(message_id = %id, "marked delivered");
        }
        Ok(advanced)
    }

    /// Receiver acknowledgement after a history pull. Ids that are unknown
    /// or addressed to someone else are skipped. Returns the ids that moved.
    pub async fn acknowledge_delivered(
        &self,
        receiver: &UserId,
        ids: &[MessageId],
    ) -> Result<Vec<MessageId>, CoreError> {
        let mut advanced = Vec::new();
        for &id in ids {
            if self.owned_by_receiver(receiver, id).await?.is_none() {
                continue;
            }
            if self.mark_delivered(id).await? {
                advanced.push(id);
            }
        }
        Ok(advanced)
    }

    /// Mark `ids` read on behalf of `reader` and tell each original sender
    /// which of its messages were read, in one `message:read` per sender.
    pub async fn mark_read(
        &self,
        reader: &UserId,
        ids: &[MessageId],
    ) -> Result<BTreeMap<UserId, Vec<MessageId>>, CoreError> {
        let mut by_sender: BTreeMap<UserId, Vec<MessageId>> = BTreeMap::new();
        for &id in ids {
            let Some(record) = self.owned_by_receiver(reader, id).await? else {
                continue;
            };
            let advanced = self
                .retry
                .run("update_state", || {
                    self.messages.update_state(id, DeliveryState::Read, Utc::now())
                })
                .await
                .map_err(|e| not_found_or(e, id))?;
            if advanced {
                by_sender
                    .entry(record.envelope.sender_id)
                    .or_default()
                    .push(id);
            }
        }

        for (sender, message_ids) in &by_sender {
            let reached = self
                .presence
                .deliver(
                    sender,
                    ServerEvent::MessageRead {
                        message_ids: message_ids.clone(),
                        read_by: reader.clone(),
                    },
                );
            debug!(sender = %sender, count = message_ids.len(), reached, "read receipt sent");
        }
        Ok(by_sender)
    }

    /// Tombstone `id`. Only the original sender may; state is untouched.
    pub async fn delete(&self, id: MessageId, requester: &UserId) -> Result<(), CoreError> {
        let record = self.fetch(id).await?;
        if &record.envelope.sender_id != requester {
            return Err(CoreError::Authorization(format!(
                "{requester} may not delete message {id}"
            )));
        }
        self.retry
            .run("tombstone", || self.messages.tombstone(id, Utc::now()))
            .await
            .map_err(|e| not_found_or(e, id))?;
        info!(message_id = %id, user_id = %requester, "message deleted");
        Ok(())
    }

    async fn fetch(&self, id: MessageId) -> Result<MessageRecord, CoreError> {
        self.retry
            .run("get", || self.messages.get(id))
            .await
            .map_err(|e| not_found_or(e, id))
    }

    async fn owned_by_receiver(
        &self,
        receiver: &UserId,
        id: MessageId,
    ) -> Result<Option<MessageRecord>, CoreError> {
        match self.fetch(id).await {
            Ok(record) if &record.envelope.receiver_id == receiver => Ok(Some(record)),
            Ok(_) | Err(CoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn not_found_or(err: StoreError, id: MessageId) -> CoreError {
    match err {
        StoreError::NotFound(_) => CoreError::NotFound(format!("message {id}")),
        other => CoreError::Store(other),
    }
}
