//! Message router: encrypt, sign, persist, then push.
//!
//! Order per send: validate, resolve the receiver key, seal on the crypto
//! pool, persist in `sent`, push to the receiver's live connections, mark
//! `delivered` if any push landed, acknowledge. A crypto failure aborts
//! before anything is written; a failed persist aborts before any push.

use std::sync::Arc;

use tracing::{info, warn};
use zeroize::Zeroizing;

use hl_crypto::{CryptoError, PrivateIdentityKey, PublicIdentityKey};
use hl_proto::{ChatId, DeliveryState, Envelope, MessageId, MessageType, RoutingHeader, ServerEvent, UserId};
use hl_store::{KeyVault, MessageStore, StoreError, UserDirectory};

use crate::error::CoreError;
use crate::pool::CryptoPool;
use crate::presence::PresenceRegistry;
use crate::receipts::ReceiptTracker;
use crate::retry::RetryPolicy;

/// Acknowledgement for a routed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: MessageId,
    pub chat_id: ChatId,
    /// Live connections that received the push.
    pub pushed_to: usize,
}

pub struct MessageRouter {
    pub(crate) directory: Arc<dyn UserDirectory>,
    pub(crate) keys: Arc<dyn KeyVault>,
    pub(crate) messages: Arc<dyn MessageStore>,
    pub(crate) presence: Arc<PresenceRegistry>,
    pub(crate) receipts: Arc<ReceiptTracker>,
    pub(crate) pool: CryptoPool,
    pub(crate) retry: RetryPolicy,
}

impl MessageRouter {
    pub async fn send(
        &self,
        sender: &UserId,
        receiver: &str,
        content: &str,
        message_type: MessageType,
    ) -> Result<SendReceipt, CoreError> {
        if receiver.is_empty() || content.is_empty() {
            return Err(CoreError::Validation(
                "receiverId and content are required".into(),
            ));
        }
        let receiver = UserId::parse(receiver)?;
        let header = RoutingHeader::new(sender.clone(), receiver.clone(), message_type)?;

        let receiver_pem = self
            .retry
            .run("public_key", || self.directory.public_key(&receiver))
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => CoreError::UnknownRecipient(receiver.to_string()),
                other => CoreError::Store(other),
            })?;
        let sender_pem = self
            .retry
            .run("private_key", || self.keys.private_key(sender))
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => CoreError::NotFound(format!("identity key for {sender}")),
                other => CoreError::Store(other),
            })?;

        let plaintext = Zeroizing::new(content.as_bytes().to_vec());
        let envelope = self
            .pool
            .run(move || -> Result<Envelope, CryptoError> {
                let receiver_key = PublicIdentityKey::from_pem(&receiver_pem)?;
                let sender_key = PrivateIdentityKey::from_pem(&sender_pem)?;
                Envelope::seal(header, &plaintext, &receiver_key, &sender_key)
            })
            .await??;

        let message_id = self
            .retry
            .run("append", || self.messages.append(&envelope, DeliveryState::Sent))
            .await?;
        let chat_id = envelope.chat_id.clone();

        let pushed_to = self
            .presence
            .deliver(&receiver, ServerEvent::MessageNew { message_id, envelope });
        if pushed_to > 0 {
            // The push already happened; a failed state write is not a send failure.
            if let Err(e) = self.receipts.mark_delivered(message_id).await {
                warn!(message_id = %message_id, error = %e, "could not record delivery");
            }
        }

        info!(
            message_id = %message_id,
            chat_id = %chat_id,
            sender = %sender,
            pushed_to,
            "message routed"
        );
        Ok(SendReceipt {
            message_id,
            chat_id,
            pushed_to,
        })
    }

    /// Pass a typing hint to the receiver's live connections. Not persisted.
    pub async fn relay_typing(
        &self,
        sender: &UserId,
        receiver: &str,
        typing: bool,
    ) -> Result<(), CoreError> {
        let receiver = UserId::parse(receiver)?;
        if &receiver == sender {
            return Ok(());
        }
        let user_id = sender.clone();
        let event = if typing {
            ServerEvent::TypingStart { user_id }
        } else {
            ServerEvent::TypingStop { user_id }
        };
        self.presence.deliver(&receiver, event);
        Ok(())
    }
}
