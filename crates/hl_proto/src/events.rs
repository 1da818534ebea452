//! Protocol events exchanged over a connection.
//!
//! Frames are adjacently tagged: `{"event": "message:send", "data": {...}}`.
//! Inbound fields that need validation (`receiverId`, `content`, `chatId`)
//! arrive as raw strings so a bad value becomes a validation error for that
//! one event instead of a malformed frame.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;
use crate::ids::{ChatId, UserId};
use crate::message::{DeliveryState, MessageId, MessageType};

/// Client → server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Must be the first frame on a connection.
    #[serde(rename = "connect")]
    Connect { credential: String },

    #[serde(rename = "message:send", rename_all = "camelCase")]
    MessageSend {
        #[serde(default)]
        receiver_id: String,
        #[serde(default)]
        content: String,
        #[serde(default)]
        message_type: MessageType,
    },

    #[serde(rename = "message:delivered", rename_all = "camelCase")]
    MessageDelivered { message_ids: Vec<MessageId> },

    #[serde(rename = "message:read", rename_all = "camelCase")]
    MessageRead { message_ids: Vec<MessageId> },

    #[serde(rename = "message:delete", rename_all = "camelCase")]
    MessageDelete { message_id: MessageId },

    #[serde(rename = "typing:start", rename_all = "camelCase")]
    TypingStart { receiver_id: String },

    #[serde(rename = "typing:stop", rename_all = "camelCase")]
    TypingStop { receiver_id: String },

    #[serde(rename = "history:fetch", rename_all = "camelCase")]
    HistoryFetch {
        chat_id: String,
        #[serde(default)]
        before: Option<DateTime<Utc>>,
        #[serde(default)]
        limit: Option<usize>,
    },
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::MessageSend { .. } => "message:send",
            Self::MessageDelivered { .. } => "message:delivered",
            Self::MessageRead { .. } => "message:read",
            Self::MessageDelete { .. } => "message:delete",
            Self::TypingStart { .. } => "typing:start",
            Self::TypingStop { .. } => "typing:stop",
            Self::HistoryFetch { .. } => "history:fetch",
        }
    }
}

/// One stored message as returned by a history fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub message_id: MessageId,
    pub state: DeliveryState,
    pub envelope: Envelope,
}

/// Server → client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "connected", rename_all = "camelCase")]
    Connected { user_id: UserId },

    /// Pushed to every live connection of the receiver.
    #[serde(rename = "message:new", rename_all = "camelCase")]
    MessageNew {
        message_id: MessageId,
        envelope: Envelope,
    },

    /// Acknowledgement to the sending connection.
    #[serde(rename = "message:sent", rename_all = "camelCase")]
    MessageSent {
        message_id: MessageId,
        chat_id: ChatId,
    },

    #[serde(rename = "message:read", rename_all = "camelCase")]
    MessageRead {
        message_ids: Vec<MessageId>,
        read_by: UserId,
    },

    #[serde(rename = "message:deleted", rename_all = "camelCase")]
    MessageDeleted { message_id: MessageId },

    #[serde(rename = "typing:start", rename_all = "camelCase")]
    TypingStart { user_id: UserId },

    #[serde(rename = "typing:stop", rename_all = "camelCase")]
    TypingStop { user_id: UserId },

    #[serde(rename = "user:online", rename_all = "camelCase")]
    UserOnline { user_id: UserId },

    #[serde(rename = "user:offline", rename_all = "camelCase")]
    UserOffline { user_id: UserId },

    #[serde(rename = "history", rename_all = "camelCase")]
    History {
        chat_id: ChatId,
        messages: Vec<HistoryEntry>,
    },

    /// Generic failure. `message` never carries internal detail.
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
