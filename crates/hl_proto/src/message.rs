//! Message metadata and the persisted message record.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;

pub type MessageId = uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
    Audio,
    Video,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl FromStr for MessageType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "file" => Ok(Self::File),
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            other => Err(format!("unknown message type {other:?}")),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered: a record only ever moves to a greater state.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    #[default]
    Sent,
    Delivered,
    Read,
}

impl DeliveryState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
        }
    }

    /// Monotonic: staying put or moving backwards is not an advance.
    pub fn can_advance_to(self, next: DeliveryState) -> bool {
        next > self
    }
}

impl FromStr for DeliveryState {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "read" => Ok(Self::Read),
            other => Err(format!("unknown delivery state {other:?}")),
        }
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted form of an envelope. Never carries plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: MessageId,
    pub envelope: Envelope,
    pub state: DeliveryState,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    /// Tombstone; orthogonal to `state`.
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl MessageRecord {
    pub fn new(id: MessageId, envelope: Envelope, state: DeliveryState) -> Self {
        Self {
            id,
            envelope,
            state,
            delivered_at: None,
            read_at: None,
            deleted: false,
            deleted_at: None,
        }
    }

    /// Move to `next` if that is an advance, stamping the matching time.
    /// Returns whether anything changed.
    pub fn advance(&mut self, next: DeliveryState, at: DateTime<Utc>) -> bool {
        if !self.state.can_advance_to(next) {
            return false;
        }
        if next >= DeliveryState::Delivered && self.delivered_at.is_none() {
            self.delivered_at = Some(at);
        }
        if next == DeliveryState::Read {
            self.read_at = Some(at);
        }
        self.state = next;
        true
    }

    pub fn tombstone(&mut self, at: DateTime<Utc>) {
        if !self.deleted {
            self.deleted = true;
            self.deleted_at = Some(at);
        }
    }
}
