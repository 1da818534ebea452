//! Database row models — these map to/from SQL rows.

use chrono::{DateTime, Utc};

use hl_proto::{ChatId, DeliveryState, Envelope, MessageRecord, MessageType, UserId};

use crate::error::StoreError;
use crate::traits::PresenceRecord;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub public_key_pem: String,
    pub is_online: bool,
    pub last_seen: Option<i64>,
    pub created_at: i64,
}

impl UserRow {
    pub fn presence(&self) -> Result<PresenceRecord, StoreError> {
        Ok(PresenceRecord {
            online: self.is_online,
            last_seen: self
                .last_seen
                .map(|v| from_micros(&self.id, v))
                .transpose()?,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub message_type: String,
    pub ciphertext: Vec<u8>,
    pub wrapped_key: Vec<u8>,
    pub iv: Vec<u8>,
    pub auth_tag: Vec<u8>,
    pub signature: Vec<u8>,
    pub created_at: i64,
    pub state: i64,
    pub delivered_at: Option<i64>,
    pub read_at: Option<i64>,
    pub deleted: bool,
    pub deleted_at: Option<i64>,
}

impl TryFrom<MessageRow> for MessageRecord {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| StoreError::Corrupt {
            id: row.id.clone(),
            reason,
        };
        let id = row.id.parse().map_err(|e| corrupt(format!("id: {e}")))?;
        let envelope = Envelope {
            sender_id: UserId::parse(row.sender_id.as_str()).map_err(|e| corrupt(e.to_string()))?,
            receiver_id: UserId::parse(row.receiver_id.as_str())
                .map_err(|e| corrupt(e.to_string()))?,
            chat_id: ChatId::parse(row.chat_id.as_str()).map_err(|e| corrupt(e.to_string()))?,
            ciphertext: row.ciphertext.clone(),
            wrapped_key: row.wrapped_key.clone(),
            iv: row.iv.clone(),
            auth_tag: row.auth_tag.clone(),
            signature: row.signature.clone(),
            message_type: row.message_type.parse::<MessageType>().map_err(corrupt)?,
            created_at: from_micros(&row.id, row.created_at)?,
        };
        Ok(MessageRecord {
            id,
            envelope,
            state: state_from_code(row.state).ok_or_else(|| corrupt(format!("state {}", row.state)))?,
            delivered_at: row.delivered_at.map(|v| from_micros(&row.id, v)).transpose()?,
            read_at: row.read_at.map(|v| from_micros(&row.id, v)).transpose()?,
            deleted: row.deleted,
            deleted_at: row.deleted_at.map(|v| from_micros(&row.id, v)).transpose()?,
        })
    }
}

pub fn state_code(state: DeliveryState) -> i64 {
    match state {
        DeliveryState::Sent => 0,
        DeliveryState::Delivered => 1,
        DeliveryState::Read => 2,
    }
}

pub fn state_from_code(code: i64) -> Option<DeliveryState> {
    match code {
        0 => Some(DeliveryState::Sent),
        1 => Some(DeliveryState::Delivered),
        2 => Some(DeliveryState::Read),
        _ => None,
    }
}

pub fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn from_micros(id: &str, micros: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::<Utc>::from_timestamp_micros(micros).ok_or_else(|| StoreError::Corrupt {
        id: id.to_owned(),
        reason: format!("timestamp {micros} out of range"),
    })
}
