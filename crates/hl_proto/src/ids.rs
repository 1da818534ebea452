//! Identifiers.
//!
//! A `UserId` is 1-64 characters of `[A-Za-z0-9-]`. The underscore is
//! reserved: it separates the two participants inside a `ChatId`, so the
//! chat id of two users can always be split back into exactly those users.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CHAT_ID_SEPARATOR: char = '_';
pub const MAX_USER_ID_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("invalid user id: {0:?}")]
    InvalidUserId(String),
    #[error("invalid chat id: {0:?}")]
    InvalidChatId(String),
    #[error("a chat needs two distinct participants")]
    SelfChat,
}

// ── UserId ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn parse(raw: impl Into<String>) -> Result<Self, IdError> {
        let raw = raw.into();
        let valid = !raw.is_empty()
            && raw.len() <= MAX_USER_ID_LEN
            && raw.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-');
        if valid {
            Ok(Self(raw))
        } else {
            Err(IdError::InvalidUserId(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = IdError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl FromStr for UserId {
    type Err = IdError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── ChatId ────────────────────────────────────────────────────────────────────

/// `min(a, b) + "_" + max(a, b)`; commutative by construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChatId(String);

impl ChatId {
    pub fn between(a: &UserId, b: &UserId) -> Result<Self, IdError> {
        let (lo, hi) = match a.cmp(b) {
            std::cmp::Ordering::Less => (a, b),
            std::cmp::Ordering::Greater => (b, a),
            std::cmp::Ordering::Equal => return Err(IdError::SelfChat),
        };
        Ok(Self(format!("{lo}{CHAT_ID_SEPARATOR}{hi}")))
    }

    /// Accepts only the canonical form `between` produces.
    pub fn parse(raw: impl Into<String>) -> Result<Self, IdError> {
        let raw = raw.into();
        let Some((lo, hi)) = raw.split_once(CHAT_ID_SEPARATOR) else {
            return Err(IdError::InvalidChatId(raw));
        };
        let (Ok(lo), Ok(hi)) = (UserId::parse(lo), UserId::parse(hi)) else {
            return Err(IdError::InvalidChatId(raw));
        };
        if lo >= hi {
            return Err(IdError::InvalidChatId(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn participants(&self) -> (UserId, UserId) {
        // Construction guarantees exactly one separator and two valid ids.
        let (lo, hi) = self
            .0
            .split_once(CHAT_ID_SEPARATOR)
            .unwrap_or((self.0.as_str(), ""));
        (UserId(lo.to_owned()), UserId(hi.to_owned()))
    }

    pub fn contains(&self, user: &UserId) -> bool {
        let (lo, hi) = self.participants();
        &lo == user || &hi == user
    }

    /// The other participant, if `user` is one of the two.
    pub fn counterpart(&self, user: &UserId) -> Option<UserId> {
        let (lo, hi) = self.participants();
        if &lo == user {
            Some(hi)
        } else if &hi == user {
            Some(lo)
        } else {
            None
        }
    }
}

impl TryFrom<String> for ChatId {
    type Error = IdError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ChatId> for String {
    fn from(id: ChatId) -> Self {
        id.0
    }
}

impl FromStr for ChatId {
    type Err = IdError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
