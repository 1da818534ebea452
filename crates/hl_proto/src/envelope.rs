//! Encrypted message envelope — what the server stores and relays.
//!
//! The server sees only routing metadata:
//!   - sender_id / receiver_id / chat_id (needed for routing and access checks)
//!   - message_type (needed by clients to pick a renderer)
//!   - created_at (needed for history windows)
//!
//! The body travels as one AES-256-GCM instance (`ciphertext`, `iv`,
//! `auth_tag`) under a per-message key that only the receiver can unwrap
//! (`wrapped_key`). The routing header is the AEAD associated data, and
//! the signature covers `signing_bytes()`: the header plus every
//! ciphertext field. Moving an envelope to another chat, or swapping any
//! of its encrypted parts, breaks both checks.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use hl_crypto::{CryptoError, PrivateIdentityKey, PublicIdentityKey};

use crate::codec::b64;
use crate::ids::{ChatId, IdError, UserId};
use crate::message::MessageType;

const ROUTE_DOMAIN: &[u8] = b"hushline-route-v1\0";
const SIGNATURE_DOMAIN: &[u8] = b"hushline-envelope-v1\0";

/// Plain metadata bound into both the AEAD tag and the signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingHeader {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub chat_id: ChatId,
    pub message_type: MessageType,
    /// Microsecond precision so the value survives JSON and SQLite unchanged.
    pub created_at: DateTime<Utc>,
}

impl RoutingHeader {
    /// Header for a new message stamped now. Fails on self-chat.
    pub fn new(
        sender_id: UserId,
        receiver_id: UserId,
        message_type: MessageType,
    ) -> Result<Self, IdError> {
        let chat_id = ChatId::between(&sender_id, &receiver_id)?;
        Ok(Self {
            sender_id,
            receiver_id,
            chat_id,
            message_type,
            created_at: Utc::now().trunc_subsecs(6),
        })
    }

    /// AEAD associated data.
    pub fn aad(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128);
        out.extend_from_slice(ROUTE_DOMAIN);
        self.write_fields(&mut out);
        out
    }

    fn write_fields(&self, out: &mut Vec<u8>) {
        put(out, self.sender_id.as_str().as_bytes());
        put(out, self.receiver_id.as_str().as_bytes());
        put(out, self.chat_id.as_str().as_bytes());
        put(out, self.message_type.as_str().as_bytes());
        put(
            out,
            self.created_at
                .to_rfc3339_opts(SecondsFormat::Micros, true)
                .as_bytes(),
        );
    }
}

/// u32 big-endian length prefix, then the bytes.
fn put(out: &mut Vec<u8>, field: &[u8]) {
    out.extend_from_slice(&(field.len() as u32).to_be_bytes());
    out.extend_from_slice(field);
}

/// On-wire and at-rest envelope. Immutable once sealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub chat_id: ChatId,
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "b64")]
    pub wrapped_key: Vec<u8>,
    #[serde(with = "b64")]
    pub iv: Vec<u8>,
    #[serde(with = "b64")]
    pub auth_tag: Vec<u8>,
    #[serde(with = "b64")]
    pub signature: Vec<u8>,
    #[serde(default)]
    pub message_type: MessageType,
    pub created_at: DateTime<Utc>,
}

impl Envelope {
    /// Encrypt `plaintext` to the receiver and sign the result as the sender.
    /// CPU-heavy: run it off the async runtime.
    pub fn seal(
        header: RoutingHeader,
        plaintext: &[u8],
        receiver_key: &PublicIdentityKey,
        sender_key: &PrivateIdentityKey,
    ) -> Result<Self, CryptoError> {
        let sealed = hl_crypto::hybrid_encrypt(plaintext, receiver_key, &header.aad())?;
        let mut envelope = Self {
            sender_id: header.sender_id,
            receiver_id: header.receiver_id,
            chat_id: header.chat_id,
            ciphertext: sealed.ciphertext,
            wrapped_key: sealed.wrapped_key,
            iv: sealed.iv.to_vec(),
            auth_tag: sealed.auth_tag.to_vec(),
            signature: Vec::new(),
            message_type: header.message_type,
            created_at: header.created_at,
        };
        envelope.signature = hl_crypto::sign(&envelope.signing_bytes(), sender_key)?;
        Ok(envelope)
    }

    pub fn header(&self) -> RoutingHeader {
        RoutingHeader {
            sender_id: self.sender_id.clone(),
            receiver_id: self.receiver_id.clone(),
            chat_id: self.chat_id.clone(),
            message_type: self.message_type,
            created_at: self.created_at,
        }
    }

    /// Canonical bytes covered by `signature`. Everything but the signature.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            SIGNATURE_DOMAIN.len()
                + 160
                + self.ciphertext.len()
                + self.wrapped_key.len()
                + self.iv.len()
                + self.auth_tag.len(),
        );
        out.extend_from_slice(SIGNATURE_DOMAIN);
        self.header().write_fields(&mut out);
        put(&mut out, &self.ciphertext);
        put(&mut out, &self.wrapped_key);
        put(&mut out, &self.iv);
        put(&mut out, &self.auth_tag);
        out
    }

    /// Whether `signature` was made by the holder of `sender_key` over this
    /// exact envelope. Never panics.
    pub fn verify_signature(&self, sender_key: &PublicIdentityKey) -> bool {
        hl_crypto::verify(&self.signing_bytes(), &self.signature, sender_key)
    }

    /// Decrypt as the receiver. Does not check the signature; call
    /// `verify_signature` first when the sender key is at hand.
    pub fn open(&self, receiver_key: &PrivateIdentityKey) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        hl_crypto::hybrid_decrypt(
            &self.ciphertext,
            &self.wrapped_key,
            &self.iv,
            &self.auth_tag,
            receiver_key,
            &self.header().aad(),
        )
    }
}
