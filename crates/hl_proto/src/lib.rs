//! hl_proto — Wire types, envelopes, and serialisation for Hushline
//!
//! All on-wire types are serialised to newline-delimited JSON with
//! camelCase field names; byte fields are standard base64.
//!
//! # Modules
//! - `ids`      — `UserId` and the order-independent `ChatId`
//! - `message`  — message type, delivery state, persisted record
//! - `envelope` — encrypted, signed message envelope (what the server stores)
//! - `events`   — inbound/outbound protocol events
//! - `codec`    — frame encoding and base64 field helpers

pub mod codec;
pub mod envelope;
pub mod events;
pub mod ids;
pub mod message;

pub use envelope::{Envelope, RoutingHeader};
pub use events::{ClientEvent, HistoryEntry, ServerEvent};
pub use ids::{ChatId, IdError, UserId};
pub use message::{DeliveryState, MessageId, MessageRecord, MessageType};
