//! hl-server — Presence, routing and receipts for Hushline
//!
//! # Module layout
//! - `presence` — live connections per user, online/offline edges
//! - `router`   — seal, persist, push, acknowledge
//! - `receipts` — delivered/read state machine, sender-only delete
//! - `history`  — participant-only pull of stored envelopes
//! - `auth`     — credential verification and identity registration
//! - `session`  — per-connection actor over any byte stream
//! - `server`   — TCP accept loop
//! - `pool`     — bounded blocking pool for asymmetric crypto
//! - `config`   — file + environment configuration

pub mod auth;
pub mod config;
pub mod error;
pub mod history;
pub mod paths;
pub mod pool;
pub mod presence;
pub mod receipts;
pub mod retry;
pub mod router;
pub mod server;
pub mod service;
pub mod session;

pub use auth::{AuthGateway, HmacGateway, Registration};
pub use config::{Secrets, ServerConfig};
pub use error::CoreError;
pub use presence::{LocalOnly, PresenceEdge, PresenceFanout, PresenceRegistry, Transition};
pub use router::{MessageRouter, SendReceipt};
pub use service::{Backends, ChatService};
pub use session::serve_connection;
