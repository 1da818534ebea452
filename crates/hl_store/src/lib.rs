//! hl_store — Storage collaborators for the Hushline messaging core
//!
//! The core never touches a database directly. It talks to three contracts:
//! - `UserDirectory` — public keys, online flag, last seen
//! - `KeyVault`      — private identity keys (PEM)
//! - `MessageStore`  — envelopes and their delivery state
//!
//! Two implementations ship:
//! - `MemoryStore` — process-local, for tests and single-shot tools
//! - `Store`       — SQLite via sqlx. Private keys are sealed with
//!   AES-256-GCM under a vault key derived from a passphrase (Argon2id).
//!   Envelopes are stored exactly as sealed; there is no plaintext column.
//!
//! # Migration
//! SQLx migrations in `migrations/` are run on open.

pub mod db;
pub mod error;
pub mod memory;
pub mod models;
pub mod traits;
pub mod vault;

pub use db::Store;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use traits::{KeyVault, MessageStore, PresenceRecord, UserDirectory};
pub use vault::Vault;
