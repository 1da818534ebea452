//! SQLite implementation of the storage contracts via sqlx.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use hl_crypto::kdf::SALT_LEN;
use hl_proto::{ChatId, DeliveryState, Envelope, MessageId, MessageRecord, UserId};

use crate::error::StoreError;
use crate::models::{state_code, to_micros, MessageRow, UserRow};
use crate::traits::{KeyVault, MessageStore, PresenceRecord, UserDirectory};
use crate::vault::{new_vault_salt, Vault};

const VERIFIER_PLAINTEXT: &[u8] = b"hushline vault verifier";
const VERIFIER_CONTEXT: &[u8] = b"hushline-vault-verifier-v1";

const MESSAGE_COLUMNS: &str = "id, chat_id, sender_id, receiver_id, message_type, ciphertext, \
     wrapped_key, iv, auth_tag, signature, created_at, state, delivered_at, read_at, deleted, deleted_at";

/// Central store handle. Cheap to clone (Arc internally).
#[derive(Clone)]
pub struct Store {
    pub pool: SqlitePool,
    pub vault: Vault,
}

impl Store {
    /// Open (or create) the SQLite database at `db_path` and run pending
    /// migrations. The vault starts locked.
    ///
    /// WAL mode is set on the connection, not in a migration: SQLite refuses
    /// to change `journal_mode` inside the transaction sqlx wraps each
    /// migration in.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(opts).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        info!(path = %db_path.display(), "message store opened");
        Ok(Self {
            pool,
            vault: Vault::new(),
        })
    }

    /// Unlock the key vault with the server passphrase. The first call on a
    /// fresh database creates and stores the salt and the verifier; later
    /// calls with a different passphrase fail with `WrongPassphrase` and
    /// leave the vault locked.
    pub async fn unlock(&self, passphrase: &[u8]) -> Result<(), StoreError> {
        let salt = self.vault_salt().await?;
        self.vault.unlock(passphrase, &salt).await?;
        if let Err(e) = self.check_verifier().await {
            self.vault.lock().await;
            return Err(e);
        }
        Ok(())
    }

    async fn check_verifier(&self) -> Result<(), StoreError> {
        let stored: Option<String> =
            sqlx::query_scalar("SELECT verifier FROM vault_meta WHERE id = 1")
                .fetch_one(&self.pool)
                .await?;
        let sealed = match stored {
            Some(sealed) => sealed,
            None => {
                let fresh = self.vault.seal(VERIFIER_PLAINTEXT, VERIFIER_CONTEXT).await?;
                sqlx::query("UPDATE vault_meta SET verifier = ? WHERE id = 1 AND verifier IS NULL")
                    .bind(&fresh)
                    .execute(&self.pool)
                    .await?;
                sqlx::query_scalar("SELECT verifier FROM vault_meta WHERE id = 1")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        match self.vault.open(&sealed, VERIFIER_CONTEXT).await {
            Ok(plain) if plain.as_slice() == VERIFIER_PLAINTEXT => Ok(()),
            Ok(_) | Err(StoreError::Crypto(_)) => {
                warn!("vault passphrase rejected");
                Err(StoreError::WrongPassphrase)
            }
            Err(e) => Err(e),
        }
    }

    async fn vault_salt(&self) -> Result<[u8; SALT_LEN], StoreError> {
        let stored: Option<String> = sqlx::query_scalar("SELECT salt FROM vault_meta WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        let hex_salt = match stored {
            Some(s) => s,
            None => {
                let fresh = hex::encode(new_vault_salt());
                // Another opener may race us; keep whichever salt landed first.
                sqlx::query("INSERT OR IGNORE INTO vault_meta (id, salt) VALUES (1, ?)")
                    .bind(&fresh)
                    .execute(&self.pool)
                    .await?;
                sqlx::query_scalar("SELECT salt FROM vault_meta WHERE id = 1")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        let mut salt = [0u8; SALT_LEN];
        hex::decode_to_slice(&hex_salt, &mut salt).map_err(|e| StoreError::Corrupt {
            id: "vault_meta".into(),
            reason: e.to_string(),
        })?;
        Ok(salt)
    }

    async fn user_row(&self, user: &UserId) -> Result<UserRow, StoreError> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, public_key_pem, is_online, last_seen, created_at FROM users WHERE id = ?",
        )
        .bind(user.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(user.to_string()))
    }
}

fn vault_context(user: &UserId) -> Vec<u8> {
    format!("hushline-vault-v1:{user}").into_bytes()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl UserDirectory for Store {
    async fn create_user(&self, user: &UserId, public_key_pem: &str) -> Result<(), StoreError> {
        let res = sqlx::query(
            "INSERT INTO users (id, public_key_pem, is_online, created_at) VALUES (?, ?, 0, ?)",
        )
        .bind(user.as_str())
        .bind(public_key_pem)
        .bind(to_micros(Utc::now()))
        .execute(&self.pool)
        .await;
        match res {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::AlreadyExists(user.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, user: &UserId) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = ?")
            .bind(user.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn public_key(&self, user: &UserId) -> Result<String, StoreError> {
        Ok(self.user_row(user).await?.public_key_pem)
    }

    async fn set_online(&self, user: &UserId, online: bool) -> Result<(), StoreError> {
        let res = sqlx::query("UPDATE users SET is_online = ? WHERE id = ?")
            .bind(online)
            .bind(user.as_str())
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound(user.to_string()));
        }
        Ok(())
    }

    async fn set_last_seen(&self, user: &UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let res = sqlx::query("UPDATE users SET last_seen = ? WHERE id = ?")
            .bind(to_micros(at))
            .bind(user.as_str())
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound(user.to_string()));
        }
        Ok(())
    }

    async fn presence(&self, user: &UserId) -> Result<PresenceRecord, StoreError> {
        self.user_row(user).await?.presence()
    }
}

#[async_trait]
impl KeyVault for Store {
    async fn store_private_key(
        &self,
        user: &UserId,
        private_key_pem: &str,
    ) -> Result<(), StoreError> {
        let sealed = self
            .vault
            .seal(private_key_pem.as_bytes(), &vault_context(user))
            .await?;
        let res = sqlx::query(
            "INSERT INTO identity_keys (user_id, private_key_enc, created_at) VALUES (?, ?, ?)",
        )
        .bind(user.as_str())
        .bind(sealed)
        .bind(to_micros(Utc::now()))
        .execute(&self.pool)
        .await;
        match res {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::AlreadyExists(user.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn private_key(&self, user: &UserId) -> Result<Zeroizing<String>, StoreError> {
        let sealed: String =
            sqlx::query_scalar("SELECT private_key_enc FROM identity_keys WHERE user_id = ?")
                .bind(user.as_str())
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| StoreError::NotFound(user.to_string()))?;
        let pem = self.vault.open(&sealed, &vault_context(user)).await?;
        let pem = String::from_utf8(pem.to_vec()).map_err(|_| StoreError::Corrupt {
            id: user.to_string(),
            reason: "private key is not UTF-8".into(),
        })?;
        Ok(Zeroizing::new(pem))
    }
}

#[async_trait]
impl MessageStore for Store {
    async fn append(
        &self,
        envelope: &Envelope,
        state: DeliveryState,
    ) -> Result<MessageId, StoreError> {
        let id = MessageId::new_v4();
        sqlx::query(
            "INSERT INTO messages (id, chat_id, sender_id, receiver_id, message_type, ciphertext, \
             wrapped_key, iv, auth_tag, signature, created_at, state) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(envelope.chat_id.as_str())
        .bind(envelope.sender_id.as_str())
        .bind(envelope.receiver_id.as_str())
        .bind(envelope.message_type.as_str())
        .bind(&envelope.ciphertext)
        .bind(&envelope.wrapped_key)
        .bind(&envelope.iv)
        .bind(&envelope.auth_tag)
        .bind(&envelope.signature)
        .bind(to_micros(envelope.created_at))
        .bind(state_code(state))
        .execute(&self.pool)
        .await?;
        debug!(message_id = %id, chat_id = %envelope.chat_id, "envelope appended");
        Ok(id)
    }

    async fn get(&self, id: MessageId) -> Result<MessageRecord, StoreError> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        row.try_into()
    }

    async fn update_state(
        &self,
        id: MessageId,
        state: DeliveryState,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let at = to_micros(at);
        let read_at = (state == DeliveryState::Read).then_some(at);
        // The `state < ?` guard makes the transition monotonic under races.
        let res = sqlx::query(
            "UPDATE messages SET state = ?, \
             delivered_at = COALESCE(delivered_at, ?), \
             read_at = COALESCE(?, read_at) \
             WHERE id = ? AND state < ?",
        )
        .bind(state_code(state))
        .bind(at)
        .bind(read_at)
        .bind(id.to_string())
        .bind(state_code(state))
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 1 {
            return Ok(true);
        }
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        if count == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(false)
    }

    async fn query_by_chat(
        &self,
        chat: &ChatId,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE chat_id = ? AND deleted = 0 AND created_at < ? \
             ORDER BY created_at DESC, rowid DESC LIMIT ?"
        ))
        .bind(chat.as_str())
        .bind(to_micros(before))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(MessageRecord::try_from).collect()
    }

    async fn tombstone(&self, id: MessageId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let res = sqlx::query(
            "UPDATE messages SET deleted = 1, deleted_at = COALESCE(deleted_at, ?) WHERE id = ?",
        )
        .bind(to_micros(at))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
