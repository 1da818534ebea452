use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Vault is locked — unlock with the passphrase first")]
    VaultLocked,

    #[error("Crypto error: {0}")]
    Crypto(#[from] hl_crypto::CryptoError),

    #[error("Vault passphrase does not match this database")]
    WrongPassphrase,

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("Store temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("Migration error: {0}")]
    Migration(String),
}

impl StoreError {
    /// Whether retrying the same call might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Database(err) => match err {
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
                // SQLITE_BUSY / SQLITE_LOCKED
                sqlx::Error::Database(db) => matches!(db.code().as_deref(), Some("5") | Some("6")),
                _ => false,
            },
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_availability_errors_are_transient() {
        assert!(StoreError::Unavailable("busy".into()).is_transient());
        assert!(StoreError::Database(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!StoreError::NotFound("x".into()).is_transient());
        assert!(!StoreError::VaultLocked.is_transient());
        assert!(!StoreError::WrongPassphrase.is_transient());
        assert!(!StoreError::Database(sqlx::Error::RowNotFound).is_transient());
    }
}
