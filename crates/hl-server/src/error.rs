use thiserror::Error;

use hl_crypto::CryptoError;
use hl_proto::IdError;
use hl_store::StoreError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown recipient: {0}")]
    UnknownRecipient(String),

    #[error("AEAD integrity check failed")]
    Integrity,

    #[error("Key unwrap failed")]
    Unwrap,

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Identity already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Credential rejected")]
    Unauthenticated,

    #[error("Crypto worker pool unavailable")]
    WorkerUnavailable,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Crypto error: {0}")]
    Crypto(CryptoError),
}

impl From<CryptoError> for CoreError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Integrity => Self::Integrity,
            CryptoError::Unwrap => Self::Unwrap,
            other => Self::Crypto(other),
        }
    }
}

impl From<IdError> for CoreError {
    fn from(err: IdError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl CoreError {
    /// Text for an `error` event. Crypto and storage detail stays in logs;
    /// "wrong key" and "tampered ciphertext" read the same.
    pub fn client_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::UnknownRecipient(_) => "unknown recipient".into(),
            Self::Integrity | Self::Unwrap => "decryption failed".into(),
            Self::Authorization(_) => "not authorized".into(),
            Self::NotFound(_) => "not found".into(),
            Self::AlreadyRegistered(_) => "already registered".into(),
            Self::Unauthenticated => "authentication failed".into(),
            Self::WorkerUnavailable | Self::Store(_) | Self::Crypto(_) => "request failed".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crypto_failures_are_indistinguishable_to_clients() {
        let unwrap: CoreError = CryptoError::Unwrap.into();
        let integrity: CoreError = CryptoError::Integrity.into();
        assert!(matches!(unwrap, CoreError::Unwrap));
        assert!(matches!(integrity, CoreError::Integrity));
        assert_eq!(unwrap.client_message(), integrity.client_message());
    }

    #[test]
    fn internal_detail_is_not_exposed() {
        let err = CoreError::Store(StoreError::Migration("table messages: disk I/O".into()));
        assert_eq!(err.client_message(), "request failed");
        let err: CoreError = CryptoError::InvalidKey("public key PEM: bad base64".into()).into();
        assert_eq!(err.client_message(), "request failed");
    }

    #[test]
    fn self_chat_is_a_validation_error() {
        let err: CoreError = IdError::SelfChat.into();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
