//! Wiring: one `ChatService` per process, shared by every connection.

use std::sync::Arc;

use hl_store::{KeyVault, MessageStore, UserDirectory};

use crate::auth::{AuthGateway, HmacGateway};
use crate::config::ServerConfig;
use crate::history::HistoryService;
use crate::pool::CryptoPool;
use crate::presence::{LocalOnly, PresenceFanout, PresenceRegistry};
use crate::receipts::ReceiptTracker;
use crate::retry::RetryPolicy;
use crate::router::MessageRouter;

/// The three storage collaborators.
#[derive(Clone)]
pub struct Backends {
    pub directory: Arc<dyn UserDirectory>,
    pub keys: Arc<dyn KeyVault>,
    pub messages: Arc<dyn MessageStore>,
}

impl Backends {
    /// One backend serving all three contracts.
    pub fn shared<B>(backend: Arc<B>) -> Self
    where
        B: UserDirectory + KeyVault + MessageStore + 'static,
    {
        Self {
            directory: backend.clone(),
            keys: backend.clone(),
            messages: backend,
        }
    }
}

pub struct ChatService {
    pub config: ServerConfig,
    pub presence: Arc<PresenceRegistry>,
    pub receipts: Arc<ReceiptTracker>,
    pub router: MessageRouter,
    pub history: HistoryService,
    pub auth: Arc<dyn AuthGateway>,
}

impl ChatService {
    /// Must be called inside a tokio runtime.
    pub fn new(
        config: ServerConfig,
        backends: Backends,
        auth: Arc<dyn AuthGateway>,
        pool: CryptoPool,
        fanout: Arc<dyn PresenceFanout>,
    ) -> Self {
        let retry = RetryPolicy::new(config.store_retry_attempts, config.store_retry_backoff_ms);
        let presence = Arc::new(PresenceRegistry::new(backends.directory.clone(), fanout));
        let receipts = Arc::new(ReceiptTracker::new(
            backends.messages.clone(),
            presence.clone(),
            retry,
        ));
        let router = MessageRouter {
            directory: backends.directory.clone(),
            keys: backends.keys.clone(),
            messages: backends.messages.clone(),
            presence: presence.clone(),
            receipts: receipts.clone(),
            pool,
            retry,
        };
        let history = HistoryService::new(
            backends.messages,
            retry,
            config.history_default_limit,
            config.history_max_limit,
        );
        Self {
            config,
            presence,
            receipts,
            router,
            history,
            auth,
        }
    }

    /// Single-node service with HMAC credentials.
    pub fn with_hmac_auth(config: ServerConfig, backends: Backends, auth_secret: &[u8]) -> Self {
        let pool = CryptoPool::new(config.crypto_workers);
        let auth = Arc::new(HmacGateway::new(
            auth_secret,
            backends.directory.clone(),
            backends.keys.clone(),
            pool.clone(),
            config.modulus_bits,
        ));
        Self::new(config, backends, auth, pool, Arc::new(LocalOnly))
    }
}
