#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};

use hl_crypto::IdentityKeyPair;
use hl_proto::codec::{decode_frame, encode_frame};
use hl_proto::{ClientEvent, ServerEvent, UserId};
use hl_server::{serve_connection, Backends, ChatService, ServerConfig};
use hl_store::{KeyVault, MemoryStore, UserDirectory};

pub const SECRET: &[u8] = b"integration-test-secret";

const PIPE_CAPACITY: usize = 256 * 1024;

pub fn uid(s: &str) -> UserId {
    UserId::parse(s).unwrap()
}

/// 2048-bit keypairs, generated once per test binary.
pub fn keypair(name: &str) -> &'static IdentityKeyPair {
    static KEYS: OnceLock<HashMap<&'static str, IdentityKeyPair>> = OnceLock::new();
    let keys = KEYS.get_or_init(|| {
        ["alice", "bob", "carol"]
            .into_iter()
            .map(|n| (n, IdentityKeyPair::generate(2048).unwrap()))
            .collect()
    });
    &keys[name]
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        modulus_bits: 2048,
        crypto_workers: 2,
        outbound_buffer: 64,
        store_retry_backoff_ms: 1,
        handshake_timeout_secs: 2,
        ..ServerConfig::default()
    }
}

/// Put `users` into `store` with their cached keypairs.
pub async fn seed_users(store: &MemoryStore, users: &[&str]) {
    for name in users {
        let (public_pem, private_pem) = keypair(name).to_pem_pair().unwrap();
        store.create_user(&uid(name), &public_pem).await.unwrap();
        store.store_private_key(&uid(name), &private_pem).await.unwrap();
    }
}

pub async fn service_with(backends: Backends) -> Arc<ChatService> {
    service_with_config(test_config(), backends).await
}

pub async fn service_with_config(config: ServerConfig, backends: Backends) -> Arc<ChatService> {
    Arc::new(ChatService::with_hmac_auth(config, backends, SECRET))
}

/// Memory-backed service with alice, bob and carol registered.
pub async fn service() -> (Arc<MemoryStore>, Arc<ChatService>) {
    let store = Arc::new(MemoryStore::new());
    seed_users(&store, &["alice", "bob", "carol"]).await;
    let service = service_with(Backends::shared(store.clone())).await;
    (store, service)
}

pub struct Client {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl Client {
    /// Open a pipe to a fresh connection actor and send `connect`.
    pub async fn open(service: &Arc<ChatService>, credential: &str) -> Self {
        Self::open_with_pipe(service, credential, PIPE_CAPACITY).await
    }

    /// Like `open`, with `capacity` bytes of buffering in each direction.
    pub async fn open_with_pipe(
        service: &Arc<ChatService>,
        credential: &str,
        capacity: usize,
    ) -> Self {
        let (client, server) = tokio::io::duplex(capacity);
        tokio::spawn(serve_connection(server, service.clone()));
        let (reader, writer) = tokio::io::split(client);
        let mut client = Self {
            reader: BufReader::new(reader),
            writer,
        };
        client
            .send(&ClientEvent::Connect {
                credential: credential.to_owned(),
            })
            .await;
        client
    }

    /// Connect as `user` and consume the `connected` frame.
    pub async fn login(service: &Arc<ChatService>, user: &str) -> Self {
        Self::login_with_pipe(service, user, PIPE_CAPACITY).await
    }

    pub async fn login_with_pipe(service: &Arc<ChatService>, user: &str, capacity: usize) -> Self {
        let credential = service.auth.issue_credential(&uid(user)).await.unwrap();
        let mut client = Self::open_with_pipe(service, &credential, capacity).await;
        assert_eq!(
            client.recv().await,
            ServerEvent::Connected { user_id: uid(user) }
        );
        client
    }

    pub async fn send(&mut self, event: &ClientEvent) {
        self.send_raw(&encode_frame(event).unwrap()).await;
    }

    pub async fn send_raw(&mut self, frame: &str) {
        self.send_bytes(frame.as_bytes()).await;
    }

    pub async fn send_bytes(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Next frame, failing the test after five seconds.
    pub async fn recv(&mut self) -> ServerEvent {
        self.try_recv(Duration::from_secs(5))
            .await
            .expect("timed out waiting for a frame")
    }

    /// Next frame that is not a presence broadcast.
    pub async fn recv_skipping_presence(&mut self) -> ServerEvent {
        loop {
            match self.recv().await {
                ServerEvent::UserOnline { .. } | ServerEvent::UserOffline { .. } => continue,
                other => return other,
            }
        }
    }

    pub async fn try_recv(&mut self, wait: Duration) -> Option<ServerEvent> {
        let mut line = String::new();
        match tokio::time::timeout(wait, self.reader.read_line(&mut line)).await {
            Ok(Ok(0)) => None,
            Ok(Ok(_)) => Some(decode_frame(&line).unwrap()),
            Ok(Err(e)) => panic!("read failed: {e}"),
            Err(_) => None,
        }
    }

    /// True once the server has closed the stream.
    pub async fn is_closed(&mut self) -> bool {
        let mut line = String::new();
        matches!(
            tokio::time::timeout(Duration::from_secs(5), self.reader.read_line(&mut line)).await,
            Ok(Ok(0))
        )
    }

    pub async fn assert_silent(&mut self) {
        if let Some(ev) = self.try_recv(Duration::from_millis(150)).await {
            panic!("unexpected frame: {ev:?}");
        }
    }
}
