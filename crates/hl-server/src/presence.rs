//! Presence registry: which users have live connections.
//!
//! One mutex guards the whole map. Edge detection (first connection in,
//! last connection out) and the `user:online` / `user:offline` broadcast
//! both happen under that lock, so an edge is broadcast exactly once and
//! before the new connection can send anything.
//!
//! Every push is a `try_send` into the target connection's bounded outbound
//! queue; nothing ever waits for a receiver. A connection whose queue is full
//! (or already closed) is evicted: it leaves the map, its session is woken
//! through `ConnectionHandle::evicted` and closes the socket, and the offline
//! edge fires if it was the user's last connection. The client recovers what
//! it missed through history after reconnecting.
//!
//! Persisting the online flag and last-seen time is handed to one writer
//! task through an ordered channel, so directory writes land in edge order
//! even when a user flaps.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, info, warn};

use hl_proto::{ServerEvent, UserId};
use hl_store::UserDirectory;

pub type ConnectionId = u64;

/// Outbound side of one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    tx: mpsc::Sender<ServerEvent>,
    evicted: Arc<Notify>,
}

impl ConnectionHandle {
    /// Notified once if the registry drops this connection for not keeping up.
    pub fn evicted(&self) -> Arc<Notify> {
        self.evicted.clone()
    }
}

struct Connection {
    tx: mpsc::Sender<ServerEvent>,
    evicted: Arc<Notify>,
}

type ConnectionMap = HashMap<UserId, HashMap<ConnectionId, Connection>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// offline -> online edge.
    CameOnline,
    AlreadyOnline,
    /// online -> offline edge.
    WentOffline,
    StillOnline,
    /// The connection was not registered.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEdge {
    pub user: UserId,
    pub online: bool,
    pub at: DateTime<Utc>,
}

/// Extension point for multi-node deployments: told about every edge after
/// it has been persisted locally.
#[async_trait]
pub trait PresenceFanout: Send + Sync {
    async fn publish(&self, edge: &PresenceEdge);
}

/// Single-process deployment: nothing to fan out.
pub struct LocalOnly;

#[async_trait]
impl PresenceFanout for LocalOnly {
    async fn publish(&self, _edge: &PresenceEdge) {}
}

enum WriterCommand {
    Edge(PresenceEdge),
    Flush(oneshot::Sender<()>),
}

pub struct PresenceRegistry {
    connections: Mutex<ConnectionMap>,
    next_id: AtomicU64,
    writer: mpsc::UnboundedSender<WriterCommand>,
}

impl PresenceRegistry {
    /// Must be called inside a tokio runtime: spawns the edge writer.
    pub fn new(directory: Arc<dyn UserDirectory>, fanout: Arc<dyn PresenceFanout>) -> Self {
        let (writer, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_edge_writer(rx, directory, fanout));
        Self {
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            writer,
        }
    }

    /// Allocate a handle for a new connection's outbound queue.
    pub fn connection(&self, tx: mpsc::Sender<ServerEvent>) -> ConnectionHandle {
        ConnectionHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            tx,
            evicted: Arc::new(Notify::new()),
        }
    }

    pub fn register(&self, user: &UserId, handle: ConnectionHandle) -> Transition {
        let mut map = self.connections.lock();
        let set = map.entry(user.clone()).or_default();
        let was_offline = set.is_empty();
        set.insert(
            handle.id,
            Connection {
                tx: handle.tx,
                evicted: handle.evicted,
            },
        );
        if !was_offline {
            debug!(user_id = %user, connection = handle.id, "additional connection");
            return Transition::AlreadyOnline;
        }

        info!(user_id = %user, "user online");
        self.record_edge(user, true);
        let stalled = broadcast_locked(&map, user, &ServerEvent::UserOnline { user_id: user.clone() });
        self.evict_locked(&mut map, stalled);
        Transition::CameOnline
    }

    pub fn unregister(&self, user: &UserId, id: ConnectionId) -> Transition {
        let mut map = self.connections.lock();
        let Some(set) = map.get_mut(user) else {
            return Transition::Unknown;
        };
        if set.remove(&id).is_none() {
            return Transition::Unknown;
        }
        if !set.is_empty() {
            return Transition::StillOnline;
        }
        map.remove(user);
        self.went_offline_locked(&mut map, user);
        Transition::WentOffline
    }

    pub fn is_online(&self, user: &UserId) -> bool {
        self.connections.lock().contains_key(user)
    }

    pub fn connection_count(&self, user: &UserId) -> usize {
        self.connections.lock().get(user).map_or(0, |set| set.len())
    }

    pub fn online_users(&self) -> Vec<UserId> {
        self.connections.lock().keys().cloned().collect()
    }

    /// Queue `event` on every live connection of `user` without waiting.
    /// Connections that cannot take it are evicted. Returns how many
    /// connections accepted it.
    pub fn deliver(&self, user: &UserId, event: ServerEvent) -> usize {
        let mut map = self.connections.lock();
        let Some(set) = map.get(user) else {
            return 0;
        };
        let mut delivered = 0;
        let mut stalled = Vec::new();
        for (id, conn) in set {
            if conn.tx.try_send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                stalled.push((user.clone(), *id));
            }
        }
        self.evict_locked(&mut map, stalled);
        delivered
    }

    /// Resolves once every edge recorded so far has been persisted.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.writer.send(WriterCommand::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Offline edge for `user`, whose last connection is already gone.
    fn went_offline_locked(&self, map: &mut ConnectionMap, user: &UserId) {
        info!(user_id = %user, "user offline");
        self.record_edge(user, false);
        let stalled = broadcast_locked(map, user, &ServerEvent::UserOffline { user_id: user.clone() });
        self.evict_locked(map, stalled);
    }

    /// Drop connections that could not take a push. Evicting a user's last
    /// connection broadcasts its offline edge, which may stall others in turn.
    fn evict_locked(&self, map: &mut ConnectionMap, mut stalled: Vec<(UserId, ConnectionId)>) {
        while let Some((user, id)) = stalled.pop() {
            let Some(set) = map.get_mut(&user) else {
                continue;
            };
            let Some(conn) = set.remove(&id) else {
                continue;
            };
            conn.evicted.notify_one();
            warn!(user_id = %user, connection = id, "outbound queue full, connection evicted");
            if set.is_empty() {
                map.remove(&user);
                info!(user_id = %user, "user offline");
                self.record_edge(&user, false);
                stalled.extend(broadcast_locked(
                    map,
                    &user,
                    &ServerEvent::UserOffline { user_id: user.clone() },
                ));
            }
        }
    }

    fn record_edge(&self, user: &UserId, online: bool) {
        let edge = PresenceEdge {
            user: user.clone(),
            online,
            at: Utc::now(),
        };
        if self.writer.send(WriterCommand::Edge(edge)).is_err() {
            warn!(user_id = %user, "presence writer stopped; edge not persisted");
        }
    }
}

/// Send to every connection of every user except `about`. Caller holds the
/// lock. Returns the connections that could not take the event.
fn broadcast_locked(
    map: &ConnectionMap,
    about: &UserId,
    event: &ServerEvent,
) -> Vec<(UserId, ConnectionId)> {
    let mut stalled = Vec::new();
    for (user, set) in map {
        if user == about {
            continue;
        }
        for (id, conn) in set {
            if conn.tx.try_send(event.clone()).is_err() {
                stalled.push((user.clone(), *id));
            }
        }
    }
    stalled
}

async fn run_edge_writer(
    mut rx: mpsc::UnboundedReceiver<WriterCommand>,
    directory: Arc<dyn UserDirectory>,
    fanout: Arc<dyn PresenceFanout>,
) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WriterCommand::Edge(edge) => {
                if let Err(e) = directory.set_online(&edge.user, edge.online).await {
                    warn!(user_id = %edge.user, error = %e, "failed to persist online flag");
                }
                if !edge.online {
                    if let Err(e) = directory.set_last_seen(&edge.user, edge.at).await {
                        warn!(user_id = %edge.user, error = %e, "failed to persist last seen");
                    }
                }
                fanout.publish(&edge).await;
            }
            WriterCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}
