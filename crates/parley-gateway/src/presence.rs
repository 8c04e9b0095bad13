use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::debug;
use uuid::Uuid;

use parley_types::events::GatewayEvent;

/// Identifies one socket. A user reconnecting gets a new id.
pub type ConnectionId = Uuid;

/// Sending half of a live connection's targeted event queue.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    conn_id: ConnectionId,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.conn_id
    }

    /// Queue an event for this socket. `false` once the socket task is gone.
    pub fn send(&self, event: GatewayEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Tracks which users are online and routes targeted events to them.
///
/// One live connection per user; the most recent connection wins. State is
/// process-local and starts empty.
#[derive(Clone)]
pub struct PresenceRegistry {
    inner: Arc<PresenceInner>,
}

struct PresenceInner {
    /// Reaches every open socket, with or without a user id
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// user_id -> live connection
    connections: RwLock<HashMap<Uuid, ConnectionHandle>>,
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceRegistry {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(PresenceInner {
                broadcast_tx,
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to events sent to all sockets.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Best-effort send to every subscribed socket.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register `user_id` as online on a new connection, replacing any
    /// previous one, and announce the online list.
    pub async fn connect(&self, user_id: Uuid) -> (ConnectionId, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let replaced = self
            .inner
            .connections
            .write()
            .await
            .insert(user_id, ConnectionHandle { conn_id, tx });

        if let Some(previous) = replaced {
            debug!("User {} reconnected, replacing connection {}", user_id, previous.conn_id);
        }

        self.announce().await;
        (conn_id, rx)
    }

    /// Drop `user_id`'s entry if it still belongs to `conn_id`, then
    /// announce the online list. Returns whether an entry was removed.
    pub async fn disconnect(&self, user_id: Uuid, conn_id: ConnectionId) -> bool {
        let removed = {
            let mut connections = self.inner.connections.write().await;
            match connections.get(&user_id) {
                Some(current) if current.conn_id == conn_id => {
                    connections.remove(&user_id);
                    true
                }
                // A newer connection has taken over, leave it alone
                _ => false,
            }
        };

        self.announce().await;
        removed
    }

    /// Current live connection for a user.
    pub async fn lookup(&self, user_id: Uuid) -> Option<ConnectionHandle> {
        self.inner.connections.read().await.get(&user_id).cloned()
    }

    /// Push an event to one user's live connection, if any.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) -> bool {
        match self.lookup(user_id).await {
            Some(handle) => handle.send(event),
            None => false,
        }
    }

    /// Online user ids, sorted.
    pub async fn online_user_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.inner.connections.read().await.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Broadcast `getOnlineUsers` with the current list.
    pub async fn announce(&self) {
        let ids = self.online_user_ids().await;
        self.broadcast(GatewayEvent::GetOnlineUsers(ids));
    }
}
