use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use chatline_types::events::GatewayEvent;

/// Presence registry and event fan-out for connected clients.
///
/// Each user maps to the set of their live connections, so a second tab
/// never evicts the first. A user counts as online while that set is
/// non-empty. State is process-local.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Every connected client receives every broadcast event
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// user_id -> (conn_id -> targeted sender)
    connections: RwLock<HashMap<Uuid, HashMap<Uuid, mpsc::UnboundedSender<GatewayEvent>>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to gateway events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a new connection for `user_id` and announce the updated
    /// online set. Returns (conn_id, receiver for targeted events).
    pub async fn register(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let online = {
            let mut connections = self.inner.connections.write().await;
            connections.entry(user_id).or_default().insert(conn_id, tx);
            sorted_keys(&connections)
        };

        self.broadcast(GatewayEvent::OnlineUsersChanged(online));
        (conn_id, rx)
    }

    /// Drop one connection. The user goes offline only when it was their last.
    pub async fn unregister(&self, user_id: Uuid, conn_id: Uuid) {
        let online = {
            let mut connections = self.inner.connections.write().await;
            let Some(conns) = connections.get_mut(&user_id) else {
                return;
            };
            if conns.remove(&conn_id).is_none() {
                return;
            }
            if conns.is_empty() {
                connections.remove(&user_id);
            }
            sorted_keys(&connections)
        };

        self.broadcast(GatewayEvent::OnlineUsersChanged(online));
    }

    /// Send a targeted event to every connection of a user.
    /// Returns how many connections it was handed to; 0 means offline.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) -> usize {
        let connections = self.inner.connections.read().await;
        let Some(conns) = connections.get(&user_id) else {
            return 0;
        };

        conns
            .values()
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count()
    }

    /// Ids of users with at least one live connection.
    pub async fn online_users(&self) -> Vec<Uuid> {
        sorted_keys(&*self.inner.connections.read().await)
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.connections.read().await.contains_key(&user_id)
    }
}

fn sorted_keys<V>(map: &HashMap<Uuid, V>) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = map.keys().copied().collect();
    ids.sort();
    ids
}
