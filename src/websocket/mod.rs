use crate::models::RoomKey;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc::UnboundedSender, RwLock};
use uuid::Uuid;

pub mod events;
pub mod handlers;
pub mod session;

/// Unique identifier for one live transport connection.
///
/// Assigned when the socket is accepted; a connection stays unbound until the
/// client announces an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

type OutboundSender = UnboundedSender<String>;

#[derive(Default)]
struct RegistryInner {
    /// Outbound channel per live connection.
    senders: HashMap<ConnectionId, OutboundSender>,
    /// User identity -> set of live connections (one per device/tab).
    users: HashMap<Uuid, HashSet<ConnectionId>>,
    /// Reverse lookup for disconnect cleanup.
    bound: HashMap<ConnectionId, Uuid>,
}

/// In-memory connection registry: the single owner of connection-to-identity
/// state and of the per-connection outbound senders. Everything else queries
/// it; nothing mutates its maps except through these operations.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the outbound channel for a freshly accepted connection.
    pub async fn register(&self, connection_id: ConnectionId, sender: OutboundSender) {
        let mut guard = self.inner.write().await;
        guard.senders.insert(connection_id, sender);
    }

    /// Drop the outbound channel. Identity bindings are cleaned up separately
    /// via [`unbind`](Self::unbind).
    pub async fn deregister(&self, connection_id: ConnectionId) {
        let mut guard = self.inner.write().await;
        guard.senders.remove(&connection_id);
    }

    /// Bind a connection under a user's live set. Idempotent; binding the
    /// same pair twice changes nothing. A connection holds one identity at a
    /// time: re-binding under a different user releases the old binding, and
    /// the drained previous user is returned so the caller can broadcast the
    /// offline transition.
    pub async fn bind(&self, connection_id: ConnectionId, user_id: Uuid) -> Option<Uuid> {
        let mut guard = self.inner.write().await;
        let mut drained = None;
        if let Some(previous) = guard.bound.insert(connection_id, user_id) {
            if previous != user_id {
                if let Some(set) = guard.users.get_mut(&previous) {
                    set.remove(&connection_id);
                    if set.is_empty() {
                        guard.users.remove(&previous);
                        drained = Some(previous);
                    }
                }
            }
        }
        guard.users.entry(user_id).or_default().insert(connection_id);
        drained
    }

    /// Remove a connection from the user's live set. Returns true when this
    /// drained the set, i.e. the user just transitioned to offline.
    pub async fn unbind(&self, connection_id: ConnectionId, user_id: Uuid) -> bool {
        let mut guard = self.inner.write().await;
        guard.bound.remove(&connection_id);
        match guard.users.get_mut(&user_id) {
            Some(set) => {
                set.remove(&connection_id);
                if set.is_empty() {
                    guard.users.remove(&user_id);
                    true
                } else {
                    false
                }
            }
            None => false,
        }
    }

    pub async fn user_for(&self, connection_id: ConnectionId) -> Option<Uuid> {
        let guard = self.inner.read().await;
        guard.bound.get(&connection_id).copied()
    }

    pub async fn connections_for(&self, user_id: Uuid) -> HashSet<ConnectionId> {
        let guard = self.inner.read().await;
        guard.users.get(&user_id).cloned().unwrap_or_default()
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        let guard = self.inner.read().await;
        guard.users.get(&user_id).map(|s| !s.is_empty()).unwrap_or(false)
    }

    /// Deliver to one connection. Dead senders are pruned on failure.
    pub async fn send_to(&self, connection_id: ConnectionId, payload: &str) -> bool {
        let mut guard = self.inner.write().await;
        match guard.senders.get(&connection_id) {
            Some(sender) if sender.send(payload.to_string()).is_ok() => true,
            Some(_) => {
                guard.senders.remove(&connection_id);
                tracing::debug!(connection_id = %connection_id, "pruned dead sender");
                false
            }
            None => false,
        }
    }

    /// Deliver to every live connection of a user. Returns the delivery count.
    pub async fn send_to_user(&self, user_id: Uuid, payload: &str) -> usize {
        let connections = self.connections_for(user_id).await;
        let mut delivered = 0;
        for connection_id in connections {
            if self.send_to(connection_id, payload).await {
                delivered += 1;
            }
        }
        delivered
    }
}

/// Transport-level broadcast rooms keyed by conversation or group id.
///
/// Membership is not persisted; a room exists as soon as one connection joins
/// and stops mattering once empty.
#[derive(Default, Clone)]
pub struct RoomManager {
    inner: Arc<RwLock<HashMap<RoomKey, HashSet<ConnectionId>>>>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn join(&self, connection_id: ConnectionId, room: RoomKey) {
        let mut guard = self.inner.write().await;
        guard.entry(room).or_default().insert(connection_id);
    }

    pub async fn leave(&self, connection_id: ConnectionId, room: RoomKey) {
        let mut guard = self.inner.write().await;
        if let Some(members) = guard.get_mut(&room) {
            members.remove(&connection_id);
            if members.is_empty() {
                guard.remove(&room);
            }
        }
    }

    pub async fn leave_all(&self, connection_id: ConnectionId) {
        let mut guard = self.inner.write().await;
        guard.retain(|_, members| {
            members.remove(&connection_id);
            !members.is_empty()
        });
    }

    pub async fn members(&self, room: RoomKey) -> HashSet<ConnectionId> {
        let guard = self.inner.read().await;
        guard.get(&room).cloned().unwrap_or_default()
    }

    /// Deliver a payload to every member of the room, optionally skipping the
    /// origin connection so the sender gets no echo of their own action.
    pub async fn broadcast(
        &self,
        registry: &ConnectionRegistry,
        room: RoomKey,
        payload: &str,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let members = self.members(room).await;
        let mut delivered = 0;
        for connection_id in members {
            if Some(connection_id) == exclude {
                continue;
            }
            if registry.send_to(connection_id, payload).await {
                delivered += 1;
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[tokio::test]
    async fn bind_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let conn = ConnectionId::new();

        registry.bind(conn, user).await;
        registry.bind(conn, user).await;

        assert_eq!(registry.connections_for(user).await.len(), 1);
        assert!(registry.is_online(user).await);
        assert!(registry.unbind(conn, user).await);
        assert!(!registry.is_online(user).await);
    }

    #[tokio::test]
    async fn rebinding_a_connection_releases_the_previous_identity() {
        let registry = ConnectionRegistry::new();
        let conn = ConnectionId::new();
        let (user_a, user_b) = (Uuid::new_v4(), Uuid::new_v4());

        assert_eq!(registry.bind(conn, user_a).await, None);
        assert_eq!(registry.bind(conn, user_b).await, Some(user_a));

        assert!(!registry.is_online(user_a).await);
        assert!(registry.connections_for(user_a).await.is_empty());
        assert!(registry.is_online(user_b).await);
        assert_eq!(registry.user_for(conn).await, Some(user_b));

        // same-identity rebind stays a no-op
        assert_eq!(registry.bind(conn, user_b).await, None);
    }

    #[tokio::test]
    async fn rebind_does_not_drain_a_user_with_other_connections() {
        let registry = ConnectionRegistry::new();
        let (conn, other) = (ConnectionId::new(), ConnectionId::new());
        let (user_a, user_b) = (Uuid::new_v4(), Uuid::new_v4());

        registry.bind(conn, user_a).await;
        registry.bind(other, user_a).await;

        assert_eq!(registry.bind(conn, user_b).await, None);
        assert!(registry.is_online(user_a).await);
        assert_eq!(registry.connections_for(user_a).await.len(), 1);
    }

    #[tokio::test]
    async fn unbind_signals_offline_only_when_set_drains() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let (a, b) = (ConnectionId::new(), ConnectionId::new());

        registry.bind(a, user).await;
        registry.bind(b, user).await;

        assert!(!registry.unbind(a, user).await);
        assert!(registry.is_online(user).await);
        assert!(registry.unbind(b, user).await);
        assert!(!registry.is_online(user).await);
    }

    /// Randomized bind/unbind interleavings across several connections: the
    /// online flag must always equal "live set is non-empty".
    #[tokio::test]
    async fn online_iff_live_set_nonempty_under_random_interleaving() {
        let mut rng = rand::rng();
        for _ in 0..50 {
            let registry = ConnectionRegistry::new();
            let user = Uuid::new_v4();
            let conns: Vec<ConnectionId> = (0..4).map(|_| ConnectionId::new()).collect();
            let mut live: HashSet<ConnectionId> = HashSet::new();

            for _ in 0..32 {
                let conn = *conns.choose(&mut rng).unwrap();
                if rng.random_bool(0.5) {
                    registry.bind(conn, user).await;
                    live.insert(conn);
                } else {
                    registry.unbind(conn, user).await;
                    live.remove(&conn);
                }
                assert_eq!(registry.is_online(user).await, !live.is_empty());
                assert_eq!(registry.connections_for(user).await, live);
            }
        }
    }

    #[tokio::test]
    async fn send_to_user_reaches_every_device_and_prunes_dead_senders() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();

        let (tx1, mut rx1) = unbounded_channel();
        let (tx2, rx2) = unbounded_channel();
        let (a, b) = (ConnectionId::new(), ConnectionId::new());
        registry.register(a, tx1).await;
        registry.register(b, tx2).await;
        registry.bind(a, user).await;
        registry.bind(b, user).await;

        drop(rx2); // second device went away without deregistering

        assert_eq!(registry.send_to_user(user, "hello").await, 1);
        assert_eq!(rx1.recv().await.unwrap(), "hello");
        // the dead sender is gone now
        assert!(!registry.send_to(b, "again").await);
    }

    #[tokio::test]
    async fn room_broadcast_excludes_origin() {
        let registry = ConnectionRegistry::new();
        let rooms = RoomManager::new();
        let room = RoomKey::Conversation(Uuid::new_v4());

        let (tx1, mut rx1) = unbounded_channel();
        let (tx2, mut rx2) = unbounded_channel();
        let (sender, receiver) = (ConnectionId::new(), ConnectionId::new());
        registry.register(sender, tx1).await;
        registry.register(receiver, tx2).await;
        rooms.join(sender, room).await;
        rooms.join(receiver, room).await;

        let delivered = rooms
            .broadcast(&registry, room, "payload", Some(sender))
            .await;

        assert_eq!(delivered, 1);
        assert_eq!(rx2.recv().await.unwrap(), "payload");
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn leave_all_clears_memberships_and_empty_rooms() {
        let rooms = RoomManager::new();
        let conn = ConnectionId::new();
        let other = ConnectionId::new();
        let a = RoomKey::Conversation(Uuid::new_v4());
        let b = RoomKey::Group(Uuid::new_v4());

        rooms.join(conn, a).await;
        rooms.join(conn, b).await;
        rooms.join(other, b).await;
        rooms.leave_all(conn).await;

        assert!(rooms.members(a).await.is_empty());
        assert_eq!(rooms.members(b).await.len(), 1);
    }
}
