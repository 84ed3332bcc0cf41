use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use raaya_types::events::GatewayEvent;

/// Tracks live connections, which user each belongs to, and which rooms
/// each has joined. Events are pushed onto per-connection unbounded queues,
/// so fan-out never waits on a slow socket.
///
/// Locks are taken in the order `rooms`, `registry`, `connections` and are
/// never held across an `.await` on anything else.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// Outbound queue per connection: conn_id -> sender
    connections: RwLock<HashMap<Uuid, mpsc::UnboundedSender<GatewayEvent>>>,

    /// Connection registry: user_id -> conn_id. Last authenticated wins.
    registry: RwLock<HashMap<Uuid, Uuid>>,

    /// Room groups: room_id -> joined conn_ids
    rooms: RwLock<HashMap<Uuid, HashSet<Uuid>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a connection slot. Returns (conn_id, receiver of its events).
    pub async fn connect(&self) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.connections.write().await.insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Bind `user_id` to this connection, replacing any earlier binding, and
    /// acknowledge to this connection only. A connection is bound to at most
    /// one user, so re-authenticating drops its previous user's entry.
    pub async fn authenticate(&self, conn_id: Uuid, user_id: Uuid) {
        let previous = {
            let mut registry = self.inner.registry.write().await;
            registry.retain(|user, registered| *registered != conn_id || *user == user_id);
            registry.insert(user_id, conn_id)
        };
        if let Some(previous) = previous.filter(|prev| *prev != conn_id) {
            debug!("User {} moved from connection {} to {}", user_id, previous, conn_id);
        }

        self.send_to(conn_id, GatewayEvent::Authenticated { user_id }).await;
    }

    /// The connection currently registered for a user, if any.
    pub async fn connection_for(&self, user_id: Uuid) -> Option<Uuid> {
        self.inner.registry.read().await.get(&user_id).copied()
    }

    pub async fn join(&self, conn_id: Uuid, room_id: Uuid) {
        self.inner
            .rooms
            .write()
            .await
            .entry(room_id)
            .or_default()
            .insert(conn_id);
    }

    pub async fn leave(&self, conn_id: Uuid, room_id: Uuid) {
        let mut rooms = self.inner.rooms.write().await;
        if let Some(members) = rooms.get_mut(&room_id) {
            members.remove(&conn_id);
            if members.is_empty() {
                rooms.remove(&room_id);
            }
        }
    }

    pub async fn room_size(&self, room_id: Uuid) -> usize {
        self.inner.rooms.read().await.get(&room_id).map_or(0, HashSet::len)
    }

    /// Send an event to one connection. A closed connection is ignored.
    pub async fn send_to(&self, conn_id: Uuid, event: GatewayEvent) {
        if let Some(tx) = self.inner.connections.read().await.get(&conn_id) {
            let _ = tx.send(event);
        }
    }

    /// Deliver an event to every connection joined to `room_id`, optionally
    /// skipping one. Returns how many connections it was queued for.
    pub async fn broadcast_to_room(&self, room_id: Uuid, event: GatewayEvent, except: Option<Uuid>) -> usize {
        let members: Vec<Uuid> = match self.inner.rooms.read().await.get(&room_id) {
            Some(members) => members
                .iter()
                .copied()
                .filter(|conn_id| Some(*conn_id) != except)
                .collect(),
            None => return 0,
        };

        let connections = self.inner.connections.read().await;
        let mut delivered = 0;
        for conn_id in members {
            if let Some(tx) = connections.get(&conn_id) {
                if tx.send(event.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Forget a connection: its queue, every registry entry pointing at it,
    /// and its room memberships.
    pub async fn disconnect(&self, conn_id: Uuid) {
        {
            let mut rooms = self.inner.rooms.write().await;
            rooms.retain(|_, members| {
                members.remove(&conn_id);
                !members.is_empty()
            });
        }

        // A newer connection for the same user has its own entry and is left alone.
        self.inner.registry.write().await.retain(|_, registered| *registered != conn_id);
        self.inner.connections.write().await.remove(&conn_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typing(room_id: Uuid) -> GatewayEvent {
        GatewayEvent::UserTyping {
            room_id,
            user_id: Uuid::new_v4(),
            is_typing: true,
        }
    }

    #[tokio::test]
    async fn authenticate_acknowledges_only_the_caller() {
        let dispatcher = Dispatcher::new();
        let (conn_a, mut rx_a) = dispatcher.connect().await;
        let (_conn_b, mut rx_b) = dispatcher.connect().await;
        let user = Uuid::new_v4();

        dispatcher.authenticate(conn_a, user).await;

        match rx_a.try_recv().unwrap() {
            GatewayEvent::Authenticated { user_id } => assert_eq!(user_id, user),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(rx_b.try_recv().is_err());
        assert_eq!(dispatcher.connection_for(user).await, Some(conn_a));
    }

    #[tokio::test]
    async fn last_connection_wins_and_old_disconnect_keeps_it() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let (old, _rx_old) = dispatcher.connect().await;
        let (new, _rx_new) = dispatcher.connect().await;

        dispatcher.authenticate(old, user).await;
        dispatcher.authenticate(new, user).await;
        assert_eq!(dispatcher.connection_for(user).await, Some(new));

        dispatcher.disconnect(old).await;
        assert_eq!(dispatcher.connection_for(user).await, Some(new));

        dispatcher.disconnect(new).await;
        assert_eq!(dispatcher.connection_for(user).await, None);
    }

    #[tokio::test]
    async fn reauthenticating_as_another_user_releases_the_first() {
        let dispatcher = Dispatcher::new();
        let (conn, _rx) = dispatcher.connect().await;
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        dispatcher.authenticate(conn, first).await;
        dispatcher.authenticate(conn, second).await;

        assert_eq!(dispatcher.connection_for(first).await, None);
        assert_eq!(dispatcher.connection_for(second).await, Some(conn));
    }

    #[tokio::test]
    async fn broadcast_reaches_joined_connections_only() {
        let dispatcher = Dispatcher::new();
        let room = Uuid::new_v4();
        let (a, mut rx_a) = dispatcher.connect().await;
        let (b, mut rx_b) = dispatcher.connect().await;
        let (_c, mut rx_c) = dispatcher.connect().await;
        dispatcher.join(a, room).await;
        dispatcher.join(b, room).await;

        assert_eq!(dispatcher.broadcast_to_room(room, typing(room), None).await, 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_c.try_recv().is_err());

        assert_eq!(dispatcher.broadcast_to_room(room, typing(room), Some(a)).await, 1);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn leave_and_disconnect_drop_membership() {
        let dispatcher = Dispatcher::new();
        let room = Uuid::new_v4();
        let (a, _rx_a) = dispatcher.connect().await;
        let (b, _rx_b) = dispatcher.connect().await;
        dispatcher.join(a, room).await;
        dispatcher.join(b, room).await;
        assert_eq!(dispatcher.room_size(room).await, 2);

        dispatcher.leave(a, room).await;
        assert_eq!(dispatcher.room_size(room).await, 1);

        dispatcher.disconnect(b).await;
        assert_eq!(dispatcher.room_size(room).await, 0);
        assert_eq!(dispatcher.broadcast_to_room(room, typing(room), None).await, 0);
    }

    #[tokio::test]
    async fn dropped_receiver_is_swallowed() {
        let dispatcher = Dispatcher::new();
        let room = Uuid::new_v4();
        let (a, rx_a) = dispatcher.connect().await;
        dispatcher.join(a, room).await;
        drop(rx_a);

        assert_eq!(dispatcher.broadcast_to_room(room, typing(room), None).await, 0);
    }
}
