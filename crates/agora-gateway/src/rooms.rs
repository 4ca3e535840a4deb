//! Room membership and broadcast routing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use agora_db::Store;
use agora_types::events::ServerEvent;

use crate::error::GatewayError;
use crate::room::Room;
use crate::session::{Session, SessionId};

#[derive(Default)]
struct RoomTable {
    /// Live rooms: room_id -> subscriber set. Rooms with no subscribers are dropped.
    rooms: HashMap<Uuid, Room>,

    /// Reverse index for disconnect cleanup: session_id -> joined room ids
    joined: HashMap<SessionId, HashSet<Uuid>>,
}

/// Persists room membership and owns every room's live subscriber set.
pub struct RoomCoordinator {
    table: RwLock<RoomTable>,
    store: Arc<dyn Store>,
}

impl RoomCoordinator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            table: RwLock::new(RoomTable::default()),
            store,
        }
    }

    /// Join a room: persist membership (authenticated sessions only; repeat
    /// joins are storage no-ops), subscribe the session, then announce
    /// `user_joined` to every subscriber including the joiner. Rooms that
    /// don't exist are refused for every identity.
    pub async fn join(&self, room_id: Uuid, session: &Session) -> Result<(), GatewayError> {
        if !self.store.room_exists(room_id).await? {
            return Err(GatewayError::UnknownRoom(room_id));
        }

        if let Some(user_id) = session.user_id() {
            let added = self.store.add_room_member(room_id, user_id).await?;
            if added {
                debug!("{} ({}) became a member of {}", session.username(), user_id, room_id);
            }
        }

        let event = ServerEvent::UserJoined {
            room_id,
            user_id: session.user_id(),
            username: session.username().to_string(),
        };

        let mut table = self.table.write().await;
        let room = table.rooms.entry(room_id).or_insert_with(|| Room::new(room_id));
        room.subscribe(session.clone());
        room.broadcast(&event);
        table.joined.entry(session.id).or_default().insert(room_id);

        info!("{} joined room {}", session.username(), room_id);
        Ok(())
    }

    /// Stop receiving a room's broadcasts. Persisted membership is kept.
    /// Announces `user_left` to the remaining subscribers. Returns false if
    /// the session was not subscribed, in which case nothing is emitted.
    pub async fn leave(&self, room_id: Uuid, session: &Session) -> bool {
        let mut table = self.table.write().await;
        let Some(room) = table.rooms.get_mut(&room_id) else {
            return false;
        };
        if room.unsubscribe(session.id).is_none() {
            return false;
        }

        room.broadcast(&ServerEvent::UserLeft {
            room_id,
            user_id: session.user_id(),
            username: session.username().to_string(),
        });

        if room.is_empty() {
            table.rooms.remove(&room_id);
            debug!(room = %room_id, "Dropped empty room");
        }
        if let Some(joined) = table.joined.get_mut(&session.id) {
            joined.remove(&room_id);
            if joined.is_empty() {
                table.joined.remove(&session.id);
            }
        }

        info!("{} left room {}", session.username(), room_id);
        true
    }

    /// Drop every subscription a session holds, silently. Used on disconnect.
    /// Returns the rooms it was removed from.
    pub async fn leave_all(&self, session_id: SessionId) -> Vec<Uuid> {
        let mut table = self.table.write().await;
        let Some(joined) = table.joined.remove(&session_id) else {
            return Vec::new();
        };

        for room_id in &joined {
            if let Some(room) = table.rooms.get_mut(room_id) {
                room.unsubscribe(session_id);
                if room.is_empty() {
                    table.rooms.remove(room_id);
                }
            }
        }

        debug!(session = %session_id, rooms = joined.len(), "Unsubscribed from all rooms");
        joined.into_iter().collect()
    }

    /// Deliver `event` to the room's current subscribers. Sessions that are
    /// not subscribed right now never see it.
    pub async fn broadcast(&self, room_id: Uuid, event: &ServerEvent) -> usize {
        self.table
            .read()
            .await
            .rooms
            .get(&room_id)
            .map(|room| room.broadcast(event))
            .unwrap_or(0)
    }

    /// Deliver `event` to the room's current subscribers except `origin`.
    pub async fn broadcast_except(&self, room_id: Uuid, event: &ServerEvent, origin: SessionId) -> usize {
        self.table
            .read()
            .await
            .rooms
            .get(&room_id)
            .map(|room| room.broadcast_except(event, origin))
            .unwrap_or(0)
    }

    pub async fn subscriber_count(&self, room_id: Uuid) -> usize {
        self.table
            .read()
            .await
            .rooms
            .get(&room_id)
            .map(Room::subscriber_count)
            .unwrap_or(0)
    }

    pub async fn is_subscribed(&self, room_id: Uuid, session_id: SessionId) -> bool {
        self.table
            .read()
            .await
            .rooms
            .get(&room_id)
            .is_some_and(|room| room.is_subscribed(session_id))
    }

    /// Rooms the session is currently subscribed to.
    pub async fn rooms_of(&self, session_id: SessionId) -> HashSet<Uuid> {
        self.table
            .read()
            .await
            .joined
            .get(&session_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn room_count(&self) -> usize {
        self.table.read().await.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Identity;
    use crate::test_support::{TestStore, drain, general_room};

    #[tokio::test]
    async fn join_persists_and_announces_to_everyone() {
        let store = TestStore::new();
        let alice = store.user("alice");
        let rooms = RoomCoordinator::new(store.dyn_store());
        let room_id = general_room();

        let (watcher, mut watcher_rx) = Session::new(Identity::Anonymous);
        rooms.join(room_id, &watcher).await.unwrap();
        drain(&mut watcher_rx);

        let (a1, mut a1_rx) = alice.session();
        rooms.join(room_id, &a1).await.unwrap();

        let expected = ServerEvent::UserJoined {
            room_id,
            user_id: Some(alice.id),
            username: "alice".into(),
        };
        assert_eq!(drain(&mut a1_rx), vec![expected.clone()]);
        assert_eq!(drain(&mut watcher_rx), vec![expected]);
        assert_eq!(store.member_count(room_id), 1);
        assert_eq!(rooms.subscriber_count(room_id).await, 2);
    }

    #[tokio::test]
    async fn anonymous_join_subscribes_without_membership() {
        let store = TestStore::new();
        let rooms = RoomCoordinator::new(store.dyn_store());
        let room_id = general_room();

        let (anon, mut rx) = Session::new(Identity::Anonymous);
        rooms.join(room_id, &anon).await.unwrap();

        assert_eq!(store.member_count(room_id), 0);
        assert!(rooms.is_subscribed(room_id, anon.id).await);
        assert_eq!(
            drain(&mut rx),
            vec![ServerEvent::UserJoined {
                room_id,
                user_id: None,
                username: "anonymous".into()
            }]
        );
    }

    #[tokio::test]
    async fn joining_a_missing_room_fails_without_subscribing() {
        let store = TestStore::new();
        let alice = store.user("alice");
        let rooms = RoomCoordinator::new(store.dyn_store());
        let missing = Uuid::new_v4();

        let (a1, mut a_rx) = alice.session();
        let (anon, mut anon_rx) = Session::new(Identity::Anonymous);
        for session in [&a1, &anon] {
            assert!(matches!(
                rooms.join(missing, session).await,
                Err(GatewayError::UnknownRoom(id)) if id == missing
            ));
            assert!(!rooms.is_subscribed(missing, session.id).await);
        }
        assert!(drain(&mut a_rx).is_empty());
        assert!(drain(&mut anon_rx).is_empty());
        assert_eq!(rooms.room_count().await, 0);
    }

    #[tokio::test]
    async fn leave_keeps_membership_and_notifies_the_rest() {
        let store = TestStore::new();
        let alice = store.user("alice");
        let bob = store.user("bob");
        let rooms = RoomCoordinator::new(store.dyn_store());
        let room_id = general_room();

        let (a1, mut a1_rx) = alice.session();
        let (b1, mut b1_rx) = bob.session();
        rooms.join(room_id, &a1).await.unwrap();
        rooms.join(room_id, &b1).await.unwrap();
        drain(&mut a1_rx);
        drain(&mut b1_rx);

        assert!(rooms.leave(room_id, &a1).await);
        assert!(drain(&mut a1_rx).is_empty());
        assert_eq!(
            drain(&mut b1_rx),
            vec![ServerEvent::UserLeft {
                room_id,
                user_id: Some(alice.id),
                username: "alice".into()
            }]
        );
        assert_eq!(store.member_count(room_id), 2);

        // Not subscribed any more: nothing to announce
        assert!(!rooms.leave(room_id, &a1).await);
        assert!(drain(&mut b1_rx).is_empty());
    }

    #[tokio::test]
    async fn leave_all_clears_every_subscription_silently() {
        let store = TestStore::new();
        let alice = store.user("alice");
        let rooms = RoomCoordinator::new(store.dyn_store());
        let general = general_room();
        let other = store.room("random");

        let (a1, _a1_rx) = alice.session();
        let (watcher, mut watcher_rx) = Session::new(Identity::Anonymous);
        rooms.join(general, &watcher).await.unwrap();
        rooms.join(general, &a1).await.unwrap();
        rooms.join(other, &a1).await.unwrap();
        drain(&mut watcher_rx);

        let mut left = rooms.leave_all(a1.id).await;
        left.sort();
        let mut expected = vec![general, other];
        expected.sort();
        assert_eq!(left, expected);

        assert!(rooms.rooms_of(a1.id).await.is_empty());
        assert!(drain(&mut watcher_rx).is_empty());
        // `other` had no one else and is gone from the live table
        assert_eq!(rooms.room_count().await, 1);
    }

    #[tokio::test]
    async fn broadcast_to_unwatched_room_reaches_nobody() {
        let store = TestStore::new();
        let rooms = RoomCoordinator::new(store.dyn_store());

        assert_eq!(rooms.broadcast(general_room(), &ServerEvent::error("x")).await, 0);
    }
}
