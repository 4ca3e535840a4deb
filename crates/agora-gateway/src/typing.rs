use std::sync::Arc;

use uuid::Uuid;

use agora_types::events::ServerEvent;

use crate::rooms::RoomCoordinator;
use crate::session::Session;

/// Room-scoped typing indicators. Nothing here is persisted or remembered:
/// a `typing_start` with no matching `typing_stop` is the client's problem.
pub struct TypingRelay {
    rooms: Arc<RoomCoordinator>,
}

impl TypingRelay {
    pub fn new(rooms: Arc<RoomCoordinator>) -> Self {
        Self { rooms }
    }

    pub async fn start(&self, room_id: Uuid, session: &Session) -> usize {
        let event = ServerEvent::UserTyping {
            user_id: session.user_id(),
            username: session.username().to_string(),
            room_id,
        };
        self.rooms.broadcast_except(room_id, &event, session.id).await
    }

    pub async fn stop(&self, room_id: Uuid, session: &Session) -> usize {
        let event = ServerEvent::UserStopTyping {
            user_id: session.user_id(),
            username: session.username().to_string(),
            room_id,
        };
        self.rooms.broadcast_except(room_id, &event, session.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestStore, drain, general_room};

    #[tokio::test]
    async fn typing_skips_the_typist() {
        let store = TestStore::new();
        let alice = store.user("alice");
        let bob = store.user("bob");
        let rooms = Arc::new(RoomCoordinator::new(store.dyn_store()));
        let relay = TypingRelay::new(rooms.clone());

        let (a1, mut a1_rx) = alice.session();
        let (a2, mut a2_rx) = alice.session();
        let (b1, mut b1_rx) = bob.session();
        for s in [&a1, &a2, &b1] {
            rooms.join(general_room(), s).await.unwrap();
        }
        for rx in [&mut a1_rx, &mut a2_rx, &mut b1_rx] {
            drain(rx);
        }

        assert_eq!(relay.start(general_room(), &a1).await, 2);
        let typing = ServerEvent::UserTyping {
            user_id: Some(alice.id),
            username: "alice".into(),
            room_id: general_room(),
        };
        assert!(drain(&mut a1_rx).is_empty());
        // Alice's other tab sees her typing too
        assert_eq!(drain(&mut a2_rx), vec![typing.clone()]);
        assert_eq!(drain(&mut b1_rx), vec![typing]);

        relay.stop(general_room(), &a1).await;
        assert!(matches!(
            drain(&mut b1_rx).as_slice(),
            [ServerEvent::UserStopTyping { .. }]
        ));
    }

    #[tokio::test]
    async fn typing_in_unwatched_room_goes_nowhere() {
        let store = TestStore::new();
        let alice = store.user("alice");
        let rooms = Arc::new(RoomCoordinator::new(store.dyn_store()));
        let relay = TypingRelay::new(rooms);

        let (a1, _rx) = alice.session();
        assert_eq!(relay.start(general_room(), &a1).await, 0);
    }
}
