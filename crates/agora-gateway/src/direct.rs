use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use agora_db::Store;
use agora_types::events::{DirectMessageView, ServerEvent};
use agora_types::models::UserProfile;

use crate::error::GatewayError;
use crate::messages::{display_identity, sanitize_content};
use crate::registry::ConnectionRegistry;
use crate::session::Session;

/// One-to-one messages, DM typing and friend request signals, routed by user
/// rather than room.
pub struct DirectMessageService {
    store: Arc<dyn Store>,
    registry: ConnectionRegistry,
    max_len: usize,
}

impl DirectMessageService {
    pub fn new(store: Arc<dyn Store>, registry: ConnectionRegistry, max_len: usize) -> Self {
        Self {
            store,
            registry,
            max_len,
        }
    }

    /// Persist a DM and deliver `new_dm` to every live session of both
    /// parties. Anonymous senders and blank content are dropped.
    pub async fn send(
        &self,
        session: &Session,
        receiver_id: Uuid,
        content: &str,
    ) -> Result<Option<DirectMessageView>, GatewayError> {
        let Some(sender_id) = session.user_id() else {
            debug!("Dropped DM from anonymous session {}", session.id);
            return Ok(None);
        };
        let Some(content) = sanitize_content(content, self.max_len) else {
            return Ok(None);
        };

        let (sender_username, sender_avatar_color) = display_identity(self.store.as_ref(), session).await;
        let dm = self
            .store
            .insert_direct_message(sender_id, receiver_id, &content)
            .await?;

        let view = DirectMessageView {
            id: dm.id,
            sender_id: dm.sender_id,
            receiver_id: dm.receiver_id,
            content: dm.content,
            created_at: dm.created_at,
            sender_username,
            sender_avatar_color,
        };

        let delivered = self
            .registry
            .send_to_users(&[receiver_id, sender_id], &ServerEvent::NewDm(view.clone()))
            .await;
        debug!(dm = %view.id, delivered, "DM delivered");

        Ok(Some(view))
    }

    pub async fn typing_start(&self, session: &Session, receiver_id: Uuid) -> usize {
        let Some(user_id) = session.user_id() else {
            return 0;
        };
        let event = ServerEvent::DmUserTyping {
            user_id,
            username: session.username().to_string(),
        };
        self.registry.send_to_user(receiver_id, &event).await
    }

    pub async fn typing_stop(&self, session: &Session, receiver_id: Uuid) -> usize {
        let Some(user_id) = session.user_id() else {
            return 0;
        };
        let event = ServerEvent::DmUserStopTyping {
            user_id,
            username: session.username().to_string(),
        };
        self.registry.send_to_user(receiver_id, &event).await
    }

    /// Tell every live session of `receiver_id` about a request the session's
    /// user has already recorded. Without a pending request nothing is sent.
    pub async fn friend_request(&self, session: &Session, receiver_id: Uuid) -> Result<usize, GatewayError> {
        let Some(requester_id) = session.user_id() else {
            return Ok(0);
        };
        if !self
            .store
            .has_pending_friend_request(requester_id, receiver_id)
            .await?
        {
            debug!("No pending request from {} to {}", requester_id, receiver_id);
            return Ok(0);
        }

        let (username, avatar_color) = display_identity(self.store.as_ref(), session).await;
        let event = ServerEvent::NewFriendRequest {
            from: UserProfile {
                id: requester_id,
                username,
                avatar_color,
            },
        };
        Ok(self.registry.send_to_user(receiver_id, &event).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MAX_CONTENT_LEN;
    use crate::session::Identity;
    use crate::session::DEFAULT_AVATAR_COLOR;
    use crate::test_support::{ProfileOutageStore, TestStore, drain};

    fn new_dms(events: Vec<ServerEvent>) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, ServerEvent::NewDm(_)))
            .count()
    }

    #[tokio::test]
    async fn dm_reaches_both_parties_and_nobody_else() {
        let store = TestStore::new();
        let alice = store.user("alice");
        let bob = store.user("bob");
        let carol = store.user("carol");
        let registry = ConnectionRegistry::new();
        let dms = DirectMessageService::new(store.dyn_store(), registry.clone(), MAX_CONTENT_LEN);

        let (a1, mut a1_rx) = alice.session();
        let (b1, mut b1_rx) = bob.session();
        let (c1, mut c1_rx) = carol.session();
        for s in [&a1, &b1, &c1] {
            registry.register(s).await;
        }
        for rx in [&mut a1_rx, &mut b1_rx, &mut c1_rx] {
            drain(rx);
        }

        let view = dms.send(&a1, bob.id, " hey bob ").await.unwrap().unwrap();
        assert_eq!(view.content, "hey bob");
        assert_eq!(view.sender_username, "alice");

        assert_eq!(drain(&mut a1_rx), vec![ServerEvent::NewDm(view.clone())]);
        assert_eq!(drain(&mut b1_rx), vec![ServerEvent::NewDm(view)]);
        assert_eq!(new_dms(drain(&mut c1_rx)), 0);
    }

    #[tokio::test]
    async fn dm_to_self_is_delivered_once_per_session() {
        let store = TestStore::new();
        let alice = store.user("alice");
        let registry = ConnectionRegistry::new();
        let dms = DirectMessageService::new(store.dyn_store(), registry.clone(), MAX_CONTENT_LEN);

        let (a1, mut rx) = alice.session();
        registry.register(&a1).await;
        drain(&mut rx);

        dms.send(&a1, alice.id, "note to self").await.unwrap();
        assert_eq!(new_dms(drain(&mut rx)), 1);
    }

    #[tokio::test]
    async fn dm_to_offline_user_is_still_stored() {
        let store = TestStore::new();
        let alice = store.user("alice");
        let bob = store.user("bob");
        let registry = ConnectionRegistry::new();
        let dms = DirectMessageService::new(store.dyn_store(), registry.clone(), MAX_CONTENT_LEN);

        let (a1, _rx) = alice.session();
        registry.register(&a1).await;
        dms.send(&a1, bob.id, "see you later").await.unwrap();

        let unread = store.db().unread_counts(&bob.id.to_string()).unwrap();
        assert_eq!(unread, vec![(alice.id.to_string(), 1)]);
    }

    #[tokio::test]
    async fn anonymous_sender_is_ignored() {
        let store = TestStore::new();
        let bob = store.user("bob");
        let registry = ConnectionRegistry::new();
        let dms = DirectMessageService::new(store.dyn_store(), registry.clone(), MAX_CONTENT_LEN);

        let (b1, mut b_rx) = bob.session();
        registry.register(&b1).await;
        drain(&mut b_rx);

        let (anon, _rx) = Session::new(Identity::Anonymous);
        assert!(dms.send(&anon, bob.id, "boo").await.unwrap().is_none());
        assert_eq!(dms.typing_start(&anon, bob.id).await, 0);
        assert!(drain(&mut b_rx).is_empty());
    }

    #[tokio::test]
    async fn dm_typing_goes_to_receiver_only() {
        let store = TestStore::new();
        let alice = store.user("alice");
        let bob = store.user("bob");
        let registry = ConnectionRegistry::new();
        let dms = DirectMessageService::new(store.dyn_store(), registry.clone(), MAX_CONTENT_LEN);

        let (a1, mut a_rx) = alice.session();
        let (b1, mut b_rx) = bob.session();
        let (b2, mut b2_rx) = bob.session();
        for s in [&a1, &b1, &b2] {
            registry.register(s).await;
        }
        for rx in [&mut a_rx, &mut b_rx, &mut b2_rx] {
            drain(rx);
        }

        assert_eq!(dms.typing_start(&a1, bob.id).await, 2);
        let typing = ServerEvent::DmUserTyping {
            user_id: alice.id,
            username: "alice".into(),
        };
        assert_eq!(drain(&mut b_rx), vec![typing.clone()]);
        assert_eq!(drain(&mut b2_rx), vec![typing]);
        assert!(drain(&mut a_rx).is_empty());

        dms.typing_stop(&a1, bob.id).await;
        assert_eq!(
            drain(&mut b_rx),
            vec![ServerEvent::DmUserStopTyping {
                user_id: alice.id,
                username: "alice".into()
            }]
        );
    }

    #[tokio::test]
    async fn friend_request_notifies_only_when_recorded() {
        let store = TestStore::new();
        let alice = store.user("alice");
        let bob = store.user("bob");
        let registry = ConnectionRegistry::new();
        let dms = DirectMessageService::new(store.dyn_store(), registry.clone(), MAX_CONTENT_LEN);

        let (a1, mut a_rx) = alice.session();
        let (b1, mut b_rx) = bob.session();
        let (b2, mut b2_rx) = bob.session();
        for s in [&a1, &b1, &b2] {
            registry.register(s).await;
        }
        for rx in [&mut a_rx, &mut b_rx, &mut b2_rx] {
            drain(rx);
        }

        assert_eq!(dms.friend_request(&a1, bob.id).await.unwrap(), 0);
        assert!(drain(&mut b_rx).is_empty());

        store
            .db()
            .request_friend(
                &Uuid::new_v4().to_string(),
                &alice.id.to_string(),
                &bob.id.to_string(),
                &agora_db::models::format_timestamp(chrono::Utc::now()),
            )
            .unwrap();

        assert_eq!(dms.friend_request(&a1, bob.id).await.unwrap(), 2);
        let expected = ServerEvent::NewFriendRequest {
            from: UserProfile {
                id: alice.id,
                username: "alice".into(),
                avatar_color: "#9B59B6".into(),
            },
        };
        assert_eq!(drain(&mut b_rx), vec![expected.clone()]);
        assert_eq!(drain(&mut b2_rx), vec![expected]);
        assert!(drain(&mut a_rx).is_empty());
    }

    #[tokio::test]
    async fn failed_profile_lookup_still_delivers_the_dm() {
        let base = TestStore::new();
        let alice = base.user("alice");
        let bob = base.user("bob");
        let registry = ConnectionRegistry::new();
        let dms = DirectMessageService::new(
            Arc::new(ProfileOutageStore::new(base.dyn_store())),
            registry.clone(),
            MAX_CONTENT_LEN,
        );

        let (a1, mut a_rx) = alice.session();
        let (b1, mut b_rx) = bob.session();
        registry.register(&a1).await;
        registry.register(&b1).await;
        drain(&mut a_rx);
        drain(&mut b_rx);

        let view = dms.send(&a1, bob.id, "still here").await.unwrap().unwrap();
        assert_eq!(view.sender_username, "alice");
        assert_eq!(view.sender_avatar_color, DEFAULT_AVATAR_COLOR);
        assert_eq!(drain(&mut b_rx), vec![ServerEvent::NewDm(view)]);

        let unread = base.db().unread_counts(&bob.id.to_string()).unwrap();
        assert_eq!(unread, vec![(alice.id.to_string(), 1)]);
    }
}
