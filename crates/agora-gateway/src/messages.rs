//! Room messages: validate, persist, then broadcast.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use agora_db::Store;
use agora_types::events::{MessageView, ServerEvent};
use agora_types::models::Message;

use crate::error::GatewayError;
use crate::rooms::RoomCoordinator;
use crate::session::{ANONYMOUS_USERNAME, DEFAULT_AVATAR_COLOR, Session};

/// Longest accepted message body, in characters, after trimming.
pub const MAX_CONTENT_LEN: usize = 2000;

/// Trim surrounding whitespace and cap at `max_chars` characters.
/// Returns `None` for content that is empty once trimmed.
pub fn sanitize_content(raw: &str, max_chars: usize) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => Some(trimmed[..cut].to_string()),
        None => Some(trimmed.to_string()),
    }
}

pub struct MessageService {
    store: Arc<dyn Store>,
    rooms: Arc<RoomCoordinator>,
    max_len: usize,
}

impl MessageService {
    pub fn new(store: Arc<dyn Store>, rooms: Arc<RoomCoordinator>, max_len: usize) -> Self {
        Self { store, rooms, max_len }
    }

    /// Persist a message and broadcast `new_message` to the room.
    /// Whitespace-only content is dropped and yields `Ok(None)`.
    pub async fn send(
        &self,
        room_id: Uuid,
        session: &Session,
        content: &str,
    ) -> Result<Option<MessageView>, GatewayError> {
        let Some(content) = sanitize_content(content, self.max_len) else {
            debug!("Dropped empty message from {}", session.username());
            return Ok(None);
        };

        let (username, avatar_color) = display_identity(self.store.as_ref(), session).await;
        let message = self
            .store
            .insert_message(room_id, session.user_id(), &content)
            .await?;

        let view = MessageView {
            id: message.id,
            room_id: message.room_id,
            user_id: message.user_id,
            content: message.content,
            message_type: message.message_type,
            created_at: message.created_at,
            username,
            avatar_color,
        };

        let delivered = self
            .rooms
            .broadcast(room_id, &ServerEvent::NewMessage(view.clone()))
            .await;
        debug!(room = %room_id, message = %view.id, delivered, "Message broadcast");

        Ok(Some(view))
    }

    /// Edit a message the session's user wrote. Anything that doesn't match
    /// (wrong author, unknown id) is a silent no-op. The edit is announced in
    /// the room the message is stored in.
    pub async fn edit(
        &self,
        message_id: Uuid,
        session: &Session,
        content: &str,
    ) -> Result<Option<Message>, GatewayError> {
        let Some(author_id) = session.user_id() else {
            return Ok(None);
        };
        let Some(content) = sanitize_content(content, self.max_len) else {
            return Ok(None);
        };

        let Some(message) = self
            .store
            .update_message(message_id, author_id, &content)
            .await?
        else {
            debug!("Edit of {} by {} matched nothing", message_id, session.username());
            return Ok(None);
        };

        self.rooms
            .broadcast(message.room_id, &ServerEvent::MessageEdited(message.clone()))
            .await;
        Ok(Some(message))
    }

    /// Delete a message the session's user wrote. Returns the room it was
    /// removed from; a miss emits nothing.
    pub async fn delete(&self, message_id: Uuid, session: &Session) -> Result<Option<Uuid>, GatewayError> {
        let Some(author_id) = session.user_id() else {
            return Ok(None);
        };

        let Some(room_id) = self.store.delete_message(message_id, author_id).await? else {
            debug!("Delete of {} by {} matched nothing", message_id, session.username());
            return Ok(None);
        };

        self.rooms
            .broadcast(room_id, &ServerEvent::MessageDeleted { message_id, room_id })
            .await;
        Ok(Some(room_id))
    }
}

/// Username and avatar color shown for what `session` sends: the stored
/// profile, else the session's own name with the default color. Anonymous
/// sessions get the fixed anonymous identity.
pub(crate) async fn display_identity(store: &dyn Store, session: &Session) -> (String, String) {
    let Some(user_id) = session.user_id() else {
        return (ANONYMOUS_USERNAME.to_string(), DEFAULT_AVATAR_COLOR.to_string());
    };

    match store.user_profile(user_id).await {
        Ok(Some(profile)) => (profile.username, profile.avatar_color),
        Ok(None) => (session.username().to_string(), DEFAULT_AVATAR_COLOR.to_string()),
        Err(e) => {
            warn!("Profile lookup failed for {}, using session name: {:#}", user_id, e);
            (session.username().to_string(), DEFAULT_AVATAR_COLOR.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Identity;
    use crate::test_support::{ProfileOutageStore, TestStore, drain, general_room};

    fn service(store: &TestStore, rooms: &Arc<RoomCoordinator>) -> MessageService {
        MessageService::new(store.dyn_store(), rooms.clone(), MAX_CONTENT_LEN)
    }

    #[test]
    fn sanitize_trims_and_rejects_blank() {
        assert_eq!(sanitize_content("  hi  ", 10).as_deref(), Some("hi"));
        assert_eq!(sanitize_content(" \n\t ", 10), None);
        assert_eq!(sanitize_content("", 10), None);
    }

    #[test]
    fn sanitize_counts_characters_not_bytes() {
        assert_eq!(sanitize_content("héllo wörld", 5).as_deref(), Some("héllo"));
        assert_eq!(sanitize_content("ééé", 3).as_deref(), Some("ééé"));

        let long = "x".repeat(MAX_CONTENT_LEN + 10);
        assert_eq!(
            sanitize_content(&long, MAX_CONTENT_LEN).map(|s| s.chars().count()),
            Some(MAX_CONTENT_LEN)
        );
    }

    #[tokio::test]
    async fn send_uses_stored_profile() {
        let store = TestStore::new();
        let alice = store.user("alice");
        let rooms = Arc::new(RoomCoordinator::new(store.dyn_store()));
        let messages = service(&store, &rooms);

        // The session name is stale; the stored profile wins
        let (a1, mut rx) = Session::new(Identity::Authenticated {
            user_id: alice.id,
            username: "old-alice".into(),
        });
        rooms.join(general_room(), &a1).await.unwrap();
        drain(&mut rx);

        let view = messages.send(general_room(), &a1, "hello").await.unwrap().unwrap();
        assert_eq!(view.username, "alice");
        assert_eq!(view.avatar_color, "#9B59B6");
        assert_eq!(drain(&mut rx), vec![ServerEvent::NewMessage(view)]);
    }

    #[tokio::test]
    async fn anonymous_messages_carry_fixed_identity() {
        let store = TestStore::new();
        let rooms = Arc::new(RoomCoordinator::new(store.dyn_store()));
        let messages = service(&store, &rooms);

        let (anon, _rx) = Session::new(Identity::Anonymous);
        let view = messages.send(general_room(), &anon, "psst").await.unwrap().unwrap();

        assert_eq!(view.user_id, None);
        assert_eq!(view.username, ANONYMOUS_USERNAME);
        assert_eq!(view.avatar_color, DEFAULT_AVATAR_COLOR);
    }

    #[tokio::test]
    async fn edit_and_delete_are_scoped_to_the_author() {
        let store = TestStore::new();
        let alice = store.user("alice");
        let bob = store.user("bob");
        let rooms = Arc::new(RoomCoordinator::new(store.dyn_store()));
        let messages = service(&store, &rooms);

        let (a1, mut a_rx) = alice.session();
        let (b1, _b_rx) = bob.session();
        rooms.join(general_room(), &a1).await.unwrap();
        let sent = messages.send(general_room(), &a1, "first").await.unwrap().unwrap();
        drain(&mut a_rx);

        assert!(messages.edit(sent.id, &b1, "mine").await.unwrap().is_none());
        assert!(messages.delete(sent.id, &b1).await.unwrap().is_none());
        assert!(drain(&mut a_rx).is_empty());

        let edited = messages.edit(sent.id, &a1, "  second  ").await.unwrap().unwrap();
        assert_eq!(edited.content, "second");
        assert!(edited.edited);
        assert!(edited.edited_at.is_some());
        assert_eq!(drain(&mut a_rx), vec![ServerEvent::MessageEdited(edited)]);

        assert_eq!(messages.delete(sent.id, &a1).await.unwrap(), Some(general_room()));
        assert_eq!(
            drain(&mut a_rx),
            vec![ServerEvent::MessageDeleted {
                message_id: sent.id,
                room_id: general_room()
            }]
        );
        assert!(messages.delete(sent.id, &a1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn edits_are_announced_in_the_stored_room() {
        let store = TestStore::new();
        let alice = store.user("alice");
        let other_room = store.room("random");
        let rooms = Arc::new(RoomCoordinator::new(store.dyn_store()));
        let messages = service(&store, &rooms);

        let (a1, mut a_rx) = alice.session();
        let (watcher, mut other_rx) = store.user("carol").session();
        rooms.join(general_room(), &a1).await.unwrap();
        rooms.join(other_room, &watcher).await.unwrap();
        let sent = messages.send(general_room(), &a1, "first").await.unwrap().unwrap();
        drain(&mut a_rx);
        drain(&mut other_rx);

        let edited = messages.edit(sent.id, &a1, "edited").await.unwrap().unwrap();

        assert_eq!(edited.room_id, general_room());
        assert_eq!(edited.content, "edited");
        assert_eq!(drain(&mut a_rx), vec![ServerEvent::MessageEdited(edited)]);
        assert!(drain(&mut other_rx).is_empty());
    }

    #[tokio::test]
    async fn failed_profile_lookup_still_broadcasts_once() {
        let base = TestStore::new();
        let alice = base.user("alice");
        let store: Arc<dyn Store> = Arc::new(ProfileOutageStore::new(base.dyn_store()));
        let rooms = Arc::new(RoomCoordinator::new(store.clone()));
        let messages = MessageService::new(store, rooms.clone(), MAX_CONTENT_LEN);

        let (a1, mut rx) = alice.session();
        rooms.join(general_room(), &a1).await.unwrap();
        drain(&mut rx);

        let view = messages.send(general_room(), &a1, "hello").await.unwrap().unwrap();
        assert_eq!(view.username, "alice");
        assert_eq!(view.avatar_color, DEFAULT_AVATAR_COLOR);
        assert_eq!(drain(&mut rx), vec![ServerEvent::NewMessage(view)]);

        let stored = base
            .db()
            .get_room_messages(&general_room().to_string(), 10, None, None)
            .unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn blank_edit_is_dropped() {
        let store = TestStore::new();
        let alice = store.user("alice");
        let rooms = Arc::new(RoomCoordinator::new(store.dyn_store()));
        let messages = service(&store, &rooms);

        let (a1, _rx) = alice.session();
        let sent = messages.send(general_room(), &a1, "keep me").await.unwrap().unwrap();

        assert!(messages.edit(sent.id, &a1, "   ").await.unwrap().is_none());
        let row = store.db().get_message(&sent.id.to_string()).unwrap().unwrap();
        assert_eq!(row.content, "keep me");
    }
}
