//! Shared fixtures for the gateway's unit tests.

use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{Notify, Semaphore};
use uuid::Uuid;

use agora_db::migrations::GENERAL_ROOM_ID;
use agora_db::models::format_timestamp;
use agora_db::{Database, SqliteStore, Store};
use agora_types::events::ServerEvent;
use agora_types::models::{DirectMessage, Message, PresenceStatus, UserProfile};

use crate::session::{Identity, Session};

pub fn general_room() -> Uuid {
    GENERAL_ROOM_ID.parse().unwrap()
}

/// Everything queued for a session so far.
pub fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// In-memory SQLite store plus helpers to seed it.
pub struct TestStore {
    store: Arc<SqliteStore>,
}

#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: Uuid,
    pub username: String,
}

impl TestUser {
    pub fn identity(&self) -> Identity {
        Identity::Authenticated {
            user_id: self.id,
            username: self.username.clone(),
        }
    }

    pub fn session(&self) -> (Session, UnboundedReceiver<ServerEvent>) {
        Session::new(self.identity())
    }
}

impl TestStore {
    pub fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        Self {
            store: Arc::new(SqliteStore::new(db)),
        }
    }

    pub fn dyn_store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    pub fn db(&self) -> &Arc<Database> {
        self.store.database()
    }

    pub fn user(&self, username: &str) -> TestUser {
        let id = Uuid::new_v4();
        self.db()
            .create_user(
                &id.to_string(),
                username,
                &format!("{}@example.com", username),
                "hash",
                "#9B59B6",
                &format_timestamp(Utc::now()),
            )
            .unwrap();
        TestUser {
            id,
            username: username.to_string(),
        }
    }

    /// A room owned by a throwaway user, so only the owner is a member.
    pub fn room(&self, name: &str) -> Uuid {
        let owner = self.user(&format!("{}-owner", name));
        let id = Uuid::new_v4();
        self.db()
            .create_room(
                &id.to_string(),
                name,
                None,
                &owner.id.to_string(),
                &format_timestamp(Utc::now()),
            )
            .unwrap();
        id
    }

    pub fn member_count(&self, room_id: Uuid) -> u32 {
        self.db().count_room_members(&room_id.to_string()).unwrap()
    }

    pub fn status_of(&self, user_id: Uuid) -> PresenceStatus {
        self.db()
            .get_user_by_id(&user_id.to_string())
            .unwrap()
            .unwrap()
            .into_user()
            .unwrap()
            .status
    }
}

/// A store whose every call fails.
pub struct BrokenStore;

#[async_trait]
impl Store for BrokenStore {
    async fn user_profile(&self, _user_id: Uuid) -> Result<Option<UserProfile>> {
        bail!("store offline")
    }

    async fn set_presence(&self, _user_id: Uuid, _status: PresenceStatus, _at: DateTime<Utc>) -> Result<()> {
        bail!("store offline")
    }

    async fn room_exists(&self, _room_id: Uuid) -> Result<bool> {
        bail!("store offline")
    }

    async fn add_room_member(&self, _room_id: Uuid, _user_id: Uuid) -> Result<bool> {
        bail!("store offline")
    }

    async fn insert_message(&self, _room_id: Uuid, _user_id: Option<Uuid>, _content: &str) -> Result<Message> {
        bail!("store offline")
    }

    async fn update_message(&self, _message_id: Uuid, _author_id: Uuid, _content: &str) -> Result<Option<Message>> {
        bail!("store offline")
    }

    async fn delete_message(&self, _message_id: Uuid, _author_id: Uuid) -> Result<Option<Uuid>> {
        bail!("store offline")
    }

    async fn insert_direct_message(
        &self,
        _sender_id: Uuid,
        _receiver_id: Uuid,
        _content: &str,
    ) -> Result<DirectMessage> {
        bail!("store offline")
    }

    async fn has_pending_friend_request(&self, _requester_id: Uuid, _receiver_id: Uuid) -> Result<bool> {
        bail!("store offline")
    }
}

/// A working store whose profile lookups fail.
pub struct ProfileOutageStore {
    inner: Arc<dyn Store>,
}

impl ProfileOutageStore {
    pub fn new(inner: Arc<dyn Store>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Store for ProfileOutageStore {
    async fn user_profile(&self, _user_id: Uuid) -> Result<Option<UserProfile>> {
        bail!("profile lookup timed out")
    }

    async fn set_presence(&self, user_id: Uuid, status: PresenceStatus, at: DateTime<Utc>) -> Result<()> {
        self.inner.set_presence(user_id, status, at).await
    }

    async fn room_exists(&self, room_id: Uuid) -> Result<bool> {
        self.inner.room_exists(room_id).await
    }

    async fn add_room_member(&self, room_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.inner.add_room_member(room_id, user_id).await
    }

    async fn insert_message(&self, room_id: Uuid, user_id: Option<Uuid>, content: &str) -> Result<Message> {
        self.inner.insert_message(room_id, user_id, content).await
    }

    async fn update_message(&self, message_id: Uuid, author_id: Uuid, content: &str) -> Result<Option<Message>> {
        self.inner.update_message(message_id, author_id, content).await
    }

    async fn delete_message(&self, message_id: Uuid, author_id: Uuid) -> Result<Option<Uuid>> {
        self.inner.delete_message(message_id, author_id).await
    }

    async fn insert_direct_message(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: &str,
    ) -> Result<DirectMessage> {
        self.inner.insert_direct_message(sender_id, receiver_id, content).await
    }

    async fn has_pending_friend_request(&self, requester_id: Uuid, receiver_id: Uuid) -> Result<bool> {
        self.inner.has_pending_friend_request(requester_id, receiver_id).await
    }
}

/// A working store that holds one user's presence writes until released.
pub struct GatedStore {
    inner: Arc<dyn Store>,
    gated_user: Uuid,
    held: Notify,
    gate: Semaphore,
}

impl GatedStore {
    pub fn new(inner: Arc<dyn Store>, gated_user: Uuid) -> Self {
        Self {
            inner,
            gated_user,
            held: Notify::new(),
            gate: Semaphore::new(0),
        }
    }

    /// Resolves once a write for the gated user is waiting.
    pub async fn wait_until_held(&self) {
        self.held.notified().await;
    }

    /// Let the held write, and every later one, through.
    pub fn release(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl Store for GatedStore {
    async fn user_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        self.inner.user_profile(user_id).await
    }

    async fn set_presence(&self, user_id: Uuid, status: PresenceStatus, at: DateTime<Utc>) -> Result<()> {
        if user_id == self.gated_user {
            self.held.notify_one();
            let _permit = self.gate.acquire().await?;
        }
        self.inner.set_presence(user_id, status, at).await
    }

    async fn room_exists(&self, room_id: Uuid) -> Result<bool> {
        self.inner.room_exists(room_id).await
    }

    async fn add_room_member(&self, room_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.inner.add_room_member(room_id, user_id).await
    }

    async fn insert_message(&self, room_id: Uuid, user_id: Option<Uuid>, content: &str) -> Result<Message> {
        self.inner.insert_message(room_id, user_id, content).await
    }

    async fn update_message(&self, message_id: Uuid, author_id: Uuid, content: &str) -> Result<Option<Message>> {
        self.inner.update_message(message_id, author_id, content).await
    }

    async fn delete_message(&self, message_id: Uuid, author_id: Uuid) -> Result<Option<Uuid>> {
        self.inner.delete_message(message_id, author_id).await
    }

    async fn insert_direct_message(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: &str,
    ) -> Result<DirectMessage> {
        self.inner.insert_direct_message(sender_id, receiver_id, content).await
    }

    async fn has_pending_friend_request(&self, requester_id: Uuid, receiver_id: Uuid) -> Result<bool> {
        self.inner.has_pending_friend_request(requester_id, receiver_id).await
    }
}
