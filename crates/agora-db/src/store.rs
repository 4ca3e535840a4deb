//! Async persistence interface consumed by the gateway.
//!
//! The gateway never talks SQL. It calls [`Store`], and [`SqliteStore`] runs
//! each call on the blocking pool so a handler awaiting a write never stalls
//! the runtime.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use agora_types::models::{DirectMessage, Message, PresenceStatus, UserProfile};

use crate::Database;
use crate::models::{format_timestamp, parse_id};

#[async_trait]
pub trait Store: Send + Sync {
    /// Display identity for `user_id`, if the user exists.
    async fn user_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>>;

    /// Persist a presence transition and its last-seen time.
    async fn set_presence(&self, user_id: Uuid, status: PresenceStatus, at: DateTime<Utc>) -> Result<()>;

    async fn room_exists(&self, room_id: Uuid) -> Result<bool>;

    /// Idempotent membership insert. Returns true if a new row was written.
    async fn add_room_member(&self, room_id: Uuid, user_id: Uuid) -> Result<bool>;

    async fn insert_message(&self, room_id: Uuid, user_id: Option<Uuid>, content: &str) -> Result<Message>;

    /// Edit scoped to `id` and author. `None` when nothing matched.
    async fn update_message(&self, message_id: Uuid, author_id: Uuid, content: &str) -> Result<Option<Message>>;

    /// Delete scoped to `id` and author. Returns the room the message was in,
    /// or `None` when nothing matched.
    async fn delete_message(&self, message_id: Uuid, author_id: Uuid) -> Result<Option<Uuid>>;

    async fn insert_direct_message(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: &str,
    ) -> Result<DirectMessage>;

    /// True if `requester_id` has a friend request waiting on `receiver_id`.
    async fn has_pending_friend_request(&self, requester_id: Uuid, receiver_id: Uuid) -> Result<bool>;
}

/// [`Store`] backed by the SQLite [`Database`].
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
}

impl SqliteStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Run a blocking DB call off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| anyhow!("spawn_blocking join error: {}", e))?
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn user_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        self.blocking(move |db| {
            db.get_user_by_id(&user_id.to_string())?
                .map(|row| row.into_profile())
                .transpose()
        })
        .await
    }

    async fn set_presence(&self, user_id: Uuid, status: PresenceStatus, at: DateTime<Utc>) -> Result<()> {
        self.blocking(move |db| {
            if !db.set_user_status(&user_id.to_string(), status.as_str(), &format_timestamp(at))? {
                tracing::debug!("Presence update for unknown user {}", user_id);
            }
            Ok(())
        })
        .await
    }

    async fn room_exists(&self, room_id: Uuid) -> Result<bool> {
        self.blocking(move |db| db.room_exists(&room_id.to_string())).await
    }

    async fn add_room_member(&self, room_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.blocking(move |db| {
            db.add_room_member(
                &room_id.to_string(),
                &user_id.to_string(),
                &format_timestamp(Utc::now()),
            )
        })
        .await
    }

    async fn insert_message(&self, room_id: Uuid, user_id: Option<Uuid>, content: &str) -> Result<Message> {
        let content = content.to_string();
        self.blocking(move |db| {
            let author = user_id.map(|id| id.to_string());
            db.insert_message(
                &Uuid::new_v4().to_string(),
                &room_id.to_string(),
                author.as_deref(),
                &content,
                &format_timestamp(Utc::now()),
            )?
            .into_message()
        })
        .await
    }

    async fn update_message(&self, message_id: Uuid, author_id: Uuid, content: &str) -> Result<Option<Message>> {
        let content = content.to_string();
        self.blocking(move |db| {
            db.update_message(
                &message_id.to_string(),
                &author_id.to_string(),
                &content,
                &format_timestamp(Utc::now()),
            )?
            .map(|row| row.into_message())
            .transpose()
        })
        .await
    }

    async fn delete_message(&self, message_id: Uuid, author_id: Uuid) -> Result<Option<Uuid>> {
        self.blocking(move |db| {
            db.delete_message(&message_id.to_string(), &author_id.to_string())?
                .map(|room_id| parse_id(&room_id))
                .transpose()
        })
        .await
    }

    async fn insert_direct_message(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: &str,
    ) -> Result<DirectMessage> {
        let content = content.to_string();
        self.blocking(move |db| {
            db.insert_direct_message(
                &Uuid::new_v4().to_string(),
                &sender_id.to_string(),
                &receiver_id.to_string(),
                &content,
                &format_timestamp(Utc::now()),
            )?
            .into_direct_message()
        })
        .await
    }

    async fn has_pending_friend_request(&self, requester_id: Uuid, receiver_id: Uuid) -> Result<bool> {
        self.blocking(move |db| {
            db.has_pending_request(&requester_id.to_string(), &receiver_id.to_string())
        })
        .await
    }
}
