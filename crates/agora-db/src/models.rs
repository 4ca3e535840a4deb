//! Database row types. These map directly to SQLite rows; ids and timestamps
//! stay as TEXT here and are parsed into domain models at the edge.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use agora_types::api::{Friend, RoomMember};
use agora_types::models::{DirectMessage, Message, PresenceStatus, Room, User, UserProfile};

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub avatar_color: String,
    pub status: String,
    pub last_seen: Option<String>,
    pub created_at: String,
}

pub struct RoomRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: Option<String>,
    pub is_private: bool,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub room_id: String,
    pub user_id: Option<String>,
    pub content: String,
    pub message_type: String,
    pub edited: bool,
    pub edited_at: Option<String>,
    pub created_at: String,
}

/// A message joined with its author, for history pages.
pub struct MessageWithAuthorRow {
    pub message: MessageRow,
    pub username: Option<String>,
    pub avatar_color: Option<String>,
}

pub struct DirectMessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub read: bool,
    pub created_at: String,
}

pub struct DirectMessageWithSenderRow {
    pub message: DirectMessageRow,
    pub sender_username: String,
    pub sender_avatar_color: String,
}

/// A persisted room member joined with their user row.
pub struct RoomMemberRow {
    pub user_id: String,
    pub username: String,
    pub avatar_color: String,
    pub status: String,
    pub role: String,
}

/// The other side of a friendship or pending request.
pub struct FriendRow {
    pub user_id: String,
    pub username: String,
    pub avatar_color: String,
    pub status: String,
    pub since: String,
}

/// Timestamp format written by the application. Lexicographic order equals
/// chronological order, which the history queries rely on.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("corrupt timestamp '{}'", raw))
}

pub fn parse_id(raw: &str) -> Result<Uuid> {
    raw.parse().with_context(|| format!("corrupt id '{}'", raw))
}

fn parse_optional_id(raw: Option<&str>) -> Result<Option<Uuid>> {
    raw.map(parse_id).transpose()
}

fn parse_status(raw: &str) -> Result<PresenceStatus> {
    raw.parse::<PresenceStatus>().map_err(anyhow::Error::msg)
}

fn parse_optional_timestamp(raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    raw.map(parse_timestamp).transpose()
}

impl UserRow {
    pub fn into_user(self) -> Result<User> {
        Ok(User {
            id: parse_id(&self.id)?,
            status: parse_status(&self.status)?,
            last_seen: parse_optional_timestamp(self.last_seen.as_deref())?,
            created_at: parse_timestamp(&self.created_at)?,
            username: self.username,
            email: self.email,
            avatar_color: self.avatar_color,
        })
    }

    pub fn into_profile(self) -> Result<UserProfile> {
        Ok(UserProfile {
            id: parse_id(&self.id)?,
            username: self.username,
            avatar_color: self.avatar_color,
        })
    }
}

impl RoomRow {
    pub fn into_room(self) -> Result<Room> {
        Ok(Room {
            id: parse_id(&self.id)?,
            owner_id: parse_optional_id(self.owner_id.as_deref())?,
            created_at: parse_timestamp(&self.created_at)?,
            name: self.name,
            description: self.description,
            is_private: self.is_private,
        })
    }
}

impl MessageRow {
    pub fn into_message(self) -> Result<Message> {
        Ok(Message {
            id: parse_id(&self.id)?,
            room_id: parse_id(&self.room_id)?,
            user_id: parse_optional_id(self.user_id.as_deref())?,
            edited_at: parse_optional_timestamp(self.edited_at.as_deref())?,
            created_at: parse_timestamp(&self.created_at)?,
            content: self.content,
            message_type: self.message_type,
            edited: self.edited,
        })
    }
}

impl RoomMemberRow {
    pub fn into_member(self) -> Result<RoomMember> {
        Ok(RoomMember {
            id: parse_id(&self.user_id)?,
            status: parse_status(&self.status)?,
            username: self.username,
            avatar_color: self.avatar_color,
            role: self.role,
        })
    }
}

impl FriendRow {
    pub fn into_friend(self) -> Result<Friend> {
        Ok(Friend {
            id: parse_id(&self.user_id)?,
            status: parse_status(&self.status)?,
            since: parse_timestamp(&self.since)?,
            username: self.username,
            avatar_color: self.avatar_color,
        })
    }
}

impl DirectMessageRow {
    pub fn into_direct_message(self) -> Result<DirectMessage> {
        Ok(DirectMessage {
            id: parse_id(&self.id)?,
            sender_id: parse_id(&self.sender_id)?,
            receiver_id: parse_id(&self.receiver_id)?,
            created_at: parse_timestamp(&self.created_at)?,
            content: self.content,
            read: self.read,
        })
    }
}
