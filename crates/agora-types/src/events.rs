use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, UserProfile};

/// Commands sent FROM client TO server over the WebSocket gateway.
///
/// Frames look like `{"type": "send_message", "data": {"roomId": ..., "content": ...}}`.
/// Anything that does not deserialize into one of these variants is dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientCommand {
    JoinRoom { room_id: Uuid },

    LeaveRoom { room_id: Uuid },

    SendMessage { room_id: Uuid, content: String },

    TypingStart { room_id: Uuid },

    TypingStop { room_id: Uuid },

    SendDm { receiver_id: Uuid, content: String },

    DmTypingStart { receiver_id: Uuid },

    DmTypingStop { receiver_id: Uuid },

    EditMessage {
        message_id: Uuid,
        content: String,
        room_id: Uuid,
    },

    DeleteMessage { message_id: Uuid, room_id: Uuid },

    /// Nudge the receiver about a request already recorded over REST
    FriendRequest { receiver_id: Uuid },
}

impl ClientCommand {
    /// Wire name of the command, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "join_room",
            Self::LeaveRoom { .. } => "leave_room",
            Self::SendMessage { .. } => "send_message",
            Self::TypingStart { .. } => "typing_start",
            Self::TypingStop { .. } => "typing_stop",
            Self::SendDm { .. } => "send_dm",
            Self::DmTypingStart { .. } => "dm_typing_start",
            Self::DmTypingStop { .. } => "dm_typing_stop",
            Self::EditMessage { .. } => "edit_message",
            Self::DeleteMessage { .. } => "delete_message",
            Self::FriendRequest { .. } => "friend_request",
        }
    }

    /// Generic text reported to the client when handling fails.
    pub fn failure_message(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "Failed to join room",
            Self::LeaveRoom { .. } => "Failed to leave room",
            Self::SendMessage { .. } => "Failed to send message",
            Self::SendDm { .. } => "Failed to send DM",
            Self::EditMessage { .. } => "Failed to edit message",
            Self::DeleteMessage { .. } => "Failed to delete message",
            Self::FriendRequest { .. } => "Failed to send friend request",
            Self::TypingStart { .. }
            | Self::TypingStop { .. }
            | Self::DmTypingStart { .. }
            | Self::DmTypingStop { .. } => "Failed to relay typing state",
        }
    }
}

/// A room message as broadcast to subscribers, with the author's display identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: Uuid,
    pub room_id: Uuid,
    pub user_id: Option<Uuid>,
    pub content: String,
    pub message_type: String,
    pub created_at: DateTime<Utc>,
    pub username: String,
    pub avatar_color: String,
}

/// A direct message as delivered to both parties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectMessageView {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub sender_username: String,
    pub sender_avatar_color: String,
}

/// Events sent FROM server TO client over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Ids of every user with at least one live session
    OnlineUsers(Vec<Uuid>),

    #[serde(rename_all = "camelCase")]
    UserJoined {
        room_id: Uuid,
        user_id: Option<Uuid>,
        username: String,
    },

    #[serde(rename_all = "camelCase")]
    UserLeft {
        room_id: Uuid,
        user_id: Option<Uuid>,
        username: String,
    },

    NewMessage(MessageView),

    #[serde(rename_all = "camelCase")]
    UserTyping {
        user_id: Option<Uuid>,
        username: String,
        room_id: Uuid,
    },

    #[serde(rename_all = "camelCase")]
    UserStopTyping {
        user_id: Option<Uuid>,
        username: String,
        room_id: Uuid,
    },

    NewDm(DirectMessageView),

    #[serde(rename_all = "camelCase")]
    DmUserTyping { user_id: Uuid, username: String },

    #[serde(rename_all = "camelCase")]
    DmUserStopTyping { user_id: Uuid, username: String },

    /// The full updated row
    MessageEdited(Message),

    #[serde(rename_all = "camelCase")]
    MessageDeleted { message_id: Uuid, room_id: Uuid },

    NewFriendRequest { from: UserProfile },

    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
