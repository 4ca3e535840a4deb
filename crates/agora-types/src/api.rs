use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{PresenceStatus, User};

// -- JWT Claims --

/// JWT claims shared across agora-api (token issuance, REST middleware) and
/// agora-gateway (handshake verification).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Returned by both register and login.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub avatar_color: String,
    pub status: PresenceStatus,
}

// -- Rooms --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRoomRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublicRoom {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub member_count: u32,
}

/// A persisted member of a room.
#[derive(Debug, Serialize, Deserialize)]
pub struct RoomMember {
    pub id: Uuid,
    pub username: String,
    pub avatar_color: String,
    pub status: PresenceStatus,
    pub role: String,
}

/// A room history entry, with the author's display identity when known.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub room_id: Uuid,
    pub user_id: Option<Uuid>,
    pub content: String,
    pub message_type: String,
    pub edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub username: Option<String>,
    pub avatar_color: Option<String>,
}

// -- Direct messages --

#[derive(Debug, Serialize, Deserialize)]
pub struct DirectMessageResponse {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub sender_username: String,
    pub sender_avatar_color: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadCount {
    pub sender_id: Uuid,
    pub count: u32,
}

// -- Friends --

/// Either an accepted friend or the sender of a pending request.
#[derive(Debug, Serialize, Deserialize)]
pub struct Friend {
    pub id: Uuid,
    pub username: String,
    pub avatar_color: String,
    pub status: PresenceStatus,
    pub since: DateTime<Utc>,
}
