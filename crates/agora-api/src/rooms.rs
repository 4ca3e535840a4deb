use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use agora_db::models::{MessageWithAuthorRow, format_timestamp, parse_timestamp};
use agora_types::api::{
    Claims, CreateRoomRequest, MessageResponse, PublicRoom, RoomMember, RoomSummary,
};

use crate::{AppState, blocking};

const MAX_PAGE: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor: `created_at` (RFC 3339) of the oldest message already seen.
    pub before: Option<String>,
    /// Id of that message. Without it the cursor skips its whole timestamp.
    pub before_id: Option<Uuid>,
}

fn default_limit() -> u32 {
    50
}

pub async fn public_rooms(State(state): State<AppState>) -> Result<Json<Vec<PublicRoom>>, StatusCode> {
    let rooms = blocking(&state, |db| {
        db.list_public_rooms()?
            .into_iter()
            .map(|(row, _)| {
                let room = row.into_room()?;
                Ok(PublicRoom {
                    id: room.id,
                    name: room.name,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()
    })
    .await?;

    Ok(Json(rooms))
}

pub async fn list_rooms(State(state): State<AppState>) -> Result<Json<Vec<RoomSummary>>, StatusCode> {
    let rooms = blocking(&state, |db| {
        db.list_public_rooms()?
            .into_iter()
            .map(|(row, member_count)| {
                let room = row.into_room()?;
                Ok(RoomSummary {
                    id: room.id,
                    name: room.name,
                    description: room.description,
                    created_at: room.created_at,
                    member_count,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()
    })
    .await?;

    Ok(Json(rooms))
}

/// Create a public room. Names are stored trimmed and lowercased; the
/// creator becomes its owner and first member.
pub async fn create_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let name = req.name.trim().to_lowercase();
    if name.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let description = req
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());

    let room_name = name.clone();
    let room = blocking(&state, move |db| {
        if db.room_name_taken(&room_name)? {
            return Ok(None);
        }
        let row = db.create_room(
            &Uuid::new_v4().to_string(),
            &room_name,
            description.as_deref(),
            &claims.sub.to_string(),
            &format_timestamp(Utc::now()),
        )?;
        row.into_room().map(Some)
    })
    .await?
    .ok_or(StatusCode::CONFLICT)?;

    info!("Room '{}' ({}) created", room.name, room.id);
    Ok((StatusCode::CREATED, Json(room)))
}

/// A page of room history in chronological order, newest page first.
pub async fn room_messages(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
) -> Result<Json<Vec<MessageResponse>>, StatusCode> {
    let limit = query.limit.clamp(1, MAX_PAGE);
    let before = query
        .before
        .as_deref()
        .map(|raw| parse_timestamp(raw).map(format_timestamp))
        .transpose()
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let before_id = query.before_id.map(|id| id.to_string());

    let messages = blocking(&state, move |db| {
        let mut rows = db.get_room_messages(
            &room_id.to_string(),
            limit,
            before.as_deref(),
            before_id.as_deref(),
        )?;
        rows.reverse();
        rows.into_iter()
            .map(message_response)
            .collect::<anyhow::Result<Vec<_>>>()
    })
    .await?;

    Ok(Json(messages))
}

/// Persisted members of a room. Unknown rooms are 404.
pub async fn room_members(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<Vec<RoomMember>>, StatusCode> {
    let members = blocking(&state, move |db| {
        let id = room_id.to_string();
        if !db.room_exists(&id)? {
            return Ok(None);
        }
        db.get_room_members(&id)?
            .into_iter()
            .map(|row| row.into_member())
            .collect::<anyhow::Result<Vec<_>>>()
            .map(Some)
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(members))
}

/// Persist the caller's membership without subscribing any live session.
/// Repeat joins succeed.
pub async fn join_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let added = blocking(&state, move |db| {
        let id = room_id.to_string();
        if !db.room_exists(&id)? {
            return Ok(None);
        }
        db.add_room_member(&id, &claims.sub.to_string(), &format_timestamp(Utc::now()))
            .map(Some)
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    if added {
        info!("User {} became a member of {}", claims.sub, room_id);
    }
    Ok(Json(json!({ "joined": true })))
}

fn message_response(row: MessageWithAuthorRow) -> anyhow::Result<MessageResponse> {
    let message = row.message.into_message()?;
    Ok(MessageResponse {
        id: message.id,
        room_id: message.room_id,
        user_id: message.user_id,
        content: message.content,
        message_type: message.message_type,
        edited: message.edited,
        edited_at: message.edited_at,
        created_at: message.created_at,
        username: row.username,
        avatar_color: row.avatar_color,
    })
}
