use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use agora_db::models::format_timestamp;
use agora_types::api::{Claims, Friend};

use crate::{AppState, blocking};

/// Accepted friends of the caller.
pub async fn list_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Friend>>, StatusCode> {
    let me = claims.sub.to_string();
    let friends = blocking(&state, move |db| {
        db.list_friends(&me)?
            .into_iter()
            .map(|row| row.into_friend())
            .collect::<anyhow::Result<Vec<_>>>()
    })
    .await?;

    Ok(Json(friends))
}

/// Requests waiting on the caller, one entry per requester.
pub async fn pending(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Friend>>, StatusCode> {
    let me = claims.sub.to_string();
    let requests = blocking(&state, move |db| {
        db.list_pending_requests(&me)?
            .into_iter()
            .map(|row| row.into_friend())
            .collect::<anyhow::Result<Vec<_>>>()
    })
    .await?;

    Ok(Json(requests))
}

/// Record a request to `user_id`. `sent` is false when the pair already has
/// a request or friendship in either direction. Clients follow up with a
/// `friend_request` gateway command to notify the receiver live.
pub async fn request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Value>, StatusCode> {
    if user_id == claims.sub {
        return Err(StatusCode::BAD_REQUEST);
    }

    let (me, peer) = (claims.sub.to_string(), user_id.to_string());
    let sent = blocking(&state, move |db| {
        if db.get_user_by_id(&peer)?.is_none() {
            return Ok(None);
        }
        db.request_friend(
            &Uuid::new_v4().to_string(),
            &me,
            &peer,
            &format_timestamp(Utc::now()),
        )
        .map(Some)
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    if sent {
        info!("{} sent a friend request to {}", claims.username, user_id);
    }
    Ok(Json(json!({ "sent": sent })))
}

/// Accept the pending request `user_id` sent to the caller.
pub async fn accept(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Value>, StatusCode> {
    let (me, peer) = (claims.sub.to_string(), user_id.to_string());
    if !blocking(&state, move |db| db.accept_friend(&peer, &me)).await? {
        return Err(StatusCode::NOT_FOUND);
    }

    info!("{} accepted a friend request from {}", claims.username, user_id);
    Ok(Json(json!({ "accepted": true })))
}

/// Unfriend, or withdraw/decline a request, in either direction.
pub async fn remove(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Value>, StatusCode> {
    let (me, peer) = (claims.sub.to_string(), user_id.to_string());
    let removed = blocking(&state, move |db| db.remove_friend(&me, &peer)).await?;

    Ok(Json(json!({ "removed": removed })))
}
