use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::debug;
use uuid::Uuid;

use agora_db::models::parse_id;
use agora_types::api::{Claims, DirectMessageResponse, UnreadCount};

use crate::{AppState, blocking};

const CONVERSATION_PAGE: u32 = 50;

/// Unread DM counts for the caller, grouped by sender.
pub async fn unread(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<UnreadCount>>, StatusCode> {
    let me = claims.sub.to_string();
    let counts = blocking(&state, move |db| {
        db.unread_counts(&me)?
            .into_iter()
            .map(|(sender, count)| {
                Ok(UnreadCount {
                    sender_id: parse_id(&sender)?,
                    count,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()
    })
    .await?;

    Ok(Json(counts))
}

/// The latest messages with `user_id`, oldest first. Fetching the
/// conversation marks everything the peer sent to the caller as read; the
/// returned rows still show their state from before the fetch.
pub async fn conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<DirectMessageResponse>>, StatusCode> {
    let me = claims.sub.to_string();
    let peer = user_id.to_string();

    let messages = blocking(&state, move |db| {
        let mut rows = db.get_conversation(&me, &peer, CONVERSATION_PAGE)?;
        let marked = db.mark_conversation_read(&peer, &me)?;
        debug!("Marked {} DMs from {} as read", marked, peer);

        rows.reverse();
        rows.into_iter()
            .map(|row| {
                let dm = row.message.into_direct_message()?;
                Ok(DirectMessageResponse {
                    id: dm.id,
                    sender_id: dm.sender_id,
                    receiver_id: dm.receiver_id,
                    content: dm.content,
                    read: dm.read,
                    created_at: dm.created_at,
                    sender_username: row.sender_username,
                    sender_avatar_color: row.sender_avatar_color,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()
    })
    .await?;

    Ok(Json(messages))
}
