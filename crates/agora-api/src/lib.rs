//! REST surface: accounts, rooms and their history, DM history, friends.

pub mod auth;
pub mod dms;
pub mod friends;
pub mod middleware;
pub mod rooms;

use std::sync::Arc;

use axum::{
    Router,
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
};
use tracing::error;

use agora_db::Database;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
}

/// All `/api` routes. Everything except register, login and the public room
/// list requires a bearer token.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/rooms/public", get(rooms::public_rooms));

    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/users", get(auth::users))
        .route("/api/rooms", get(rooms::list_rooms).post(rooms::create_room))
        .route("/api/rooms/{room_id}/messages", get(rooms::room_messages))
        .route("/api/rooms/{room_id}/members", get(rooms::room_members))
        .route("/api/rooms/{room_id}/join", post(rooms::join_room))
        .route("/api/dm/unread", get(dms::unread))
        .route("/api/dm/{user_id}", get(dms::conversation))
        .route("/api/friends", get(friends::list_friends))
        .route("/api/friends/pending", get(friends::pending))
        .route("/api/friends/request/{user_id}", post(friends::request))
        .route("/api/friends/accept/{user_id}", post(friends::accept))
        .route("/api/friends/{user_id}", delete(friends::remove))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

/// Run a blocking DB call off the async runtime, mapping any failure to 500.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, StatusCode>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("Database error: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}
