use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use rand::seq::IndexedRandom;
use rand_core::OsRng;
use tracing::{error, info};
use uuid::Uuid;

use agora_db::models::format_timestamp;
use agora_types::api::{AuthResponse, Claims, LoginRequest, RegisterRequest, UserSummary};
use agora_types::models::User;

use crate::{AppState, blocking};

/// Avatar colors handed out at registration.
pub const AVATAR_COLORS: [&str; 7] = [
    "#E74C3C", "#3498DB", "#2ECC71", "#F39C12", "#9B59B6", "#1ABC9C", "#E67E22",
];

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.username.chars().count() < 3 || req.email.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    if req.password.chars().count() < 6 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let (username, email) = (req.username.clone(), req.email.clone());
    if blocking(&state, move |db| db.user_exists(&username, &email)).await? {
        return Err(StatusCode::CONFLICT);
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .to_string();

    let color = AVATAR_COLORS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(AVATAR_COLORS[0]);

    let user_id = Uuid::new_v4();
    let user = blocking(&state, move |db| {
        let id = user_id.to_string();
        db.create_user(
            &id,
            &req.username,
            &req.email,
            &password_hash,
            color,
            &format_timestamp(Utc::now()),
        )?;
        fetch_user(db, &id)
    })
    .await?;

    let token = create_token(&state.jwt_secret, user.id, &user.username, state.token_ttl_days)
        .map_err(|e| {
            error!("Token signing failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    info!("Registered {} ({})", user.username, user.id);
    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

/// Issues a token. Presence is left alone: only live connections move it.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, StatusCode> {
    let email = req.email.clone();
    let row = blocking(&state, move |db| db.get_user_by_email(&email))
        .await?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // Verify password
    let parsed_hash =
        PasswordHash::new(&row.password).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let user = row.into_user().map_err(|e| {
        error!("Corrupt user row: {:#}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let token = create_token(&state.jwt_secret, user.id, &user.username, state.token_ttl_days)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(AuthResponse { token, user }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<User>, StatusCode> {
    let id = claims.sub.to_string();
    let row = blocking(&state, move |db| db.get_user_by_id(&id))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    row.into_user().map(Json).map_err(|e| {
        error!("Corrupt user row: {:#}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// Everyone except the caller, by username. Used to start DMs.
pub async fn users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<UserSummary>>, StatusCode> {
    let id = claims.sub.to_string();
    let users = blocking(&state, move |db| {
        db.list_users_except(&id)?
            .into_iter()
            .map(|row| {
                let user = row.into_user()?;
                Ok(UserSummary {
                    id: user.id,
                    username: user.username,
                    avatar_color: user.avatar_color,
                    status: user.status,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()
    })
    .await?;

    Ok(Json(users))
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str, ttl_days: i64) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (Utc::now() + Duration::days(ttl_days)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

fn fetch_user(db: &agora_db::Database, id: &str) -> anyhow::Result<User> {
    db.get_user_by_id(id)?
        .ok_or_else(|| anyhow::anyhow!("user {} vanished after insert", id))?
        .into_user()
}
