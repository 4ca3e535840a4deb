use std::str::FromStr;

use jsonwebtoken::{DecodingKey, Validation, decode};
use thiserror::Error;
use tracing::warn;

use agora_types::api::Claims;

use crate::session::Identity;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

/// Verifies handshake credentials. Invoked exactly once per connection.
pub trait AuthGate: Send + Sync {
    fn verify(&self, token: &str) -> Result<Claims, AuthError>;
}

/// HS256 JWT verification with a shared secret.
pub struct JwtGate {
    key: DecodingKey,
    validation: Validation,
}

impl JwtGate {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }
}

impl AuthGate for JwtGate {
    fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)?;
        Ok(data.claims)
    }
}

/// What happens to a connection whose handshake carries no valid token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnonymousPolicy {
    /// Continue as an anonymous session that may join rooms, post and type.
    #[default]
    Allow,
    /// Continue anonymously, but only to receive: sends and typing are dropped.
    ReadOnly,
    /// Refuse the connection.
    Reject,
}

impl AnonymousPolicy {
    pub fn may_post(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

impl FromStr for AnonymousPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "read_only" | "readonly" => Ok(Self::ReadOnly),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown anonymous policy: {}", other)),
        }
    }
}

/// Resolve the identity for a new connection. `None` means the policy
/// refuses it; every other failure degrades to [`Identity::Anonymous`].
pub fn resolve_identity(
    gate: &dyn AuthGate,
    token: Option<&str>,
    policy: AnonymousPolicy,
) -> Option<Identity> {
    let identity = match token.filter(|t| !t.is_empty()) {
        Some(token) => match gate.verify(token) {
            Ok(claims) => Identity::Authenticated {
                user_id: claims.sub,
                username: claims.username,
            },
            Err(e) => {
                warn!("Handshake token rejected, continuing anonymously: {}", e);
                Identity::Anonymous
            }
        },
        None => Identity::Anonymous,
    };

    if !identity.is_authenticated() && policy == AnonymousPolicy::Reject {
        return None;
    }
    Some(identity)
}
