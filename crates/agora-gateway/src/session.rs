use std::fmt;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use agora_types::events::ServerEvent;

/// Display name used for sessions without a verified user.
pub const ANONYMOUS_USERNAME: &str = "anonymous";

/// Avatar color for anonymous authors, and for users whose profile is missing.
pub const DEFAULT_AVATAR_COLOR: &str = "#4A90D9";

/// Identifier of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who is on the other end of a session. Resolved once, at handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Authenticated { user_id: Uuid, username: String },
    Anonymous,
}

impl Identity {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Self::Authenticated { user_id, .. } => Some(*user_id),
            Self::Anonymous => None,
        }
    }

    pub fn username(&self) -> &str {
        match self {
            Self::Authenticated { username, .. } => username,
            Self::Anonymous => ANONYMOUS_USERNAME,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }
}

/// One live connection: `Connecting -> {Authenticated | Anonymous} ->
/// JoinedRoom(0..N) -> Disconnected`.
///
/// Cloning is cheap and every clone feeds the same outbound queue; the
/// registry and each joined room hold one. Never persisted.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub identity: Identity,
    pub connected_at: DateTime<Utc>,
    outbox: mpsc::UnboundedSender<ServerEvent>,
}

impl Session {
    /// Create a session and the receiving end of its outbound queue.
    pub fn new(identity: Identity) -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (outbox, rx) = mpsc::unbounded_channel();
        let session = Self {
            id: SessionId::generate(),
            identity,
            connected_at: Utc::now(),
            outbox,
        };
        (session, rx)
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.identity.user_id()
    }

    pub fn username(&self) -> &str {
        self.identity.username()
    }

    /// Queue an event for this session. Returns false once the connection
    /// has gone away; callers treat that as a dropped delivery.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.outbox.send(event).is_ok()
    }
}
