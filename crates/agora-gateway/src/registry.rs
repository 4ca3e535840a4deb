use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use agora_types::events::ServerEvent;

use crate::session::{Session, SessionId};

/// Tracks every live session and which of them belong to which user.
///
/// A user is online iff `users` holds a non-empty session set for them.
/// Both maps sit behind one lock, and every mutation takes the write half.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<RegistryState>>,
}

#[derive(Default)]
struct RegistryState {
    /// Every live session, anonymous ones included: session_id -> session
    sessions: HashMap<SessionId, Session>,

    /// Authenticated sessions grouped by user: user_id -> session ids
    users: HashMap<Uuid, HashSet<SessionId>>,
}

impl RegistryState {
    fn online_snapshot(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.users.keys().copied().collect();
        ids.sort();
        ids
    }

    fn broadcast_online(&self) {
        let event = ServerEvent::OnlineUsers(self.online_snapshot());
        for session in self.sessions.values() {
            session.send(event.clone());
        }
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a live session. Returns true if it is the user's first session,
    /// i.e. the user just came online. Anonymous sessions always return false.
    ///
    /// Broadcasts the online snapshot to every session before releasing the
    /// lock, so snapshots arrive in mutation order.
    pub async fn register(&self, session: &Session) -> bool {
        let mut state = self.inner.write().await;
        state.sessions.insert(session.id, session.clone());

        let first = match session.user_id() {
            Some(user_id) => {
                let sessions = state.users.entry(user_id).or_default();
                sessions.insert(session.id);
                sessions.len() == 1
            }
            None => false,
        };

        debug!(
            session = %session.id,
            user = session.username(),
            first,
            "Session registered"
        );
        state.broadcast_online();
        first
    }

    /// Remove a live session. Returns true if it was the user's last one,
    /// i.e. the user just went offline. Unknown sessions are ignored.
    pub async fn unregister(&self, session_id: SessionId) -> bool {
        let mut state = self.inner.write().await;
        let Some(session) = state.sessions.remove(&session_id) else {
            return false;
        };

        let mut last = false;
        if let Some(user_id) = session.user_id() {
            if let Some(sessions) = state.users.get_mut(&user_id) {
                sessions.remove(&session_id);
                if sessions.is_empty() {
                    state.users.remove(&user_id);
                    last = true;
                }
            }
        }

        debug!(session = %session_id, user = session.username(), last, "Session unregistered");
        state.broadcast_online();
        last
    }

    /// Ids of the user's live sessions; empty if the user is offline.
    pub async fn sessions_of(&self, user_id: Uuid) -> HashSet<SessionId> {
        self.inner
            .read()
            .await
            .users
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn online_user_ids(&self) -> HashSet<Uuid> {
        self.inner.read().await.users.keys().copied().collect()
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.read().await.users.contains_key(&user_id)
    }

    pub async fn session_count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    /// Deliver `event` to every live session of each listed user. A session
    /// appearing under more than one listed user still receives one copy.
    /// Returns the number of sessions the event was queued for.
    pub async fn send_to_users(&self, user_ids: &[Uuid], event: &ServerEvent) -> usize {
        let state = self.inner.read().await;
        let targets: HashSet<SessionId> = user_ids
            .iter()
            .filter_map(|user_id| state.users.get(user_id))
            .flatten()
            .copied()
            .collect();

        targets
            .iter()
            .filter_map(|id| state.sessions.get(id))
            .filter(|session| session.send(event.clone()))
            .count()
    }

    /// Deliver `event` to every live session of one user.
    pub async fn send_to_user(&self, user_id: Uuid, event: &ServerEvent) -> usize {
        self.send_to_users(&[user_id], event).await
    }
}
