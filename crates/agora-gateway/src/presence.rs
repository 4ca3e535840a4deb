//! Online/offline transitions and their persisted side.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{error, info};
use uuid::Uuid;

use agora_db::Store;
use agora_types::models::PresenceStatus;

use crate::registry::ConnectionRegistry;
use crate::session::{Session, SessionId};

/// Couples registry mutations with the persisted status write they gate.
///
/// Transitions are serialized per user, so a fast reconnect cannot persist
/// `online` before the preceding disconnect persists `offline`. Different
/// users never wait on each other's writes.
pub struct PresenceTracker {
    registry: ConnectionRegistry,
    store: Arc<dyn Store>,
    /// One transition lock per user with a transition in flight
    transitions: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl PresenceTracker {
    pub fn new(registry: ConnectionRegistry, store: Arc<dyn Store>) -> Self {
        Self {
            registry,
            store,
            transitions: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Register a session; the user's first session flips them online.
    pub async fn connect(&self, session: &Session) {
        let Some(user_id) = session.user_id() else {
            self.registry.register(session).await;
            return;
        };

        let lock = self.lock_for(user_id).await;
        {
            let _guard = lock.lock().await;
            if self.registry.register(session).await {
                info!("{} ({}) is now online", session.username(), user_id);
                self.persist(user_id, PresenceStatus::Online).await;
            }
        }
        self.release(user_id, lock).await;
    }

    /// Unregister a session; the user's last session flips them offline.
    pub async fn disconnect(&self, session_id: SessionId, user_id: Option<Uuid>) {
        let Some(user_id) = user_id else {
            self.registry.unregister(session_id).await;
            return;
        };

        let lock = self.lock_for(user_id).await;
        {
            let _guard = lock.lock().await;
            if self.registry.unregister(session_id).await {
                info!("User {} is now offline", user_id);
                self.persist(user_id, PresenceStatus::Offline).await;
            }
        }
        self.release(user_id, lock).await;
    }

    async fn lock_for(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        self.transitions
            .lock()
            .await
            .entry(user_id)
            .or_default()
            .clone()
    }

    /// Forget the user's lock once no other transition holds a handle to it.
    async fn release(&self, user_id: Uuid, lock: Arc<Mutex<()>>) {
        let mut transitions = self.transitions.lock().await;
        // The map's handle plus ours
        if Arc::strong_count(&lock) == 2 {
            transitions.remove(&user_id);
        }
    }

    async fn persist(&self, user_id: Uuid, status: PresenceStatus) {
        if let Err(e) = self.store.set_presence(user_id, status, Utc::now()).await {
            // The live registry stays authoritative; the row catches up on
            // the next transition.
            error!("Failed to persist {} for user {}: {:#}", status, user_id, e);
        }
    }

    #[cfg(test)]
    async fn pending_transitions(&self) -> usize {
        self.transitions.lock().await.len()
    }
}
