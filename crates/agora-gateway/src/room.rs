//! A room's live side: the sessions currently receiving its broadcasts.
//!
//! Persisted membership lives in the store and is independent of this set.

use std::collections::HashMap;

use tracing::trace;
use uuid::Uuid;

use agora_types::events::ServerEvent;

use crate::session::{Session, SessionId};

/// A room's subscriber set plus the broadcast operation over it.
#[derive(Debug)]
pub struct Room {
    id: Uuid,
    subscribers: HashMap<SessionId, Session>,
}

impl Room {
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            subscribers: HashMap::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    #[must_use]
    pub fn is_subscribed(&self, session_id: SessionId) -> bool {
        self.subscribers.contains_key(&session_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Returns `true` if the session was not already subscribed.
    pub fn subscribe(&mut self, session: Session) -> bool {
        self.subscribers.insert(session.id, session).is_none()
    }

    /// Returns the removed session, if it was subscribed.
    pub fn unsubscribe(&mut self, session_id: SessionId) -> Option<Session> {
        self.subscribers.remove(&session_id)
    }

    /// Best-effort delivery to every current subscriber. Returns how many
    /// sessions the event was queued for.
    pub fn broadcast(&self, event: &ServerEvent) -> usize {
        self.deliver(event, None)
    }

    /// Like [`Room::broadcast`], skipping one session.
    pub fn broadcast_except(&self, event: &ServerEvent, except: SessionId) -> usize {
        self.deliver(event, Some(except))
    }

    fn deliver(&self, event: &ServerEvent, except: Option<SessionId>) -> usize {
        let mut delivered = 0;
        for (id, session) in &self.subscribers {
            if Some(*id) == except {
                continue;
            }
            if session.send(event.clone()) {
                delivered += 1;
            }
        }
        trace!(room = %self.id, delivered, "Room broadcast");
        delivered
    }
}
