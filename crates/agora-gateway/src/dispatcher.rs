use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use agora_db::Store;
use agora_types::events::{ClientCommand, ServerEvent};

use crate::auth::AnonymousPolicy;
use crate::direct::DirectMessageService;
use crate::error::GatewayError;
use crate::messages::{MAX_CONTENT_LEN, MessageService};
use crate::presence::PresenceTracker;
use crate::registry::ConnectionRegistry;
use crate::rooms::RoomCoordinator;
use crate::session::{Identity, Session};
use crate::typing::TypingRelay;

/// Gateway tunables.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Longest accepted message or DM body, in characters
    pub max_content_len: usize,

    pub anonymous_policy: AnonymousPolicy,

    /// Interval between WebSocket pings
    pub heartbeat_interval: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_content_len: MAX_CONTENT_LEN,
            anonymous_policy: AnonymousPolicy::default(),
            heartbeat_interval: Duration::from_secs(15),
        }
    }
}

/// Routes every inbound command to the component that owns it.
/// Cloned into each connection; all clones share one set of live state.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    config: GatewayConfig,
    presence: PresenceTracker,
    rooms: Arc<RoomCoordinator>,
    messages: MessageService,
    direct: DirectMessageService,
    typing: TypingRelay,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Store>, config: GatewayConfig) -> Self {
        let registry = ConnectionRegistry::new();
        let rooms = Arc::new(RoomCoordinator::new(store.clone()));

        Self {
            inner: Arc::new(DispatcherInner {
                presence: PresenceTracker::new(registry.clone(), store.clone()),
                messages: MessageService::new(store.clone(), rooms.clone(), config.max_content_len),
                direct: DirectMessageService::new(store, registry, config.max_content_len),
                typing: TypingRelay::new(rooms.clone()),
                rooms,
                config,
            }),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        self.inner.presence.registry()
    }

    pub fn rooms(&self) -> &RoomCoordinator {
        &self.inner.rooms
    }

    /// Open a session for an already-resolved identity and register it.
    /// The receiver is the session's outbound queue.
    pub async fn connect(&self, identity: Identity) -> (Session, mpsc::UnboundedReceiver<ServerEvent>) {
        let (session, rx) = Session::new(identity);
        info!(
            "{} connected (session {}, {})",
            session.username(),
            session.id,
            if session.identity.is_authenticated() { "authenticated" } else { "anonymous" }
        );
        self.inner.presence.connect(&session).await;
        (session, rx)
    }

    /// Drop every room subscription, then unregister.
    pub async fn disconnect(&self, session: &Session) {
        self.inner.rooms.leave_all(session.id).await;
        self.inner.presence.disconnect(session.id, session.user_id()).await;
        info!("{} disconnected (session {})", session.username(), session.id);
    }

    /// Entry point for a raw text frame. Frames that don't parse into a
    /// [`ClientCommand`] are dropped.
    pub async fn handle_text(&self, session: &Session, text: &str) {
        match serde_json::from_str::<ClientCommand>(text) {
            Ok(command) => self.handle_command(session, command).await,
            Err(e) => {
                warn!("Dropping malformed frame from {}: {}", session.username(), e);
            }
        }
    }

    /// Run one command. Failures are logged and reported to the
    /// originating session only, as a generic `error` event.
    pub async fn handle_command(&self, session: &Session, command: ClientCommand) {
        if !self.permits(session, &command) {
            warn!("Dropping {} from read-only session {}", command.name(), session.id);
            return;
        }

        debug!("{} from {}", command.name(), session.username());
        if let Err(e) = self.route(session, &command).await {
            error!("{} failed for {}: {}", command.name(), session.username(), e);
            session.send(ServerEvent::error(command.failure_message()));
        }
    }

    /// Anonymous sessions under the read-only policy may only join and leave.
    fn permits(&self, session: &Session, command: &ClientCommand) -> bool {
        if session.identity.is_authenticated() || self.inner.config.anonymous_policy.may_post() {
            return true;
        }
        matches!(
            command,
            ClientCommand::JoinRoom { .. } | ClientCommand::LeaveRoom { .. }
        )
    }

    async fn route(&self, session: &Session, command: &ClientCommand) -> Result<(), GatewayError> {
        let inner = &self.inner;
        match command {
            ClientCommand::JoinRoom { room_id } => {
                inner.rooms.join(*room_id, session).await?;
            }
            ClientCommand::LeaveRoom { room_id } => {
                inner.rooms.leave(*room_id, session).await;
            }
            ClientCommand::SendMessage { room_id, content } => {
                inner.messages.send(*room_id, session, content).await?;
            }
            ClientCommand::TypingStart { room_id } => {
                inner.typing.start(*room_id, session).await;
            }
            ClientCommand::TypingStop { room_id } => {
                inner.typing.stop(*room_id, session).await;
            }
            ClientCommand::SendDm { receiver_id, content } => {
                inner.direct.send(session, *receiver_id, content).await?;
            }
            ClientCommand::DmTypingStart { receiver_id } => {
                inner.direct.typing_start(session, *receiver_id).await;
            }
            ClientCommand::DmTypingStop { receiver_id } => {
                inner.direct.typing_stop(session, *receiver_id).await;
            }
            // Edits and deletes are announced in the room the message is
            // stored in; the room the client names is not trusted.
            ClientCommand::EditMessage {
                message_id,
                content,
                room_id: _,
            } => {
                inner.messages.edit(*message_id, session, content).await?;
            }
            ClientCommand::DeleteMessage { message_id, room_id: _ } => {
                inner.messages.delete(*message_id, session).await?;
            }
            ClientCommand::FriendRequest { receiver_id } => {
                inner.direct.friend_request(session, *receiver_id).await?;
            }
        }
        Ok(())
    }
}
