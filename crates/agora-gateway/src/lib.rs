//! Real-time presence, room membership and message fan-out.
//!
//! ```text
//! connection ──▶ Dispatcher ──▶ RoomCoordinator ──▶ Room (subscriber set)
//!                    │      ├──▶ MessageService
//!                    │      ├──▶ DirectMessageService ──▶ ConnectionRegistry
//!                    │      └──▶ TypingRelay
//!                    └──▶ PresenceTracker ──▶ ConnectionRegistry
//! ```
//!
//! Everything below [`connection`] is transport-agnostic: a [`Session`] is an
//! identity plus an unbounded queue of [`ServerEvent`]s, so the coordinator
//! logic is exercised in tests with plain receivers.
//!
//! [`ServerEvent`]: agora_types::events::ServerEvent

pub mod auth;
pub mod connection;
pub mod direct;
pub mod dispatcher;
pub mod error;
pub mod messages;
pub mod presence;
pub mod registry;
pub mod room;
pub mod rooms;
pub mod session;
pub mod typing;

#[cfg(test)]
mod test_support;

pub use auth::{AnonymousPolicy, AuthGate, JwtGate};
pub use dispatcher::{Dispatcher, GatewayConfig};
pub use error::GatewayError;
pub use registry::ConnectionRegistry;
pub use session::{Identity, Session, SessionId};
