use thiserror::Error;
use uuid::Uuid;

/// Failures surfaced by gateway handlers. The dispatcher logs these and
/// reports only a generic message to the originating session.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("room {0} does not exist")]
    UnknownRoom(Uuid),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}
