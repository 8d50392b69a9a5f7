//! Error types for the lobby core.

use thiserror::Error;

/// Errors that can occur in lobby allocation and chat relay operations.
///
/// Domain outcomes (lobby full, ceiling reached, lock contention, chat
/// authorization refusals) are **not** errors — they are reported through
/// [`JoinResponse`](crate::protocol::JoinResponse) and
/// [`ChatOutcome`](crate::chat::ChatOutcome). This enum covers the failures
/// that callers cannot resolve by retrying the same request against the same
/// state: invalid input and backend trouble.
#[derive(Debug, Error)]
pub enum LobbyError {
    /// A join was attempted with an empty player id.
    ///
    /// The edge layer is expected to validate input; the allocation engine
    /// still rejects empty ids defensively before touching the store.
    #[error("player id must not be empty")]
    EmptyPlayerId,

    /// The backing store could not be reached, or a store command failed.
    ///
    /// Never downgraded to success: every store failure after input
    /// validation surfaces here (or, during lock acquisition only, as a
    /// retryable `LOCK_UNAVAILABLE` response).
    #[error("store error: {0}")]
    Store(String),

    /// The store replied with a shape this crate does not understand
    /// (e.g. an atomic script returned an undocumented result code).
    #[error("unexpected store reply: {0}")]
    UnexpectedReply(String),

    /// Failed to serialize or deserialize a wire payload.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A chat operation referenced a connection id the relay does not know
    /// (never registered, or already disconnected).
    #[error("unknown chat connection: {0}")]
    UnknownConnection(uuid::Uuid),
}

/// A specialized [`Result`] type for lobby core operations.
pub type Result<T> = std::result::Result<T, LobbyError>;
