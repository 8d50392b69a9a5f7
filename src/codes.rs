//! Result codes for lobby join outcomes.
//!
//! These codes ride along on every [`JoinResponse`](crate::protocol::JoinResponse)
//! and serialize as `SCREAMING_SNAKE_CASE` strings (e.g. `"ALREADY_IN_LOBBY"`)
//! so that edge layers can map them to transport-specific status signaling
//! without parsing the human-readable message.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a [`join_lobby`](crate::service::LobbyService::join_lobby) call.
///
/// Two variants are successes; the rest are failures with distinct causes.
/// Use [`is_retryable()`](JoinCode::is_retryable) to distinguish "try the same
/// request again" failures from failures that stand until lobby state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoinCode {
    /// The player was admitted to a lobby by this call.
    Joined,
    /// The player already occupied a lobby; the call was an idempotent no-op.
    AlreadyInLobby,
    /// The explicitly requested lobby is at capacity.
    PreferredLobbyFull,
    /// Every active lobby is full and the global lobby ceiling blocks
    /// creating another.
    NoCapacityAvailable,
    /// A freshly generated lobby id collided with an existing record.
    LobbyIdCollision,
    /// The target lobby filled between selection and the atomic commit.
    LobbyFilledDuringCommit,
    /// The coordination lock could not be acquired within the configured
    /// budget; the system is busy.
    LockUnavailable,
}

impl JoinCode {
    /// Returns `true` for the two success outcomes.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Joined | Self::AlreadyInLobby)
    }

    /// Returns `true` if retrying the identical request may succeed without
    /// any lobby state changing first.
    ///
    /// Capacity failures (`PREFERRED_LOBBY_FULL`, `NO_CAPACITY_AVAILABLE`)
    /// are definitive until players or limits change, so they are not
    /// retryable in this sense.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LockUnavailable | Self::LobbyIdCollision | Self::LobbyFilledDuringCommit
        )
    }

    /// Returns a human-readable description of this code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Joined => "The player was admitted to a lobby.",
            Self::AlreadyInLobby => {
                "The player already belongs to a lobby; the join was idempotent."
            }
            Self::PreferredLobbyFull => "The requested lobby is at maximum capacity.",
            Self::NoCapacityAvailable => {
                "All lobbies are full and the global lobby limit prevents creating a new one."
            }
            Self::LobbyIdCollision => {
                "A generated lobby id collided with an existing lobby. Safe to retry."
            }
            Self::LobbyFilledDuringCommit => {
                "The lobby filled up while the join was being committed. Safe to retry."
            }
            Self::LockUnavailable => {
                "The allocation lock could not be acquired. The system is busy; retry shortly."
            }
        }
    }
}

impl fmt::Display for JoinCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Joined => "JOINED",
            Self::AlreadyInLobby => "ALREADY_IN_LOBBY",
            Self::PreferredLobbyFull => "PREFERRED_LOBBY_FULL",
            Self::NoCapacityAvailable => "NO_CAPACITY_AVAILABLE",
            Self::LobbyIdCollision => "LOBBY_ID_COLLISION",
            Self::LobbyFilledDuringCommit => "LOBBY_FILLED_DURING_COMMIT",
            Self::LockUnavailable => "LOCK_UNAVAILABLE",
        };
        f.write_str(name)
    }
}
