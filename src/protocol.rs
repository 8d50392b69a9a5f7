//! Wire types crossing the lobby core's boundary.
//!
//! Join responses and lobby listings are what an HTTP edge serializes to
//! callers; [`ChatMessage`] is the payload published on per-lobby pub/sub
//! channels and delivered to chat connections. Field names serialize in
//! `camelCase` to match the service's public JSON surface.

use serde::{Deserialize, Serialize};

use crate::codes::JoinCode;

/// Sender name used for system notices (chat join/leave, refusals).
pub const SYSTEM_SENDER: &str = "System";

/// Prefix for per-lobby chat channels in the shared store.
const CHAT_CHANNEL_PREFIX: &str = "lobby_chat:";

/// Returns the pub/sub channel name carrying chat for the given lobby.
pub fn chat_channel(lobby_id: &str) -> String {
    format!("{CHAT_CHANNEL_PREFIX}{lobby_id}")
}

// ── Join responses ──────────────────────────────────────────────────

/// Result of a [`join_lobby`](crate::service::LobbyService::join_lobby) call.
///
/// `success` mirrors [`JoinCode::is_success`]; `message` is a human-readable
/// reason suitable for showing to the player, distinguishing "try again"
/// failures from definitive ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    /// Whether the player ended up in a lobby.
    pub success: bool,
    /// Machine-readable outcome code.
    pub code: JoinCode,
    /// The lobby the player occupies, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lobby_id: Option<String>,
    /// Human-readable reason.
    pub message: String,
}

impl JoinResponse {
    /// The player was admitted by this call.
    pub(crate) fn joined(lobby_id: String) -> Self {
        Self {
            success: true,
            code: JoinCode::Joined,
            message: format!("You have joined the lobby with ID {lobby_id}"),
            lobby_id: Some(lobby_id),
        }
    }

    /// The player already occupied a lobby; idempotent success.
    pub(crate) fn already_in_lobby(lobby_id: String) -> Self {
        Self {
            success: true,
            code: JoinCode::AlreadyInLobby,
            message: format!("You are already in lobby with ID {lobby_id}"),
            lobby_id: Some(lobby_id),
        }
    }

    /// The explicitly requested lobby is full.
    pub(crate) fn preferred_full(lobby_id: &str) -> Self {
        Self {
            success: false,
            code: JoinCode::PreferredLobbyFull,
            lobby_id: None,
            message: format!("Lobby {lobby_id} is full."),
        }
    }

    /// All lobbies full and the creation ceiling is reached.
    pub(crate) fn no_capacity() -> Self {
        Self {
            success: false,
            code: JoinCode::NoCapacityAvailable,
            lobby_id: None,
            message: "No lobbies available and new lobby creation is blocked.".into(),
        }
    }

    /// A generated lobby id collided with an existing record.
    pub(crate) fn id_collision() -> Self {
        Self {
            success: false,
            code: JoinCode::LobbyIdCollision,
            lobby_id: None,
            message: "Lobby creation failed. Please try again.".into(),
        }
    }

    /// The target lobby filled between selection and commit.
    pub(crate) fn filled_during_commit() -> Self {
        Self {
            success: false,
            code: JoinCode::LobbyFilledDuringCommit,
            lobby_id: None,
            message: "Failed to join lobby. It might have just filled up. Please try again.".into(),
        }
    }

    /// The coordination lock could not be acquired in time.
    pub(crate) fn lock_unavailable() -> Self {
        Self {
            success: false,
            code: JoinCode::LockUnavailable,
            lobby_id: None,
            message: "System is busy. Please try again.".into(),
        }
    }
}

// ── Lobby listings ──────────────────────────────────────────────────

/// Snapshot of one lobby's occupancy, as returned by
/// [`list_active_lobbies`](crate::service::LobbyService::list_active_lobbies).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyInfo {
    /// Opaque lobby identifier.
    pub lobby_id: String,
    /// Players currently assigned to the lobby.
    pub current_players: u64,
    /// Capacity fixed at lobby creation.
    pub max_capacity: u32,
}

// ── Chat payloads ───────────────────────────────────────────────────

/// A chat payload published to a lobby channel and delivered to every
/// current subscriber of that lobby.
///
/// System notices (players joining or leaving chat, authorization refusals)
/// use [`SYSTEM_SENDER`] as the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Player id of the sender, or [`SYSTEM_SENDER`].
    pub sender: String,
    /// Message body.
    pub content: String,
}

impl ChatMessage {
    /// Create a player-authored message.
    pub fn new(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
        }
    }

    /// Create a system notice.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            sender: SYSTEM_SENDER.into(),
            content: content.into(),
        }
    }

    /// Returns `true` if this message is a system notice.
    pub fn is_system(&self) -> bool {
        self.sender == SYSTEM_SENDER
    }
}
