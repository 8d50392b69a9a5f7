#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire-shape tests for the lobby core's serialized types.
//!
//! Verifies the camelCase JSON surface of join responses and lobby
//! listings, the `SCREAMING_SNAKE_CASE` join codes, and the chat payload
//! format published on lobby channels.

use lobby_core::protocol::{chat_channel, SYSTEM_SENDER};
use lobby_core::{ChatMessage, JoinCode, JoinResponse, LobbyInfo};

/// Serialize `val` to JSON, then deserialize back and return it.
fn round_trip<T: serde::Serialize + serde::de::DeserializeOwned>(val: &T) -> T {
    let json = serde_json::to_string(val).expect("serialize");
    serde_json::from_str(&json).expect("deserialize")
}

// ════════════════════════════════════════════════════════════════════
// JoinResponse
// ════════════════════════════════════════════════════════════════════

#[test]
fn join_response_uses_camel_case_and_coded_outcomes() {
    let response = JoinResponse {
        success: true,
        code: JoinCode::Joined,
        lobby_id: Some("abc123".into()),
        message: "You have joined the lobby with ID abc123".into(),
    };
    let json = serde_json::to_string(&response).unwrap();
    assert!(json.contains(r#""lobbyId":"abc123""#), "json was: {json}");
    assert!(json.contains(r#""code":"JOINED""#), "json was: {json}");
    assert!(json.contains(r#""success":true"#), "json was: {json}");

    let back = round_trip(&response);
    assert_eq!(back.code, JoinCode::Joined);
    assert_eq!(back.lobby_id.as_deref(), Some("abc123"));
}

#[test]
fn join_response_omits_absent_lobby_id() {
    let response = JoinResponse {
        success: false,
        code: JoinCode::NoCapacityAvailable,
        lobby_id: None,
        message: "No lobbies available and new lobby creation is blocked.".into(),
    };
    let json = serde_json::to_string(&response).unwrap();
    assert!(!json.contains("lobbyId"), "json was: {json}");
    assert!(
        json.contains(r#""code":"NO_CAPACITY_AVAILABLE""#),
        "json was: {json}"
    );
}

// ════════════════════════════════════════════════════════════════════
// JoinCode
// ════════════════════════════════════════════════════════════════════

#[test]
fn join_codes_serialize_screaming_snake_case() {
    let cases = [
        (JoinCode::Joined, "JOINED"),
        (JoinCode::AlreadyInLobby, "ALREADY_IN_LOBBY"),
        (JoinCode::PreferredLobbyFull, "PREFERRED_LOBBY_FULL"),
        (JoinCode::NoCapacityAvailable, "NO_CAPACITY_AVAILABLE"),
        (JoinCode::LobbyIdCollision, "LOBBY_ID_COLLISION"),
        (JoinCode::LobbyFilledDuringCommit, "LOBBY_FILLED_DURING_COMMIT"),
        (JoinCode::LockUnavailable, "LOCK_UNAVAILABLE"),
    ];
    for (code, expected) in cases {
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, format!("\"{expected}\""));
        // Display matches the wire name.
        assert_eq!(code.to_string(), expected);
        assert_eq!(round_trip(&code), code);
    }
}

#[test]
fn join_code_classification() {
    assert!(JoinCode::Joined.is_success());
    assert!(JoinCode::AlreadyInLobby.is_success());
    assert!(!JoinCode::PreferredLobbyFull.is_success());

    // Retryable without any state change:
    assert!(JoinCode::LockUnavailable.is_retryable());
    assert!(JoinCode::LobbyIdCollision.is_retryable());
    assert!(JoinCode::LobbyFilledDuringCommit.is_retryable());
    // Definitive until lobbies or limits change:
    assert!(!JoinCode::PreferredLobbyFull.is_retryable());
    assert!(!JoinCode::NoCapacityAvailable.is_retryable());
}

#[test]
fn join_code_descriptions_are_nonempty() {
    let codes = [
        JoinCode::Joined,
        JoinCode::AlreadyInLobby,
        JoinCode::PreferredLobbyFull,
        JoinCode::NoCapacityAvailable,
        JoinCode::LobbyIdCollision,
        JoinCode::LobbyFilledDuringCommit,
        JoinCode::LockUnavailable,
    ];
    for code in codes {
        assert!(!code.description().is_empty(), "{code} lacks a description");
    }
}

// ════════════════════════════════════════════════════════════════════
// LobbyInfo
// ════════════════════════════════════════════════════════════════════

#[test]
fn lobby_info_wire_shape() {
    let info = LobbyInfo {
        lobby_id: "abc123".into(),
        current_players: 2,
        max_capacity: 8,
    };
    let json = serde_json::to_string(&info).unwrap();
    assert_eq!(
        json,
        r#"{"lobbyId":"abc123","currentPlayers":2,"maxCapacity":8}"#
    );
    assert_eq!(round_trip(&info), info);
}

// ════════════════════════════════════════════════════════════════════
// Chat payloads
// ════════════════════════════════════════════════════════════════════

#[test]
fn chat_message_wire_shape() {
    let message = ChatMessage::new("p1", "hello");
    let json = serde_json::to_string(&message).unwrap();
    assert_eq!(json, r#"{"sender":"p1","content":"hello"}"#);
    assert_eq!(round_trip(&message), message);
}

#[test]
fn system_notices_use_the_system_sender() {
    let notice = ChatMessage::system("p1 has joined the chat.");
    assert!(notice.is_system());
    assert_eq!(notice.sender, SYSTEM_SENDER);

    // A published fixture parses back as a system notice.
    let parsed: ChatMessage =
        serde_json::from_str(r#"{"sender":"System","content":"p1 has joined the chat."}"#).unwrap();
    assert!(parsed.is_system());
    assert_eq!(parsed, notice);
}

#[test]
fn player_messages_are_not_system_notices() {
    assert!(!ChatMessage::new("System2", "x").is_system());
    assert!(!ChatMessage::new("p1", "x").is_system());
}

#[test]
fn chat_channels_are_scoped_per_lobby() {
    assert_eq!(chat_channel("abc123"), "lobby_chat:abc123");
    assert_ne!(chat_channel("a"), chat_channel("b"));
}
