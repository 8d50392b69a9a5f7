#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for lobby core integration tests.
//!
//! Provides [`ScriptedStore`], a fault-injecting wrapper around
//! [`MemoryStore`], plus small helpers for draining chat channels with
//! timeouts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use lobby_core::store::{AddPlayerOutcome, FindOrCreateOutcome, LobbyStore, LockOptions, StoreLock};
use lobby_core::stores::MemoryStore;
use lobby_core::{ChatMessage, LobbyConfig, LobbyError, LobbyInfo, Result};
use tokio::sync::mpsc;

// ── Config helpers ──────────────────────────────────────────────────

/// A config with snappy lock timings for tests.
pub fn quick_config(max_players_per_lobby: u32, max_total_lobbies: u64) -> LobbyConfig {
    LobbyConfig::new(max_players_per_lobby, max_total_lobbies)
        .with_lock_acquire_timeout(Duration::from_millis(300))
        .with_lock_retry_interval(Duration::from_millis(25))
}

// ── Chat channel helpers ────────────────────────────────────────────

/// Receive the next chat message, panicking with context on timeout.
pub async fn recv_within(rx: &mut mpsc::Receiver<ChatMessage>, what: &str) -> ChatMessage {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
        .unwrap_or_else(|| panic!("channel closed while waiting for {what}"))
}

/// Assert that no chat message arrives on `rx` in a short window.
pub async fn assert_no_message(rx: &mut mpsc::Receiver<ChatMessage>, context: &str) {
    let outcome = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
    if let Ok(Some(message)) = outcome {
        panic!("expected silence ({context}), got {message:?}");
    }
}

/// Assert that no raw payload arrives on a store subscription.
pub async fn assert_no_payload(rx: &mut mpsc::Receiver<String>, context: &str) {
    let outcome = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
    if let Ok(Some(payload)) = outcome {
        panic!("expected silence ({context}), got {payload}");
    }
}

// ── ScriptedStore ───────────────────────────────────────────────────

/// A [`LobbyStore`] that delegates to a [`MemoryStore`] but can be told to
/// fail specific operations, and to report a ghost directory entry with no
/// backing record.
///
/// Shared handles (`Arc<ScriptedStore>`) flip the flags mid-test to script
/// failure sequences.
pub struct ScriptedStore {
    base: MemoryStore,
    pub fail_acquire_lock: AtomicBool,
    pub fail_add_player: AtomicBool,
    pub fail_set_player_lobby: AtomicBool,
    pub ghost_lobby: StdMutex<Option<String>>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self {
            base: MemoryStore::new(),
            fail_acquire_lock: AtomicBool::new(false),
            fail_add_player: AtomicBool::new(false),
            fail_set_player_lobby: AtomicBool::new(false),
            ghost_lobby: StdMutex::new(None),
        }
    }

    /// The wrapped store, for direct state setup in tests.
    pub fn base(&self) -> &MemoryStore {
        &self.base
    }

    fn injected(op: &str) -> LobbyError {
        LobbyError::Store(format!("injected {op} failure"))
    }
}

impl Default for ScriptedStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LobbyStore for ScriptedStore {
    async fn acquire_lock(
        &self,
        resource: &str,
        options: LockOptions,
    ) -> Result<Option<Box<dyn StoreLock>>> {
        if self.fail_acquire_lock.load(Ordering::SeqCst) {
            return Err(Self::injected("acquire_lock"));
        }
        self.base.acquire_lock(resource, options).await
    }

    async fn lobby_player_count(&self, lobby_id: &str) -> Result<u64> {
        self.base.lobby_player_count(lobby_id).await
    }

    async fn find_or_create_open_lobby(
        &self,
        max_players_per_lobby: u32,
        max_total_lobbies: u64,
        candidate_lobby_id: &str,
    ) -> Result<FindOrCreateOutcome> {
        self.base
            .find_or_create_open_lobby(max_players_per_lobby, max_total_lobbies, candidate_lobby_id)
            .await
    }

    async fn add_player_to_lobby(
        &self,
        lobby_id: &str,
        player_id: &str,
        max_players_per_lobby: u32,
    ) -> Result<AddPlayerOutcome> {
        if self.fail_add_player.load(Ordering::SeqCst) {
            return Err(Self::injected("add_player_to_lobby"));
        }
        self.base
            .add_player_to_lobby(lobby_id, player_id, max_players_per_lobby)
            .await
    }

    async fn player_lobby(&self, player_id: &str) -> Result<Option<String>> {
        self.base.player_lobby(player_id).await
    }

    async fn set_player_lobby(&self, player_id: &str, lobby_id: &str) -> Result<()> {
        if self.fail_set_player_lobby.load(Ordering::SeqCst) {
            return Err(Self::injected("set_player_lobby"));
        }
        self.base.set_player_lobby(player_id, lobby_id).await
    }

    async fn active_lobby_ids(&self) -> Result<Vec<String>> {
        let mut ids = self.base.active_lobby_ids().await?;
        if let Some(ghost) = self.ghost_lobby.lock().unwrap().clone() {
            ids.push(ghost);
        }
        Ok(ids)
    }

    async fn lobby_details(&self, lobby_ids: &[String]) -> Result<Vec<LobbyInfo>> {
        self.base.lobby_details(lobby_ids).await
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        self.base.publish(channel, payload).await
    }

    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<String>> {
        self.base.subscribe(channel).await
    }
}

/// Convenience: an `Arc<ScriptedStore>` plus a second handle for flag flips.
pub fn scripted_store() -> (Arc<ScriptedStore>, Arc<ScriptedStore>) {
    let store = Arc::new(ScriptedStore::new());
    (Arc::clone(&store), store)
}
