//! # Custom Store Example
//!
//! Shows how to implement the [`LobbyStore`] trait by wrapping another
//! backend. This pattern is useful for:
//!
//! - **Instrumentation** — count or time store calls without touching the core
//! - **Custom backends** — adapt any store offering atomic transactions,
//!   an expiring lock and pub/sub
//!
//! The wrapper here delegates everything to a [`MemoryStore`] and counts
//! the atomic transactions flowing through the seam.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example custom_store
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use lobby_core::store::{AddPlayerOutcome, FindOrCreateOutcome, LockOptions, StoreLock};
use lobby_core::stores::MemoryStore;
use lobby_core::{LobbyConfig, LobbyInfo, LobbyService, LobbyStore, Result};
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// Step 1: Wrap a backend and implement LobbyStore
// ─────────────────────────────────────────────────────────────────────

/// A [`LobbyStore`] that counts the atomic transactions it carries.
#[derive(Default)]
struct CountingStore {
    base: MemoryStore,
    finds: AtomicU64,
    commits: AtomicU64,
}

#[async_trait]
impl LobbyStore for CountingStore {
    async fn acquire_lock(
        &self,
        resource: &str,
        options: LockOptions,
    ) -> Result<Option<Box<dyn StoreLock>>> {
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
        self.finds.fetch_add(1, Ordering::Relaxed);
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
        self.commits.fetch_add(1, Ordering::Relaxed);
        self.base
            .add_player_to_lobby(lobby_id, player_id, max_players_per_lobby)
            .await
    }

    async fn player_lobby(&self, player_id: &str) -> Result<Option<String>> {
        self.base.player_lobby(player_id).await
    }

    async fn set_player_lobby(&self, player_id: &str, lobby_id: &str) -> Result<()> {
        self.base.set_player_lobby(player_id, lobby_id).await
    }

    async fn active_lobby_ids(&self) -> Result<Vec<String>> {
        self.base.active_lobby_ids().await
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

// ─────────────────────────────────────────────────────────────────────
// Step 2: Run the allocation engine over the wrapper
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let store = Arc::new(CountingStore::default());
    let dyn_store: Arc<dyn LobbyStore> = store.clone();
    let service = LobbyService::new(dyn_store, LobbyConfig::new(4, 10));

    for player in ["alice", "bob", "carol", "dave", "erin"] {
        let response = service.join_lobby(player, None).await?;
        tracing::info!("{player}: {}", response.message);
    }
    // Idempotent re-join: resolved from the membership index, no
    // transaction needed.
    service.join_lobby("alice", None).await?;

    tracing::info!(
        "find-or-create transactions: {}, add-player commits: {}",
        store.finds.load(Ordering::Relaxed),
        store.commits.load(Ordering::Relaxed)
    );

    Ok(())
}
