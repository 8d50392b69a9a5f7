//! # Basic Join Example
//!
//! Demonstrates the full lobby core lifecycle against the in-memory store:
//!
//! 1. Build a store, an allocation service and a chat relay
//! 2. Join players until a lobby fills and a new one is created
//! 3. List active lobbies
//! 4. Join lobby chat and exchange messages
//!
//! ## Running
//!
//! ```sh
//! cargo run --example basic_join
//!
//! # Against a real Redis server instead (requires the default `store-redis`
//! # feature):
//! LOBBY_REDIS_URL=redis://localhost:6379 cargo run --example basic_join
//! ```

use std::sync::Arc;

use lobby_core::stores::MemoryStore;
use lobby_core::{ChatRelay, LobbyConfig, LobbyService, LobbyStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Initialize tracing. Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Store ───────────────────────────────────────────────────────
    // The in-memory store by default; point LOBBY_REDIS_URL at a Redis
    // server to share state with other instances.
    let store: Arc<dyn LobbyStore> = match std::env::var("LOBBY_REDIS_URL") {
        #[cfg(feature = "store-redis")]
        Ok(url) => {
            tracing::info!("Using Redis store at {url}");
            Arc::new(lobby_core::stores::RedisStore::connect(&url).await?)
        }
        #[cfg(not(feature = "store-redis"))]
        Ok(_) => {
            tracing::warn!("Built without `store-redis`; falling back to the in-memory store");
            Arc::new(MemoryStore::new())
        }
        Err(_) => Arc::new(MemoryStore::new()),
    };

    // Two players per lobby, at most three lobbies ever.
    let config = LobbyConfig::new(2, 3);
    let service = LobbyService::new(Arc::clone(&store), config.clone());
    let relay = ChatRelay::new(store, &config);

    // ── Allocation ──────────────────────────────────────────────────
    // The first two players share a lobby; the third spills into a new one.
    for player in ["alice", "bob", "carol"] {
        let response = service.join_lobby(player, None).await?;
        tracing::info!(
            "{player}: {} (code {}, lobby {:?})",
            response.message,
            response.code,
            response.lobby_id
        );
    }

    // Joining again is idempotent.
    let again = service.join_lobby("alice", None).await?;
    tracing::info!("alice again: {} (code {})", again.message, again.code);

    for lobby in service.list_active_lobbies().await? {
        tracing::info!(
            "lobby {}: {}/{} players",
            lobby.lobby_id,
            lobby.current_players,
            lobby.max_capacity
        );
    }

    // ── Chat ────────────────────────────────────────────────────────
    let alice_lobby = again.lobby_id.unwrap_or_default();

    let (alice_conn, mut alice_events) = relay.connect().await;
    let (bob_conn, mut bob_events) = relay.connect().await;
    relay.join_chat(alice_conn, &alice_lobby, "alice").await?;
    relay.join_chat(bob_conn, &alice_lobby, "bob").await?;

    relay
        .send_message(alice_conn, &alice_lobby, "alice", "ready when you are")
        .await?;

    // Drain a few events from each connection.
    for _ in 0..3 {
        if let Some(message) = alice_events.recv().await {
            tracing::info!("alice sees: <{}> {}", message.sender, message.content);
        }
    }
    for _ in 0..2 {
        if let Some(message) = bob_events.recv().await {
            tracing::info!("bob sees: <{}> {}", message.sender, message.content);
        }
    }

    // A player cannot speak into a lobby they are not a member of.
    let outcome = relay
        .send_message(bob_conn, "some-other-lobby", "bob", "sneaky")
        .await?;
    tracing::info!("bob's cross-lobby attempt: {outcome:?}");

    relay.leave_chat(alice_conn, &alice_lobby, "alice").await?;
    relay.disconnect(alice_conn).await;
    relay.disconnect(bob_conn).await;

    Ok(())
}
