//! Shared state store abstraction for lobby allocation and chat.
//!
//! The [`LobbyStore`] trait is the seam between the lobby core and the
//! external store that durably owns all lobby state. The service process
//! holds no authoritative copy — every allocation decision reads through
//! this trait, so its atomicity contracts are load-bearing:
//!
//! - [`find_or_create_open_lobby`](LobbyStore::find_or_create_open_lobby)
//!   and [`add_player_to_lobby`](LobbyStore::add_player_to_lobby) are
//!   **atomic transactions**: no other caller may observe their
//!   intermediate state. Backends either run them as store-side scripts
//!   (the Redis backend) or inside a single critical section (the in-memory
//!   backend).
//! - [`acquire_lock`](LobbyStore::acquire_lock) provides a cluster-wide,
//!   expiring mutual-exclusion lease with a **bounded** wait — it returns a
//!   definitive `None` on contention, never a hang.
//!
//! # Implementing a custom backend
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use lobby_core::store::{AddPlayerOutcome, FindOrCreateOutcome, LobbyStore, LockOptions, StoreLock};
//! use lobby_core::{LobbyInfo, Result};
//! use tokio::sync::mpsc;
//!
//! struct MyStore { /* ... */ }
//!
//! #[async_trait]
//! impl LobbyStore for MyStore {
//!     async fn acquire_lock(
//!         &self,
//!         resource: &str,
//!         options: LockOptions,
//!     ) -> Result<Option<Box<dyn StoreLock>>> {
//!         todo!()
//!     }
//!     // ... remaining methods
//! #    async fn lobby_player_count(&self, _: &str) -> Result<u64> { todo!() }
//! #    async fn find_or_create_open_lobby(&self, _: u32, _: u64, _: &str) -> Result<FindOrCreateOutcome> { todo!() }
//! #    async fn add_player_to_lobby(&self, _: &str, _: &str, _: u32) -> Result<AddPlayerOutcome> { todo!() }
//! #    async fn player_lobby(&self, _: &str) -> Result<Option<String>> { todo!() }
//! #    async fn set_player_lobby(&self, _: &str, _: &str) -> Result<()> { todo!() }
//! #    async fn active_lobby_ids(&self) -> Result<Vec<String>> { todo!() }
//! #    async fn lobby_details(&self, _: &[String]) -> Result<Vec<LobbyInfo>> { todo!() }
//! #    async fn publish(&self, _: &str, _: &str) -> Result<()> { todo!() }
//! #    async fn subscribe(&self, _: &str) -> Result<mpsc::Receiver<String>> { todo!() }
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::protocol::LobbyInfo;

/// Parameters for one coordination lock acquisition.
#[derive(Debug, Clone, Copy)]
pub struct LockOptions {
    /// Lease duration. The lock self-expires after this long so a crashed
    /// holder cannot block allocation indefinitely.
    pub expiry: Duration,
    /// Total time to keep attempting acquisition before giving up.
    pub wait_timeout: Duration,
    /// Pause between acquisition attempts.
    pub retry_interval: Duration,
}

/// A held coordination lock lease.
///
/// Holders must call [`release`](StoreLock::release) on every exit path.
/// Release is token-checked: releasing a lease that has already expired and
/// been re-acquired by another holder must not disturb the new holder.
#[async_trait]
pub trait StoreLock: Send + Sync {
    /// Release the lease.
    ///
    /// # Errors
    ///
    /// Returns a store error if the release command fails; the lease will
    /// then lapse on its own at expiry.
    async fn release(self: Box<Self>) -> Result<()>;
}

/// Outcome of the atomic add-player transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddPlayerOutcome {
    /// The player was added and the occupancy counter incremented, together.
    Added,
    /// The player was already in the lobby's membership set; nothing changed.
    AlreadyPresent,
    /// The lobby is at capacity; nothing changed.
    Full,
}

/// Outcome of the atomic find-or-create transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindOrCreateOutcome {
    /// An open lobby (existing, or freshly created under the ceiling).
    Lobby(String),
    /// No open lobby exists and the global lobby ceiling blocks creation.
    LimitReached,
    /// The supplied candidate id already names a lobby. Rare; callers may
    /// retry with a fresh id.
    IdCollision,
}

/// The shared state store owning all lobby state.
///
/// Implementations must be safe to share across many concurrent requests
/// (`&self` methods, `Send + Sync`). Two are provided:
/// [`MemoryStore`](crate::stores::MemoryStore) for tests and single-process
/// embedding, and [`RedisStore`](crate::stores::RedisStore) (feature
/// `store-redis`) for multi-instance deployments.
///
/// # Ordering
///
/// The find-or-create scan enumerates the active lobby directory in
/// whatever order the backend yields. No fairness or tie-break among
/// several open lobbies is guaranteed.
#[async_trait]
pub trait LobbyStore: Send + Sync + 'static {
    /// Attempt to acquire the named coordination lock.
    ///
    /// Retries internally every `options.retry_interval` until
    /// `options.wait_timeout` elapses, then reports `None`. The returned
    /// lease expires on its own after `options.expiry`.
    ///
    /// # Errors
    ///
    /// Returns a store error if the backend is unreachable. Callers treat
    /// acquisition errors like contention: a retryable "busy" condition.
    async fn acquire_lock(
        &self,
        resource: &str,
        options: LockOptions,
    ) -> Result<Option<Box<dyn StoreLock>>>;

    /// Read a lobby's current occupancy counter.
    ///
    /// Unknown lobby ids read as 0. This read is advisory — the binding
    /// capacity check is [`add_player_to_lobby`](Self::add_player_to_lobby).
    async fn lobby_player_count(&self, lobby_id: &str) -> Result<u64>;

    /// Atomically find an open lobby or create a new one.
    ///
    /// In one transaction: scan the active directory for a lobby with spare
    /// capacity; if none, check the global creation counter against
    /// `max_total_lobbies`; if under, register `candidate_lobby_id` with
    /// `current_players = 0`, `max_capacity = max_players_per_lobby`, add it
    /// to the directory and increment the counter.
    async fn find_or_create_open_lobby(
        &self,
        max_players_per_lobby: u32,
        max_total_lobbies: u64,
        candidate_lobby_id: &str,
    ) -> Result<FindOrCreateOutcome>;

    /// Atomically admit a player to a lobby.
    ///
    /// In one transaction: re-check `current_players < max_players_per_lobby`,
    /// then insert the player into the membership set and increment the
    /// counter together. This is the backstop correctness check — it must
    /// hold even if the coordination lock expired under its holder.
    ///
    /// # Errors
    ///
    /// Admitting to a lobby id with no record is a store error (consistency
    /// anomaly), not a silent create.
    async fn add_player_to_lobby(
        &self,
        lobby_id: &str,
        player_id: &str,
        max_players_per_lobby: u32,
    ) -> Result<AddPlayerOutcome>;

    /// Look up the lobby a player currently occupies, if any.
    async fn player_lobby(&self, player_id: &str) -> Result<Option<String>>;

    /// Record that a player occupies a lobby. Overwrites any prior entry.
    async fn set_player_lobby(&self, player_id: &str, lobby_id: &str) -> Result<()>;

    /// Read the active lobby directory. Order is backend-defined.
    async fn active_lobby_ids(&self) -> Result<Vec<String>>;

    /// Fetch occupancy details for the given lobbies.
    ///
    /// Directory entries whose records are missing or partial are skipped
    /// (and logged by the backend), not treated as fatal — the listing is a
    /// best-effort snapshot.
    async fn lobby_details(&self, lobby_ids: &[String]) -> Result<Vec<LobbyInfo>>;

    /// Publish a payload to a named channel.
    ///
    /// Delivery is at-most-once per publish, to current subscribers only;
    /// there is no durability or replay.
    async fn publish(&self, channel: &str, payload: &str) -> Result<()>;

    /// Subscribe to a named channel.
    ///
    /// Payloads published after this call resolves arrive on the returned
    /// receiver. Dropping the receiver ends the subscription; backends
    /// clean up their side on the next delivery attempt at the latest.
    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<String>>;
}
