//! The lobby allocation engine.
//!
//! [`LobbyService`] decides which lobby a joining player ends up in. All
//! authoritative state lives in the [`LobbyStore`]; this type contributes
//! the decision sequence and its serialization discipline:
//!
//! 1. an idempotency check against the membership index (lock-free),
//! 2. a cluster-wide coordination lock around "scan for an open lobby or
//!    decide to create one" — the read-then-act step two concurrent
//!    requests must never run interleaved, or the global lobby ceiling
//!    could be breached by twin creations,
//! 3. an atomic add-player commit that re-checks capacity — the backstop
//!    that keeps counters correct even if the lock expired under us.
//!
//! The lock serializes allocation across every service instance sharing the
//! store; chat never contends for it.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::LobbyConfig;
use crate::error::{LobbyError, Result};
use crate::protocol::{JoinResponse, LobbyInfo};
use crate::store::{AddPlayerOutcome, FindOrCreateOutcome, LobbyStore};

/// Resource name of the cluster-wide allocation lock. A single fixed name:
/// every allocation decision in the deployment serializes on it.
pub const GLOBAL_LOBBY_LOCK_RESOURCE: &str = "global_lobby_operation_lock";

/// Generates an opaque lobby id.
fn fresh_lobby_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Allocates players to capacity-bounded lobbies.
///
/// Cheap to share: hold it in an `Arc` and call from as many concurrent
/// request handlers as needed.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use lobby_core::{LobbyConfig, LobbyService};
/// use lobby_core::stores::MemoryStore;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> lobby_core::Result<()> {
/// let store = Arc::new(MemoryStore::new());
/// let service = LobbyService::new(store, LobbyConfig::new(8, 100));
///
/// let response = service.join_lobby("player-1", None).await?;
/// assert!(response.success);
/// # Ok(())
/// # }
/// ```
pub struct LobbyService {
    store: Arc<dyn LobbyStore>,
    config: LobbyConfig,
}

impl LobbyService {
    /// Create a service over the given store and configuration.
    pub fn new(store: Arc<dyn LobbyStore>, config: LobbyConfig) -> Self {
        Self { store, config }
    }

    /// The configuration this service was built with.
    pub fn config(&self) -> &LobbyConfig {
        &self.config
    }

    /// Join `player_id` to a lobby.
    ///
    /// Idempotent per player: a player who already occupies a lobby gets
    /// that lobby back (`ALREADY_IN_LOBBY`) without any mutation. With
    /// `preferred_lobby_id` set, only that lobby is considered; otherwise
    /// the engine picks any open lobby or creates one under the global
    /// ceiling.
    ///
    /// Domain failures (full, ceiling, contention) come back as unsuccessful
    /// [`JoinResponse`]s with a [`JoinCode`](crate::codes::JoinCode) and a
    /// human-readable reason.
    ///
    /// # Errors
    ///
    /// [`LobbyError::EmptyPlayerId`] for empty input;
    /// [`LobbyError::Store`]/[`LobbyError::UnexpectedReply`] when the store
    /// fails after lock acquisition — never masked as success.
    pub async fn join_lobby(
        &self,
        player_id: &str,
        preferred_lobby_id: Option<&str>,
    ) -> Result<JoinResponse> {
        if player_id.trim().is_empty() {
            return Err(LobbyError::EmptyPlayerId);
        }
        // Empty preferred id means "no preference", same as absent.
        let preferred_lobby_id = preferred_lobby_id.filter(|id| !id.trim().is_empty());

        // Idempotency: no lock needed, the membership index is authoritative.
        if let Some(existing) = self.store.player_lobby(player_id).await? {
            info!(player_id = %player_id, lobby_id = %existing, "player is already in a lobby");
            return Ok(JoinResponse::already_in_lobby(existing));
        }

        let lock = match self
            .store
            .acquire_lock(GLOBAL_LOBBY_LOCK_RESOURCE, self.config.lock_options())
            .await
        {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                warn!(player_id = %player_id, "could not acquire allocation lock, concurrent requests likely");
                return Ok(JoinResponse::lock_unavailable());
            }
            Err(e) => {
                // Store trouble during acquisition is indistinguishable from
                // contention to the caller: retryable, not fatal.
                error!(player_id = %player_id, error = %e, "lock acquisition failed against the store");
                return Ok(JoinResponse::lock_unavailable());
            }
        };

        let result = self.allocate_and_commit(player_id, preferred_lobby_id).await;

        // Single release point covering every exit path. If the release
        // itself fails, the lease lapses on its own at expiry.
        if let Err(e) = lock.release().await {
            warn!(player_id = %player_id, error = %e, "failed to release allocation lock");
        }
        result
    }

    /// Steps 3–5 of the join sequence, run while holding the lock.
    async fn allocate_and_commit(
        &self,
        player_id: &str,
        preferred_lobby_id: Option<&str>,
    ) -> Result<JoinResponse> {
        let target_lobby_id = match preferred_lobby_id {
            Some(preferred) => {
                // Advisory read; the binding check is the atomic add below.
                let current_players = self.store.lobby_player_count(preferred).await?;
                if current_players >= u64::from(self.config.max_players_per_lobby) {
                    info!(player_id = %player_id, lobby_id = %preferred, "preferred lobby is full");
                    return Ok(JoinResponse::preferred_full(preferred));
                }
                preferred.to_string()
            }
            None => {
                let candidate = fresh_lobby_id();
                match self
                    .store
                    .find_or_create_open_lobby(
                        self.config.max_players_per_lobby,
                        self.config.max_total_lobbies,
                        &candidate,
                    )
                    .await?
                {
                    FindOrCreateOutcome::Lobby(lobby_id) => lobby_id,
                    FindOrCreateOutcome::LimitReached => {
                        info!(
                            player_id = %player_id,
                            max_total_lobbies = self.config.max_total_lobbies,
                            "no open lobby and the creation ceiling is reached"
                        );
                        return Ok(JoinResponse::no_capacity());
                    }
                    FindOrCreateOutcome::IdCollision => {
                        warn!(player_id = %player_id, lobby_id = %candidate, "generated lobby id collided");
                        return Ok(JoinResponse::id_collision());
                    }
                }
            }
        };

        match self
            .store
            .add_player_to_lobby(&target_lobby_id, player_id, self.config.max_players_per_lobby)
            .await?
        {
            AddPlayerOutcome::Added | AddPlayerOutcome::AlreadyPresent => {
                self.store.set_player_lobby(player_id, &target_lobby_id).await?;
                info!(player_id = %player_id, lobby_id = %target_lobby_id, "player joined lobby");
                Ok(JoinResponse::joined(target_lobby_id))
            }
            AddPlayerOutcome::Full => {
                warn!(
                    player_id = %player_id,
                    lobby_id = %target_lobby_id,
                    "lobby filled between selection and commit"
                );
                Ok(JoinResponse::filled_during_commit())
            }
        }
    }

    /// Best-effort snapshot of every active lobby's occupancy.
    ///
    /// No lock is taken and the list is not transactionally consistent
    /// across lobbies. Directory entries missing their records are skipped
    /// (logged by the store backend).
    ///
    /// # Errors
    ///
    /// Returns a store error if the directory or detail reads fail.
    pub async fn list_active_lobbies(&self) -> Result<Vec<LobbyInfo>> {
        let lobby_ids = self.store.active_lobby_ids().await?;
        if lobby_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.store.lobby_details(&lobby_ids).await
    }
}

impl std::fmt::Debug for LobbyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LobbyService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
