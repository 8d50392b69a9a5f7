//! In-process store backend.
//!
//! [`MemoryStore`] keeps all lobby state behind a single `tokio::sync::Mutex`,
//! which makes every store operation one critical section — the same
//! no-partial-visibility guarantee the Redis backend gets from server-side
//! scripts. It backs the integration tests and works for single-process
//! embedding; it offers no durability.
//!
//! Cloning a `MemoryStore` yields another handle to the **same** state, so
//! tests can run several service instances against one "remote" store.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{LobbyError, Result};
use crate::protocol::LobbyInfo;
use crate::store::{AddPlayerOutcome, FindOrCreateOutcome, LobbyStore, LockOptions, StoreLock};

/// Capacity of each subscriber's payload channel.
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 256;

/// One lobby's counters.
#[derive(Debug, Clone)]
struct LobbyRecord {
    current_players: u64,
    max_capacity: u32,
}

/// A held named lock.
#[derive(Debug)]
struct HeldLock {
    token: String,
    expires_at: Instant,
}

/// All shared state. Every trait method takes the mutex exactly once.
#[derive(Debug, Default)]
struct Inner {
    lobbies: HashMap<String, LobbyRecord>,
    members: HashMap<String, HashSet<String>>,
    active: HashSet<String>,
    created_total: u64,
    player_lobby: HashMap<String, String>,
    subscribers: HashMap<String, Vec<mpsc::Sender<String>>>,
    locks: HashMap<String, HeldLock>,
}

/// An in-process [`LobbyStore`] backed by a mutex-guarded state table.
///
/// # Example
///
/// ```
/// use lobby_core::stores::MemoryStore;
///
/// let store = MemoryStore::new();
/// let second_instance = store.clone(); // shares the same state
/// # let _ = second_instance;
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Lease over a named entry in the store's lock table.
struct MemoryLock {
    inner: Arc<Mutex<Inner>>,
    resource: String,
    token: String,
}

#[async_trait]
impl StoreLock for MemoryLock {
    async fn release(self: Box<Self>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        // Token check: if the lease expired and someone else re-acquired,
        // leave the new holder's lock alone.
        let held_by_us = inner
            .locks
            .get(&self.resource)
            .is_some_and(|held| held.token == self.token);
        if held_by_us {
            inner.locks.remove(&self.resource);
        } else {
            debug!(
                resource = %self.resource,
                "lock already expired or re-acquired; release is a no-op"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl LobbyStore for MemoryStore {
    async fn acquire_lock(
        &self,
        resource: &str,
        options: LockOptions,
    ) -> Result<Option<Box<dyn StoreLock>>> {
        let deadline = Instant::now() + options.wait_timeout;
        loop {
            {
                let mut inner = self.inner.lock().await;
                let now = Instant::now();
                let free = inner
                    .locks
                    .get(resource)
                    .map_or(true, |held| held.expires_at <= now);
                if free {
                    let token = uuid::Uuid::new_v4().simple().to_string();
                    inner.locks.insert(
                        resource.to_string(),
                        HeldLock {
                            token: token.clone(),
                            expires_at: now + options.expiry,
                        },
                    );
                    return Ok(Some(Box::new(MemoryLock {
                        inner: Arc::clone(&self.inner),
                        resource: resource.to_string(),
                        token,
                    })));
                }
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(options.retry_interval).await;
        }
    }

    async fn lobby_player_count(&self, lobby_id: &str) -> Result<u64> {
        let inner = self.inner.lock().await;
        Ok(inner
            .lobbies
            .get(lobby_id)
            .map_or(0, |record| record.current_players))
    }

    async fn find_or_create_open_lobby(
        &self,
        max_players_per_lobby: u32,
        max_total_lobbies: u64,
        candidate_lobby_id: &str,
    ) -> Result<FindOrCreateOutcome> {
        let mut inner = self.inner.lock().await;

        // First fit over the directory; enumeration order is arbitrary.
        let open = inner.active.iter().find_map(|lobby_id| {
            let record = inner.lobbies.get(lobby_id)?;
            (record.current_players < u64::from(record.max_capacity)).then(|| lobby_id.clone())
        });
        if let Some(lobby_id) = open {
            return Ok(FindOrCreateOutcome::Lobby(lobby_id));
        }

        if inner.created_total >= max_total_lobbies {
            return Ok(FindOrCreateOutcome::LimitReached);
        }
        if inner.lobbies.contains_key(candidate_lobby_id) {
            return Ok(FindOrCreateOutcome::IdCollision);
        }

        inner.lobbies.insert(
            candidate_lobby_id.to_string(),
            LobbyRecord {
                current_players: 0,
                max_capacity: max_players_per_lobby,
            },
        );
        inner.active.insert(candidate_lobby_id.to_string());
        inner.created_total += 1;
        Ok(FindOrCreateOutcome::Lobby(candidate_lobby_id.to_string()))
    }

    async fn add_player_to_lobby(
        &self,
        lobby_id: &str,
        player_id: &str,
        max_players_per_lobby: u32,
    ) -> Result<AddPlayerOutcome> {
        let mut inner = self.inner.lock().await;

        let current = match inner.lobbies.get(lobby_id) {
            Some(record) => record.current_players,
            None => {
                return Err(LobbyError::Store(format!(
                    "lobby {lobby_id} has no record"
                )))
            }
        };
        // Capacity gate first, exactly like the store-side script: a full
        // lobby refuses even a re-add of an existing member.
        if current >= u64::from(max_players_per_lobby) {
            return Ok(AddPlayerOutcome::Full);
        }

        let newly_added = inner
            .members
            .entry(lobby_id.to_string())
            .or_default()
            .insert(player_id.to_string());
        if !newly_added {
            return Ok(AddPlayerOutcome::AlreadyPresent);
        }
        if let Some(record) = inner.lobbies.get_mut(lobby_id) {
            record.current_players += 1;
        }
        Ok(AddPlayerOutcome::Added)
    }

    async fn player_lobby(&self, player_id: &str) -> Result<Option<String>> {
        let inner = self.inner.lock().await;
        Ok(inner.player_lobby.get(player_id).cloned())
    }

    async fn set_player_lobby(&self, player_id: &str, lobby_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .player_lobby
            .insert(player_id.to_string(), lobby_id.to_string());
        Ok(())
    }

    async fn active_lobby_ids(&self) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        Ok(inner.active.iter().cloned().collect())
    }

    async fn lobby_details(&self, lobby_ids: &[String]) -> Result<Vec<LobbyInfo>> {
        let inner = self.inner.lock().await;
        let mut details = Vec::with_capacity(lobby_ids.len());
        for lobby_id in lobby_ids {
            match inner.lobbies.get(lobby_id) {
                Some(record) => details.push(LobbyInfo {
                    lobby_id: lobby_id.clone(),
                    current_players: record.current_players,
                    max_capacity: record.max_capacity,
                }),
                None => {
                    warn!(lobby_id = %lobby_id, "active lobby has no record, skipping");
                }
            }
        }
        Ok(details)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let Some(senders) = inner.subscribers.get_mut(channel) else {
            return Ok(());
        };
        senders.retain(|sender| !sender.is_closed());
        for sender in senders.iter() {
            // At-most-once: a full subscriber drops this payload rather
            // than blocking the publisher.
            if sender.try_send(payload.to_string()).is_err() {
                warn!(channel = %channel, "subscriber lagging or gone, dropping payload");
            }
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<String>> {
        let mut inner = self.inner.lock().await;
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        inner
            .subscribers
            .entry(channel.to_string())
            .or_default()
            .push(sender);
        Ok(receiver)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn lock_options() -> LockOptions {
        LockOptions {
            expiry: Duration::from_secs(10),
            wait_timeout: Duration::from_millis(300),
            retry_interval: Duration::from_millis(50),
        }
    }

    #[test]
    fn memory_store_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MemoryStore>();
    }

    #[tokio::test(start_paused = true)]
    async fn lock_is_mutually_exclusive() {
        let store = MemoryStore::new();
        let first = store.acquire_lock("res", lock_options()).await.unwrap();
        assert!(first.is_some());

        let second = store.acquire_lock("res", lock_options()).await.unwrap();
        assert!(second.is_none(), "held lock must not be re-acquired");
    }

    #[tokio::test(start_paused = true)]
    async fn released_lock_can_be_reacquired() {
        let store = MemoryStore::new();
        let lock = store
            .acquire_lock("res", lock_options())
            .await
            .unwrap()
            .unwrap();
        lock.release().await.unwrap();

        let again = store.acquire_lock("res", lock_options()).await.unwrap();
        assert!(again.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_lock_can_be_reacquired() {
        let store = MemoryStore::new();
        let _stale = store
            .acquire_lock("res", lock_options())
            .await
            .unwrap()
            .unwrap();

        tokio::time::sleep(Duration::from_secs(11)).await;

        let fresh = store.acquire_lock("res", lock_options()).await.unwrap();
        assert!(fresh.is_some(), "expired lease must be claimable");
    }

    #[tokio::test(start_paused = true)]
    async fn stale_release_does_not_steal_new_holders_lock() {
        let store = MemoryStore::new();
        let stale = store
            .acquire_lock("res", lock_options())
            .await
            .unwrap()
            .unwrap();

        // Lease lapses; a new holder takes over.
        tokio::time::sleep(Duration::from_secs(11)).await;
        let _fresh = store
            .acquire_lock("res", lock_options())
            .await
            .unwrap()
            .unwrap();

        // The stale guard's release must be a token-checked no-op.
        stale.release().await.unwrap();
        let contended = store.acquire_lock("res", lock_options()).await.unwrap();
        assert!(
            contended.is_none(),
            "new holder's lease must survive a stale release"
        );
    }

    #[tokio::test]
    async fn add_player_full_is_the_backstop() {
        let store = MemoryStore::new();
        let outcome = store
            .find_or_create_open_lobby(2, 10, "lobby-a")
            .await
            .unwrap();
        assert_eq!(outcome, FindOrCreateOutcome::Lobby("lobby-a".into()));

        assert_eq!(
            store.add_player_to_lobby("lobby-a", "p1", 2).await.unwrap(),
            AddPlayerOutcome::Added
        );
        assert_eq!(
            store.add_player_to_lobby("lobby-a", "p2", 2).await.unwrap(),
            AddPlayerOutcome::Added
        );
        // Even without any coordination lock, the atomic add refuses.
        assert_eq!(
            store.add_player_to_lobby("lobby-a", "p3", 2).await.unwrap(),
            AddPlayerOutcome::Full
        );
        assert_eq!(store.lobby_player_count("lobby-a").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn add_player_is_idempotent_per_player() {
        let store = MemoryStore::new();
        store
            .find_or_create_open_lobby(4, 10, "lobby-a")
            .await
            .unwrap();

        assert_eq!(
            store.add_player_to_lobby("lobby-a", "p1", 4).await.unwrap(),
            AddPlayerOutcome::Added
        );
        assert_eq!(
            store.add_player_to_lobby("lobby-a", "p1", 4).await.unwrap(),
            AddPlayerOutcome::AlreadyPresent
        );
        // The counter moved once, matching the membership set cardinality.
        assert_eq!(store.lobby_player_count("lobby-a").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn add_player_to_missing_lobby_is_an_error() {
        let store = MemoryStore::new();
        let result = store.add_player_to_lobby("ghost", "p1", 4).await;
        assert!(matches!(result, Err(LobbyError::Store(_))));
    }

    #[tokio::test]
    async fn find_or_create_respects_the_ceiling() {
        let store = MemoryStore::new();
        store
            .find_or_create_open_lobby(1, 1, "lobby-a")
            .await
            .unwrap();
        store.add_player_to_lobby("lobby-a", "p1", 1).await.unwrap();

        let outcome = store
            .find_or_create_open_lobby(1, 1, "lobby-b")
            .await
            .unwrap();
        assert_eq!(outcome, FindOrCreateOutcome::LimitReached);
    }

    #[tokio::test]
    async fn find_or_create_reports_id_collisions() {
        let store = MemoryStore::new();
        store
            .find_or_create_open_lobby(1, 10, "lobby-a")
            .await
            .unwrap();
        store.add_player_to_lobby("lobby-a", "p1", 1).await.unwrap();

        let outcome = store
            .find_or_create_open_lobby(1, 10, "lobby-a")
            .await
            .unwrap();
        assert_eq!(outcome, FindOrCreateOutcome::IdCollision);
    }

    #[tokio::test]
    async fn lobby_details_skips_directory_entries_without_records() {
        let store = MemoryStore::new();
        store
            .find_or_create_open_lobby(4, 10, "lobby-a")
            .await
            .unwrap();
        // Corrupt the state: directory entry with no record.
        store
            .inner
            .lock()
            .await
            .active
            .insert("ghost".to_string());

        let ids = store.active_lobby_ids().await.unwrap();
        assert_eq!(ids.len(), 2);
        let details = store.lobby_details(&ids).await.unwrap();
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].lobby_id, "lobby-a");
    }

    #[tokio::test]
    async fn publish_reaches_current_subscribers_only() {
        let store = MemoryStore::new();
        let mut early = store.subscribe("ch").await.unwrap();

        store.publish("ch", "one").await.unwrap();
        assert_eq!(early.recv().await.unwrap(), "one");

        let mut late = store.subscribe("ch").await.unwrap();
        store.publish("ch", "two").await.unwrap();
        assert_eq!(early.recv().await.unwrap(), "two");
        assert_eq!(late.recv().await.unwrap(), "two");
        // "one" predates the late subscription; no replay.
        assert!(late.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_receiver_ends_the_subscription() {
        let store = MemoryStore::new();
        let receiver = store.subscribe("ch").await.unwrap();
        drop(receiver);

        store.publish("ch", "into the void").await.unwrap();
        let inner = store.inner.lock().await;
        assert!(inner.subscribers.get("ch").is_some_and(Vec::is_empty));
    }
}
