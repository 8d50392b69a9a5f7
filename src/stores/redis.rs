//! Redis store backend.
//!
//! [`RedisStore`] implements [`LobbyStore`] against a Redis server (or
//! cluster endpoint), the deployment target for running several service
//! instances against one shared store:
//!
//! - The find-or-create and add-player transactions run as **Lua scripts**,
//!   so their read-check-write sequences execute server-side with no
//!   partial state visible to concurrent callers.
//! - The coordination lock is a `SET NX PX` lease with a random token and a
//!   compare-and-delete release script, so a stale holder can never release
//!   a lease that has already been re-acquired.
//! - Chat channels map straight onto Redis pub/sub.
//!
//! # Feature gate
//!
//! This module is only available when the `store-redis` feature is enabled
//! (it is enabled by default).

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{LobbyError, Result};
use crate::protocol::LobbyInfo;
use crate::store::{AddPlayerOutcome, FindOrCreateOutcome, LobbyStore, LockOptions, StoreLock};

const LOBBY_HASH_PREFIX: &str = "lobby:";
const LOBBY_PLAYERS_SET_PREFIX: &str = "lobby_players:";
const ACTIVE_LOBBIES_SET_KEY: &str = "active_lobbies";
const GLOBAL_LOBBY_COUNTER_KEY: &str = "global_lobby_count";
const PLAYER_LOBBY_KEY_PREFIX: &str = "player_lobby:";

/// Capacity of each subscriber's payload channel.
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 256;

/// Admit a player: re-check capacity, then update membership set and
/// occupancy counter together. Returns 1 (added), 0 (already a member) or
/// -1 (full).
const ADD_PLAYER_SCRIPT: &str = r"
    local current_players = tonumber(redis.call('HGET', KEYS[1], 'current_players'))
    local max_capacity = tonumber(ARGV[2])
    if not current_players then
        return redis.error_reply('lobby record missing')
    end
    if current_players >= max_capacity then
        return -1
    end
    local added = redis.call('SADD', KEYS[2], ARGV[1])
    if added == 1 then
        redis.call('HINCRBY', KEYS[1], 'current_players', 1)
        return 1
    end
    return 0
";

/// First-fit scan of the active directory, falling back to creation under
/// the global ceiling. Returns a lobby id, -1 (ceiling reached) or -2
/// (candidate id collision).
const FIND_OR_CREATE_SCRIPT: &str = r"
    local max_players = tonumber(ARGV[1])
    local max_total = tonumber(ARGV[2])
    local candidate = ARGV[3]
    local prefix = ARGV[4]

    local active = redis.call('SMEMBERS', KEYS[1])
    for _, lobby_id in ipairs(active) do
        local fields = redis.call('HMGET', prefix .. lobby_id, 'current_players', 'max_capacity')
        local current = tonumber(fields[1])
        local capacity = tonumber(fields[2])
        if current and capacity and current < capacity then
            return lobby_id
        end
    end

    local created = tonumber(redis.call('GET', KEYS[2])) or 0
    if created >= max_total then
        return -1
    end

    local hash_key = prefix .. candidate
    if redis.call('EXISTS', hash_key) == 1 then
        return -2
    end

    redis.call('HSET', hash_key, 'current_players', 0, 'max_capacity', max_players)
    redis.call('SADD', KEYS[1], candidate)
    redis.call('INCR', KEYS[2])
    return candidate
";

/// Release a lock lease only if the stored token is still ours.
const RELEASE_LOCK_SCRIPT: &str = r"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('DEL', KEYS[1])
    end
    return 0
";

fn store_err(error: redis::RedisError) -> LobbyError {
    LobbyError::Store(error.to_string())
}

/// A [`LobbyStore`] backed by a Redis server.
///
/// # Construction
///
/// ```rust,no_run
/// # async fn example() -> lobby_core::Result<()> {
/// use lobby_core::stores::RedisStore;
///
/// let store = RedisStore::connect("redis://127.0.0.1:6379").await?;
/// # let _ = store;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    conn: ConnectionManager,
    add_player_script: Arc<redis::Script>,
    find_or_create_script: Arc<redis::Script>,
    release_lock_script: Arc<redis::Script>,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to the Redis server at `url` (e.g. `redis://host:6379`).
    ///
    /// Commands run over a shared multiplexed connection that reconnects
    /// automatically; each chat subscription gets its own pub/sub
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::Store`] if the URL is invalid or the initial
    /// connection cannot be established.
    pub async fn connect(url: &str) -> Result<Self> {
        debug!(url = %url, "connecting to Redis");
        let client = redis::Client::open(url).map_err(store_err)?;
        let conn = client.get_connection_manager().await.map_err(store_err)?;
        Ok(Self {
            client,
            conn,
            add_player_script: Arc::new(redis::Script::new(ADD_PLAYER_SCRIPT)),
            find_or_create_script: Arc::new(redis::Script::new(FIND_OR_CREATE_SCRIPT)),
            release_lock_script: Arc::new(redis::Script::new(RELEASE_LOCK_SCRIPT)),
        })
    }

    fn lobby_hash_key(lobby_id: &str) -> String {
        format!("{LOBBY_HASH_PREFIX}{lobby_id}")
    }

    fn lobby_players_key(lobby_id: &str) -> String {
        format!("{LOBBY_PLAYERS_SET_PREFIX}{lobby_id}")
    }

    fn player_lobby_key(player_id: &str) -> String {
        format!("{PLAYER_LOBBY_KEY_PREFIX}{player_id}")
    }
}

/// A `SET NX PX` lease held in Redis.
struct RedisLock {
    conn: ConnectionManager,
    release_script: Arc<redis::Script>,
    resource: String,
    token: String,
}

#[async_trait]
impl StoreLock for RedisLock {
    async fn release(self: Box<Self>) -> Result<()> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .release_script
            .key(&self.resource)
            .arg(&self.token)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;
        if deleted == 0 {
            debug!(
                resource = %self.resource,
                "lock already expired or re-acquired; release is a no-op"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl LobbyStore for RedisStore {
    async fn acquire_lock(
        &self,
        resource: &str,
        options: LockOptions,
    ) -> Result<Option<Box<dyn StoreLock>>> {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let expiry_ms = u64::try_from(options.expiry.as_millis())
            .unwrap_or(u64::MAX)
            .max(1);
        let deadline = Instant::now() + options.wait_timeout;
        let mut conn = self.conn.clone();
        loop {
            let acquired: bool = redis::cmd("SET")
                .arg(resource)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(expiry_ms)
                .query_async(&mut conn)
                .await
                .map_err(store_err)?;
            if acquired {
                return Ok(Some(Box::new(RedisLock {
                    conn: self.conn.clone(),
                    release_script: Arc::clone(&self.release_lock_script),
                    resource: resource.to_string(),
                    token,
                })));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(options.retry_interval).await;
        }
    }

    async fn lobby_player_count(&self, lobby_id: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let count: Option<u64> = conn
            .hget(Self::lobby_hash_key(lobby_id), "current_players")
            .await
            .map_err(store_err)?;
        Ok(count.unwrap_or(0))
    }

    async fn find_or_create_open_lobby(
        &self,
        max_players_per_lobby: u32,
        max_total_lobbies: u64,
        candidate_lobby_id: &str,
    ) -> Result<FindOrCreateOutcome> {
        let mut conn = self.conn.clone();
        let reply: redis::Value = self
            .find_or_create_script
            .key(ACTIVE_LOBBIES_SET_KEY)
            .key(GLOBAL_LOBBY_COUNTER_KEY)
            .arg(max_players_per_lobby)
            .arg(max_total_lobbies)
            .arg(candidate_lobby_id)
            .arg(LOBBY_HASH_PREFIX)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;
        match reply {
            redis::Value::BulkString(bytes) => {
                let lobby_id = String::from_utf8(bytes).map_err(|_| {
                    LobbyError::UnexpectedReply("non-UTF-8 lobby id from store".into())
                })?;
                Ok(FindOrCreateOutcome::Lobby(lobby_id))
            }
            redis::Value::Int(-1) => Ok(FindOrCreateOutcome::LimitReached),
            redis::Value::Int(-2) => Ok(FindOrCreateOutcome::IdCollision),
            other => Err(LobbyError::UnexpectedReply(format!(
                "find-or-create returned {other:?}"
            ))),
        }
    }

    async fn add_player_to_lobby(
        &self,
        lobby_id: &str,
        player_id: &str,
        max_players_per_lobby: u32,
    ) -> Result<AddPlayerOutcome> {
        let mut conn = self.conn.clone();
        let code: i64 = self
            .add_player_script
            .key(Self::lobby_hash_key(lobby_id))
            .key(Self::lobby_players_key(lobby_id))
            .arg(player_id)
            .arg(max_players_per_lobby)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;
        match code {
            1 => Ok(AddPlayerOutcome::Added),
            0 => Ok(AddPlayerOutcome::AlreadyPresent),
            -1 => Ok(AddPlayerOutcome::Full),
            other => Err(LobbyError::UnexpectedReply(format!(
                "add-player returned {other}"
            ))),
        }
    }

    async fn player_lobby(&self, player_id: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let lobby_id: Option<String> = conn
            .get(Self::player_lobby_key(player_id))
            .await
            .map_err(store_err)?;
        Ok(lobby_id.filter(|id| !id.is_empty()))
    }

    async fn set_player_lobby(&self, player_id: &str, lobby_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set(Self::player_lobby_key(player_id), lobby_id)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn active_lobby_ids(&self) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .smembers(ACTIVE_LOBBIES_SET_KEY)
            .await
            .map_err(store_err)?;
        Ok(ids)
    }

    async fn lobby_details(&self, lobby_ids: &[String]) -> Result<Vec<LobbyInfo>> {
        if lobby_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for lobby_id in lobby_ids {
            pipe.cmd("HMGET")
                .arg(Self::lobby_hash_key(lobby_id))
                .arg("current_players")
                .arg("max_capacity");
        }
        let rows: Vec<(Option<u64>, Option<u32>)> =
            pipe.query_async(&mut conn).await.map_err(store_err)?;

        let mut details = Vec::with_capacity(lobby_ids.len());
        for (lobby_id, row) in lobby_ids.iter().zip(rows) {
            match row {
                (Some(current_players), Some(max_capacity)) => details.push(LobbyInfo {
                    lobby_id: lobby_id.clone(),
                    current_players,
                    max_capacity,
                }),
                _ => {
                    warn!(lobby_id = %lobby_id, "active lobby has no record, skipping");
                }
            }
        }
        Ok(details)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _receivers: i64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<String>> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(store_err)?;
        pubsub.subscribe(channel).await.map_err(store_err)?;

        let (sender, receiver) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        let channel = channel.to_string();
        tokio::spawn(async move {
            {
                let mut stream = pubsub.on_message();
                while let Some(message) = stream.next().await {
                    let payload: String = match message.get_payload() {
                        Ok(payload) => payload,
                        Err(error) => {
                            warn!(channel = %channel, error = %error, "undecodable pub/sub payload, skipping");
                            continue;
                        }
                    };
                    if sender.send(payload).await.is_err() {
                        // Receiver dropped; the subscription is over.
                        break;
                    }
                }
            }
            // Dropping the pub/sub connection unsubscribes server-side.
            drop(pubsub);
            debug!(channel = %channel, "pub/sub subscription ended");
        });
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

    #[test]
    fn redis_store_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RedisStore>();
    }

    #[test]
    fn key_helpers_use_the_shared_layout() {
        assert_eq!(RedisStore::lobby_hash_key("abc"), "lobby:abc");
        assert_eq!(RedisStore::lobby_players_key("abc"), "lobby_players:abc");
        assert_eq!(RedisStore::player_lobby_key("p1"), "player_lobby:p1");
    }
}
