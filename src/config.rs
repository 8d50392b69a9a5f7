//! Configuration for the lobby allocation engine and chat relay.

use std::time::Duration;

use crate::store::LockOptions;

/// Default lease on the coordination lock.
const DEFAULT_LOCK_EXPIRY: Duration = Duration::from_secs(10);

/// Default budget for acquiring the coordination lock before reporting busy.
const DEFAULT_LOCK_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(1);

/// Default interval between lock acquisition attempts.
const DEFAULT_LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Default capacity of each chat connection's bounded event channel.
const DEFAULT_CHAT_CHANNEL_CAPACITY: usize = 256;

/// Configuration consumed by [`LobbyService`](crate::service::LobbyService)
/// and [`ChatRelay`](crate::chat::ChatRelay).
///
/// The two required limits are `max_players_per_lobby` and
/// `max_total_lobbies`; everything else has defaults tuned for a shared
/// remote store.
///
/// # Example
///
/// ```
/// use lobby_core::LobbyConfig;
///
/// let config = LobbyConfig::new(8, 100);
/// assert_eq!(config.max_players_per_lobby, 8);
/// assert_eq!(config.max_total_lobbies, 100);
/// ```
///
/// # Tuning
///
/// ```
/// use lobby_core::LobbyConfig;
/// use std::time::Duration;
///
/// let config = LobbyConfig::new(8, 100)
///     .with_lock_acquire_timeout(Duration::from_millis(250))
///     .with_chat_channel_capacity(512);
/// ```
#[derive(Debug, Clone)]
pub struct LobbyConfig {
    /// Fixed capacity assigned to every newly created lobby.
    pub max_players_per_lobby: u32,
    /// Ceiling on the number of lobbies ever created.
    pub max_total_lobbies: u64,
    /// Lease on the coordination lock. A crashed holder blocks allocation
    /// for at most this long.
    ///
    /// Defaults to **10 seconds**.
    pub lock_expiry: Duration,
    /// How long one join request waits for the coordination lock before
    /// giving up with a retryable "system busy" failure.
    ///
    /// Defaults to **1 second**.
    pub lock_acquire_timeout: Duration,
    /// Interval between lock acquisition attempts within the wait budget.
    ///
    /// Defaults to **100 milliseconds**.
    pub lock_retry_interval: Duration,
    /// Capacity of the bounded per-connection chat event channel.
    ///
    /// When a consumer cannot keep up, messages to that connection are
    /// dropped (with a warning logged) rather than blocking the fan-out.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub chat_channel_capacity: usize,
}

impl LobbyConfig {
    /// Create a configuration with the given limits and default lock tuning.
    ///
    /// Both limits are clamped to at least 1.
    pub fn new(max_players_per_lobby: u32, max_total_lobbies: u64) -> Self {
        Self {
            max_players_per_lobby: max_players_per_lobby.max(1),
            max_total_lobbies: max_total_lobbies.max(1),
            lock_expiry: DEFAULT_LOCK_EXPIRY,
            lock_acquire_timeout: DEFAULT_LOCK_ACQUIRE_TIMEOUT,
            lock_retry_interval: DEFAULT_LOCK_RETRY_INTERVAL,
            chat_channel_capacity: DEFAULT_CHAT_CHANNEL_CAPACITY,
        }
    }

    /// Set the coordination lock lease.
    #[must_use]
    pub fn with_lock_expiry(mut self, expiry: Duration) -> Self {
        self.lock_expiry = expiry;
        self
    }

    /// Set the lock acquisition wait budget.
    #[must_use]
    pub fn with_lock_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.lock_acquire_timeout = timeout;
        self
    }

    /// Set the interval between lock acquisition attempts.
    #[must_use]
    pub fn with_lock_retry_interval(mut self, interval: Duration) -> Self {
        self.lock_retry_interval = interval;
        self
    }

    /// Set the capacity of per-connection chat event channels.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_chat_channel_capacity(mut self, capacity: usize) -> Self {
        self.chat_channel_capacity = capacity.max(1);
        self
    }

    /// The lock parameters handed to the store on each acquisition.
    pub fn lock_options(&self) -> LockOptions {
        LockOptions {
            expiry: self.lock_expiry,
            wait_timeout: self.lock_acquire_timeout,
            retry_interval: self.lock_retry_interval,
        }
    }
}
