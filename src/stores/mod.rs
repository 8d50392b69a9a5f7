//! Store backends for the lobby core.
//!
//! This module provides concrete [`LobbyStore`](crate::store::LobbyStore)
//! implementations. The in-memory backend is always available; remote
//! backends sit behind feature gates:
//!
//! | Feature       | Backend         |
//! |---------------|-----------------|
//! | (always)      | [`MemoryStore`] |
//! | `store-redis` | [`RedisStore`]  |

pub mod memory;

#[cfg(feature = "store-redis")]
pub mod redis;

pub use memory::MemoryStore;

#[cfg(feature = "store-redis")]
pub use redis::RedisStore;
