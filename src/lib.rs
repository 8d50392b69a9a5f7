//! # Lobby Core
//!
//! Capacity-bounded lobby allocation and per-lobby chat relay over a shared
//! state store.
//!
//! This crate is the allocation/membership core of a multiplayer lobby
//! service: given concurrent join requests arriving across possibly many
//! service instances, it guarantees a single race-free view of which lobby
//! has room and which lobby each player belongs to, with all authoritative
//! state held in an external store.
//!
//! ## Features
//!
//! - **Store-agnostic** — implement the [`LobbyStore`] trait for any backend
//!   offering atomic transactions, an expiring lock and pub/sub
//! - **Redis built-in** — default `store-redis` feature provides
//!   [`RedisStore`] (Lua-script transactions, `SET NX PX` lock lease)
//! - **In-memory included** — [`MemoryStore`] for tests and single-process use
//! - **Idempotent joins** — a player re-joining gets their existing lobby back
//! - **Authorized chat** — messages fan out only to a lobby's current members
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use lobby_core::{ChatRelay, LobbyConfig, LobbyService};
//! use lobby_core::stores::MemoryStore;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> lobby_core::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let config = LobbyConfig::new(8, 100);
//!
//! let service = LobbyService::new(store.clone(), config.clone());
//! let relay = ChatRelay::new(store, &config);
//!
//! let response = service.join_lobby("alice", None).await?;
//! assert!(response.success);
//! # let _ = relay;
//! # Ok(())
//! # }
//! ```

pub mod chat;
pub mod codes;
pub mod config;
pub mod error;
pub mod protocol;
pub mod service;
pub mod store;
pub mod stores;

// Re-export primary types for ergonomic imports.
pub use chat::{ChatOutcome, ChatRelay, ConnectionId};
pub use codes::JoinCode;
pub use config::LobbyConfig;
pub use error::{LobbyError, Result};
pub use protocol::{ChatMessage, JoinResponse, LobbyInfo};
pub use service::LobbyService;
pub use store::{LobbyStore, StoreLock};
pub use stores::MemoryStore;

#[cfg(feature = "store-redis")]
pub use stores::RedisStore;
