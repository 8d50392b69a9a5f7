#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Allocation engine integration tests.
//!
//! Exercises `LobbyService` against the in-memory store: idempotency,
//! capacity and ceiling enforcement, lock contention and release, and the
//! surfacing of store failures.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{quick_config, scripted_store};
use lobby_core::store::LobbyStore;
use lobby_core::stores::MemoryStore;
use lobby_core::{JoinCode, LobbyConfig, LobbyError, LobbyService};

fn service_over(store: MemoryStore, config: LobbyConfig) -> LobbyService {
    LobbyService::new(Arc::new(store), config)
}

// ════════════════════════════════════════════════════════════════════
// Basic allocation
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn first_join_creates_a_lobby() {
    let service = service_over(MemoryStore::new(), quick_config(8, 100));

    let response = service.join_lobby("p1", None).await.unwrap();
    assert!(response.success);
    assert_eq!(response.code, JoinCode::Joined);
    let lobby_id = response.lobby_id.expect("joined response carries a lobby id");

    let lobbies = service.list_active_lobbies().await.unwrap();
    assert_eq!(lobbies.len(), 1);
    assert_eq!(lobbies[0].lobby_id, lobby_id);
    assert_eq!(lobbies[0].current_players, 1);
    assert_eq!(lobbies[0].max_capacity, 8);
}

#[tokio::test]
async fn join_is_idempotent_per_player() {
    let service = service_over(MemoryStore::new(), quick_config(8, 100));

    let first = service.join_lobby("p1", None).await.unwrap();
    let second = service.join_lobby("p1", None).await.unwrap();

    assert_eq!(second.code, JoinCode::AlreadyInLobby);
    assert!(second.success);
    assert_eq!(first.lobby_id, second.lobby_id);

    // The counter moved exactly once.
    let lobbies = service.list_active_lobbies().await.unwrap();
    assert_eq!(lobbies.len(), 1);
    assert_eq!(lobbies[0].current_players, 1);
}

#[tokio::test]
async fn idempotency_holds_across_service_instances() {
    let store = MemoryStore::new();
    let first_instance = service_over(store.clone(), quick_config(8, 100));
    let second_instance = service_over(store, quick_config(8, 100));

    let first = first_instance.join_lobby("p1", None).await.unwrap();
    let second = second_instance.join_lobby("p1", None).await.unwrap();

    assert_eq!(second.code, JoinCode::AlreadyInLobby);
    assert_eq!(first.lobby_id, second.lobby_id);
}

#[tokio::test]
async fn empty_player_id_is_rejected_before_the_store() {
    let service = service_over(MemoryStore::new(), quick_config(8, 100));

    let result = service.join_lobby("", None).await;
    assert!(matches!(result, Err(LobbyError::EmptyPlayerId)));
    let result = service.join_lobby("   ", None).await;
    assert!(matches!(result, Err(LobbyError::EmptyPlayerId)));

    // Nothing was created.
    assert!(service.list_active_lobbies().await.unwrap().is_empty());
}

#[tokio::test]
async fn full_lobby_spills_into_a_new_one() {
    let service = service_over(MemoryStore::new(), quick_config(2, 10));

    let first = service.join_lobby("p1", None).await.unwrap();
    let second = service.join_lobby("p2", None).await.unwrap();
    assert_eq!(first.lobby_id, second.lobby_id);

    let third = service.join_lobby("p3", None).await.unwrap();
    assert_eq!(third.code, JoinCode::Joined);
    assert_ne!(third.lobby_id, first.lobby_id);

    let lobbies = service.list_active_lobbies().await.unwrap();
    assert_eq!(lobbies.len(), 2);
}

// ════════════════════════════════════════════════════════════════════
// Preferred lobby
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn preferred_lobby_is_honored_until_full() {
    let service = service_over(MemoryStore::new(), quick_config(2, 10));

    let created = service.join_lobby("p1", None).await.unwrap();
    let lobby_id = created.lobby_id.unwrap();

    let second = service.join_lobby("p2", Some(&lobby_id)).await.unwrap();
    assert_eq!(second.code, JoinCode::Joined);
    assert_eq!(second.lobby_id.as_deref(), Some(lobby_id.as_str()));

    let third = service.join_lobby("p3", Some(&lobby_id)).await.unwrap();
    assert!(!third.success);
    assert_eq!(third.code, JoinCode::PreferredLobbyFull);
    assert!(third.lobby_id.is_none());

    // The refusal mutated nothing.
    let lobbies = service.list_active_lobbies().await.unwrap();
    assert_eq!(lobbies.len(), 1);
    assert_eq!(lobbies[0].current_players, 2);
}

#[tokio::test]
async fn empty_preferred_id_means_no_preference() {
    let service = service_over(MemoryStore::new(), quick_config(8, 100));

    let response = service.join_lobby("p1", Some("  ")).await.unwrap();
    assert_eq!(response.code, JoinCode::Joined);
}

#[tokio::test]
async fn preferred_lobby_without_a_record_is_a_store_error() {
    let service = service_over(MemoryStore::new(), quick_config(8, 100));

    // The advisory count reads 0 for an unknown id; the atomic commit then
    // refuses to invent a lobby record.
    let result = service.join_lobby("p1", Some("no-such-lobby")).await;
    assert!(matches!(result, Err(LobbyError::Store(_))));
}

// ════════════════════════════════════════════════════════════════════
// Global ceiling
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn ceiling_blocks_lobby_creation() {
    let service = service_over(MemoryStore::new(), quick_config(1, 2));

    let first = service.join_lobby("p1", None).await.unwrap();
    let second = service.join_lobby("p2", None).await.unwrap();
    assert_ne!(first.lobby_id, second.lobby_id);

    let third = service.join_lobby("p3", None).await.unwrap();
    assert!(!third.success);
    assert_eq!(third.code, JoinCode::NoCapacityAvailable);
    assert!(third.message.contains("creation is blocked"));

    assert_eq!(service.list_active_lobbies().await.unwrap().len(), 2);
}

#[tokio::test]
async fn end_to_end_two_player_single_lobby_scenario() {
    // maxPlayersPerLobby = 2, maxTotalLobbies = 1.
    let service = service_over(MemoryStore::new(), quick_config(2, 1));

    let p1 = service.join_lobby("p1", None).await.unwrap();
    assert_eq!(p1.code, JoinCode::Joined);
    let lobby_id = p1.lobby_id.clone().unwrap();
    assert_eq!(
        service.list_active_lobbies().await.unwrap()[0].current_players,
        1
    );

    let p2 = service.join_lobby("p2", None).await.unwrap();
    assert_eq!(p2.code, JoinCode::Joined);
    assert_eq!(p2.lobby_id.as_deref(), Some(lobby_id.as_str()));
    assert_eq!(
        service.list_active_lobbies().await.unwrap()[0].current_players,
        2
    );

    let p3 = service.join_lobby("p3", None).await.unwrap();
    assert!(!p3.success);
    assert_eq!(p3.code, JoinCode::NoCapacityAvailable);

    // Still exactly one lobby, still exactly two members.
    let lobbies = service.list_active_lobbies().await.unwrap();
    assert_eq!(lobbies.len(), 1);
    assert_eq!(lobbies[0].current_players, 2);
}

// ════════════════════════════════════════════════════════════════════
// Concurrency
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn concurrent_joins_admit_exactly_capacity() {
    // One lobby of 3 seats, 12 racing players: exactly 3 admissions, the
    // other 9 told there is no capacity. A generous lock budget keeps
    // contention from masquerading as a capacity failure.
    let config = quick_config(3, 1).with_lock_acquire_timeout(Duration::from_secs(30));
    let service = Arc::new(service_over(MemoryStore::new(), config));

    let mut handles = Vec::new();
    for player in 0..12 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service
                .join_lobby(&format!("player-{player}"), None)
                .await
                .unwrap()
        }));
    }

    let mut joined = 0;
    let mut refused = 0;
    for handle in handles {
        let response = handle.await.unwrap();
        match response.code {
            JoinCode::Joined => joined += 1,
            JoinCode::NoCapacityAvailable => refused += 1,
            other => panic!("unexpected outcome under contention: {other}"),
        }
    }
    assert_eq!(joined, 3);
    assert_eq!(refused, 9);

    // The capacity invariant held throughout.
    let lobbies = service.list_active_lobbies().await.unwrap();
    assert_eq!(lobbies.len(), 1);
    assert_eq!(lobbies[0].current_players, 3);
}

#[tokio::test(start_paused = true)]
async fn held_lock_yields_a_busy_response() {
    let store = MemoryStore::new();
    let config = quick_config(8, 100)
        .with_lock_acquire_timeout(Duration::from_millis(200))
        .with_lock_retry_interval(Duration::from_millis(50));

    // Park the allocation lock as if another instance held it.
    let lock = store
        .acquire_lock(
            lobby_core::service::GLOBAL_LOBBY_LOCK_RESOURCE,
            config.lock_options(),
        )
        .await
        .unwrap()
        .unwrap();

    let service = service_over(store, config);
    let response = service.join_lobby("p1", None).await.unwrap();
    assert!(!response.success);
    assert_eq!(response.code, JoinCode::LockUnavailable);
    assert!(response.code.is_retryable());

    lock.release().await.unwrap();
    let retry = service.join_lobby("p1", None).await.unwrap();
    assert_eq!(retry.code, JoinCode::Joined);
}

// ════════════════════════════════════════════════════════════════════
// Failure surfacing
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn store_failure_during_lock_acquire_reads_as_busy() {
    let (store, control) = scripted_store();
    control.fail_acquire_lock.store(true, Ordering::SeqCst);

    let service = LobbyService::new(store, quick_config(8, 100));
    let response = service.join_lobby("p1", None).await.unwrap();
    assert!(!response.success);
    assert_eq!(response.code, JoinCode::LockUnavailable);
}

#[tokio::test(start_paused = true)]
async fn lock_is_released_even_when_the_commit_fails() {
    let (store, control) = scripted_store();
    let service = LobbyService::new(store, quick_config(8, 100));

    control.fail_add_player.store(true, Ordering::SeqCst);
    let result = service.join_lobby("p1", None).await;
    assert!(matches!(result, Err(LobbyError::Store(_))));

    // Had the lock leaked, its 10 s lease would outlive the 300 ms acquire
    // budget and this retry would read as busy instead of joining.
    control.fail_add_player.store(false, Ordering::SeqCst);
    let retry = service.join_lobby("p1", None).await.unwrap();
    assert_eq!(retry.code, JoinCode::Joined);
}

#[tokio::test]
async fn membership_index_write_failure_is_surfaced() {
    let (store, control) = scripted_store();
    control.fail_set_player_lobby.store(true, Ordering::SeqCst);

    let service = LobbyService::new(store, quick_config(8, 100));
    let result = service.join_lobby("p1", None).await;
    assert!(matches!(result, Err(LobbyError::Store(_))));
}

#[tokio::test]
async fn listing_skips_directory_entries_without_records() {
    let (store, control) = scripted_store();
    let service = LobbyService::new(store, quick_config(8, 100));

    let joined = service.join_lobby("p1", None).await.unwrap();
    *control.ghost_lobby.lock().unwrap() = Some("ghost".to_string());

    let lobbies = service.list_active_lobbies().await.unwrap();
    assert_eq!(lobbies.len(), 1);
    assert_eq!(lobbies[0].lobby_id, joined.lobby_id.unwrap());
}
