//! Concurrent front desks hitting one SQLite-backed coordinator

use std::collections::HashSet;
use std::sync::Arc;

use queueline_core::application::{CoordinatorConfig, JoinRequest, QueueCoordinator};
use queueline_core::domain::EntryStatus;
use queueline_core::port::id_provider::UuidProvider;
use queueline_core::port::time_provider::SystemTimeProvider;
use queueline_core::port::{EntryRepository, EntryScope};
use queueline_core::ErrorKind;
use queueline_infra_sqlite::{create_pool, run_migrations, SqliteEntryRepository};

async fn setup() -> (Arc<SqliteEntryRepository>, Arc<QueueCoordinator>) {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();
    let repo = Arc::new(SqliteEntryRepository::new(pool));
    let coordinator = Arc::new(QueueCoordinator::new(
        repo.clone(),
        Arc::new(UuidProvider),
        Arc::new(SystemTimeProvider),
        CoordinatorConfig::default(),
    ));
    (repo, coordinator)
}

fn walk_in(business_id: &str, name: String) -> JoinRequest {
    JoinRequest {
        business_id: business_id.to_string(),
        customer_name: name,
        phone_number: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_joins_get_distinct_dense_ranks() {
    let (repo, coordinator) = setup().await;

    let mut handles = Vec::new();
    for i in 0..40 {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator
                .join(walk_in("clinic", format!("Patient {}", i)))
                .await
        }));
    }

    let mut ranks = HashSet::new();
    for handle in handles {
        let entry = handle.await.unwrap().unwrap();
        assert!(ranks.insert(entry.position), "duplicate rank {}", entry.position);
    }
    assert_eq!(ranks, (1..=40).collect::<HashSet<u32>>());

    let stored = repo
        .list_by_business("clinic", EntryScope::Active)
        .await
        .unwrap();
    let mut stored_ranks: Vec<u32> = stored.iter().map(|e| e.position).collect();
    stored_ranks.sort_unstable();
    assert_eq!(stored_ranks, (1..=40).collect::<Vec<u32>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_serves_leave_one_serving_row() {
    let (repo, coordinator) = setup().await;

    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(
            coordinator
                .join(walk_in("barber", format!("Customer {}", i)))
                .await
                .unwrap()
                .id,
        );
    }

    let mut handles = Vec::new();
    for id in ids {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator.advance(&id, EntryStatus::Serving).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(e) => assert_eq!(e.kind(), ErrorKind::Conflict),
        }
    }
    assert_eq!(winners, 1);

    let serving = repo
        .list_by_business("barber", EntryScope::Active)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.status == EntryStatus::Serving)
        .count();
    assert_eq!(serving, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_businesses_do_not_interfere() {
    let (_repo, coordinator) = setup().await;

    let mut handles = Vec::new();
    for business in ["north", "south", "east"] {
        for i in 0..10 {
            let coordinator = coordinator.clone();
            handles.push(tokio::spawn(async move {
                coordinator
                    .join(walk_in(business, format!("{} {}", business, i)))
                    .await
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for business in ["north", "south", "east"] {
        let snapshot = coordinator.snapshot(business, false).await.unwrap();
        let ranks: Vec<u32> = snapshot.entries.iter().map(|e| e.position).collect();
        assert_eq!(ranks, (1..=10).collect::<Vec<u32>>());
        assert!(snapshot
            .entries
            .iter()
            .all(|e| e.customer_name.starts_with(business)));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_history_snapshot_never_double_counts() {
    let (_repo, coordinator) = setup().await;

    for round in 0..50 {
        let business = format!("kiosk-{}", round);
        let alice = coordinator
            .join(walk_in(&business, "Alice".to_string()))
            .await
            .unwrap();
        coordinator
            .join(walk_in(&business, "Bob".to_string()))
            .await
            .unwrap();

        let cancel = {
            let coordinator = coordinator.clone();
            let id = alice.id.clone();
            tokio::spawn(async move { coordinator.advance(&id, EntryStatus::Cancelled).await })
        };

        let snapshot = coordinator.snapshot(&business, true).await.unwrap();
        cancel.await.unwrap().unwrap();

        let active: HashSet<&str> = snapshot.entries.iter().map(|e| e.id.as_str()).collect();
        assert!(
            snapshot.history.iter().all(|e| !active.contains(e.id.as_str())),
            "round {}: an entry is both active and in history",
            round
        );
        assert_eq!(snapshot.entries.len() + snapshot.history.len(), 2);

        let stats = coordinator.stats(&business).await.unwrap();
        assert_eq!((stats.waiting, stats.cancelled), (1, 1));
    }
}
