use std::sync::Arc;

use anyhow::Result;
use callsign_ledger::{
    AllocationError, AllocationRequest, Allocator, AllocatorSettings, Ledger, StoreError,
};
use callsign_test_utils::MockStore;
use tokio::task::JoinSet;

const PREFIX: &str = "OPS-";
const START: u64 = 500;

fn settings() -> AllocatorSettings {
    AllocatorSettings::new(PREFIX).with_start(START)
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_allocations_never_collide() -> Result<()> {
    let store = Arc::new(MockStore::with_ledger(Ledger::new(PREFIX, START)));
    let allocator = Arc::new(Allocator::new(
        store.clone(),
        settings().with_max_attempts(64),
    ));

    let mut tasks = JoinSet::new();
    for worker in 0..16 {
        let allocator = allocator.clone();
        tasks.spawn(async move {
            allocator
                .allocate(AllocationRequest::new(
                    format!("user-{worker}"),
                    format!("worker {worker}"),
                ))
                .await
        });
    }

    let mut numbers = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        numbers.push(joined??.number);
    }

    let issued = numbers.len();
    numbers.sort_unstable();
    numbers.dedup();
    assert_eq!(numbers.len(), issued, "every issued number is unique");
    assert_eq!(issued, 16);

    let ledger = store.ledger().expect("ledger present");
    assert_eq!(ledger.next_sequence, START + 16, "no lost updates");
    assert_eq!(ledger.assignments.len(), 16);

    // codes were committed in strictly increasing order
    for (offset, assignment) in ledger.assignments.iter().enumerate() {
        assert_eq!(assignment.code, format!("{PREFIX}{}", START + offset as u64));
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn cold_start_races_initialize_exactly_once() -> Result<()> {
    let store = Arc::new(MockStore::new());
    let allocator = Arc::new(Allocator::new(
        store.clone(),
        settings().with_max_attempts(64),
    ));

    let mut tasks = JoinSet::new();
    for worker in 0..4 {
        let allocator = allocator.clone();
        tasks.spawn(async move {
            allocator
                .allocate(AllocationRequest::new(
                    format!("user-{worker}"),
                    format!("worker {worker}"),
                ))
                .await
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined??;
    }

    let ledger = store.ledger().expect("initialized");
    assert_eq!(ledger.prefix, PREFIX);
    assert_eq!(ledger.next_sequence, START + 4);
    assert_eq!(ledger.assignments.len(), 4);
    Ok(())
}

#[tokio::test]
async fn contention_error_carries_the_attempt_count() {
    let store = Arc::new(MockStore::with_ledger(Ledger::new(PREFIX, START)));
    store.force_write_conflicts(3);
    let allocator = Allocator::new(store.clone(), settings().with_max_attempts(3));

    let err = allocator
        .allocate(AllocationRequest::new("u-1", "Bakr"))
        .await
        .expect_err("conflicts exhaust the budget");
    assert!(matches!(err, AllocationError::Contention { attempts: 3 }));
    assert_eq!(store.writes(), 3);
}

#[tokio::test]
async fn transport_failures_stop_the_allocation_immediately() {
    let store = Arc::new(MockStore::with_ledger(Ledger::new(PREFIX, START)));
    store.fail_next_write(StoreError::Transport("503 from store".into()));
    let allocator = Allocator::new(store.clone(), settings());

    let err = allocator
        .allocate(AllocationRequest::new("u-1", "Bakr"))
        .await
        .expect_err("transport error is terminal");
    assert!(matches!(err, AllocationError::Transport(_)));
    assert_eq!(store.writes(), 1, "no retry after a transport failure");
    assert_eq!(store.ledger().unwrap().next_sequence, START, "nothing committed");
}
