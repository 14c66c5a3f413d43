//! Invariant checks under concurrency: the window never over-admits and
//! the queue never over-fills, whatever the interleaving.

use std::sync::Arc;

use weir_rs::services::queue::{QueueManager, QueueOutcome};
use weir_rs::storage::memory::MemoryStore;
use weir_rs::storage::{CounterVerdict, SharedStore};

#[tokio::test]
async fn counter_bound_holds_under_concurrent_hammering() {
    let store = Arc::new(MemoryStore::new());
    let limit = 10u32;
    let now = 1_000i64;

    let mut handles = Vec::new();
    for _ in 0..64 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            matches!(
                store.counter_admit("k", limit, 60, now).await.unwrap(),
                CounterVerdict::WithinQuota { .. }
            )
        }));
    }

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, limit);
}

#[tokio::test]
async fn single_slot_queue_admits_exactly_one_of_two_racers() {
    let queue = Arc::new(QueueManager::new());

    let a = {
        let q = queue.clone();
        tokio::spawn(async move { q.try_enqueue("k", 1, 60_000) })
    };
    let b = {
        let q = queue.clone();
        tokio::spawn(async move { q.try_enqueue("k", 1, 60_000) })
    };

    let outcomes = [a.await.unwrap(), b.await.unwrap()];
    let queued = outcomes
        .iter()
        .filter(|o| matches!(o, QueueOutcome::Queued { .. }))
        .count();
    let rejected = outcomes
        .iter()
        .filter(|o| matches!(o, QueueOutcome::Full))
        .count();

    assert_eq!(queued, 1);
    assert_eq!(rejected, 1);
    assert_eq!(queue.depth("k"), 1);
}

#[tokio::test]
async fn window_admissions_per_identifier_are_independent_of_order() {
    let store = Arc::new(MemoryStore::new());

    let mut handles = Vec::new();
    for i in 0..40 {
        let store = store.clone();
        let key = format!("rule:{}", i % 4);
        handles.push(tokio::spawn(async move {
            (
                key.clone(),
                matches!(
                    store.counter_admit(&key, 5, 60, 1_000).await.unwrap(),
                    CounterVerdict::WithinQuota { .. }
                ),
            )
        }));
    }

    let mut admitted_per_key = std::collections::HashMap::new();
    for handle in handles {
        let (key, admitted) = handle.await.unwrap();
        if admitted {
            *admitted_per_key.entry(key).or_insert(0u32) += 1;
        }
    }

    assert_eq!(admitted_per_key.len(), 4);
    for (_, count) in admitted_per_key {
        assert_eq!(count, 5);
    }
}
