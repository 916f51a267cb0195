//! Concurrent workers, completers and sweeps sharing one in-memory store

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use leaseq_core::application::WorkQueue;
use leaseq_core::port::time_provider::mocks::MockTimeProvider;
use leaseq_core::port::AtomicStore;
use leaseq_core::Item;
use leaseq_infra_memory::MemoryStore;

const LEASE: Duration = Duration::from_secs(30);

/// Each worker process gets its own queue handle (own session)
fn handles(store: &Arc<MemoryStore>, n: usize) -> Vec<Arc<WorkQueue>> {
    (0..n)
        .map(|_| Arc::new(WorkQueue::new("jobs", store.clone()).unwrap()))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_leasers_never_share_an_item() {
    let store = Arc::new(MemoryStore::new());
    let queues = handles(&store, 8);

    for i in 0..200 {
        queues[0]
            .add_item(&Item::with_id(format!("x{i}"), "p").unwrap())
            .await
            .unwrap();
    }

    let mut tasks = Vec::new();
    for queue in queues.iter().cloned() {
        tasks.push(tokio::spawn(async move {
            let mut got = Vec::new();
            while let Some(item) = queue
                .lease(LEASE, true, Duration::from_millis(50))
                .await
                .unwrap()
            {
                assert!(queue.complete(&item).await.unwrap());
                got.push(item.id().to_string());
            }
            got
        }));
    }

    let mut all = Vec::new();
    for task in tasks {
        all.extend(task.await.unwrap());
    }

    let unique: HashSet<_> = all.iter().collect();
    assert_eq!(all.len(), 200, "every item delivered");
    assert_eq!(unique.len(), 200, "no item delivered twice");
    assert_eq!(queues[0].processing_count().await.unwrap(), 0);
    println!("✅ 200 items over 8 leasers, no duplicates");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exactly_one_completer_wins() {
    let store = Arc::new(MemoryStore::new());
    let queues = handles(&store, 10);

    queues[0]
        .add_item(&Item::with_id("x1", "p").unwrap())
        .await
        .unwrap();
    let item = queues[0]
        .lease(LEASE, false, Duration::ZERO)
        .await
        .unwrap()
        .unwrap();

    let mut tasks = Vec::new();
    for queue in queues.iter().cloned() {
        let item = item.clone();
        tasks.push(tokio::spawn(async move { queue.complete(&item).await.unwrap() }));
    }

    let mut wins = 0;
    for task in tasks {
        if task.await.unwrap() {
            wins += 1;
        }
    }
    assert_eq!(wins, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_blocked_leasers_wake_for_new_items() {
    let store = Arc::new(MemoryStore::new());
    let queues = handles(&store, 3);

    let mut tasks = Vec::new();
    for queue in queues.iter().cloned() {
        tasks.push(tokio::spawn(async move {
            queue.lease(LEASE, true, Duration::from_secs(2)).await.unwrap()
        }));
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    for i in 0..3 {
        queues[0]
            .add_item(&Item::with_id(format!("late{i}"), "p").unwrap())
            .await
            .unwrap();
    }

    let mut ids = HashSet::new();
    for task in tasks {
        let item = task.await.unwrap().expect("each blocked leaser gets one");
        ids.insert(item.id().to_string());
    }
    assert_eq!(ids.len(), 3);
}

/// Sweeps racing with abandoning workers: nothing is lost, and every item
/// is eventually completed
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sweeps_and_abandoning_workers_lose_nothing() {
    let clock = Arc::new(MockTimeProvider::new(0));
    let store = Arc::new(MemoryStore::with_time_provider(clock.clone()));
    let queues = handles(&store, 4);
    let short = Duration::from_secs(1);

    for i in 0..50 {
        queues[0]
            .add_item(&Item::with_id(format!("x{i}"), "p").unwrap())
            .await
            .unwrap();
    }

    // Workers lease and abandon everything, while a sweeper races them
    let mut tasks = Vec::new();
    for queue in queues.iter().cloned() {
        tasks.push(tokio::spawn(async move {
            for _ in 0..25 {
                let _ = queue.lease(short, false, Duration::ZERO).await.unwrap();
                tokio::task::yield_now().await;
            }
        }));
    }
    let sweeper = {
        let queue = queues[1].clone();
        let clock = clock.clone();
        tokio::spawn(async move {
            for _ in 0..25 {
                clock.advance(short);
                queue.light_clean().await.unwrap();
                tokio::task::yield_now().await;
            }
        })
    };
    for task in tasks {
        task.await.unwrap();
    }
    sweeper.await.unwrap();

    // Let every lease lapse and settle with sweeps
    clock.advance(short);
    queues[0].light_clean().await.unwrap();
    queues[0].light_clean().await.unwrap();

    let mut done = HashSet::new();
    while let Some(item) = queues[0].lease(LEASE, false, Duration::ZERO).await.unwrap() {
        if queues[0].complete(&item).await.unwrap() {
            done.insert(item.id().to_string());
        }
    }
    assert_eq!(done.len(), 50, "every item reachable after sweeps");
    let keys = queues[0].keys();
    assert_eq!(store.list_length(keys.cleaning_list()).await.unwrap(), 0);
    println!("✅ No loss with concurrent sweeps");
}
