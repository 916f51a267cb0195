//! Lease protocol against a live Redis (>= 6.2)
//!
//! Run with: REDIS_URL=redis://127.0.0.1:6379 cargo test -p leaseq-integration-tests -- --ignored

use std::sync::Arc;
use std::time::Duration;

use leaseq_core::application::WorkQueue;
use leaseq_core::port::AtomicStore;
use leaseq_core::Item;
use leaseq_infra_redis::RedisStore;

async fn redis_queue() -> (Arc<RedisStore>, WorkQueue) {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let store = Arc::new(RedisStore::connect(&url).await.unwrap());
    // Fresh queue name per test run
    let name = format!("leaseq-e2e-{}", uuid::Uuid::new_v4().simple());
    let queue = WorkQueue::new(name, store.clone()).unwrap();
    (store, queue)
}

#[tokio::test]
#[ignore] // Requires running Redis
async fn test_redis_full_lifecycle() {
    let (store, queue) = redis_queue().await;

    queue
        .add_item(&Item::with_id("x1", "hello").unwrap())
        .await
        .unwrap();
    assert_eq!(queue.queue_len().await.unwrap(), 1);

    let item = queue
        .lease(Duration::from_secs(5), false, Duration::ZERO)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.id(), "x1");
    assert_eq!(item.data(), b"hello");
    assert_eq!(queue.processing_count().await.unwrap(), 1);

    assert!(queue.complete(&item).await.unwrap());
    assert!(!queue.complete(&item).await.unwrap());
    assert!(!store.exists(&queue.keys().item_key("x1")).await.unwrap());
    println!("✅ Redis lifecycle verified");
}

#[tokio::test]
#[ignore] // Requires running Redis
async fn test_redis_expired_lease_requeued() {
    let (_store, queue) = redis_queue().await;
    queue.add_item(&Item::with_id("x1", "a").unwrap()).await.unwrap();

    queue
        .lease(Duration::from_millis(100), false, Duration::ZERO)
        .await
        .unwrap()
        .unwrap();

    // Live lease survives
    assert_eq!(queue.light_clean().await.unwrap().requeued, 0);

    tokio::time::sleep(Duration::from_millis(250)).await;
    let report = queue.light_clean().await.unwrap();
    assert_eq!(report.requeued, 1);
    assert_eq!(queue.queue_len().await.unwrap(), 1);
    assert_eq!(queue.processing_count().await.unwrap(), 0);

    // Drain
    let item = queue
        .lease(Duration::from_secs(5), false, Duration::ZERO)
        .await
        .unwrap()
        .unwrap();
    assert!(queue.complete(&item).await.unwrap());
}

#[tokio::test]
#[ignore] // Requires running Redis
async fn test_redis_blocking_lease_wakes_on_add() {
    let (store, queue) = redis_queue().await;
    let queue = Arc::new(queue);

    let waiter = {
        let queue = queue.clone();
        tokio::spawn(async move {
            queue
                .lease(Duration::from_secs(5), true, Duration::from_secs(3))
                .await
                .unwrap()
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    // Other commands are not stuck behind the blocking one
    assert_eq!(store.list_length(queue.keys().main_list()).await.unwrap(), 0);
    queue.add_item(&Item::with_id("late", "p").unwrap()).await.unwrap();

    let item = waiter.await.unwrap().expect("blocked lease should wake");
    assert_eq!(item.id(), "late");
    assert!(queue.complete(&item).await.unwrap());
}
