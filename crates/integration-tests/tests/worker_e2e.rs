//! Worker + clean scheduler end to end on the in-memory store

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use leaseq_core::application::{shutdown_channel, CleanScheduler, WorkQueue, Worker, WorkerConfig};
use leaseq_core::error::{AppError, Result};
use leaseq_core::port::ItemHandler;
use leaseq_core::Item;
use leaseq_infra_memory::MemoryStore;

/// Fails the first attempt of every item, succeeds afterwards
#[derive(Default)]
struct FlakyHandler {
    attempts: Mutex<HashMap<String, u32>>,
}

impl FlakyHandler {
    fn attempts(&self) -> HashMap<String, u32> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ItemHandler for FlakyHandler {
    async fn handle(&self, item: &Item) -> Result<()> {
        let mut attempts = self.attempts.lock().unwrap();
        let n = attempts.entry(item.id().to_string()).or_insert(0);
        *n += 1;
        if *n == 1 {
            return Err(AppError::Handler(format!("first attempt of {}", item.id())));
        }
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_items_are_redelivered_after_lease_expiry() {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(WorkQueue::new("jobs", store.clone()).unwrap());
    let handler = Arc::new(FlakyHandler::default());

    for i in 0..5 {
        queue
            .add_item(&Item::with_id(format!("x{i}"), "p").unwrap())
            .await
            .unwrap();
    }

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let worker = Worker::new(
        queue.clone(),
        handler.clone(),
        WorkerConfig {
            lease_duration: Duration::from_millis(200),
            poll_timeout: Duration::from_millis(50),
        },
    );
    let worker_handle = {
        let token = shutdown_rx.clone();
        tokio::spawn(async move { worker.run(token).await })
    };
    let scheduler = CleanScheduler::new(queue.clone(), Duration::from_millis(50));
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));

    // Wait until everything has been handled twice and completed
    let settled = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let drained = queue.queue_len().await.unwrap() == 0
                && queue.processing_count().await.unwrap() == 0;
            if drained && handler.attempts().len() == 5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(settled.is_ok(), "queue did not drain: {:?}", handler.attempts());

    shutdown_tx.shutdown();
    worker_handle.await.unwrap().unwrap();
    scheduler_handle.await.unwrap();

    for (id, n) in handler.attempts() {
        assert_eq!(n, 2, "{id} should be handled exactly twice");
    }
    println!("✅ Failed items redelivered and completed");
}

#[tokio::test]
async fn test_worker_stops_promptly_when_idle() {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(WorkQueue::new("idle", store).unwrap());
    let worker = Worker::new(
        queue,
        Arc::new(FlakyHandler::default()),
        WorkerConfig {
            lease_duration: Duration::from_secs(30),
            poll_timeout: Duration::from_millis(50),
        },
    );

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

    tokio::time::sleep(Duration::from_millis(30)).await;
    shutdown_tx.shutdown();

    let stopped = tokio::time::timeout(Duration::from_secs(1), handle).await;
    assert!(stopped.is_ok(), "worker should notice shutdown within one poll");
}
