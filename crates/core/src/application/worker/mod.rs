// Worker - lease/handle/complete loop

pub mod constants;
mod panic_guard;
mod shutdown;

use constants::*;
use panic_guard::handle_guarded;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::WorkQueue;
use crate::error::Result;
use crate::port::ItemHandler;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Worker tuning
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Visibility timeout for each lease
    pub lease_duration: Duration,
    /// Upper bound on one blocking lease, so shutdown is noticed
    pub poll_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            lease_duration: DEFAULT_LEASE_DURATION,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Worker pulls items from one queue and hands them to an [`ItemHandler`]
pub struct Worker {
    queue: Arc<WorkQueue>,
    handler: Arc<dyn ItemHandler>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(queue: Arc<WorkQueue>, handler: Arc<dyn ItemHandler>, config: WorkerConfig) -> Self {
        Self {
            queue,
            handler,
            config,
        }
    }

    /// Run worker loop with graceful shutdown support
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(
            queue = %self.queue.name(),
            session = %self.queue.session(),
            "Worker started"
        );
        loop {
            if shutdown.is_shutdown() {
                info!(queue = %self.queue.name(), "Worker shutting down");
                break;
            }
            // Empty polls already waited inside the blocking lease
            if let Err(e) = self.process_next().await {
                error!(queue = %self.queue.name(), error = %e, "Worker error");
                tokio::select! {
                    _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                    _ = shutdown.wait() => {
                        info!("Worker interrupted during error recovery");
                        break;
                    }
                }
            }
        }
        info!(queue = %self.queue.name(), "Worker stopped");
        Ok(())
    }

    /// Lease and handle one item (returns true if an item was leased)
    pub async fn process_next(&self) -> Result<bool> {
        let item = match self
            .queue
            .lease(self.config.lease_duration, true, self.config.poll_timeout)
            .await?
        {
            Some(item) => item,
            None => return Ok(false),
        };

        debug!(queue = %self.queue.name(), item_id = %item.id(), "Handling item");

        match handle_guarded(self.handler.clone(), item.clone()).await {
            Ok(()) => {
                if self.queue.complete(&item).await? {
                    info!(queue = %self.queue.name(), item_id = %item.id(), "Item completed");
                } else {
                    // Lease expired mid-work and someone else got there first
                    warn!(
                        queue = %self.queue.name(),
                        item_id = %item.id(),
                        "Item was already completed elsewhere"
                    );
                }
            }
            Err(e) => {
                // Left in processing; requeued by the sweep after lease expiry
                warn!(
                    queue = %self.queue.name(),
                    item_id = %item.id(),
                    error = %e,
                    "Handler failed, item left for recovery"
                );
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Item;
    use crate::port::item_handler::mocks::RecordingHandler;
    use crate::port::store::mocks::MockStore;

    fn setup(handler: RecordingHandler) -> (Arc<MockStore>, Arc<WorkQueue>, Arc<RecordingHandler>, Worker) {
        let store = Arc::new(MockStore::new());
        let queue = Arc::new(WorkQueue::new("jobs", store.clone()).unwrap());
        let handler = Arc::new(handler);
        let worker = Worker::new(queue.clone(), handler.clone(), WorkerConfig::default());
        (store, queue, handler, worker)
    }

    #[tokio::test]
    async fn test_process_next_completes_handled_item() {
        let (store, queue, handler, worker) = setup(RecordingHandler::new());
        queue.add_item(&Item::with_id("x1", "a").unwrap()).await.unwrap();

        assert!(worker.process_next().await.unwrap());

        assert_eq!(handler.handled_ids(), vec!["x1"]);
        assert_eq!(queue.processing_count().await.unwrap(), 0);
        assert!(!store.has_key("jobs:item:x1"));
    }

    #[tokio::test]
    async fn test_process_next_empty_queue() {
        let (_store, _queue, handler, worker) = setup(RecordingHandler::new());
        assert!(!worker.process_next().await.unwrap());
        assert!(handler.handled().is_empty());
    }

    #[tokio::test]
    async fn test_failed_item_stays_in_processing() {
        let (store, queue, _handler, worker) = setup(RecordingHandler::failing_on(&["bad"]));
        queue.add_item(&Item::with_id("bad", "a").unwrap()).await.unwrap();

        assert!(worker.process_next().await.unwrap());

        assert_eq!(queue.processing_count().await.unwrap(), 1);
        assert!(store.has_key("jobs:item:bad"));

        // Once the lease lapses the sweep hands it back
        store.expire("jobs:leased_by_session:bad");
        queue.light_clean().await.unwrap();
        assert_eq!(queue.queue_len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_panicking_handler_does_not_stop_worker() {
        struct Panics;

        #[async_trait::async_trait]
        impl ItemHandler for Panics {
            async fn handle(&self, _item: &Item) -> Result<()> {
                panic!("handler bug");
            }
        }

        let store = Arc::new(MockStore::new());
        let queue = Arc::new(WorkQueue::new("jobs", store.clone()).unwrap());
        let worker = Worker::new(queue.clone(), Arc::new(Panics), WorkerConfig::default());
        queue.add_item(&Item::with_id("x1", "a").unwrap()).await.unwrap();

        assert!(worker.process_next().await.unwrap());
        assert_eq!(queue.processing_count().await.unwrap(), 1);
        assert!(!worker.process_next().await.unwrap());
    }

    #[tokio::test]
    async fn test_store_error_propagates() {
        let (store, _queue, _handler, worker) = setup(RecordingHandler::new());
        store.fail_on("atomic_transfer");
        assert!(worker.process_next().await.is_err());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (_store, _queue, _handler, worker) = setup(RecordingHandler::new());
        let (tx, token) = shutdown_channel();
        tx.shutdown();
        worker.run(token).await.unwrap();
    }
}
