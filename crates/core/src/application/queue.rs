// Queue Facade - the public surface workers and producers call

use crate::application::lease;
use crate::application::recovery::{CleanReport, RecoveryScanner};
use crate::domain::{Item, KeySpace};
use crate::error::Result;
use crate::port::{AtomicStore, IdProvider, UuidProvider};
use std::sync::Arc;
use std::time::Duration;

/// A work queue backed by a shared atomic store.
///
/// Holds the per-process session token that is written into lease records.
/// The token is only an owner tag for operators; nothing enforces it.
pub struct WorkQueue {
    keys: KeySpace,
    session: String,
    store: Arc<dyn AtomicStore>,
    scanner: RecoveryScanner,
}

impl WorkQueue {
    /// Create a queue handle with a random session token
    pub fn new(name: impl Into<String>, store: Arc<dyn AtomicStore>) -> Result<Self> {
        Self::with_id_provider(name, store, &UuidProvider)
    }

    /// Create a queue handle with a session token from `id_provider`
    pub fn with_id_provider(
        name: impl Into<String>,
        store: Arc<dyn AtomicStore>,
        id_provider: &dyn IdProvider,
    ) -> Result<Self> {
        let keys = KeySpace::new(name)?;
        Ok(Self {
            scanner: RecoveryScanner::new(Arc::clone(&store), keys.clone()),
            session: id_provider.generate_id(),
            keys,
            store,
        })
    }

    pub fn name(&self) -> &str {
        self.keys.queue_name()
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    pub async fn add_item(&self, item: &Item) -> Result<()> {
        lease::add(self.store.as_ref(), &self.keys, item).await
    }

    pub async fn add_items(&self, items: &[Item]) -> Result<()> {
        lease::add_all(self.store.as_ref(), &self.keys, items).await
    }

    /// Lease an item. See [`lease::lease`] for `block`/`timeout` semantics.
    pub async fn lease(
        &self,
        lease_duration: Duration,
        block: bool,
        timeout: Duration,
    ) -> Result<Option<Item>> {
        lease::lease(
            self.store.as_ref(),
            &self.keys,
            &self.session,
            lease_duration,
            block,
            timeout,
        )
        .await
    }

    /// Mark an item done. True only for the first completer.
    pub async fn complete(&self, item: &Item) -> Result<bool> {
        lease::complete(self.store.as_ref(), &self.keys, item).await
    }

    pub async fn light_clean(&self) -> Result<CleanReport> {
        self.scanner.light_clean().await
    }

    /// Items waiting to be leased (not counting items being processed)
    pub async fn queue_len(&self) -> Result<u64> {
        self.store.list_length(self.keys.main_list()).await
    }

    /// Items currently leased
    pub async fn processing_count(&self) -> Result<u64> {
        self.store.list_length(self.keys.processing_list()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::store::mocks::MockStore;

    fn queue(store: Arc<MockStore>) -> WorkQueue {
        WorkQueue::with_id_provider("jobs", store, &SequentialIdProvider::new("worker")).unwrap()
    }

    #[test]
    fn test_invalid_name_rejected() {
        let store: Arc<dyn AtomicStore> = Arc::new(MockStore::new());
        assert!(WorkQueue::new("bad name", store).is_err());
    }

    #[test]
    fn test_random_sessions_differ() {
        let store: Arc<dyn AtomicStore> = Arc::new(MockStore::new());
        let a = WorkQueue::new("jobs", Arc::clone(&store)).unwrap();
        let b = WorkQueue::new("jobs", store).unwrap();
        assert_ne!(a.session(), b.session());
        assert_eq!(a.session().len(), 32);
    }

    #[tokio::test]
    async fn test_add_lease_complete_counts() {
        let store = Arc::new(MockStore::new());
        let queue = queue(store.clone());

        queue
            .add_item(&Item::with_id("x1", "hello").unwrap())
            .await
            .unwrap();
        assert_eq!(queue.queue_len().await.unwrap(), 1);
        assert_eq!(queue.processing_count().await.unwrap(), 0);

        let item = queue
            .lease(Duration::from_secs(5), false, Duration::ZERO)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item, Item::with_id("x1", "hello").unwrap());
        assert_eq!(queue.queue_len().await.unwrap(), 0);
        assert_eq!(queue.processing_count().await.unwrap(), 1);

        assert!(queue.complete(&item).await.unwrap());
        assert_eq!(queue.processing_count().await.unwrap(), 0);
        assert!(!store.has_key("jobs:item:x1"));
        assert!(!queue.complete(&item).await.unwrap());
    }

    #[tokio::test]
    async fn test_lease_record_holds_session() {
        let store = Arc::new(MockStore::new());
        let queue = queue(store.clone());
        queue.add_item(&Item::with_id("x1", "a").unwrap()).await.unwrap();
        queue
            .lease(Duration::from_secs(5), false, Duration::ZERO)
            .await
            .unwrap();

        let owner = store.get("jobs:leased_by_session:x1").await.unwrap();
        assert_eq!(owner.as_deref(), Some(queue.session().as_bytes()));
        assert_eq!(queue.session(), "worker-1");
    }

    #[tokio::test]
    async fn test_add_items_fifo() {
        let store = Arc::new(MockStore::new());
        let queue = queue(store);
        let items: Vec<Item> = (0..5)
            .map(|i| Item::with_id(i, format!("payload-{i}")).unwrap())
            .collect();
        queue.add_items(&items).await.unwrap();

        for expected in &items {
            let leased = queue
                .lease(Duration::from_secs(5), false, Duration::ZERO)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(&leased, expected);
        }
        assert!(queue
            .lease(Duration::from_secs(5), false, Duration::ZERO)
            .await
            .unwrap()
            .is_none());
    }
}
