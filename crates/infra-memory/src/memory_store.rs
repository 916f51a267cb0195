// In-memory AtomicStore Implementation

use async_trait::async_trait;
use leaseq_core::error::{AppError, Result};
use leaseq_core::port::{AtomicStore, SystemTimeProvider, TimeProvider};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::trace;

struct Entry {
    value: Vec<u8>,
    /// Epoch ms from the store's TimeProvider
    expires_at: Option<i64>,
}

#[derive(Default)]
struct State {
    keys: HashMap<String, Entry>,
    lists: HashMap<String, VecDeque<Vec<u8>>>,
    /// Wake-ups for blocking transfers, keyed by source list
    pushed: HashMap<String, Arc<Notify>>,
}

impl State {
    /// Live value of a key, dropping it first if it has expired
    fn live(&mut self, key: &str, now: i64) -> Option<&Entry> {
        let expired = matches!(
            self.keys.get(key),
            Some(Entry { expires_at: Some(at), .. }) if *at <= now
        );
        if expired {
            self.keys.remove(key);
            return None;
        }
        self.keys.get(key)
    }

    fn notifier(&mut self, list: &str) -> Arc<Notify> {
        self.pushed.entry(list.to_string()).or_default().clone()
    }

    fn transfer(&mut self, src: &str, dst: &str) -> Option<Vec<u8>> {
        let source = self.lists.get_mut(src)?;
        let value = source.pop_back()?;
        if source.is_empty() {
            self.lists.remove(src);
        }
        self.lists
            .entry(dst.to_string())
            .or_default()
            .push_front(value.clone());
        Some(value)
    }
}

/// AtomicStore held in process memory.
///
/// Every operation runs under one lock, which makes each of them atomic.
/// Expiry is lazy and measured with the injected TimeProvider, so tests can
/// expire leases by advancing a mock clock. Empty lists are dropped, as in
/// Redis. A push wakes only the transfers blocked on that list.
pub struct MemoryStore {
    state: Mutex<State>,
    time_provider: Arc<dyn TimeProvider>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_time_provider(Arc::new(SystemTimeProvider))
    }

    pub fn with_time_provider(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            time_provider,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| AppError::Store("memory store lock poisoned".to_string()))
    }

    fn now(&self) -> i64 {
        self.time_provider.now_millis()
    }

    fn try_transfer(&self, src: &str, dst: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock()?.transfer(src, dst))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AtomicStore for MemoryStore {
    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.lock()?.keys.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, ttl: Duration, value: &[u8]) -> Result<()> {
        if ttl.as_millis() == 0 {
            return Err(AppError::Validation(
                "ttl must be at least one millisecond".to_string(),
            ));
        }
        let expires_at = i64::try_from(ttl.as_millis())
            .ok()
            .and_then(|ms| self.now().checked_add(ms))
            .ok_or_else(|| AppError::Validation(format!("ttl {:?} is out of range", ttl)))?;
        self.lock()?.keys.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: Some(expires_at),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = self.now();
        Ok(self.lock()?.live(key, now).map(|e| e.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.lock()?.keys.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let now = self.now();
        Ok(self.lock()?.live(key, now).is_some())
    }

    async fn push_head(&self, list: &str, value: &[u8]) -> Result<()> {
        let waiting = {
            let mut state = self.lock()?;
            state
                .lists
                .entry(list.to_string())
                .or_default()
                .push_front(value.to_vec());
            state.pushed.get(list).cloned()
        };
        if let Some(notify) = waiting {
            notify.notify_waiters();
        }
        Ok(())
    }

    async fn atomic_transfer(&self, src: &str, dst: &str) -> Result<Option<Vec<u8>>> {
        self.try_transfer(src, dst)
    }

    async fn atomic_transfer_blocking(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>> {
        let deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);
        let pushed = self.lock()?.notifier(src);

        loop {
            // Register before checking so a push between check and await
            // still wakes us
            let notified = pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.try_transfer(src, dst)? {
                return Ok(Some(value));
            }

            trace!(src = %src, "Blocking transfer waiting for a push");
            match deadline {
                None => notified.await,
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(None);
                    }
                }
            }
        }
    }

    async fn list_length(&self, list: &str) -> Result<u64> {
        Ok(self.lock()?.lists.get(list).map_or(0, |l| l.len() as u64))
    }

    async fn remove_all_matching(&self, list: &str, value: &[u8]) -> Result<u64> {
        let mut state = self.lock()?;
        let Some(entries) = state.lists.get_mut(list) else {
            return Ok(0);
        };
        let before = entries.len();
        entries.retain(|v| v.as_slice() != value);
        let removed = (before - entries.len()) as u64;
        if entries.is_empty() {
            state.lists.remove(list);
        }
        Ok(removed)
    }

    async fn find_index(&self, list: &str, value: &[u8]) -> Result<Option<u64>> {
        Ok(self
            .lock()?
            .lists
            .get(list)
            .and_then(|l| l.iter().position(|v| v.as_slice() == value))
            .map(|i| i as u64))
    }

    async fn list_all(&self, list: &str) -> Result<Vec<Vec<u8>>> {
        Ok(self
            .lock()?
            .lists
            .get(list)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default())
    }
}
