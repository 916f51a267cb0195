// Atomic Store Port (Interface)
// Any backend with atomic list transfer, expiring keys and existence checks

use crate::domain::ItemId;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Shared list-and-key-value store the queue protocol runs against.
///
/// Lists have a head and a tail: `push_head` inserts at the head and the
/// transfer operations pop from the tail, so a list used only through these
/// two is FIFO.
///
/// Every method is a single store-side step. `atomic_transfer` and
/// `atomic_transfer_blocking` in particular must move the value in one
/// indivisible operation, never as a client-side pop followed by a push.
#[async_trait]
pub trait AtomicStore: Send + Sync {
    /// Set a key
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Set a key that expires after `ttl`
    async fn set_with_ttl(&self, key: &str, ttl: Duration, value: &[u8]) -> Result<()>;

    /// Get a key (None if missing or expired)
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a key (missing keys are not an error)
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check whether a key exists and has not expired
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Insert a value at the head of a list
    async fn push_head(&self, list: &str, value: &[u8]) -> Result<()>;

    /// Pop the tail of `src` and push it onto the head of `dst` as one step.
    /// Returns None immediately when `src` is empty.
    async fn atomic_transfer(&self, src: &str, dst: &str) -> Result<Option<Vec<u8>>>;

    /// Blocking form of [`AtomicStore::atomic_transfer`]: waits until a value
    /// is available or `timeout` elapses. `Duration::ZERO` waits forever.
    async fn atomic_transfer_blocking(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>>;

    /// Number of values in a list
    async fn list_length(&self, list: &str) -> Result<u64>;

    /// Remove every occurrence of `value`, returning how many were removed
    async fn remove_all_matching(&self, list: &str, value: &[u8]) -> Result<u64>;

    /// Position of the first occurrence of `value` counted from the head
    async fn find_index(&self, list: &str, value: &[u8]) -> Result<Option<u64>>;

    /// Snapshot of a whole list, head first
    async fn list_all(&self, list: &str) -> Result<Vec<Vec<u8>>>;
}

/// Decode a raw list value into an item id.
///
/// Item ids are written as UTF-8 text, so anything else means the list was
/// corrupted or written by something other than this protocol.
pub fn decode_item_id(list: &str, raw: Vec<u8>) -> Result<ItemId> {
    String::from_utf8(raw).map_err(|e| AppError::CorruptItemId {
        list: list.to_string(),
        detail: format!("value is not UTF-8 text ({})", e.utf8_error()),
    })
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockState {
        keys: HashMap<String, Vec<u8>>,
        lists: HashMap<String, VecDeque<Vec<u8>>>,
        fail_on: HashSet<&'static str>,
        fail_push_onto: HashSet<String>,
    }

    /// Mock AtomicStore for testing
    ///
    /// Keeps everything in memory with no expiry: TTL keys live until
    /// [`MockStore::expire`] removes them. Blocking transfer behaves like the
    /// non-blocking one. Individual operations can be made to fail to
    /// simulate a worker dying between protocol steps.
    #[derive(Default)]
    pub struct MockStore {
        state: Mutex<MockState>,
    }

    impl MockStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Simulate TTL expiry of a key
        pub fn expire(&self, key: &str) {
            self.state.lock().unwrap().keys.remove(key);
        }

        /// Make every call of `op` (method name) fail with a store error
        pub fn fail_on(&self, op: &'static str) {
            self.state.lock().unwrap().fail_on.insert(op);
        }

        /// Stop failing `op`
        pub fn recover(&self, op: &'static str) {
            self.state.lock().unwrap().fail_on.remove(op);
        }

        /// Make `push_head` fail only when it targets `list`
        pub fn fail_push_onto(&self, list: &str) {
            self.state
                .lock()
                .unwrap()
                .fail_push_onto
                .insert(list.to_string());
        }

        /// Stop failing pushes onto `list`
        pub fn recover_push_onto(&self, list: &str) {
            self.state.lock().unwrap().fail_push_onto.remove(list);
        }

        /// Push a raw value bypassing the protocol
        pub fn inject(&self, list: &str, raw: &[u8]) {
            self.state
                .lock()
                .unwrap()
                .lists
                .entry(list.to_string())
                .or_default()
                .push_front(raw.to_vec());
        }

        /// Contents of a list decoded as text, head first
        pub fn list(&self, list: &str) -> Vec<String> {
            self.state
                .lock()
                .unwrap()
                .lists
                .get(list)
                .map(|l| {
                    l.iter()
                        .map(|v| String::from_utf8_lossy(v).into_owned())
                        .collect()
                })
                .unwrap_or_default()
        }

        pub fn has_key(&self, key: &str) -> bool {
            self.state.lock().unwrap().keys.contains_key(key)
        }

        fn check(&self, state: &MockState, op: &'static str) -> Result<()> {
            if state.fail_on.contains(op) {
                return Err(AppError::Store(format!("injected failure: {}", op)));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl AtomicStore for MockStore {
        async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            self.check(&state, "set")?;
            state.keys.insert(key.to_string(), value.to_vec());
            Ok(())
        }

        async fn set_with_ttl(&self, key: &str, _ttl: Duration, value: &[u8]) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            self.check(&state, "set_with_ttl")?;
            state.keys.insert(key.to_string(), value.to_vec());
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            let state = self.state.lock().unwrap();
            self.check(&state, "get")?;
            Ok(state.keys.get(key).cloned())
        }

        async fn delete(&self, key: &str) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            self.check(&state, "delete")?;
            state.keys.remove(key);
            Ok(())
        }

        async fn exists(&self, key: &str) -> Result<bool> {
            let state = self.state.lock().unwrap();
            self.check(&state, "exists")?;
            Ok(state.keys.contains_key(key))
        }

        async fn push_head(&self, list: &str, value: &[u8]) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            self.check(&state, "push_head")?;
            if state.fail_push_onto.contains(list) {
                return Err(AppError::Store(format!("injected failure: push_head {}", list)));
            }
            state
                .lists
                .entry(list.to_string())
                .or_default()
                .push_front(value.to_vec());
            Ok(())
        }

        async fn atomic_transfer(&self, src: &str, dst: &str) -> Result<Option<Vec<u8>>> {
            let mut state = self.state.lock().unwrap();
            self.check(&state, "atomic_transfer")?;
            let value = match state.lists.get_mut(src).and_then(|l| l.pop_back()) {
                Some(v) => v,
                None => return Ok(None),
            };
            state
                .lists
                .entry(dst.to_string())
                .or_default()
                .push_front(value.clone());
            Ok(Some(value))
        }

        async fn atomic_transfer_blocking(
            &self,
            src: &str,
            dst: &str,
            _timeout: Duration,
        ) -> Result<Option<Vec<u8>>> {
            self.atomic_transfer(src, dst).await
        }

        async fn list_length(&self, list: &str) -> Result<u64> {
            let state = self.state.lock().unwrap();
            self.check(&state, "list_length")?;
            Ok(state.lists.get(list).map_or(0, |l| l.len() as u64))
        }

        async fn remove_all_matching(&self, list: &str, value: &[u8]) -> Result<u64> {
            let mut state = self.state.lock().unwrap();
            self.check(&state, "remove_all_matching")?;
            let Some(l) = state.lists.get_mut(list) else {
                return Ok(0);
            };
            let before = l.len();
            l.retain(|v| v.as_slice() != value);
            Ok((before - l.len()) as u64)
        }

        async fn find_index(&self, list: &str, value: &[u8]) -> Result<Option<u64>> {
            let state = self.state.lock().unwrap();
            self.check(&state, "find_index")?;
            Ok(state
                .lists
                .get(list)
                .and_then(|l| l.iter().position(|v| v.as_slice() == value))
                .map(|i| i as u64))
        }

        async fn list_all(&self, list: &str) -> Result<Vec<Vec<u8>>> {
            let state = self.state.lock().unwrap();
            self.check(&state, "list_all")?;
            Ok(state
                .lists
                .get(list)
                .map(|l| l.iter().cloned().collect())
                .unwrap_or_default())
        }
    }
}
