// Item Handler Port
// The work a Worker performs on each leased item

use crate::domain::Item;
use crate::error::Result;
use async_trait::async_trait;

/// Item Handler trait
///
/// Returning `Ok` makes the worker complete the item. Returning `Err` leaves
/// it in processing; once the lease expires the next sweep requeues it, so
/// handlers must tolerate seeing the same item more than once.
#[async_trait]
pub trait ItemHandler: Send + Sync {
    async fn handle(&self, item: &Item) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::sync::Mutex;

    /// Records every handled item; fails items whose id is in `fail_ids`
    #[derive(Default)]
    pub struct RecordingHandler {
        handled: Mutex<Vec<Item>>,
        fail_ids: Mutex<Vec<String>>,
    }

    impl RecordingHandler {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_on(ids: &[&str]) -> Self {
            let handler = Self::new();
            *handler.fail_ids.lock().unwrap() = ids.iter().map(|s| s.to_string()).collect();
            handler
        }

        pub fn handled(&self) -> Vec<Item> {
            self.handled.lock().unwrap().clone()
        }

        pub fn handled_ids(&self) -> Vec<String> {
            self.handled
                .lock()
                .unwrap()
                .iter()
                .map(|i| i.id().to_string())
                .collect()
        }
    }

    #[async_trait]
    impl ItemHandler for RecordingHandler {
        async fn handle(&self, item: &Item) -> Result<()> {
            self.handled.lock().unwrap().push(item.clone());
            if self.fail_ids.lock().unwrap().iter().any(|id| id == item.id()) {
                return Err(AppError::Handler(format!("refused {}", item.id())));
            }
            Ok(())
        }
    }
}
