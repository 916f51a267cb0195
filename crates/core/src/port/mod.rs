// Port Layer - Interfaces for external dependencies

pub mod id_provider; // For deterministic testing
pub mod item_handler;
pub mod store;
pub mod time_provider;

// Re-exports
pub use id_provider::{IdProvider, UuidProvider};
pub use item_handler::ItemHandler;
pub use store::{decode_item_id, AtomicStore};
pub use time_provider::{SystemTimeProvider, TimeProvider};
