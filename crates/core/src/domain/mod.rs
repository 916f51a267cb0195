// Domain Layer - Pure naming and the unit of work

pub mod error;
pub mod item;
pub mod keyspace;

// Re-exports
pub use error::DomainError;
pub use item::{Item, ItemId};
pub use keyspace::{validate_queue_name, KeyPrefix, KeySpace, MAX_QUEUE_NAME_LEN};
