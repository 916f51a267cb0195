// Leaseq Infrastructure - Redis Adapter
// Implements: AtomicStore on Redis lists and expiring keys

mod connection;
mod redis_store;

pub use connection::{connect, map_redis_error};
pub use redis_store::RedisStore;

// Note: redis::RedisError conversion is handled by map_redis_error
// due to Rust's orphan rules (cannot implement From<RedisError> for AppError here)
