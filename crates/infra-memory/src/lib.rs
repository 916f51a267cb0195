// Leaseq Infrastructure - In-Memory Adapter
// Implements: AtomicStore for tests and single-process deployments

mod memory_store;

pub use memory_store::MemoryStore;
