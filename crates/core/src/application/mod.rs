// Application Layer - Use Cases and Protocol Logic

pub mod autoscale;
pub mod clean_scheduler;
pub mod lease;
pub mod queue;
pub mod recovery;
pub mod worker;

// Re-exports
pub use autoscale::{AutoScaler, Calculator, SlowDown, WorkerCounts};
pub use clean_scheduler::CleanScheduler;
pub use queue::WorkQueue;
pub use recovery::{CleanReport, RecoveryScanner};
pub use worker::{shutdown_channel, ShutdownSender, ShutdownToken, Worker, WorkerConfig};
