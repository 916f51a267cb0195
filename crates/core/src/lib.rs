// Leaseq Core - Lease Protocol, Recovery Scanner & Ports
// NO infrastructure dependencies (Hexagonal Architecture)

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use application::WorkQueue;
pub use domain::{Item, KeySpace};
pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
