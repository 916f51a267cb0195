// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DomainError {
    #[error("Item id must not be empty")]
    EmptyItemId,

    #[error("Invalid queue name: {0}")]
    InvalidQueueName(String),

    #[error("Invalid item envelope: {0}")]
    InvalidEnvelope(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
