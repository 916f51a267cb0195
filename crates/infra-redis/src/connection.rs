// Redis Connection Setup

use leaseq_core::error::{AppError, Result};
use redis::aio::ConnectionManager;
use redis::{ErrorKind, RedisError};
use tracing::info;

/// Open a client and a shared auto-reconnecting connection
pub async fn connect(redis_url: &str) -> Result<(redis::Client, ConnectionManager)> {
    let client = redis::Client::open(redis_url).map_err(map_redis_error)?;
    let manager = client
        .get_connection_manager()
        .await
        .map_err(map_redis_error)?;

    info!(url = %redact(redis_url), "Connected to Redis");
    Ok((client, manager))
}

/// Convert redis::RedisError to AppError with structured information
pub fn map_redis_error(err: RedisError) -> AppError {
    if err.is_timeout() {
        return AppError::Store(format!("Redis timeout: {}", err));
    }
    if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
        return AppError::Store(format!("Redis connection error: {}", err));
    }
    match err.kind() {
        ErrorKind::TypeError => AppError::Store(format!("Unexpected Redis reply type: {}", err)),
        ErrorKind::InvalidClientConfig => AppError::Config(format!("Invalid Redis URL: {}", err)),
        ErrorKind::AuthenticationFailed => {
            AppError::Store(format!("Redis authentication failed: {}", err))
        }
        _ => AppError::Store(format!("Redis error: {}", err)),
    }
}

/// Hide the password part of a redis URL for logging
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => {
            format!("{}://***{}", &url[..scheme], &url[at..])
        }
        _ => url.to_string(),
    }
}
