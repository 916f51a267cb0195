// Daemon configuration from environment variables

use leaseq_core::application::worker::constants::DEFAULT_CLEAN_INTERVAL;
use leaseq_core::domain::validate_queue_name;
use leaseq_core::error::{AppError, Result};
use std::time::Duration;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_QUEUE: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub redis_url: String,
    pub queues: Vec<String>,
    pub clean_interval: Duration,
    pub log_format: LogFormat,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any variable source (tests pass a closure over a map)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let redis_url = lookup("LEASEQ_REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.to_string());

        let queues = parse_queues(lookup("LEASEQ_QUEUES").as_deref().unwrap_or(DEFAULT_QUEUE))?;

        let clean_interval = match lookup("LEASEQ_CLEAN_INTERVAL_SECS") {
            Some(raw) => parse_interval(&raw)?,
            None => DEFAULT_CLEAN_INTERVAL,
        };

        let log_format = match lookup("LEASEQ_LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            Some("pretty") | None => LogFormat::Pretty,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "LEASEQ_LOG_FORMAT must be 'pretty' or 'json', got '{}'",
                    other
                )))
            }
        };

        Ok(Self {
            redis_url,
            queues,
            clean_interval,
            log_format,
        })
    }
}

fn parse_queues(raw: &str) -> Result<Vec<String>> {
    let mut queues: Vec<String> = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        validate_queue_name(name)
            .map_err(|e| AppError::Config(format!("LEASEQ_QUEUES: {}", e)))?;
        if !queues.iter().any(|q| q == name) {
            queues.push(name.to_string());
        }
    }
    if queues.is_empty() {
        return Err(AppError::Config("LEASEQ_QUEUES names no queue".to_string()));
    }
    Ok(queues)
}

fn parse_interval(raw: &str) -> Result<Duration> {
    let secs: u64 = raw.trim().parse().map_err(|_| {
        AppError::Config(format!(
            "LEASEQ_CLEAN_INTERVAL_SECS must be a whole number of seconds, got '{}'",
            raw
        ))
    })?;
    if secs == 0 {
        return Err(AppError::Config(
            "LEASEQ_CLEAN_INTERVAL_SECS must be greater than zero".to_string(),
        ));
    }
    Ok(Duration::from_secs(secs))
}
