// Redis AtomicStore Implementation

use crate::connection::{connect, map_redis_error};
use async_trait::async_trait;
use leaseq_core::error::{AppError, Result};
use leaseq_core::port::AtomicStore;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::{AsyncCommands, Value};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Idle blocking connections kept for reuse
const MAX_IDLE_BLOCKING: usize = 8;

/// AtomicStore backed by Redis.
///
/// Lists map to Redis lists (head = left), expiring records to `PSETEX`
/// keys. Transfers use `LMOVE`/`BLMOVE ... RIGHT LEFT`, which Redis runs as
/// one step. Blocking transfers run on connections of their own, kept in a
/// small idle pool, so they never stall commands on the shared one.
pub struct RedisStore {
    client: redis::Client,
    conn: ConnectionManager,
    idle_blocking: Mutex<Vec<MultiplexedConnection>>,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let (client, conn) = connect(redis_url).await?;
        Ok(Self {
            client,
            conn,
            idle_blocking: Mutex::new(Vec::new()),
        })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }

    async fn checkout_blocking(&self) -> Result<MultiplexedConnection> {
        if let Some(conn) = self.idle_blocking.lock().await.pop() {
            return Ok(conn);
        }
        debug!("Opening blocking connection");
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_redis_error)
    }

    async fn checkin_blocking(&self, conn: MultiplexedConnection) {
        let mut idle = self.idle_blocking.lock().await;
        if idle.len() < MAX_IDLE_BLOCKING {
            idle.push(conn);
        }
    }
}

/// `PSETEX` milliseconds for a TTL; never rounds to 0 or wraps
fn ttl_millis(ttl: Duration) -> Result<u64> {
    let millis = i64::try_from(ttl.as_millis())
        .map_err(|_| AppError::Validation(format!("ttl {:?} is out of range", ttl)))?;
    if millis == 0 {
        return Err(AppError::Validation(
            "ttl must be at least one millisecond".to_string(),
        ));
    }
    Ok(millis.unsigned_abs())
}

/// `BLMOVE` timeout in seconds.
///
/// Redis truncates the timeout to whole milliseconds and 0 means forever,
/// so any non-zero wait is sent as at least 1ms.
fn blocking_timeout_secs(timeout: Duration) -> f64 {
    if timeout.is_zero() {
        return 0.0;
    }
    timeout.as_millis().max(1) as f64 / 1000.0
}

/// Decode a single list reply.
///
/// Anything other than nil, a bulk string or a simple string means the list
/// holds something this protocol never wrote.
fn reply_bytes(list: &str, reply: Value) -> Result<Option<Vec<u8>>> {
    match reply {
        Value::Nil => Ok(None),
        Value::BulkString(bytes) => Ok(Some(bytes)),
        Value::SimpleString(text) => Ok(Some(text.into_bytes())),
        Value::VerbatimString { text, .. } => Ok(Some(text.into_bytes())),
        other => Err(AppError::CorruptItemId {
            list: list.to_string(),
            detail: format!("unexpected reply {:?}", other),
        }),
    }
}

#[async_trait]
impl AtomicStore for RedisStore {
    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.conn()
            .set::<_, _, ()>(key, value)
            .await
            .map_err(map_redis_error)
    }

    async fn set_with_ttl(&self, key: &str, ttl: Duration, value: &[u8]) -> Result<()> {
        let millis = ttl_millis(ttl)?;
        self.conn()
            .pset_ex::<_, _, ()>(key, value, millis)
            .await
            .map_err(map_redis_error)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.conn()
            .get::<_, Option<Vec<u8>>>(key)
            .await
            .map_err(map_redis_error)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.conn()
            .del::<_, ()>(key)
            .await
            .map_err(map_redis_error)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.conn()
            .exists::<_, bool>(key)
            .await
            .map_err(map_redis_error)
    }

    async fn push_head(&self, list: &str, value: &[u8]) -> Result<()> {
        self.conn()
            .lpush::<_, _, ()>(list, value)
            .await
            .map_err(map_redis_error)
    }

    async fn atomic_transfer(&self, src: &str, dst: &str) -> Result<Option<Vec<u8>>> {
        let reply = redis::cmd("LMOVE")
            .arg(src)
            .arg(dst)
            .arg("RIGHT")
            .arg("LEFT")
            .query_async::<Value>(&mut self.conn())
            .await
            .map_err(map_redis_error)?;
        reply_bytes(src, reply)
    }

    async fn atomic_transfer_blocking(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>> {
        let mut conn = self.checkout_blocking().await?;
        let timeout_secs = blocking_timeout_secs(timeout);

        debug!(src = %src, timeout_secs, "BLMOVE");
        let reply = redis::cmd("BLMOVE")
            .arg(src)
            .arg(dst)
            .arg("RIGHT")
            .arg("LEFT")
            .arg(timeout_secs)
            .query_async::<Value>(&mut conn)
            .await
            .map_err(map_redis_error)?;

        // Only connections that answered go back; a failed one is dropped
        self.checkin_blocking(conn).await;
        reply_bytes(src, reply)
    }

    async fn list_length(&self, list: &str) -> Result<u64> {
        self.conn()
            .llen::<_, u64>(list)
            .await
            .map_err(map_redis_error)
    }

    async fn remove_all_matching(&self, list: &str, value: &[u8]) -> Result<u64> {
        // count 0 = remove every occurrence
        self.conn()
            .lrem::<_, _, u64>(list, 0, value)
            .await
            .map_err(map_redis_error)
    }

    async fn find_index(&self, list: &str, value: &[u8]) -> Result<Option<u64>> {
        redis::cmd("LPOS")
            .arg(list)
            .arg(value)
            .query_async::<Option<u64>>(&mut self.conn())
            .await
            .map_err(map_redis_error)
    }

    async fn list_all(&self, list: &str) -> Result<Vec<Vec<u8>>> {
        let replies = redis::cmd("LRANGE")
            .arg(list)
            .arg(0)
            .arg(-1)
            .query_async::<Vec<Value>>(&mut self.conn())
            .await
            .map_err(map_redis_error)?;

        replies
            .into_iter()
            .filter_map(|reply| reply_bytes(list, reply).transpose())
            .collect()
    }
}
