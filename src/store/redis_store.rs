//! Redis-backed store
//!
//! Thin mapping of the `Store` trait onto Redis commands over a
//! multiplexed async connection. Pipelines are sent as MULTI/EXEC.

use super::{Store, StoreFuture, StoreOp};
use crate::error::StoreError;
use redis::aio::MultiplexedConnection;
use redis::{Client, RedisError};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info};

/// Store backed by a Redis server
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379/`)
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(map_redis_error)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_redis_error)?;
        info!(url, "connected to redis");
        Ok(RedisStore { conn })
    }
}

fn map_redis_error(e: RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
        return StoreError::Unavailable(e.to_string());
    }
    let detail = e.detail().unwrap_or_default().to_ascii_lowercase();
    if e.code() == Some("WRONGTYPE") {
        StoreError::WrongType {
            key: String::new(),
        }
    } else if detail.contains("not an integer") {
        StoreError::NotAnInteger { key: String::new() }
    } else if detail.contains("overflow") {
        StoreError::Overflow { key: String::new() }
    } else {
        StoreError::Other(e.to_string())
    }
}

/// Attach the key to errors that carry one
fn with_key(e: StoreError, key: &str) -> StoreError {
    match e {
        StoreError::WrongType { .. } => StoreError::WrongType { key: key.into() },
        StoreError::NotAnInteger { .. } => StoreError::NotAnInteger { key: key.into() },
        StoreError::Overflow { .. } => StoreError::Overflow { key: key.into() },
        other => other,
    }
}

/// Bulk replies are raw bytes; invalid UTF-8 becomes U+FFFD instead of failing the read
fn decode_lossy(raw: Vec<u8>) -> String {
    match String::from_utf8(raw) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

impl Store for RedisStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let raw = redis::cmd("GET")
                .arg(key)
                .query_async::<Option<Vec<u8>>>(&mut conn)
                .await
                .map_err(|e| with_key(map_redis_error(e), key))?;
            Ok(raw.map(decode_lossy))
        })
    }

    fn mget<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, Vec<Option<String>>> {
        Box::pin(async move {
            if keys.is_empty() {
                return Ok(Vec::new());
            }
            let mut conn = self.conn.clone();
            debug!(count = keys.len(), "MGET");
            let raw = redis::cmd("MGET")
                .arg(keys)
                .query_async::<Vec<Option<Vec<u8>>>>(&mut conn)
                .await
                .map_err(map_redis_error)?;
            Ok(raw.into_iter().map(|v| v.map(decode_lossy)).collect())
        })
    }

    fn incr_by<'a>(&'a self, key: &'a str, delta: i64) -> StoreFuture<'a, i64> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            redis::cmd("INCRBY")
                .arg(key)
                .arg(delta)
                .query_async::<i64>(&mut conn)
                .await
                .map_err(|e| with_key(map_redis_error(e), key))
        })
    }

    fn expire<'a>(&'a self, key: &'a str, ttl: Duration) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            redis::cmd("PEXPIRE")
                .arg(key)
                .arg(ttl_millis(ttl))
                .query_async::<()>(&mut conn)
                .await
                .map_err(map_redis_error)
        })
    }

    fn del<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            redis::cmd("DEL")
                .arg(key)
                .query_async::<()>(&mut conn)
                .await
                .map_err(map_redis_error)
        })
    }

    fn sadd<'a>(&'a self, key: &'a str, members: &'a [String]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if members.is_empty() {
                return Ok(());
            }
            let mut conn = self.conn.clone();
            redis::cmd("SADD")
                .arg(key)
                .arg(members)
                .query_async::<()>(&mut conn)
                .await
                .map_err(|e| with_key(map_redis_error(e), key))
        })
    }

    fn srem<'a>(&'a self, key: &'a str, members: &'a [String]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if members.is_empty() {
                return Ok(());
            }
            let mut conn = self.conn.clone();
            redis::cmd("SREM")
                .arg(key)
                .arg(members)
                .query_async::<()>(&mut conn)
                .await
                .map_err(|e| with_key(map_redis_error(e), key))
        })
    }

    fn smembers<'a>(&'a self, key: &'a str) -> StoreFuture<'a, BTreeSet<String>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let members = redis::cmd("SMEMBERS")
                .arg(key)
                .query_async::<Vec<Vec<u8>>>(&mut conn)
                .await
                .map_err(|e| with_key(map_redis_error(e), key))?;
            Ok(members.into_iter().map(decode_lossy).collect())
        })
    }

    fn sunion<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, BTreeSet<String>> {
        Box::pin(async move {
            if keys.is_empty() {
                return Ok(BTreeSet::new());
            }
            let mut conn = self.conn.clone();
            debug!(count = keys.len(), "SUNION");
            let members = redis::cmd("SUNION")
                .arg(keys)
                .query_async::<Vec<Vec<u8>>>(&mut conn)
                .await
                .map_err(map_redis_error)?;
            Ok(members.into_iter().map(decode_lossy).collect())
        })
    }

    fn pipeline<'a>(&'a self, ops: Vec<StoreOp>) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if ops.is_empty() {
                return Ok(());
            }
            let mut pipe = redis::pipe();
            pipe.atomic();
            for op in &ops {
                match op {
                    StoreOp::SetAdd { key, members } if !members.is_empty() => {
                        pipe.cmd("SADD").arg(key).arg(members).ignore();
                    }
                    StoreOp::SetRemove { key, members } if !members.is_empty() => {
                        pipe.cmd("SREM").arg(key).arg(members).ignore();
                    }
                    StoreOp::SetAdd { .. } | StoreOp::SetRemove { .. } => {}
                    StoreOp::Clear { key } => {
                        pipe.cmd("DEL").arg(key).ignore();
                    }
                    StoreOp::Expire { key, ttl } => {
                        pipe.cmd("PEXPIRE").arg(key).arg(ttl_millis(*ttl)).ignore();
                    }
                }
            }
            let mut conn = self.conn.clone();
            debug!(ops = ops.len(), "pipeline");
            pipe.query_async::<()>(&mut conn)
                .await
                .map_err(map_redis_error)
        })
    }
}
