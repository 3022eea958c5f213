//! Store Abstraction
//!
//! The engine talks to its key-value backend only through the `Store`
//! trait. Each method is a single backend round trip with the backend's
//! own per-key atomicity; the engine adds no locking or retries on top.
//!
//! Implementations:
//! - `InMemoryStore`: in-process backend for tests and single-node use
//! - `FaultyStore`: wrapper injecting seeded backend outages
//! - `RedisStore`: Redis server via the `redis` crate (feature `redis-store`)
//! - `ConfiguredStore`: one of the above, chosen from `StoreConfig`

mod configured;
mod faulty;
mod memory;
#[cfg(feature = "redis-store")]
mod redis_store;

pub use configured::ConfiguredStore;
pub use faulty::{FaultyStore, FaultyStoreConfig, FaultyStoreStats};
pub use memory::InMemoryStore;
#[cfg(feature = "redis-store")]
pub use redis_store::RedisStore;

use crate::error::StoreError;
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Boxed future returned by every `Store` method
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// One write inside a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    SetAdd { key: String, members: Vec<String> },
    SetRemove { key: String, members: Vec<String> },
    /// Remove every member; for Redis this deletes the key
    Clear { key: String },
    Expire { key: String, ttl: Duration },
}

/// Key-value backend consumed by counters and sets
pub trait Store: Send + Sync + 'static {
    /// GET: value of a string key, `None` when absent
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

    /// MGET: one entry per requested key, in request order
    fn mget<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, Vec<Option<String>>>;

    /// INCRBY: atomically add `delta`, creating the key at 0 first if absent
    fn incr_by<'a>(&'a self, key: &'a str, delta: i64) -> StoreFuture<'a, i64>;

    /// EXPIRE: (re)set the key's time to live; no-op for absent keys
    fn expire<'a>(&'a self, key: &'a str, ttl: Duration) -> StoreFuture<'a, ()>;

    /// DEL
    fn del<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;

    /// SADD
    fn sadd<'a>(&'a self, key: &'a str, members: &'a [String]) -> StoreFuture<'a, ()>;

    /// SREM
    fn srem<'a>(&'a self, key: &'a str, members: &'a [String]) -> StoreFuture<'a, ()>;

    /// SMEMBERS: empty when absent
    fn smembers<'a>(&'a self, key: &'a str) -> StoreFuture<'a, BTreeSet<String>>;

    /// SUNION: members of every listed set; absent keys count as empty
    fn sunion<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, BTreeSet<String>>;

    /// Submit writes together in one round trip
    ///
    /// Failure semantics are the backend's; nothing is rolled back here.
    fn pipeline<'a>(&'a self, ops: Vec<StoreOp>) -> StoreFuture<'a, ()>;
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        (**self).get(key)
    }

    fn mget<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, Vec<Option<String>>> {
        (**self).mget(keys)
    }

    fn incr_by<'a>(&'a self, key: &'a str, delta: i64) -> StoreFuture<'a, i64> {
        (**self).incr_by(key, delta)
    }

    fn expire<'a>(&'a self, key: &'a str, ttl: Duration) -> StoreFuture<'a, ()> {
        (**self).expire(key, ttl)
    }

    fn del<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        (**self).del(key)
    }

    fn sadd<'a>(&'a self, key: &'a str, members: &'a [String]) -> StoreFuture<'a, ()> {
        (**self).sadd(key, members)
    }

    fn srem<'a>(&'a self, key: &'a str, members: &'a [String]) -> StoreFuture<'a, ()> {
        (**self).srem(key, members)
    }

    fn smembers<'a>(&'a self, key: &'a str) -> StoreFuture<'a, BTreeSet<String>> {
        (**self).smembers(key)
    }

    fn sunion<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, BTreeSet<String>> {
        (**self).sunion(keys)
    }

    fn pipeline<'a>(&'a self, ops: Vec<StoreOp>) -> StoreFuture<'a, ()> {
        (**self).pipeline(ops)
    }
}
