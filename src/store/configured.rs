//! Store selected at runtime from `[store]` configuration

use super::{InMemoryStore, Store, StoreFuture, StoreOp};
#[cfg(feature = "redis-store")]
use super::RedisStore;
use crate::config::{StoreConfig, StoreKind};
use crate::error::ConfigError;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::info;

/// Backend built from a `StoreConfig`
#[derive(Clone)]
pub enum ConfiguredStore {
    Memory(InMemoryStore),
    #[cfg(feature = "redis-store")]
    Redis(RedisStore),
}

impl ConfiguredStore {
    /// Build the backend named by `config.kind`
    ///
    /// `redis` connects to `config.url` and needs the `redis-store` feature.
    pub async fn open(config: &StoreConfig) -> Result<Self, ConfigError> {
        match config.kind {
            StoreKind::Memory => {
                info!("using in-memory store");
                Ok(ConfiguredStore::Memory(InMemoryStore::new()))
            }
            #[cfg(feature = "redis-store")]
            StoreKind::Redis => Ok(ConfiguredStore::Redis(RedisStore::connect(&config.url).await?)),
            #[cfg(not(feature = "redis-store"))]
            StoreKind::Redis => Err(ConfigError::Invalid(format!(
                "store kind 'redis' ({}) requires the redis-store feature",
                config.url
            ))),
        }
    }

    pub fn kind(&self) -> StoreKind {
        match self {
            ConfiguredStore::Memory(_) => StoreKind::Memory,
            #[cfg(feature = "redis-store")]
            ConfiguredStore::Redis(_) => StoreKind::Redis,
        }
    }

    fn backend(&self) -> &dyn Store {
        match self {
            ConfiguredStore::Memory(store) => store,
            #[cfg(feature = "redis-store")]
            ConfiguredStore::Redis(store) => store,
        }
    }
}

impl Store for ConfiguredStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        self.backend().get(key)
    }

    fn mget<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, Vec<Option<String>>> {
        self.backend().mget(keys)
    }

    fn incr_by<'a>(&'a self, key: &'a str, delta: i64) -> StoreFuture<'a, i64> {
        self.backend().incr_by(key, delta)
    }

    fn expire<'a>(&'a self, key: &'a str, ttl: Duration) -> StoreFuture<'a, ()> {
        self.backend().expire(key, ttl)
    }

    fn del<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        self.backend().del(key)
    }

    fn sadd<'a>(&'a self, key: &'a str, members: &'a [String]) -> StoreFuture<'a, ()> {
        self.backend().sadd(key, members)
    }

    fn srem<'a>(&'a self, key: &'a str, members: &'a [String]) -> StoreFuture<'a, ()> {
        self.backend().srem(key, members)
    }

    fn smembers<'a>(&'a self, key: &'a str) -> StoreFuture<'a, BTreeSet<String>> {
        self.backend().smembers(key)
    }

    fn sunion<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, BTreeSet<String>> {
        self.backend().sunion(keys)
    }

    fn pipeline<'a>(&'a self, ops: Vec<StoreOp>) -> StoreFuture<'a, ()> {
        self.backend().pipeline(ops)
    }
}
