//! Store wrapper with seeded fault injection
//!
//! Wraps another `Store` and fails a configurable fraction of calls with
//! `StoreError::Unavailable` before they reach the inner store. The RNG is
//! seeded, so a failing run replays exactly from its seed.

use super::{Store, StoreFuture, StoreOp};
use crate::error::StoreError;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;
use std::time::Duration;

/// Failure probabilities for injected outages
#[derive(Debug, Clone)]
pub struct FaultyStoreConfig {
    /// Probability of a read (GET, MGET, SMEMBERS) failing
    pub read_fail_prob: f64,
    /// Probability of a write (INCRBY, EXPIRE, DEL, SADD, SREM, pipeline) failing
    pub write_fail_prob: f64,
}

impl Default for FaultyStoreConfig {
    fn default() -> Self {
        FaultyStoreConfig {
            read_fail_prob: 0.01,
            write_fail_prob: 0.01,
        }
    }
}

impl FaultyStoreConfig {
    /// Every call fails
    pub fn always_down() -> Self {
        FaultyStoreConfig {
            read_fail_prob: 1.0,
            write_fail_prob: 1.0,
        }
    }

    /// No faults - for baseline testing
    pub fn no_faults() -> Self {
        FaultyStoreConfig {
            read_fail_prob: 0.0,
            write_fail_prob: 0.0,
        }
    }
}

/// Statistics for fault injection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultyStoreStats {
    pub read_attempts: u64,
    pub read_failures: u64,
    pub write_attempts: u64,
    pub write_failures: u64,
}

struct FaultState {
    rng: ChaCha8Rng,
    stats: FaultyStoreStats,
}

/// Store that injects seeded `Unavailable` failures in front of `inner`
pub struct FaultyStore<S: Store> {
    inner: S,
    config: FaultyStoreConfig,
    state: Mutex<FaultState>,
}

impl<S: Store> FaultyStore<S> {
    pub fn new(inner: S, seed: u64, config: FaultyStoreConfig) -> Self {
        FaultyStore {
            inner,
            config,
            state: Mutex::new(FaultState {
                rng: ChaCha8Rng::seed_from_u64(seed),
                stats: FaultyStoreStats::default(),
            }),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Get current statistics
    pub fn stats(&self) -> FaultyStoreStats {
        self.state.lock().stats.clone()
    }

    fn roll_read(&self, op: &str) -> Result<(), StoreError> {
        let mut s = self.state.lock();
        s.stats.read_attempts += 1;
        if s.rng.gen_bool(self.config.read_fail_prob.clamp(0.0, 1.0)) {
            s.stats.read_failures += 1;
            return Err(StoreError::Unavailable(format!("injected {} failure", op)));
        }
        Ok(())
    }

    fn roll_write(&self, op: &str) -> Result<(), StoreError> {
        let mut s = self.state.lock();
        s.stats.write_attempts += 1;
        if s.rng.gen_bool(self.config.write_fail_prob.clamp(0.0, 1.0)) {
            s.stats.write_failures += 1;
            return Err(StoreError::Unavailable(format!("injected {} failure", op)));
        }
        Ok(())
    }
}

impl<S: Store> Store for FaultyStore<S> {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            self.roll_read("GET")?;
            self.inner.get(key).await
        })
    }

    fn mget<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, Vec<Option<String>>> {
        Box::pin(async move {
            self.roll_read("MGET")?;
            self.inner.mget(keys).await
        })
    }

    fn incr_by<'a>(&'a self, key: &'a str, delta: i64) -> StoreFuture<'a, i64> {
        Box::pin(async move {
            self.roll_write("INCRBY")?;
            self.inner.incr_by(key, delta).await
        })
    }

    fn expire<'a>(&'a self, key: &'a str, ttl: Duration) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.roll_write("EXPIRE")?;
            self.inner.expire(key, ttl).await
        })
    }

    fn del<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.roll_write("DEL")?;
            self.inner.del(key).await
        })
    }

    fn sadd<'a>(&'a self, key: &'a str, members: &'a [String]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.roll_write("SADD")?;
            self.inner.sadd(key, members).await
        })
    }

    fn srem<'a>(&'a self, key: &'a str, members: &'a [String]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.roll_write("SREM")?;
            self.inner.srem(key, members).await
        })
    }

    fn smembers<'a>(&'a self, key: &'a str) -> StoreFuture<'a, BTreeSet<String>> {
        Box::pin(async move {
            self.roll_read("SMEMBERS")?;
            self.inner.smembers(key).await
        })
    }

    fn sunion<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, BTreeSet<String>> {
        Box::pin(async move {
            self.roll_read("SUNION")?;
            self.inner.sunion(keys).await
        })
    }

    fn pipeline<'a>(&'a self, ops: Vec<StoreOp>) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.roll_write("pipeline")?;
            self.inner.pipeline(ops).await
        })
    }
}
