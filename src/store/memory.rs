//! In-memory store
//!
//! Mirrors the Redis semantics the engine relies on: INCRBY creates keys
//! at 0 and keeps their TTL, EXPIRE on an absent key is a no-op, a set
//! whose last member is removed disappears, and type mismatches are
//! reported as `WrongType`.
//!
//! Deadlines use `tokio::time::Instant`, so paused-time tests can move
//! TTLs forward with `tokio::time::advance`. Expired keys are invisible to
//! reads immediately and are physically dropped on the next write to the
//! key, by `evict_expired()`, or by the background sweeper.

use super::{Store, StoreFuture, StoreOp};
use crate::error::StoreError;
use ahash::AHashSet;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
enum StoredValue {
    Str(String),
    Set(AHashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| deadline > now)
    }
}

type Data = HashMap<String, Entry>;

/// In-process backend; clones share the same data
#[derive(Clone, Default)]
pub struct InMemoryStore {
    data: Arc<RwLock<Data>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a backend outage: every call fails with `Unavailable` while set
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// SET: write a raw string value (no TTL), e.g. to seed historical data
    pub fn set_string(&self, key: &str, value: impl Into<String>) {
        self.data.write().insert(
            key.to_string(),
            Entry {
                value: StoredValue::Str(value.into()),
                expires_at: None,
            },
        );
    }

    /// GET without going through the async trait; `None` for absent or non-string keys
    pub fn get_string(&self, key: &str) -> Option<String> {
        Self::read_string(&self.data.read(), key, Instant::now())
            .ok()
            .flatten()
    }

    /// TTL: remaining time to live, `None` for absent or persistent keys
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let data = self.data.read();
        let entry = data.get(key).filter(|e| e.is_live(now))?;
        entry.expires_at.map(|deadline| deadline - now)
    }

    /// EXISTS
    pub fn exists(&self, key: &str) -> bool {
        let now = Instant::now();
        self.data.read().get(key).is_some_and(|e| e.is_live(now))
    }

    /// Live keys in sorted order
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .data
            .read()
            .iter()
            .filter(|(_, e)| e.is_live(now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.data.read().values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry, returning how many were removed
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut data = self.data.write();
        let before = data.len();
        data.retain(|_, e| e.is_live(now));
        before - data.len()
    }

    /// Spawn a task that evicts expired keys every `period`
    pub fn spawn_expiry_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut tick = interval(period);
            loop {
                tick.tick().await;
                let evicted = store.evict_expired();
                if evicted > 0 {
                    debug!(evicted, "expiry sweeper evicted keys");
                }
            }
        })
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("in-memory store marked unavailable".into()))
        } else {
            Ok(())
        }
    }

    fn read_string(data: &Data, key: &str, now: Instant) -> Result<Option<String>, StoreError> {
        match data.get(key).filter(|e| e.is_live(now)) {
            None => Ok(None),
            Some(Entry {
                value: StoredValue::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(StoreError::WrongType { key: key.into() }),
        }
    }

    fn read_set_into(
        data: &Data,
        key: &str,
        now: Instant,
        out: &mut BTreeSet<String>,
    ) -> Result<(), StoreError> {
        match data.get(key).filter(|e| e.is_live(now)) {
            None => Ok(()),
            Some(Entry {
                value: StoredValue::Set(set),
                ..
            }) => {
                out.extend(set.iter().cloned());
                Ok(())
            }
            Some(_) => Err(StoreError::WrongType { key: key.into() }),
        }
    }

    /// Live entry for a write, dropping it first if it has expired
    fn live_entry<'d>(data: &'d mut Data, key: &str, now: Instant) -> Option<&'d mut Entry> {
        if data.get(key).is_some_and(|e| !e.is_live(now)) {
            data.remove(key);
        }
        data.get_mut(key)
    }

    fn apply_incr(data: &mut Data, key: &str, delta: i64, now: Instant) -> Result<i64, StoreError> {
        match Self::live_entry(data, key, now) {
            Some(entry) => match &mut entry.value {
                StoredValue::Str(s) => {
                    let current: i64 = s
                        .parse()
                        .map_err(|_| StoreError::NotAnInteger { key: key.into() })?;
                    let next = current
                        .checked_add(delta)
                        .ok_or_else(|| StoreError::Overflow { key: key.into() })?;
                    *s = next.to_string();
                    Ok(next)
                }
                StoredValue::Set(_) => Err(StoreError::WrongType { key: key.into() }),
            },
            None => {
                data.insert(
                    key.to_string(),
                    Entry {
                        value: StoredValue::Str(delta.to_string()),
                        expires_at: None,
                    },
                );
                Ok(delta)
            }
        }
    }

    fn apply_expire(data: &mut Data, key: &str, ttl: Duration, now: Instant) {
        if let Some(entry) = Self::live_entry(data, key, now) {
            entry.expires_at = Some(now + ttl);
        }
    }

    fn apply_sadd(data: &mut Data, key: &str, members: &[String], now: Instant) -> Result<(), StoreError> {
        if members.is_empty() {
            return Ok(());
        }
        match Self::live_entry(data, key, now) {
            Some(Entry {
                value: StoredValue::Set(set),
                ..
            }) => {
                set.extend(members.iter().cloned());
                Ok(())
            }
            Some(_) => Err(StoreError::WrongType { key: key.into() }),
            None => {
                data.insert(
                    key.to_string(),
                    Entry {
                        value: StoredValue::Set(members.iter().cloned().collect()),
                        expires_at: None,
                    },
                );
                Ok(())
            }
        }
    }

    fn apply_srem(data: &mut Data, key: &str, members: &[String], now: Instant) -> Result<(), StoreError> {
        let emptied = match Self::live_entry(data, key, now) {
            Some(Entry {
                value: StoredValue::Set(set),
                ..
            }) => {
                for m in members {
                    set.remove(m);
                }
                set.is_empty()
            }
            Some(_) => return Err(StoreError::WrongType { key: key.into() }),
            None => false,
        };
        if emptied {
            data.remove(key);
        }
        Ok(())
    }

    fn apply_op(data: &mut Data, op: &StoreOp, now: Instant) -> Result<(), StoreError> {
        match op {
            StoreOp::SetAdd { key, members } => Self::apply_sadd(data, key, members, now),
            StoreOp::SetRemove { key, members } => Self::apply_srem(data, key, members, now),
            StoreOp::Clear { key } => {
                data.remove(key);
                Ok(())
            }
            StoreOp::Expire { key, ttl } => {
                Self::apply_expire(data, key, *ttl, now);
                Ok(())
            }
        }
    }
}

impl Store for InMemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            self.check_available()?;
            Self::read_string(&self.data.read(), key, Instant::now())
        })
    }

    fn mget<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, Vec<Option<String>>> {
        Box::pin(async move {
            self.check_available()?;
            let now = Instant::now();
            let data = self.data.read();
            // MGET reports non-string keys as nil rather than failing
            Ok(keys
                .iter()
                .map(|k| Self::read_string(&data, k, now).ok().flatten())
                .collect())
        })
    }

    fn incr_by<'a>(&'a self, key: &'a str, delta: i64) -> StoreFuture<'a, i64> {
        Box::pin(async move {
            self.check_available()?;
            Self::apply_incr(&mut self.data.write(), key, delta, Instant::now())
        })
    }

    fn expire<'a>(&'a self, key: &'a str, ttl: Duration) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.check_available()?;
            Self::apply_expire(&mut self.data.write(), key, ttl, Instant::now());
            Ok(())
        })
    }

    fn del<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.check_available()?;
            self.data.write().remove(key);
            Ok(())
        })
    }

    fn sadd<'a>(&'a self, key: &'a str, members: &'a [String]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.check_available()?;
            Self::apply_sadd(&mut self.data.write(), key, members, Instant::now())
        })
    }

    fn srem<'a>(&'a self, key: &'a str, members: &'a [String]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.check_available()?;
            Self::apply_srem(&mut self.data.write(), key, members, Instant::now())
        })
    }

    fn smembers<'a>(&'a self, key: &'a str) -> StoreFuture<'a, BTreeSet<String>> {
        Box::pin(async move {
            self.check_available()?;
            let mut members = BTreeSet::new();
            Self::read_set_into(&self.data.read(), key, Instant::now(), &mut members)?;
            Ok(members)
        })
    }

    fn sunion<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, BTreeSet<String>> {
        Box::pin(async move {
            self.check_available()?;
            let now = Instant::now();
            let data = self.data.read();
            let mut union = BTreeSet::new();
            for key in keys {
                Self::read_set_into(&data, key, now, &mut union)?;
            }
            Ok(union)
        })
    }

    fn pipeline<'a>(&'a self, ops: Vec<StoreOp>) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.check_available()?;
            let now = Instant::now();
            let mut data = self.data.write();
            // Applied under one lock; a failing op stops the batch without undoing earlier ones
            for op in &ops {
                Self::apply_op(&mut data, op, now)?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_incr_creates_and_accumulates() {
        let store = InMemoryStore::new();
        assert_eq!(store.incr_by("k", 5).await.unwrap(), 5);
        assert_eq!(store.incr_by("k", -7).await.unwrap(), -2);
        assert_eq!(store.get("k").await.unwrap(), Some("-2".to_string()));
    }

    #[tokio::test]
    async fn test_incr_on_non_integer_fails() {
        let store = InMemoryStore::new();
        store.set_string("k", "abc");
        assert_eq!(
            store.incr_by("k", 1).await,
            Err(StoreError::NotAnInteger { key: "k".into() })
        );
    }

    #[tokio::test]
    async fn test_incr_overflow() {
        let store = InMemoryStore::new();
        store.set_string("k", i64::MAX.to_string());
        assert!(matches!(
            store.incr_by("k", 1).await,
            Err(StoreError::Overflow { .. })
        ));
    }

    #[tokio::test]
    async fn test_mget_preserves_order_and_absent() {
        let store = InMemoryStore::new();
        store.incr_by("b", 2).await.unwrap();
        store.sadd("s", &members(&["x"])).await.unwrap();
        let keys = members(&["a", "b", "s"]);
        assert_eq!(
            store.mget(&keys).await.unwrap(),
            vec![None, Some("2".to_string()), None]
        );
    }

    #[tokio::test]
    async fn test_set_ops_and_wrong_type() {
        let store = InMemoryStore::new();
        store.sadd("s", &members(&["a", "b"])).await.unwrap();
        store.srem("s", &members(&["a"])).await.unwrap();
        assert_eq!(
            store.smembers("s").await.unwrap(),
            BTreeSet::from(["b".to_string()])
        );

        store.srem("s", &members(&["b"])).await.unwrap();
        assert!(!store.exists("s"), "emptied set should disappear");

        store.incr_by("n", 1).await.unwrap();
        assert!(matches!(
            store.sadd("n", &members(&["x"])).await,
            Err(StoreError::WrongType { .. })
        ));
        assert!(matches!(store.get("missing").await, Ok(None)));
    }

    #[tokio::test]
    async fn test_sunion() {
        let store = InMemoryStore::new();
        store.sadd("s1", &members(&["a", "b"])).await.unwrap();
        store.sadd("s2", &members(&["b", "c"])).await.unwrap();
        let keys = members(&["s1", "missing", "s2"]);
        assert_eq!(
            store.sunion(&keys).await.unwrap(),
            members(&["a", "b", "c"]).into_iter().collect::<BTreeSet<_>>()
        );
        assert!(store.sunion(&[]).await.unwrap().is_empty());

        store.incr_by("n", 1).await.unwrap();
        assert!(matches!(
            store.sunion(&members(&["s1", "n"])).await,
            Err(StoreError::WrongType { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_and_lazy_eviction() {
        let store = InMemoryStore::new();
        store.incr_by("k", 1).await.unwrap();
        store.expire("k", Duration::from_secs(10)).await.unwrap();
        assert_eq!(store.ttl("k"), Some(Duration::from_secs(10)));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(store.ttl("k"), Some(Duration::from_secs(6)));

        // INCRBY keeps the existing TTL
        store.incr_by("k", 1).await.unwrap();
        assert_eq!(store.ttl("k"), Some(Duration::from_secs(6)));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.evict_expired(), 1);
        assert!(store.is_empty());

        // Recreated after expiry starts from zero without a TTL
        assert_eq!(store.incr_by("k", 3).await.unwrap(), 3);
        assert_eq!(store.ttl("k"), None);
    }

    #[tokio::test]
    async fn test_expire_absent_key_is_noop() {
        let store = InMemoryStore::new();
        store.expire("nope", Duration::from_secs(5)).await.unwrap();
        assert!(!store.exists("nope"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts() {
        let store = InMemoryStore::new();
        store.incr_by("k", 1).await.unwrap();
        store.expire("k", Duration::from_millis(50)).await.unwrap();
        let handle = store.spawn_expiry_sweeper(Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(store.data.read().len(), 0);
        handle.abort();
    }

    #[tokio::test]
    async fn test_pipeline_applies_in_order() {
        let store = InMemoryStore::new();
        store.sadd("s", &members(&["old"])).await.unwrap();
        store
            .pipeline(vec![
                StoreOp::Clear { key: "s".into() },
                StoreOp::SetAdd {
                    key: "s".into(),
                    members: members(&["new1", "new2"]),
                },
            ])
            .await
            .unwrap();
        assert_eq!(
            store.smembers("s").await.unwrap(),
            members(&["new1", "new2"]).into_iter().collect::<BTreeSet<_>>()
        );
    }

    #[tokio::test]
    async fn test_unavailable() {
        let store = InMemoryStore::new();
        store.set_available(false);
        assert!(matches!(
            store.get("k").await,
            Err(StoreError::Unavailable(_))
        ));
        store.set_available(true);
        assert!(store.get("k").await.is_ok());
    }
}
