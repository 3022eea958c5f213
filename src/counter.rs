//! Time-bucketed counter
//!
//! A `BucketedCounter` is a lightweight handle for one conceptual counter
//! (namespace, optional owner, field). Every write goes to the bucket key
//! of the time it happens at; reads address one bucket or a run of
//! consecutive buckets fetched with a single MGET.
//!
//! Writes are atomic per bucket at the backend. Range reads span several
//! keys with no cross-key atomicity, so a read racing increments may see
//! some buckets before and some after.

use crate::bucket::{parse_counter_value, BucketKeyEncoder, Granularity};
use crate::clock::{Clock, IntoCivilTime, SystemClock};
use crate::definition::CounterSpec;
use crate::error::{CounterError, StoreError};
use crate::store::Store;
use chrono::NaiveDateTime;
use std::sync::Arc;
use tracing::{debug, warn};

/// Handle for one time-bucketed counter
pub struct BucketedCounter<S: Store, C: Clock = SystemClock> {
    store: Arc<S>,
    clock: C,
    spec: Arc<CounterSpec>,
    owner: Option<String>,
}

impl<S: Store, C: Clock> Clone for BucketedCounter<S, C> {
    fn clone(&self) -> Self {
        BucketedCounter {
            store: self.store.clone(),
            clock: self.clock.clone(),
            spec: self.spec.clone(),
            owner: self.owner.clone(),
        }
    }
}

impl<S: Store, C: Clock> BucketedCounter<S, C> {
    /// Build a handle; global specs ignore `owner`
    pub fn new(store: Arc<S>, clock: C, spec: Arc<CounterSpec>, owner: Option<String>) -> Self {
        let owner = if spec.global { None } else { owner };
        BucketedCounter {
            store,
            clock,
            spec,
            owner,
        }
    }

    pub fn spec(&self) -> &CounterSpec {
        &self.spec
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Key of the bucket containing `t`
    pub fn key_at(&self, t: impl IntoCivilTime) -> String {
        BucketKeyEncoder::encode(
            &self.spec.namespace,
            self.owner.as_deref(),
            &self.spec.field,
            self.spec.granularity,
            t.into_civil(),
        )
    }

    /// Keys of `length` consecutive buckets starting at the bucket containing `t`
    pub fn keys_from(&self, t: impl IntoCivilTime, length: u32) -> Vec<String> {
        BucketKeyEncoder::encode_range(
            &self.spec.namespace,
            self.owner.as_deref(),
            &self.spec.field,
            self.spec.granularity,
            t.into_civil(),
            length,
        )
    }

    /// Add `amount` to the current bucket
    pub async fn increment(&self, amount: i64) -> Result<i64, CounterError> {
        self.increment_at(amount, self.clock.now()).await
    }

    /// Add `amount` to the bucket containing `t`, refreshing its TTL
    pub async fn increment_at(&self, amount: i64, t: impl IntoCivilTime) -> Result<i64, CounterError> {
        let key = self.key_at(t);
        let value = self.store.incr_by(&key, amount).await?;
        if let Some(ttl) = self.spec.expiration {
            self.store.expire(&key, ttl).await?;
        }
        debug!(key = %key, amount, value, "counter incremented");
        Ok(value)
    }

    /// Subtract `amount` from the current bucket
    pub async fn decrement(&self, amount: i64) -> Result<i64, CounterError> {
        self.decrement_at(amount, self.clock.now()).await
    }

    /// Subtract `amount` from the bucket containing `t`; totals may go negative
    ///
    /// `i64::MIN` has no negation and fails with `Overflow` before touching the store.
    pub async fn decrement_at(&self, amount: i64, t: impl IntoCivilTime) -> Result<i64, CounterError> {
        let t = t.into_civil();
        let delta = amount
            .checked_neg()
            .ok_or_else(|| StoreError::Overflow { key: self.key_at(t) })?;
        self.increment_at(delta, t).await
    }

    /// Value of the current bucket
    pub async fn value(&self) -> Result<i64, CounterError> {
        self.at(self.clock.now()).await
    }

    /// Value of the bucket containing `t`; 0 when never written
    ///
    /// A bucket holding a non-string value reads as 0, matching MGET in `values_from`.
    pub async fn at(&self, t: impl IntoCivilTime) -> Result<i64, CounterError> {
        let key = self.key_at(t);
        let raw = match self.store.get(&key).await {
            Ok(raw) => raw,
            Err(StoreError::WrongType { .. }) => {
                warn!(key = %key, "counter bucket holds a non-string value, reading as 0");
                None
            }
            Err(e) => return Err(e.into()),
        };
        Ok(raw.map_or(0, |v| parse_counter_value(&key, &v)))
    }

    /// Same as `at`
    pub async fn value_at(&self, t: impl IntoCivilTime) -> Result<i64, CounterError> {
        self.at(t).await
    }

    /// Values of `length` consecutive buckets starting at the bucket containing `t`
    pub async fn values_from(&self, t: impl IntoCivilTime, length: u32) -> Result<Vec<i64>, CounterError> {
        let start = t.into_civil();
        let keys = self.keys_from(start, length);
        if keys.len() < length as usize {
            return Err(CounterError::TimestampOutOfRange(start));
        }
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let raw = self.store.mget(&keys).await?;
        debug!(first = %keys[0], count = keys.len(), "counter range read");
        Ok(keys
            .iter()
            .zip(raw)
            .map(|(key, v)| v.map_or(0, |v| parse_counter_value(key, &v)))
            .collect())
    }

    /// Values of every bucket from the bucket of `start` to the bucket of `end`, inclusive
    pub async fn range(
        &self,
        start: impl IntoCivilTime,
        end: impl IntoCivilTime,
    ) -> Result<Vec<i64>, CounterError> {
        let (start, end) = (start.into_civil(), end.into_civil());
        let length = bucket_count(self.spec.granularity, start, end)?;
        self.values_from(start, length).await
    }

    /// Sum of `range(start, end)`
    pub async fn sum_range(
        &self,
        start: impl IntoCivilTime,
        end: impl IntoCivilTime,
    ) -> Result<i64, CounterError> {
        let values = self.range(start, end).await?;
        Ok(values.into_iter().fold(0i64, i64::saturating_add))
    }

    /// Delete the bucket containing `t`; neighbours are untouched
    pub async fn delete(&self, t: impl IntoCivilTime) -> Result<(), CounterError> {
        let key = self.key_at(t);
        self.store.del(&key).await?;
        debug!(key = %key, "counter bucket deleted");
        Ok(())
    }
}

/// Number of buckets covering `start..=end` at `granularity`
pub(crate) fn bucket_count(
    granularity: Granularity,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<u32, CounterError> {
    let steps = granularity.steps_between(start, end);
    if steps < 0 {
        return Err(CounterError::InvalidRange { start, end });
    }
    u32::try_from(steps)
        .ok()
        .and_then(|s| s.checked_add(1))
        .ok_or(CounterError::TimestampOutOfRange(end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimulatedClock;
    use crate::store::InMemoryStore;
    use chrono::NaiveDate;
    use std::time::Duration;

    fn hour(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 4, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn counter(
        granularity: Granularity,
        expiration: Option<Duration>,
    ) -> (BucketedCounter<InMemoryStore, SimulatedClock>, Arc<InMemoryStore>, SimulatedClock) {
        let store = Arc::new(InMemoryStore::new());
        let clock = SimulatedClock::new(hour(12));
        let spec = Arc::new(CounterSpec {
            namespace: "homepage".into(),
            field: "pv".into(),
            granularity,
            expiration,
            global: false,
        });
        let c = BucketedCounter::new(store.clone(), clock.clone(), spec, Some("1".into()));
        (c, store, clock)
    }

    #[tokio::test]
    async fn test_increment_uses_clock() {
        let (c, store, clock) = counter(Granularity::Hour, None);
        assert_eq!(c.increment(5).await.unwrap(), 5);
        clock.set(hour(13));
        assert_eq!(c.increment(2).await.unwrap(), 2);

        assert_eq!(store.keys(), vec!["homepage:1:pv:2021-04-01T12", "homepage:1:pv:2021-04-01T13"]);
    }

    #[tokio::test]
    async fn test_decrement_can_go_negative() {
        let (c, _, _) = counter(Granularity::Day, None);
        c.increment(3).await.unwrap();
        assert_eq!(c.decrement(5).await.unwrap(), -2);
        assert_eq!(c.value().await.unwrap(), -2);
    }

    #[tokio::test]
    async fn test_absent_bucket_reads_zero() {
        let (c, _, _) = counter(Granularity::Hour, None);
        assert_eq!(c.at(hour(3)).await.unwrap(), 0);
        assert_eq!(c.values_from(hour(3), 3).await.unwrap(), vec![0, 0, 0]);
    }

    #[tokio::test]
    async fn test_values_from_zero_length() {
        let (c, store, _) = counter(Granularity::Hour, None);
        store.set_available(false);
        // No round trip is made for an empty request
        assert_eq!(c.values_from(hour(3), 0).await.unwrap(), Vec::<i64>::new());
    }

    #[tokio::test]
    async fn test_range_rejects_reversed_bounds() {
        let (c, _, _) = counter(Granularity::Hour, None);
        let err = c.range(hour(11), hour(10)).await.unwrap_err();
        assert_eq!(
            err,
            CounterError::InvalidRange {
                start: hour(11),
                end: hour(10)
            }
        );
    }

    #[tokio::test]
    async fn test_range_within_one_bucket() {
        let (c, _, _) = counter(Granularity::Day, None);
        c.increment_at(4, hour(1)).await.unwrap();
        // Same day, end earlier in the day than start is still one bucket
        assert_eq!(c.range(hour(20), hour(2)).await.unwrap(), vec![4]);
    }

    #[tokio::test]
    async fn test_unparsable_value_reads_as_prefix() {
        let (c, store, _) = counter(Granularity::Hour, None);
        store.set_string(&c.key_at(hour(10)), "7 apples");
        store.set_string(&c.key_at(hour(11)), "n/a");
        assert_eq!(c.at(hour(10)).await.unwrap(), 7);
        assert_eq!(c.range(hour(10), hour(11)).await.unwrap(), vec![7, 0]);
    }

    #[tokio::test]
    async fn test_increment_on_unparsable_value_fails() {
        let (c, store, _) = counter(Granularity::Hour, None);
        store.set_string(&c.key_at(hour(12)), "n/a");
        assert!(matches!(
            c.increment(1).await,
            Err(CounterError::Store(StoreError::NotAnInteger { .. }))
        ));
    }

    #[tokio::test]
    async fn test_set_typed_bucket_reads_zero_everywhere() {
        let (c, store, _) = counter(Granularity::Hour, None);
        store.sadd(&c.key_at(hour(10)), &["x".to_string()]).await.unwrap();
        assert_eq!(c.at(hour(10)).await.unwrap(), 0);
        assert_eq!(c.values_from(hour(10), 1).await.unwrap(), vec![c.at(hour(10)).await.unwrap()]);
        assert_eq!(c.range(hour(10), hour(10)).await.unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn test_decrement_min_overflows() {
        let (c, store, _) = counter(Granularity::Hour, None);
        assert_eq!(
            c.decrement(i64::MIN).await,
            Err(CounterError::Store(StoreError::Overflow {
                key: "homepage:1:pv:2021-04-01T12".into()
            }))
        );
        assert!(store.is_empty());
        assert_eq!(c.decrement(i64::MAX).await.unwrap(), -i64::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiration_applied_on_write() {
        let (c, store, _) = counter(Granularity::Hour, Some(Duration::from_secs(60)));
        c.increment(1).await.unwrap();
        assert_eq!(store.ttl(&c.key_at(hour(12))), Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn test_sum_range() {
        let (c, _, _) = counter(Granularity::Hour, None);
        c.increment_at(1, hour(9)).await.unwrap();
        c.increment_at(2, hour(10)).await.unwrap();
        c.increment_at(4, hour(11)).await.unwrap();
        assert_eq!(c.sum_range(hour(9), hour(11)).await.unwrap(), 7);
    }

    #[test]
    fn test_bucket_count() {
        assert_eq!(bucket_count(Granularity::Hour, hour(10), hour(10)), Ok(1));
        assert_eq!(bucket_count(Granularity::Hour, hour(10), hour(12)), Ok(3));
        assert!(matches!(
            bucket_count(Granularity::Hour, hour(12), hour(10)),
            Err(CounterError::InvalidRange { .. })
        ));
    }
}
