//! Periodically-keyed set
//!
//! Same bucket addressing as `BucketedCounter`, over set-valued keys: one
//! set of opaque string members per time bucket (e.g. unique visitors
//! this minute).

use crate::bucket::BucketKeyEncoder;
use crate::clock::{Clock, IntoCivilTime, SystemClock};
use crate::counter::bucket_count;
use crate::definition::CounterSpec;
use crate::error::CounterError;
use crate::store::{Store, StoreOp};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Handle for one time-bucketed set
pub struct PeriodicSet<S: Store, C: Clock = SystemClock> {
    store: Arc<S>,
    clock: C,
    spec: Arc<CounterSpec>,
    owner: Option<String>,
}

impl<S: Store, C: Clock> Clone for PeriodicSet<S, C> {
    fn clone(&self) -> Self {
        PeriodicSet {
            store: self.store.clone(),
            clock: self.clock.clone(),
            spec: self.spec.clone(),
            owner: self.owner.clone(),
        }
    }
}

fn collect_members<I, M>(members: I) -> Vec<String>
where
    I: IntoIterator<Item = M>,
    M: Into<String>,
{
    members.into_iter().map(Into::into).collect()
}

impl<S: Store, C: Clock> PeriodicSet<S, C> {
    /// Build a handle; global specs ignore `owner`
    pub fn new(store: Arc<S>, clock: C, spec: Arc<CounterSpec>, owner: Option<String>) -> Self {
        let owner = if spec.global { None } else { owner };
        PeriodicSet {
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

    /// Add members to the current bucket
    pub async fn add<I, M>(&self, members: I) -> Result<(), CounterError>
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        self.add_at(members, self.clock.now()).await
    }

    /// Add members to the bucket containing `t`, refreshing its TTL
    pub async fn add_at<I, M>(&self, members: I, t: impl IntoCivilTime) -> Result<(), CounterError>
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        let members = collect_members(members);
        if members.is_empty() {
            return Ok(());
        }
        let key = self.key_at(t);
        self.store.sadd(&key, &members).await?;
        self.refresh_ttl(&key).await?;
        debug!(key = %key, count = members.len(), "set members added");
        Ok(())
    }

    /// Remove members from the current bucket
    pub async fn remove<I, M>(&self, members: I) -> Result<(), CounterError>
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        self.remove_at(members, self.clock.now()).await
    }

    /// Remove members from the bucket containing `t`, refreshing its TTL
    pub async fn remove_at<I, M>(&self, members: I, t: impl IntoCivilTime) -> Result<(), CounterError>
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        let members = collect_members(members);
        if members.is_empty() {
            return Ok(());
        }
        let key = self.key_at(t);
        self.store.srem(&key, &members).await?;
        self.refresh_ttl(&key).await?;
        Ok(())
    }

    /// Members of the current bucket
    pub async fn members(&self) -> Result<BTreeSet<String>, CounterError> {
        self.members_at(self.clock.now()).await
    }

    /// Members of the bucket containing `t`; empty when never written
    pub async fn members_at(&self, t: impl IntoCivilTime) -> Result<BTreeSet<String>, CounterError> {
        let key = self.key_at(t);
        Ok(self.store.smembers(&key).await?)
    }

    pub async fn contains_at(&self, member: &str, t: impl IntoCivilTime) -> Result<bool, CounterError> {
        Ok(self.members_at(t).await?.contains(member))
    }

    pub async fn len_at(&self, t: impl IntoCivilTime) -> Result<usize, CounterError> {
        Ok(self.members_at(t).await?.len())
    }

    /// Empty the current bucket
    pub async fn clear(&self) -> Result<(), CounterError> {
        self.clear_at(self.clock.now()).await
    }

    /// Empty the bucket containing `t`
    ///
    /// Redis does not keep empty sets, so this is observably the same as
    /// deleting the bucket.
    pub async fn clear_at(&self, t: impl IntoCivilTime) -> Result<(), CounterError> {
        let key = self.key_at(t);
        self.store.pipeline(vec![StoreOp::Clear { key }]).await?;
        Ok(())
    }

    /// Replace the current bucket's members with `values`
    pub async fn replace<I, M>(&self, values: I) -> Result<(), CounterError>
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        self.replace_at(values, self.clock.now()).await
    }

    /// Replace the members of the bucket containing `t` in one pipeline
    ///
    /// Clear, add and TTL refresh are submitted together. This narrows the
    /// window in which the set is observably empty; it is not a transaction.
    pub async fn replace_at<I, M>(&self, values: I, t: impl IntoCivilTime) -> Result<(), CounterError>
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        let members = collect_members(values);
        let key = self.key_at(t);
        let mut ops = vec![StoreOp::Clear { key: key.clone() }];
        if !members.is_empty() {
            ops.push(StoreOp::SetAdd {
                key: key.clone(),
                members,
            });
            if let Some(ttl) = self.spec.expiration {
                ops.push(StoreOp::Expire {
                    key: key.clone(),
                    ttl,
                });
            }
        }
        debug!(key = %key, ops = ops.len(), "set replaced");
        self.store.pipeline(ops).await?;
        Ok(())
    }

    /// Union of `length` consecutive buckets starting at the bucket containing `t`
    pub async fn union_from(&self, t: impl IntoCivilTime, length: u32) -> Result<BTreeSet<String>, CounterError> {
        let start = t.into_civil();
        let keys = BucketKeyEncoder::encode_range(
            &self.spec.namespace,
            self.owner.as_deref(),
            &self.spec.field,
            self.spec.granularity,
            start,
            length,
        );
        if keys.len() < length as usize {
            return Err(CounterError::TimestampOutOfRange(start));
        }
        if keys.is_empty() {
            return Ok(BTreeSet::new());
        }
        let union = self.store.sunion(&keys).await?;
        debug!(first = %keys[0], count = keys.len(), "set union read");
        Ok(union)
    }

    /// Union of every bucket from the bucket of `start` to the bucket of `end`, inclusive
    pub async fn union_range(
        &self,
        start: impl IntoCivilTime,
        end: impl IntoCivilTime,
    ) -> Result<BTreeSet<String>, CounterError> {
        let (start, end) = (start.into_civil(), end.into_civil());
        let length = bucket_count(self.spec.granularity, start, end)?;
        self.union_from(start, length).await
    }

    /// Delete the bucket containing `t`
    pub async fn delete(&self, t: impl IntoCivilTime) -> Result<(), CounterError> {
        let key = self.key_at(t);
        self.store.del(&key).await?;
        Ok(())
    }

    async fn refresh_ttl(&self, key: &str) -> Result<(), CounterError> {
        if let Some(ttl) = self.spec.expiration {
            self.store.expire(key, ttl).await?;
        }
        Ok(())
    }
}
