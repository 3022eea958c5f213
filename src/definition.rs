//! Counter and set definitions, and the handle factory
//!
//! A definition is the static description of a counter (what it is called,
//! how it buckets time, how long buckets live). A `Backend` pairs a store
//! with a clock. Owning types compose the two: they keep a handle obtained
//! from `definition.handle(&backend, Some(&self.id))` in a named field.
//!
//! ```ignore
//! static PV: LazyLock<CounterDefinition> = LazyLock::new(|| {
//!     CounterDefinition::for_type::<Homepage>("pv", Granularity::Hour, DefinitionOptions::default())
//! });
//!
//! struct Homepage {
//!     id: u64,
//!     pv: BucketedCounter<InMemoryStore, SystemClock>,
//! }
//! ```

use crate::bucket::{namespace_for, Granularity};
use crate::clock::{Clock, SystemClock};
use crate::counter::BucketedCounter;
use crate::periodic_set::PeriodicSet;
use crate::store::Store;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Immutable description shared by every handle of one counter or set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSpec {
    /// Key prefix, usually the owning type's name
    pub namespace: String,
    /// Counter or set name within the namespace
    pub field: String,
    pub granularity: Granularity,
    /// TTL applied to each bucket on every write
    pub expiration: Option<Duration>,
    /// Shared by all owners; the identifier is left out of the key
    pub global: bool,
}

/// Options accepted when defining a counter or set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefinitionOptions {
    pub expiration: Option<Duration>,
    pub global: bool,
}

impl DefinitionOptions {
    pub fn with_expiration(mut self, ttl: Duration) -> Self {
        self.expiration = Some(ttl);
        self
    }

    pub fn global(mut self) -> Self {
        self.global = true;
        self
    }
}

/// Store and clock shared by every handle built from it
pub struct Backend<S: Store, C: Clock = SystemClock> {
    store: Arc<S>,
    clock: C,
}

impl<S: Store, C: Clock> Clone for Backend<S, C> {
    fn clone(&self) -> Self {
        Backend {
            store: self.store.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<S: Store> Backend<S, SystemClock> {
    /// Backend reading the host's local wall time
    pub fn new(store: S) -> Self {
        Self::with_clock(Arc::new(store), SystemClock)
    }
}

impl<S: Store, C: Clock> Backend<S, C> {
    pub fn with_clock(store: Arc<S>, clock: C) -> Self {
        Backend { store, clock }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn counter(&self, def: &CounterDefinition, owner: Option<&dyn Display>) -> BucketedCounter<S, C> {
        def.handle(self, owner)
    }

    pub fn set(&self, def: &SetDefinition, owner: Option<&dyn Display>) -> PeriodicSet<S, C> {
        def.handle(self, owner)
    }
}

fn build_spec(
    namespace: impl Into<String>,
    field: impl Into<String>,
    granularity: Granularity,
    options: DefinitionOptions,
) -> Arc<CounterSpec> {
    let spec = CounterSpec {
        namespace: namespace.into(),
        field: field.into(),
        granularity,
        expiration: options.expiration,
        global: options.global,
    };
    info!(
        namespace = %spec.namespace,
        field = %spec.field,
        granularity = %spec.granularity,
        global = spec.global,
        "periodic definition registered"
    );
    Arc::new(spec)
}

/// Definition of a time-bucketed counter
#[derive(Debug, Clone)]
pub struct CounterDefinition {
    spec: Arc<CounterSpec>,
}

impl CounterDefinition {
    pub fn new(
        namespace: impl Into<String>,
        field: impl Into<String>,
        granularity: Granularity,
        options: DefinitionOptions,
    ) -> Self {
        CounterDefinition {
            spec: build_spec(namespace, field, granularity, options),
        }
    }

    /// Definition namespaced by the snake_case name of `T`
    pub fn for_type<T: ?Sized>(
        field: impl Into<String>,
        granularity: Granularity,
        options: DefinitionOptions,
    ) -> Self {
        Self::new(namespace_for::<T>(), field, granularity, options)
    }

    pub fn from_spec(spec: CounterSpec) -> Self {
        CounterDefinition {
            spec: Arc::new(spec),
        }
    }

    pub fn spec(&self) -> &CounterSpec {
        &self.spec
    }

    /// Handle for `owner`'s counter, or the shared counter when global
    pub fn handle<S: Store, C: Clock>(
        &self,
        backend: &Backend<S, C>,
        owner: Option<&dyn Display>,
    ) -> BucketedCounter<S, C> {
        BucketedCounter::new(
            backend.store.clone(),
            backend.clock.clone(),
            self.spec.clone(),
            owner.map(|o| o.to_string()),
        )
    }
}

/// Definition of a time-bucketed set
#[derive(Debug, Clone)]
pub struct SetDefinition {
    spec: Arc<CounterSpec>,
}

impl SetDefinition {
    pub fn new(
        namespace: impl Into<String>,
        field: impl Into<String>,
        granularity: Granularity,
        options: DefinitionOptions,
    ) -> Self {
        SetDefinition {
            spec: build_spec(namespace, field, granularity, options),
        }
    }

    /// Definition namespaced by the snake_case name of `T`
    pub fn for_type<T: ?Sized>(
        field: impl Into<String>,
        granularity: Granularity,
        options: DefinitionOptions,
    ) -> Self {
        Self::new(namespace_for::<T>(), field, granularity, options)
    }

    pub fn from_spec(spec: CounterSpec) -> Self {
        SetDefinition {
            spec: Arc::new(spec),
        }
    }

    pub fn spec(&self) -> &CounterSpec {
        &self.spec
    }

    /// Handle for `owner`'s set, or the shared set when global
    pub fn handle<S: Store, C: Clock>(
        &self,
        backend: &Backend<S, C>,
        owner: Option<&dyn Display>,
    ) -> PeriodicSet<S, C> {
        PeriodicSet::new(
            backend.store.clone(),
            backend.clock.clone(),
            self.spec.clone(),
            owner.map(|o| o.to_string()),
        )
    }
}
