//! Time-bucketed counters and sets over a key-value store
//!
//! Counters are addressed by `namespace[:owner]:field:bucket`, where the
//! bucket is the timestamp truncated to the counter's granularity. All
//! durable state lives in the backend; handles are cheap to clone.

pub mod bucket;
pub mod clock;
pub mod config;
pub mod counter;
pub mod definition;
pub mod error;
pub mod observability;
pub mod periodic_set;
pub mod store;

pub use bucket::{BucketKeyEncoder, Granularity};
pub use clock::{Clock, IntoCivilTime, SimulatedClock, SystemClock, UtcClock};
pub use config::PeriodicConfig;
pub use counter::BucketedCounter;
pub use definition::{Backend, CounterDefinition, CounterSpec, DefinitionOptions, SetDefinition};
pub use error::{ConfigError, CounterError, StoreError};
pub use periodic_set::PeriodicSet;
pub use store::{ConfiguredStore, InMemoryStore, Store, StoreOp};
