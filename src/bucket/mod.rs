//! Time-bucket addressing
//!
//! Pure functions only: granularity arithmetic, key encoding, and parsing of
//! stored counter values. Nothing in this module talks to a backend.

mod granularity;
mod key_encoder;
mod value;

pub use granularity::Granularity;
pub use key_encoder::{namespace_for, BucketKeyEncoder};
pub use value::parse_counter_value;
