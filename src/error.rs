//! Error types for the periodic counter engine
//!
//! Three layers, each with its own enum:
//! - `StoreError`: what a backend reports
//! - `CounterError`: what counter and set handles report to callers
//! - `ConfigError`: configuration loading failures

use chrono::NaiveDateTime;
use thiserror::Error;

/// Error reported by a `Store` implementation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backend could not be reached (connection refused, dropped, timed out)
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// Operation against a key holding the wrong kind of value
    #[error("WRONGTYPE operation against key '{key}' holding the wrong kind of value")]
    WrongType { key: String },
    /// INCRBY against a value that is not an integer
    #[error("value at key '{key}' is not an integer or out of range")]
    NotAnInteger { key: String },
    /// INCRBY would overflow a 64-bit signed integer
    #[error("increment or decrement at key '{key}' would overflow")]
    Overflow { key: String },
    /// Any other backend-reported failure
    #[error("backend error: {0}")]
    Other(String),
}

/// Error reported by `BucketedCounter` and `PeriodicSet`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CounterError {
    /// Range query where the end bucket precedes the start bucket
    #[error("invalid range: end {end} precedes start {start}")]
    InvalidRange {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    /// The backend could not be reached; never retried by the engine
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    /// The backend rejected the operation
    #[error(transparent)]
    Store(StoreError),
    /// Bucket arithmetic left the representable calendar range
    #[error("timestamp out of range: {0}")]
    TimestampOutOfRange(NaiveDateTime),
}

impl From<StoreError> for CounterError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) => CounterError::BackendUnavailable(msg),
            other => CounterError::Store(other),
        }
    }
}

/// Error raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown granularity '{0}'")]
    InvalidGranularity(String),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("failed to open store: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_maps_to_backend_unavailable() {
        let err: CounterError = StoreError::Unavailable("connection refused".into()).into();
        assert_eq!(
            err,
            CounterError::BackendUnavailable("connection refused".into())
        );
    }

    #[test]
    fn test_other_store_errors_are_wrapped() {
        let err: CounterError = StoreError::NotAnInteger { key: "k".into() }.into();
        assert!(matches!(err, CounterError::Store(StoreError::NotAnInteger { .. })));
        assert_eq!(
            err.to_string(),
            "value at key 'k' is not an integer or out of range"
        );
    }
}
