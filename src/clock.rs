//! Clock Abstraction
//!
//! Every operation that defaults to "now" asks a `Clock` for the current
//! civil time instead of reading global time directly, so tests can pin
//! and move time deterministically.
//!
//! Bucket keys are derived from wall-clock (civil) time, represented as
//! `NaiveDateTime`. `SystemClock` reports the host's local wall time;
//! callers that want UTC buckets use `UtcClock` or pass UTC timestamps.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

/// Source of the current civil time
///
/// Implementations:
/// - `SystemClock`: local wall time of the host
/// - `UtcClock`: UTC wall time
/// - `SimulatedClock`: controlled time for tests
pub trait Clock: Send + Sync + Clone + 'static {
    fn now(&self) -> NaiveDateTime;
}

/// Host local time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// UTC wall time
#[derive(Debug, Clone, Copy, Default)]
pub struct UtcClock;

impl Clock for UtcClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().naive_utc()
    }
}

/// Simulated clock for deterministic testing
///
/// Time only moves when told to via `advance()` or `set()`. Clones share
/// the same underlying time.
#[derive(Debug, Clone)]
pub struct SimulatedClock {
    time: Arc<Mutex<NaiveDateTime>>,
}

impl SimulatedClock {
    pub fn new(start: impl IntoCivilTime) -> Self {
        SimulatedClock {
            time: Arc::new(Mutex::new(start.into_civil())),
        }
    }

    /// Jump to a specific time
    pub fn set(&self, t: impl IntoCivilTime) {
        *self.time.lock() = t.into_civil();
    }

    /// Move time forward (or backward, for negative deltas)
    pub fn advance(&self, delta: TimeDelta) {
        let mut time = self.time.lock();
        if let Some(next) = time.checked_add_signed(delta) {
            *time = next;
        }
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> NaiveDateTime {
        *self.time.lock()
    }
}

/// Conversion of the accepted time representations into civil time
///
/// Zoned timestamps contribute their wall time in their own zone, so a
/// `DateTime<Utc>` buckets by UTC and a `DateTime<Local>` by local time.
/// Dates map to midnight.
pub trait IntoCivilTime {
    fn into_civil(self) -> NaiveDateTime;
}

impl IntoCivilTime for NaiveDateTime {
    fn into_civil(self) -> NaiveDateTime {
        self
    }
}

impl IntoCivilTime for NaiveDate {
    fn into_civil(self) -> NaiveDateTime {
        self.and_time(NaiveTime::MIN)
    }
}

impl<Tz: TimeZone> IntoCivilTime for DateTime<Tz> {
    fn into_civil(self) -> NaiveDateTime {
        self.naive_local()
    }
}

impl<T: IntoCivilTime + Copy> IntoCivilTime for &T {
    fn into_civil(self) -> NaiveDateTime {
        (*self).into_civil()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_simulated_clock_deterministic() {
        let clock = SimulatedClock::new(at(2021, 4, 1, 10));

        // Time doesn't advance on its own
        assert_eq!(clock.now(), clock.now());

        clock.advance(TimeDelta::hours(2));
        assert_eq!(clock.now(), at(2021, 4, 1, 12));

        clock.set(at(2022, 1, 1, 0));
        assert_eq!(clock.now(), at(2022, 1, 1, 0));
    }

    #[test]
    fn test_simulated_clock_shared() {
        let clock = SimulatedClock::new(at(2021, 4, 1, 10));
        let clock2 = clock.clone();

        clock.advance(TimeDelta::minutes(30));
        assert_eq!(clock2.now(), clock.now(), "Clones should share state");
    }

    #[test]
    fn test_date_maps_to_midnight() {
        let date = NaiveDate::from_ymd_opt(2021, 5, 1).unwrap();
        assert_eq!(date.into_civil(), at(2021, 5, 1, 0));
    }

    #[test]
    fn test_zoned_time_uses_own_wall_clock() {
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let t = tokyo.with_ymd_and_hms(2021, 4, 1, 10, 15, 0).unwrap();
        assert_eq!(t.into_civil().format("%H:%M").to_string(), "10:15");

        let utc = t.with_timezone(&Utc);
        assert_eq!(utc.into_civil().format("%H:%M").to_string(), "01:15");
    }
}
