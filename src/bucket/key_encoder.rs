//! Key encoding for time-bucketed storage
//!
//! Maps a counter name and a point in time to the backend key of the
//! bucket containing that time.
//!
//! Key format: `<namespace>[:<identifier>]:<field>:<bucket>`
//!
//! Examples:
//! - `homepage:1:pv:2021-04-01T10` (hourly, per owner)
//! - `homepage:pv:2021-04-01T10` (hourly, global)
//! - `mock_class:1:my_posts:2021-04` (monthly)

use super::granularity::Granularity;
use chrono::NaiveDateTime;

/// Encodes bucket keys for counters and sets
pub struct BucketKeyEncoder;

impl BucketKeyEncoder {
    /// Encode the key of the bucket containing `t`
    pub fn encode(
        namespace: &str,
        identifier: Option<&str>,
        field: &str,
        granularity: Granularity,
        t: NaiveDateTime,
    ) -> String {
        let bucket = granularity.format(t);
        match identifier {
            Some(id) => format!("{}:{}:{}:{}", namespace, id, field, bucket),
            None => format!("{}:{}:{}", namespace, field, bucket),
        }
    }

    /// Encode `len` consecutive bucket keys starting at the bucket containing `start`
    ///
    /// Stops early if stepping leaves the representable calendar range.
    pub fn encode_range(
        namespace: &str,
        identifier: Option<&str>,
        field: &str,
        granularity: Granularity,
        start: NaiveDateTime,
        len: u32,
    ) -> Vec<String> {
        (0..len)
            .map_while(|i| granularity.step(start, i))
            .map(|t| Self::encode(namespace, identifier, field, granularity, t))
            .collect()
    }
}

/// Default namespace for a Rust type: its unqualified name in snake_case
///
/// `Homepage` becomes `homepage`, `MockClass` becomes `mock_class`. Generic
/// parameters are dropped.
pub fn namespace_for<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    let short = base.rsplit("::").next().unwrap_or(base);
    snake_case(short)
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    struct Homepage;
    struct MockClass;

    #[test]
    fn test_encode_with_identifier() {
        let key = BucketKeyEncoder::encode(
            "homepage",
            Some("1"),
            "pv",
            Granularity::Hour,
            dt(2021, 4, 1, 10, 0),
        );
        assert_eq!(key, "homepage:1:pv:2021-04-01T10");
    }

    #[test]
    fn test_encode_global_omits_identifier() {
        let key =
            BucketKeyEncoder::encode("homepage", None, "pv", Granularity::Hour, dt(2021, 4, 1, 10, 0));
        assert_eq!(key, "homepage:pv:2021-04-01T10");
    }

    #[test]
    fn test_same_window_same_key() {
        for g in Granularity::ALL {
            let a = BucketKeyEncoder::encode("ns", Some("7"), "f", g, dt(2021, 4, 1, 10, 0));
            let b = BucketKeyEncoder::encode("ns", Some("7"), "f", g, dt(2021, 4, 1, 10, 0) + chrono::TimeDelta::seconds(59));
            assert_eq!(a, b, "{} keys should match within a window", g);
        }
    }

    #[test]
    fn test_adjacent_windows_differ() {
        let t = dt(2021, 4, 1, 10, 0);
        for g in Granularity::ALL {
            let next = g.step(t, 1).unwrap();
            assert_ne!(
                BucketKeyEncoder::encode("ns", None, "f", g, t),
                BucketKeyEncoder::encode("ns", None, "f", g, next)
            );
        }
    }

    #[test]
    fn test_encode_range() {
        let keys = BucketKeyEncoder::encode_range(
            "mock_class",
            Some("1"),
            "my_posts",
            Granularity::Month,
            dt(2021, 11, 15, 0, 0),
            3,
        );
        assert_eq!(
            keys,
            vec![
                "mock_class:1:my_posts:2021-11",
                "mock_class:1:my_posts:2021-12",
                "mock_class:1:my_posts:2022-01",
            ]
        );
        assert!(BucketKeyEncoder::encode_range("a", None, "b", Granularity::Day, dt(2021, 1, 1, 0, 0), 0).is_empty());
    }

    #[test]
    fn test_namespace_for_type() {
        assert_eq!(namespace_for::<Homepage>(), "homepage");
        assert_eq!(namespace_for::<MockClass>(), "mock_class");
        assert_eq!(namespace_for::<Vec<u8>>(), "vec");
    }

    #[test]
    fn test_snake_case_acronyms() {
        assert_eq!(snake_case("HTTPRequest"), "httprequest");
        assert_eq!(snake_case("Page2View"), "page2_view");
    }
}
