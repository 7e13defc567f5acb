//! Tolerant decoding of catalog and watermark timestamps.
//!
//! Accepted encodings, first match wins:
//! 1. native values: naive values are taken as UTC, zoned values converted
//! 2. RFC 3339 (`Z` or numeric offset, optional fraction)
//! 3. [`ZONED_FORMATS`]: offset-bearing variants RFC 3339 rejects
//! 4. [`NAIVE_FORMATS`]: no offset, taken as UTC
//! 5. a bare `YYYY-MM-DD`, midnight UTC
//!
//! The result is always normalized to UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::CoreError;
use crate::types::RawTimestamp;

/// Offset-bearing patterns. `%.f` also matches an absent fraction.
pub const ZONED_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
];

/// Offset-free patterns, interpreted as UTC.
pub const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%d %H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Decode a raw catalog value to UTC.
pub fn parse_timestamp(raw: &RawTimestamp) -> Result<DateTime<Utc>, CoreError> {
    match raw {
        RawTimestamp::Native(dt) => Ok(dt.and_utc()),
        RawTimestamp::Zoned(dt) => Ok(dt.with_timezone(&Utc)),
        RawTimestamp::Text(s) => parse_timestamp_str(s),
    }
}

/// Decode a textual timestamp to UTC.
pub fn parse_timestamp_str(raw: &str) -> Result<DateTime<Utc>, CoreError> {
    let s = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ZONED_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Ok(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(dt.and_utc());
        }
    }

    Err(CoreError::MalformedTimestamp {
        raw: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).single().expect("valid")
    }

    #[test]
    fn zulu_and_offset_normalize_to_utc() {
        assert_eq!(
            parse_timestamp_str("2024-01-02T00:00:00Z").unwrap(),
            utc(2024, 1, 2, 0, 0, 0)
        );
        assert_eq!(
            parse_timestamp_str("2024-01-02T02:00:00+02:00").unwrap(),
            utc(2024, 1, 2, 0, 0, 0)
        );
        assert_eq!(
            parse_timestamp_str("2024-01-01T19:00:00-0500").unwrap(),
            utc(2024, 1, 2, 0, 0, 0)
        );
    }

    #[test]
    fn fractional_seconds_are_kept() {
        let dt = parse_timestamp_str("2024-01-02T00:00:00.123456+00:00").unwrap();
        assert_eq!(dt.timestamp_subsec_micros(), 123_456);
        let dt = parse_timestamp_str("2024-01-02 00:00:00.5").unwrap();
        assert_eq!(dt.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn naive_text_is_utc() {
        assert_eq!(
            parse_timestamp_str("2024-01-02 03:04:05").unwrap(),
            utc(2024, 1, 2, 3, 4, 5)
        );
        assert_eq!(
            parse_timestamp_str("  2024-01-02T03:04:05  ").unwrap(),
            utc(2024, 1, 2, 3, 4, 5)
        );
        assert_eq!(parse_timestamp_str("2024-01-02").unwrap(), utc(2024, 1, 2, 0, 0, 0));
    }

    #[test]
    fn native_values() {
        let naive = utc(2023, 5, 6, 7, 8, 9).naive_utc();
        assert_eq!(
            parse_timestamp(&RawTimestamp::Native(naive)).unwrap(),
            utc(2023, 5, 6, 7, 8, 9)
        );

        let offset = FixedOffset::east_opt(3600).expect("offset");
        let zoned = offset
            .with_ymd_and_hms(2023, 5, 6, 8, 8, 9)
            .single()
            .expect("valid");
        assert_eq!(
            parse_timestamp(&RawTimestamp::Zoned(zoned)).unwrap(),
            utc(2023, 5, 6, 7, 8, 9)
        );
    }

    #[test]
    fn garbage_is_malformed() {
        for raw in ["", "yesterday", "2024-13-45T00:00:00Z", "12/01/2024"] {
            let err = parse_timestamp_str(raw).unwrap_err();
            assert!(
                matches!(err, CoreError::MalformedTimestamp { .. }),
                "expected malformed for {raw:?}, got {err}"
            );
        }
    }
}
