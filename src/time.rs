//! Timestamps are held as UTC everywhere inside the client.
//!
//! The server emits offset-less wall-clock strings: comment and notification
//! times are UTC, post times are in the server's local zone. Both are
//! normalized here on the way in, and converted exactly once on the way out
//! by [`format_display`].

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset as _, TimeZone as _, Utc};
use serde::{Deserialize as _, Deserializer};

use crate::error::{ClientError, ClientResult};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Parse a server timestamp. Strings carrying an explicit offset are honoured;
/// naive strings are interpreted in `naive_offset`.
pub fn parse_api_time(raw: &str, naive_offset: FixedOffset) -> ClientResult<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return naive_offset
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc))
                .ok_or_else(|| ClientError::Decode(format!("ambiguous timestamp {s:?}")));
        }
    }
    Err(ClientError::Decode(format!("unrecognized timestamp {s:?}")))
}

/// serde adapter for fields the server stores as UTC.
pub fn deserialize_utc<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_api_time(&raw, Utc.fix()).map_err(serde::de::Error::custom)
}

/// Parse `+09:00`, `-0530`, `+9`, `Z` or `UTC`.
pub fn parse_offset(raw: &str) -> Result<FixedOffset, String> {
    let s = raw.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return Ok(Utc.fix());
    }

    let (sign, rest) = match s.as_bytes().first() {
        Some(b'+') => (1, &s[1..]),
        Some(b'-') => (-1, &s[1..]),
        _ => return Err(format!("offset {s:?} must start with + or -")),
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 && rest.is_ascii() => rest.split_at(2),
        None => (rest, "0"),
    };
    let hours: i32 = hours.parse().map_err(|_| format!("bad hours in {s:?}"))?;
    let minutes: i32 = minutes.parse().map_err(|_| format!("bad minutes in {s:?}"))?;
    if hours > 23 || minutes > 59 {
        return Err(format!("offset {s:?} out of range"));
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| format!("offset {s:?} out of range"))
}

pub fn format_display(ts: &DateTime<Utc>, offset: FixedOffset) -> String {
    ts.with_timezone(&offset).format("%Y-%m-%d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike as _;

    fn kst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    #[test]
    fn naive_strings_use_the_given_offset() {
        let utc = parse_api_time("2025-04-01T12:00:00", Utc.fix()).unwrap();
        assert_eq!(utc.hour(), 12);

        let local = parse_api_time("2025-04-01 12:00:00", kst()).unwrap();
        assert_eq!(local.hour(), 3);
    }

    #[test]
    fn explicit_offsets_win_over_the_default() {
        let t = parse_api_time("2025-04-01T12:00:00.123+02:00", kst()).unwrap();
        assert_eq!(t.hour(), 10);
    }

    #[test]
    fn fractional_seconds_are_optional() {
        let a = parse_api_time("2025-04-01T12:00:00.500000", Utc.fix()).unwrap();
        let b = parse_api_time("2025-04-01T12:00:00", Utc.fix()).unwrap();
        assert!(a > b);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            parse_api_time("yesterday", Utc.fix()),
            Err(ClientError::Decode(_))
        ));
    }

    #[test]
    fn offsets() {
        assert_eq!(parse_offset("+09:00").unwrap(), kst());
        assert_eq!(parse_offset("+0900").unwrap(), kst());
        assert_eq!(parse_offset("+9").unwrap(), kst());
        assert_eq!(
            parse_offset("-05:30").unwrap(),
            FixedOffset::west_opt(5 * 3600 + 30 * 60).unwrap()
        );
        assert_eq!(parse_offset("UTC").unwrap(), Utc.fix());
        assert!(parse_offset("09:00").is_err());
        assert!(parse_offset("+25:00").is_err());
        assert!(parse_offset("+aéb").is_err());
    }

    #[test]
    fn display_converts_once() {
        let t = parse_api_time("2025-04-01T23:30:00", Utc.fix()).unwrap();
        assert_eq!(format_display(&t, kst()), "2025-04-02 08:30");
        assert_eq!(format_display(&t, Utc.fix()), "2025-04-01 23:30");
    }
}
