//! RFC3339 timestamps as stored in the database and sent over the wire.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

/// Offset form written by older clients, e.g. `2015-06-01T08:30:00+0200`.
const COMPACT_OFFSET_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Current instant, truncated to the microsecond precision we persist.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Format as RFC3339 UTC with microsecond precision.
pub fn format(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse RFC3339, falling back to the compact `+HHMM` offset form.
pub fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(_) => DateTime::parse_from_str(raw, COMPACT_OFFSET_FORMAT).map(|dt| dt.with_timezone(&Utc)),
    }
}

/// Serde adapter for required timestamps.
pub mod rfc3339 {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Write as RFC3339.
    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format(at))
    }

    /// Read RFC3339 or the `+HHMM` offset form.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for optional timestamps. An empty string reads as `None`.
pub mod rfc3339_opt {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// `None` is written as null.
    pub fn serialize<S: Serializer>(at: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match at {
            Some(at) => s.serialize_str(&super::format(at)),
            None => s.serialize_none(),
        }
    }

    /// Null and the empty string both read as `None`.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(raw) if !raw.is_empty() => super::parse(&raw).map(Some).map_err(serde::de::Error::custom),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn format_is_utc_with_micros() {
        let at = Utc.with_ymd_and_hms(2015, 6, 1, 8, 30, 0).unwrap();
        assert_eq!(format(&at), "2015-06-01T08:30:00.000000Z");
    }

    #[test]
    fn parse_rfc3339() {
        let at = parse("2015-06-01T10:30:00+02:00").unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2015, 6, 1, 8, 30, 0).unwrap());
    }

    #[test]
    fn parse_compact_offset() {
        let at = parse("2015-06-01T10:30:00+0200").unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2015, 6, 1, 8, 30, 0).unwrap());
    }

    #[test]
    fn now_survives_format_roundtrip() {
        let at = now();
        assert_eq!(parse(&format(&at)).unwrap(), at);
    }

    #[test]
    fn parse_garbage_fails() {
        assert!(parse("yesterday").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn format_then_parse_keeps_micros() {
        let at = Utc.timestamp_opt(1_434_000_000, 123_456_000).unwrap();
        assert_eq!(parse(&format(&at)).unwrap(), at);
    }
}
