//! Sub-second precision rounding for temporal values.
//!
//! When a column declares less sub-second precision than the database's
//! native maximum, the materializer rounds the sub-second part before
//! transfer so the server does not truncate silently. Ties round away from
//! zero (round-half-up), not to even.

use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, Timelike, Utc};

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Rounds a nanosecond-of-second count to `declared` decimal digits of
/// precision, half-up.
///
/// Returns the rounded count and whether the rounding carried into the next
/// second.
pub fn round_subsecond_nanos(nanos: u32, declared: u8) -> (u32, bool) {
    if declared >= 9 {
        return (nanos, false);
    }

    let granularity = 10u64.pow(9 - declared as u32);
    let rounded = ((nanos as u64 + granularity / 2) / granularity) * granularity;

    if rounded >= NANOS_PER_SECOND {
        ((rounded - NANOS_PER_SECOND) as u32, true)
    } else {
        (rounded as u32, false)
    }
}

/// Rounds a naive timestamp to the declared sub-second precision.
pub fn round_timestamp(value: NaiveDateTime, declared: u8) -> NaiveDateTime {
    let (nanos, carry) = round_subsecond_nanos(value.and_utc().timestamp_subsec_nanos(), declared);

    let truncated = value
        .with_nanosecond(nanos)
        .unwrap_or(value);

    if carry {
        truncated + Duration::seconds(1)
    } else {
        truncated
    }
}

/// Rounds a UTC timestamp to the declared sub-second precision.
pub fn round_timestamp_tz(value: DateTime<Utc>, declared: u8) -> DateTime<Utc> {
    let (nanos, carry) = round_subsecond_nanos(value.timestamp_subsec_nanos(), declared);

    let truncated = value.with_nanosecond(nanos).unwrap_or(value);

    if carry {
        truncated + Duration::seconds(1)
    } else {
        truncated
    }
}

/// Rounds a time-of-day value to the declared sub-second precision.
///
/// A carry past midnight wraps around, matching the destination's time type.
pub fn round_time(value: NaiveTime, declared: u8) -> NaiveTime {
    let (nanos, carry) = round_subsecond_nanos(value.nanosecond(), declared);

    let truncated = value.with_nanosecond(nanos).unwrap_or(value);

    if carry {
        truncated + Duration::seconds(1)
    } else {
        truncated
    }
}
