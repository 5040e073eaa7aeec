//! Shared primitive types used across the entire engine.

use chrono::{DateTime, Utc};

/// A wall-clock instant. Everything the engine timestamps is UTC.
pub type Timestamp = DateTime<Utc>;

/// Registry identifier for a district (e.g. "downtown").
pub type DistrictId = String;

/// Registry identifier for a faction.
pub type FactionId = String;

/// Identifier of a player account, owned by the account subsystem.
pub type PlayerId = String;

/// Identifier of a crew, owned by the crew subsystem.
pub type CrewId = String;

/// Milliseconds since the Unix epoch, as persisted in SQLite.
pub fn to_millis(ts: Timestamp) -> i64 {
    ts.timestamp_millis()
}

/// Inverse of `to_millis`. Out-of-range values collapse to the epoch.
pub fn from_millis(ms: i64) -> Timestamp {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}

/// Fractional hours from `earlier` to `later`, floored at zero.
pub fn hours_between(earlier: Timestamp, later: Timestamp) -> f64 {
    let ms = (later - earlier).num_milliseconds();
    if ms <= 0 {
        0.0
    } else {
        ms as f64 / 3_600_000.0
    }
}
