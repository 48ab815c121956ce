/// Cache entry freshness.
///
/// `CacheManager::load` reads `fetched_at` back from the metadata file with
/// `parse_stored_timestamp` and asks `is_expired_at` whether the entry may
/// still be served. The caller passes the run's `now`, so a whole run judges
/// freshness against one instant.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

// ---------------------------------------------------------------------------
// Expiry check
// ---------------------------------------------------------------------------

/// Whether an entry fetched at `fetched_at` has outlived `ttl` at `now`.
/// An entry exactly `ttl` old is still served.
pub fn is_expired_at(fetched_at: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    now - fetched_at > ttl
}

/// Parses a stored timestamp.
///
/// Accepts RFC 3339 with any offset, and a naive ISO-8601 timestamp, which
/// is read as UTC. Returns `None` for anything else.
pub fn parse_stored_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
