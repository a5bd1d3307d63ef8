use chrono::{DateTime, Utc};

/// Returns the current Unix timestamp in milliseconds.
pub fn current_unix_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

/// Returns true when `ttl_ms` has elapsed since `computed_at_unix_ms`.
pub fn is_expired_unix_ms(computed_at_unix_ms: u64, ttl_ms: u64, now_unix_ms: u64) -> bool {
    now_unix_ms.saturating_sub(computed_at_unix_ms) >= ttl_ms
}

/// Parses an RFC 3339 timestamp string into a UTC instant.
///
/// Returns `None` for empty or unparseable input; callers treat an absent
/// timestamp the same way as a missing field.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|value| value.with_timezone(&Utc))
}
