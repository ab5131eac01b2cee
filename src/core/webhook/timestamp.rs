use std::time::Duration;

/// Freshness check: valid iff `|now - created_at| <= max_age` (both unix seconds).
///
/// Timestamps in the future are held to the same bound so the replay window stays closed.
pub fn verify_timestamp(created_at: i64, now: i64, max_age: Duration) -> bool {
    now.saturating_sub(created_at).unsigned_abs() <= max_age.as_secs()
}
