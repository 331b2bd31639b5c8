use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch. Storage works in whole seconds because DNS
/// TTLs have one-second resolution.
#[inline]
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
