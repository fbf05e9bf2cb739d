//! Wall-clock helpers, isolated in one place because the store has no
//! persisted blob metadata and must fabricate timestamps at call time (see
//! the info module and the acknowledged timestamp weakness it carries).

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, saturating instead of panicking on a
/// clock set before 1970.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
