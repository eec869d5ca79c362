//! Wall-clock access.
//!
//! All timestamps in the job model are epoch milliseconds. Pure timing
//! functions take `now` explicitly so tests can pin the clock; this helper is
//! the single place the engine reads the real one.

use chrono::Utc;

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
