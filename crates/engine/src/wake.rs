//! Timer/wake service the backoff policy arms.

use std::sync::Mutex;

/// External alarm service.
///
/// Arming is "unique": a new instant replaces any previously armed wake-up of
/// this kind. Platform backends (OS alarms, timer wheels) live outside the
/// engine; the contract is only that the process gets woken at or after the
/// armed instant so idle queues are re-checked.
pub trait WakeService: Send + Sync {
    /// Arm (or re-arm) the wake-up at `at_ms` (epoch ms).
    fn arm_unique_wake_at(&self, at_ms: i64);
}

/// Wake service that records the most recently armed instant.
///
/// Suitable for embedding and tests; hosts that poll the queue on their own
/// cadence need nothing more.
#[derive(Debug, Default)]
pub struct RecordingWake {
    armed_at: Mutex<Option<i64>>,
}

impl RecordingWake {
    pub fn new() -> Self {
        Self::default()
    }

    /// The latest armed instant, if any.
    pub fn armed_at(&self) -> Option<i64> {
        *self.armed_at.lock().unwrap()
    }
}

impl WakeService for RecordingWake {
    fn arm_unique_wake_at(&self, at_ms: i64) {
        *self.armed_at.lock().unwrap() = Some(at_ms);
    }
}
