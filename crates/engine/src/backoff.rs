//! Exponential backoff: when may a deferred job run again.

use std::sync::Arc;

use tracing::trace;

use tasklift_core::{Job, Requirement, RetryState, now_ms};

use crate::wake::WakeService;

/// Hard cap on how far out a retry may be scheduled: one hour.
pub const MAX_WAIT_MS: i64 = 60 * 60 * 1000;

/// Earliest legal next-run time for a job, in epoch ms.
///
/// The exponential target is `last_run_time + 2^(run_iteration - 1) * 1000`
/// (first retry lands ~1s out; an iteration of 0 yields a 500 ms target),
/// clamped to one hour from `now` and to the job's own retry window.
pub fn next_run_time(state: &RetryState, retry_duration: i64, now: i64) -> i64 {
    let exponent = state.run_iteration as i32 - 1;
    // Float-to-int saturates, and saturating_add keeps huge iterations from
    // wrapping; both ceilings clamp the result anyway.
    let target = state
        .last_run_time
        .saturating_add((2f64.powi(exponent) * 1000.0) as i64);

    let furthest = now.saturating_add(MAX_WAIT_MS);
    let bound = now.saturating_add(retry_duration);

    target.min(furthest).min(bound)
}

/// Eligibility at an explicit instant: boundary inclusive at the next run
/// time.
fn is_present_at(state: &RetryState, retry_duration: i64, now: i64) -> bool {
    now >= next_run_time(state, retry_duration, now)
}

/// Timing requirement gating deferred jobs, with wake-up arming on retry.
///
/// Stateless beyond the injected wake service and the wall clock; safe to
/// share across jobs and workers.
pub struct BackoffRequirement {
    wake: Arc<dyn WakeService>,
}

impl BackoffRequirement {
    pub fn new(wake: Arc<dyn WakeService>) -> Self {
        Self { wake }
    }
}

impl Requirement for BackoffRequirement {
    fn is_present(&self, job: &Job) -> bool {
        is_present_at(job.state(), job.params().retry_duration, now_ms())
    }

    fn on_retry(&self, job: &Job) {
        let at = next_run_time(job.state(), job.params().retry_duration, now_ms());
        trace!(wake_at = at, iteration = job.state().run_iteration, "arming backoff wake-up");
        self.wake.arm_unique_wake_at(at);
    }
}
