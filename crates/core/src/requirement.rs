//! Gating conditions a job must satisfy before an attempt may proceed.

use crate::job::Job;

/// A condition (timing, connectivity, ...) gating job dispatch.
///
/// Requirements are read-only observers of the job; any scheduling side
/// effects (such as arming a wake-up) happen in `on_retry`.
pub trait Requirement: Send + Sync {
    /// Is the condition currently satisfied for this job?
    fn is_present(&self, job: &Job) -> bool;

    /// Called after the job records a retry, before the next eligibility
    /// check. Hook point for arming external wake-ups.
    fn on_retry(&self, job: &Job) {
        let _ = job;
    }
}
