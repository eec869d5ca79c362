//! Job parameters, retry state, and the persisted snapshot.

use serde::{Deserialize, Serialize};

use crate::id::PersistentId;

/// Construction-time job configuration. Immutable once the job is built.
///
/// A job is either *count-bounded* (`retry_count > 0`: at most that many
/// attempts) or *time-bounded* (`retry_count == 0`: attempts allowed while
/// the window `[start_time, start_time + retry_duration)` is open, or forever
/// when `start_time == 0`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobParameters {
    /// Maximum number of attempts; 0 means time-bounded instead.
    pub retry_count: u32,
    /// Epoch ms when the eligibility window began; 0 = unset (always eligible).
    pub start_time: i64,
    /// Maximum retry window / backoff ceiling, in ms.
    pub retry_duration: i64,
    /// Whether the job's state is persisted for crash recovery.
    pub persistent: bool,
    /// Stable identity; present iff `persistent`.
    pub persistent_id: Option<PersistentId>,
    /// Jobs sharing a group run mutually exclusively. At most one group.
    pub group_id: Option<String>,
    /// 0 = the engine releases the held lease at job termination; nonzero
    /// leaves release to an external mechanism.
    pub resource_timeout: i64,
}

impl Default for JobParameters {
    fn default() -> Self {
        Self {
            retry_count: 0,
            start_time: 0,
            retry_duration: 0,
            persistent: false,
            persistent_id: None,
            group_id: None,
            resource_timeout: 0,
        }
    }
}

impl JobParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the job to at most `count` attempts.
    pub fn with_retry_count(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    /// Bound the job to the time window starting at `start_time` (epoch ms)
    /// and lasting `duration_ms`.
    pub fn with_retry_window(mut self, start_time: i64, duration_ms: i64) -> Self {
        self.start_time = start_time;
        self.retry_duration = duration_ms;
        self
    }

    /// Mark the job persistent under the given stable identity.
    pub fn persistent(mut self, id: PersistentId) -> Self {
        self.persistent = true;
        self.persistent_id = Some(id);
        self
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn with_resource_timeout(mut self, timeout_ms: i64) -> Self {
        self.resource_timeout = timeout_ms;
        self
    }
}

/// Mutable retry bookkeeping, bumped by [`crate::Job::on_retry`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryState {
    /// Attempts so far; increases by exactly one per attempt.
    pub run_iteration: u32,
    /// Epoch ms of the most recent attempt.
    pub last_run_time: i64,
}

/// Serializable flattening of a persistent job's parameters and retry state.
///
/// This is what the durable store receives on `update`; the on-disk encoding
/// beyond this struct is the store's concern.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSnapshot {
    pub persistent_id: PersistentId,
    pub retry_count: u32,
    pub start_time: i64,
    pub retry_duration: i64,
    pub run_iteration: u32,
    pub last_run_time: i64,
    pub group_id: Option<String>,
}

impl JobSnapshot {
    pub fn new(id: PersistentId, params: &JobParameters, state: &RetryState) -> Self {
        Self {
            persistent_id: id,
            retry_count: params.retry_count,
            start_time: params.start_time,
            retry_duration: params.retry_duration,
            run_iteration: state.run_iteration,
            last_run_time: state.last_run_time,
            group_id: params.group_id.clone(),
        }
    }
}
