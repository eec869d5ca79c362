//! Job queue with group-exclusive, requirement-gated dispatch.

use std::collections::{HashSet, VecDeque};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use tasklift_core::Job;

/// Source and sink of runnable jobs, shared across workers.
///
/// Dispatch hands over exclusive ownership of the job. Jobs sharing a group
/// are never in flight concurrently: the queue holds a group slot from
/// dispatch until [`JobQueue::set_group_available`] (terminal outcome) or a
/// [`JobQueue::requeue`] of the in-flight holder returns it. Producer
/// enqueues via [`JobQueue::push`] never touch group slots.
pub trait JobQueue: Send + Sync {
    /// Next job whose requirements are met and whose group is free.
    ///
    /// Blocks up to `timeout` waiting for one; `None` on timeout so callers
    /// can interleave shutdown checks.
    fn next_runnable(&self, timeout: Duration) -> Option<Job>;

    /// Enqueue a new job. Slot-neutral: an in-flight job of the same group
    /// keeps its slot.
    fn push(&self, job: Job);

    /// Deferral handoff: the worker that dispatched (and therefore holds the
    /// group slot for) `job` returns it to the queue, slot included.
    fn requeue(&self, job: Job);

    /// A grouped job reached a terminal outcome; unblock the next one.
    fn set_group_available(&self, group_id: &str);
}

#[derive(Default)]
struct QueueInner {
    jobs: VecDeque<Job>,
    busy_groups: HashSet<String>,
}

impl QueueInner {
    fn take_runnable(&mut self) -> Option<Job> {
        let index = self.jobs.iter().position(|job| {
            let group_free = job
                .params()
                .group_id
                .as_ref()
                .is_none_or(|g| !self.busy_groups.contains(g));
            group_free && job.is_requirements_met()
        })?;

        let job = self.jobs.remove(index)?;
        if let Some(group) = &job.params().group_id {
            self.busy_groups.insert(group.clone());
        }
        Some(job)
    }
}

/// In-memory queue for embedding and tests.
///
/// FIFO among currently-runnable jobs; gated jobs are skipped, not reordered.
#[derive(Default)]
pub struct InMemoryJobQueue {
    inner: Mutex<QueueInner>,
    available: Condvar,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl JobQueue for InMemoryJobQueue {
    fn next_runnable(&self, timeout: Duration) -> Option<Job> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock().unwrap();

        loop {
            if let Some(job) = inner.take_runnable() {
                return Some(job);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }

            let (guard, wait) = self.available.wait_timeout(inner, remaining).unwrap();
            inner = guard;
            if wait.timed_out() {
                // One last scan: a requirement may have become met by timing.
                return inner.take_runnable();
            }
        }
    }

    fn push(&self, job: Job) {
        let mut inner = self.inner.lock().unwrap();
        inner.jobs.push_back(job);
        drop(inner);
        self.available.notify_one();
    }

    fn requeue(&self, job: Job) {
        let mut inner = self.inner.lock().unwrap();
        // The requeued job is its group's in-flight holder; returning it
        // returns the slot, keeping at most one per group dispatched.
        if let Some(group) = &job.params().group_id {
            inner.busy_groups.remove(group);
        }
        inner.jobs.push_back(job);
        drop(inner);
        self.available.notify_one();
    }

    fn set_group_available(&self, group_id: &str) {
        debug!(group = group_id, "group slot released");
        self.inner.lock().unwrap().busy_groups.remove(group_id);
        self.available.notify_all();
    }
}
