//! The job unit: parameters, retry state, work body, requirements, lease.

use crate::error::{Fault, WorkResult};
use crate::params::{JobParameters, JobSnapshot, RetryState};
use crate::requirement::Requirement;
use crate::resource::ResourceLease;
use crate::time::now_ms;
use crate::work::Work;

/// A unit of retryable work, owned by exactly one worker while it runs.
///
/// The engine mutates `run_iteration`/`last_run_time` through [`Job::on_retry`];
/// everything else is fixed at construction.
pub struct Job {
    params: JobParameters,
    state: RetryState,
    work: Box<dyn Work>,
    requirements: Vec<Box<dyn Requirement>>,
    lease: Option<Box<dyn ResourceLease>>,
}

impl Job {
    pub fn new(params: JobParameters, work: impl Work + 'static) -> Self {
        Self {
            params,
            state: RetryState::default(),
            work: Box::new(work),
            requirements: Vec::new(),
            lease: None,
        }
    }

    pub fn with_requirement(mut self, requirement: impl Requirement + 'static) -> Self {
        self.requirements.push(Box::new(requirement));
        self
    }

    pub fn with_lease(mut self, lease: impl ResourceLease + 'static) -> Self {
        self.lease = Some(Box::new(lease));
        self
    }

    pub fn params(&self) -> &JobParameters {
        &self.params
    }

    pub fn state(&self) -> &RetryState {
        &self.state
    }

    /// Snapshot for the durable store; `None` for transient jobs.
    pub fn snapshot(&self) -> Option<JobSnapshot> {
        if !self.params.persistent {
            return None;
        }
        self.params
            .persistent_id
            .map(|id| JobSnapshot::new(id, &self.params, &self.state))
    }

    /// Perform one execution attempt.
    pub fn run(&mut self) -> WorkResult {
        self.work.run()
    }

    /// Ask the job whether `fault` should be retried.
    pub fn on_should_retry(&mut self, fault: &Fault) -> bool {
        self.work.on_should_retry(fault)
    }

    /// Notify the job that it failed or was dropped.
    pub fn on_canceled(&mut self) {
        self.work.on_canceled();
    }

    /// Record a retry: bump `run_iteration`, stamp `last_run_time`, and give
    /// each requirement its hook (the backoff requirement arms a wake-up here).
    pub fn on_retry(&mut self) {
        self.state.run_iteration += 1;
        self.state.last_run_time = now_ms();

        for requirement in &self.requirements {
            requirement.on_retry(self);
        }
    }

    /// All requirements satisfied? Vacuously true with none attached.
    pub fn is_requirements_met(&self) -> bool {
        self.requirements.iter().all(|r| r.is_present(self))
    }

    /// Take the held lease out of the job, if any.
    pub fn take_lease(&mut self) -> Option<Box<dyn ResourceLease>> {
        self.lease.take()
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("params", &self.params)
            .field("state", &self.state)
            .field("requirements", &self.requirements.len())
            .field("lease", &self.lease.is_some())
            .finish()
    }
}
