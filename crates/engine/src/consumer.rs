//! The job consumer: worker loop, retry state machine, finalization.

use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use tasklift_core::{Fault, Job, WorkError, now_ms};

use crate::queue::JobQueue;
use crate::store::DurableStore;

/// Outcome of one dequeue cycle.
///
/// Never persisted as a type; only its side effects are. `Success` and
/// `Failure` are terminal for the job instance, `Deferred` re-enters the
/// queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobResult {
    Success,
    Failure,
    Deferred,
}

/// Consumer configuration.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Worker thread name, used in logs.
    pub name: String,
    /// Upper bound on one blocking dequeue wait; shutdown is checked between
    /// waits, and timing requirements are re-evaluated each tick.
    pub poll_tick: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            name: "job-consumer".to_string(),
            poll_tick: Duration::from_millis(100),
        }
    }
}

impl ConsumerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_poll_tick(mut self, tick: Duration) -> Self {
        self.poll_tick = tick;
        self
    }
}

/// Consumer runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ConsumerStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_deferred: u64,
}

/// Handle to control a running consumer.
pub struct ConsumerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<ConsumerStats>>,
}

impl ConsumerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    /// Current statistics snapshot.
    pub fn stats(&self) -> ConsumerStats {
        self.stats.lock().unwrap().clone()
    }
}

/// Drives dequeued jobs through the retry loop and applies outcome side
/// effects against the queue and the store.
pub struct JobConsumer {
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn DurableStore>,
}

impl JobConsumer {
    pub fn new(queue: Arc<dyn JobQueue>, store: Arc<dyn DurableStore>) -> Self {
        Self { queue, store }
    }

    /// Spawn the consumer on a named worker thread.
    pub fn spawn(self, config: ConsumerConfig) -> ConsumerHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(ConsumerStats::default()));
        let stats_clone = stats.clone();

        let name = config.name.clone();
        let join = thread::Builder::new()
            .name(name)
            .spawn(move || consumer_loop(self, config, shutdown_rx, stats_clone))
            .expect("failed to spawn job consumer thread");

        ConsumerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        }
    }

    /// Run one dequeued job to an outcome.
    ///
    /// Recoverable faults are routed through the job's own retry policy; a
    /// fatal fault is returned as an error so the worker can terminate.
    pub fn run_job(&self, job: &mut Job) -> Result<JobResult, Fault> {
        while can_retry(job, now_ms()) {
            match job.run() {
                Ok(()) => return Ok(JobResult::Success),
                Err(WorkError::Fatal(fault)) => {
                    error!(error = %fault, "unrecoverable fault in job");
                    return Err(fault);
                }
                Err(WorkError::Recoverable(fault)) => {
                    warn!(
                        error = %fault,
                        iteration = job.state().run_iteration,
                        "job attempt failed"
                    );

                    if !job.on_should_retry(&fault) {
                        return Ok(JobResult::Failure);
                    }

                    job.on_retry();
                    if !job.is_requirements_met() {
                        return Ok(JobResult::Deferred);
                    }
                    // Requirements still met: attempt again immediately.
                }
            }
        }

        Ok(JobResult::Failure)
    }

    /// Apply the outcome's side effects, consuming the job.
    pub fn finalize(&self, mut job: Job, result: JobResult) {
        match result {
            JobResult::Deferred => {
                if let Some(snapshot) = job.snapshot() {
                    if let Err(e) = self.store.update(&snapshot) {
                        // Losing durability is worse than losing the job:
                        // cancel instead of re-queueing with stale state.
                        warn!(
                            job = %snapshot.persistent_id,
                            error = %e,
                            "failed to persist deferred job, canceling it"
                        );
                        job.on_canceled();
                        self.release_held(job);
                        return;
                    }
                }
                // Deferral handoff: returns the job's group slot with it.
                self.queue.requeue(job);
            }
            JobResult::Success | JobResult::Failure => {
                if result == JobResult::Failure {
                    job.on_canceled();
                }

                if job.params().persistent {
                    if let Some(id) = job.params().persistent_id {
                        if let Err(e) = self.store.remove(id) {
                            warn!(job = %id, error = %e, "failed to remove job record");
                        }
                    }
                }

                self.release_held(job);
            }
        }
    }

    /// Terminal-path release of whatever the job still holds: a zero-timeout
    /// lease and its group slot.
    fn release_held(&self, mut job: Job) {
        if job.params().resource_timeout == 0 {
            if let Some(mut lease) = job.take_lease() {
                lease.release();
            }
        }

        if let Some(group) = job.params().group_id.clone() {
            self.queue.set_group_available(&group);
        }
    }
}

/// Eligibility test evaluated before each attempt.
///
/// Count-bounded jobs are eligible while attempts remain; time-bounded jobs
/// while their window is open (or forever when `start_time` is unset).
fn can_retry(job: &Job, now: i64) -> bool {
    let params = job.params();
    if params.retry_count > 0 {
        return job.state().run_iteration < params.retry_count;
    }
    params.start_time == 0 || now < params.start_time + params.retry_duration
}

fn consumer_loop(
    consumer: JobConsumer,
    config: ConsumerConfig,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<ConsumerStats>>,
) {
    info!(worker = %config.name, "job consumer started");

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        let Some(mut job) = consumer.queue.next_runnable(config.poll_tick) else {
            continue;
        };

        debug!(worker = %config.name, job = ?job, "dequeued job");

        match consumer.run_job(&mut job) {
            Ok(result) => {
                {
                    let mut s = stats.lock().unwrap();
                    s.jobs_processed += 1;
                    match result {
                        JobResult::Success => s.jobs_succeeded += 1,
                        JobResult::Failure => s.jobs_failed += 1,
                        JobResult::Deferred => s.jobs_deferred += 1,
                    }
                }

                debug!(worker = %config.name, result = ?result, "job cycle finished");
                consumer.finalize(job, result);
            }
            Err(fault) => {
                // Fail-fast: a fatal fault terminates the worker; restarting
                // it is the supervisor's responsibility.
                error!(worker = %config.name, error = %fault, "worker terminating on fatal fault");
                return;
            }
        }
    }

    info!(worker = %config.name, "job consumer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Instant;

    use tasklift_core::{
        JobParameters, PersistentId, Requirement, ResourceLease, Work, WorkResult,
    };

    use crate::queue::InMemoryJobQueue;
    use crate::store::{InMemoryDurableStore, StoreError};

    /// Work body driven by a script of attempt results.
    struct ScriptedWork {
        script: VecDeque<WorkResult>,
        attempts: Arc<AtomicU32>,
        accept_retry: bool,
        canceled: Arc<AtomicBool>,
    }

    impl ScriptedWork {
        fn new(script: Vec<WorkResult>, accept_retry: bool) -> (Self, Arc<AtomicU32>, Arc<AtomicBool>) {
            let attempts = Arc::new(AtomicU32::new(0));
            let canceled = Arc::new(AtomicBool::new(false));
            (
                Self {
                    script: script.into(),
                    attempts: attempts.clone(),
                    accept_retry,
                    canceled: canceled.clone(),
                },
                attempts,
                canceled,
            )
        }
    }

    impl Work for ScriptedWork {
        fn run(&mut self) -> WorkResult {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.script
                .pop_front()
                .unwrap_or_else(|| Err(WorkError::recoverable("script exhausted")))
        }

        fn on_should_retry(&mut self, _fault: &Fault) -> bool {
            self.accept_retry
        }

        fn on_canceled(&mut self) {
            self.canceled.store(true, Ordering::SeqCst);
        }
    }

    struct Never;

    impl Requirement for Never {
        fn is_present(&self, _job: &Job) -> bool {
            false
        }
    }

    struct FlagLease {
        released: Arc<AtomicBool>,
    }

    impl ResourceLease for FlagLease {
        fn release(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    /// Queue spy recording requeues and group releases.
    #[derive(Default)]
    struct SpyQueue {
        requeued: Mutex<Vec<Job>>,
        released_groups: Mutex<Vec<String>>,
    }

    impl JobQueue for SpyQueue {
        fn next_runnable(&self, _timeout: Duration) -> Option<Job> {
            None
        }

        fn push(&self, _job: Job) {
            unreachable!("consumers never producer-enqueue");
        }

        fn requeue(&self, job: Job) {
            self.requeued.lock().unwrap().push(job);
        }

        fn set_group_available(&self, group_id: &str) {
            self.released_groups
                .lock()
                .unwrap()
                .push(group_id.to_string());
        }
    }

    struct FailingStore;

    impl DurableStore for FailingStore {
        fn update(&self, _snapshot: &tasklift_core::JobSnapshot) -> Result<(), StoreError> {
            Err(StoreError::Io("disk full".to_string()))
        }

        fn remove(&self, _id: PersistentId) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn consumer_with(queue: Arc<dyn JobQueue>, store: Arc<dyn DurableStore>) -> JobConsumer {
        JobConsumer::new(queue, store)
    }

    fn recoverable() -> WorkResult {
        Err(WorkError::recoverable("transient"))
    }

    #[test]
    fn count_bounded_job_runs_exactly_n_attempts() {
        let (work, attempts, _) = ScriptedWork::new(vec![recoverable(); 3], true);
        let mut job = Job::new(JobParameters::new().with_retry_count(3), work);

        let consumer = consumer_with(
            Arc::new(SpyQueue::default()),
            Arc::new(InMemoryDurableStore::new()),
        );
        let result = consumer.run_job(&mut job).unwrap();

        assert_eq!(result, JobResult::Failure);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(job.state().run_iteration, 3);
    }

    #[test]
    fn success_on_third_attempt_records_two_retries() {
        let (work, attempts, _) =
            ScriptedWork::new(vec![recoverable(), recoverable(), Ok(())], true);
        let id = PersistentId::new();
        let mut job = Job::new(
            JobParameters::new()
                .with_retry_count(3)
                .persistent(id)
                .with_group("sync"),
            work,
        );

        let queue = Arc::new(SpyQueue::default());
        let store = Arc::new(InMemoryDurableStore::new());
        store.update(&job.snapshot().unwrap()).unwrap();

        let consumer = consumer_with(queue.clone(), store.clone());
        let result = consumer.run_job(&mut job).unwrap();

        assert_eq!(result, JobResult::Success);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(job.state().run_iteration, 2);

        consumer.finalize(job, result);
        assert!(store.is_empty());
        assert_eq!(queue.released_groups.lock().unwrap().as_slice(), ["sync"]);
    }

    #[test]
    fn refused_retry_fails_cancels_and_releases() {
        let (work, _, canceled) = ScriptedWork::new(vec![recoverable()], false);
        let released = Arc::new(AtomicBool::new(false));
        let id = PersistentId::new();
        let mut job = Job::new(
            JobParameters::new().with_retry_count(1).persistent(id),
            work,
        )
        .with_lease(FlagLease {
            released: released.clone(),
        });

        let consumer = consumer_with(
            Arc::new(SpyQueue::default()),
            Arc::new(InMemoryDurableStore::new()),
        );
        let result = consumer.run_job(&mut job).unwrap();
        assert_eq!(result, JobResult::Failure);
        consumer.finalize(job, result);

        assert!(canceled.load(Ordering::SeqCst));
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn nonzero_resource_timeout_leaves_the_lease_alone() {
        let (work, _, _) = ScriptedWork::new(vec![Ok(())], true);
        let released = Arc::new(AtomicBool::new(false));
        let mut job = Job::new(
            JobParameters::new()
                .with_retry_count(1)
                .with_resource_timeout(30_000),
            work,
        )
        .with_lease(FlagLease {
            released: released.clone(),
        });

        let consumer = consumer_with(
            Arc::new(SpyQueue::default()),
            Arc::new(InMemoryDurableStore::new()),
        );
        let result = consumer.run_job(&mut job).unwrap();
        consumer.finalize(job, result);

        assert!(!released.load(Ordering::SeqCst));
    }

    #[test]
    fn deferred_job_is_requeued_with_persisted_state() {
        let (work, _, _) = ScriptedWork::new(vec![recoverable()], true);
        let id = PersistentId::new();
        let mut job = Job::new(
            JobParameters::new().with_retry_count(3).persistent(id),
            work,
        )
        .with_requirement(Never);

        let queue = Arc::new(SpyQueue::default());
        let store = Arc::new(InMemoryDurableStore::new());
        let consumer = consumer_with(queue.clone(), store.clone());

        let result = consumer.run_job(&mut job).unwrap();
        assert_eq!(result, JobResult::Deferred);

        consumer.finalize(job, result);
        assert_eq!(queue.requeued.lock().unwrap().len(), 1);
        assert_eq!(store.get(id).unwrap().unwrap().run_iteration, 1);
    }

    #[test]
    fn deferred_job_with_failing_store_is_canceled_not_requeued() {
        let (work, _, canceled) = ScriptedWork::new(vec![recoverable()], true);
        let id = PersistentId::new();
        let mut job = Job::new(
            JobParameters::new().with_retry_count(3).persistent(id),
            work,
        )
        .with_requirement(Never);

        let queue = Arc::new(SpyQueue::default());
        let consumer = consumer_with(queue.clone(), Arc::new(FailingStore));

        let result = consumer.run_job(&mut job).unwrap();
        assert_eq!(result, JobResult::Deferred);

        consumer.finalize(job, result);
        assert!(canceled.load(Ordering::SeqCst));
        assert!(queue.requeued.lock().unwrap().is_empty());
    }

    #[test]
    fn fatal_fault_propagates_out_of_the_retry_loop() {
        let (work, attempts, canceled) =
            ScriptedWork::new(vec![Err(WorkError::fatal("bug"))], true);
        let mut job = Job::new(JobParameters::new().with_retry_count(5), work);

        let consumer = consumer_with(
            Arc::new(SpyQueue::default()),
            Arc::new(InMemoryDurableStore::new()),
        );
        let fault = consumer.run_job(&mut job).unwrap_err();

        assert_eq!(fault.message(), "bug");
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        // Fatal faults are never classified, so no cancellation hook fires.
        assert!(!canceled.load(Ordering::SeqCst));
    }

    #[test]
    fn deferral_on_the_last_attempt_fails_on_redelivery() {
        let (work, _, _) = ScriptedWork::new(vec![recoverable()], true);
        let mut job =
            Job::new(JobParameters::new().with_retry_count(1), work).with_requirement(Never);

        let consumer = consumer_with(
            Arc::new(SpyQueue::default()),
            Arc::new(InMemoryDurableStore::new()),
        );

        // The last attempt may still defer; eligibility is re-checked on the
        // next delivery, which then fails without another attempt.
        assert_eq!(consumer.run_job(&mut job).unwrap(), JobResult::Deferred);
        assert_eq!(consumer.run_job(&mut job).unwrap(), JobResult::Failure);
        assert_eq!(job.state().run_iteration, 1);
    }

    #[test]
    fn time_bounded_eligibility_tracks_the_window() {
        let (work, _, _) = ScriptedWork::new(vec![], true);
        let job = Job::new(JobParameters::new().with_retry_window(10_000, 5_000), work);

        assert!(can_retry(&job, 10_000));
        assert!(can_retry(&job, 14_999));
        assert!(!can_retry(&job, 15_000));
        assert!(!can_retry(&job, 1_000_000));
    }

    #[test]
    fn unset_start_time_means_always_eligible() {
        let (work, _, _) = ScriptedWork::new(vec![], true);
        let job = Job::new(JobParameters::new(), work);

        assert!(can_retry(&job, 0));
        assert!(can_retry(&job, i64::MAX / 2));
    }

    #[test]
    fn terminal_store_removal_is_idempotent() {
        let (work, _, _) = ScriptedWork::new(vec![Ok(())], true);
        let id = PersistentId::new();
        let mut job = Job::new(
            JobParameters::new().with_retry_count(1).persistent(id),
            work,
        );

        let store = Arc::new(InMemoryDurableStore::new());
        store.update(&job.snapshot().unwrap()).unwrap();

        let consumer = consumer_with(Arc::new(SpyQueue::default()), store.clone());
        let result = consumer.run_job(&mut job).unwrap();
        consumer.finalize(job, result);

        assert!(store.is_empty());
        // A repeated removal of the same identity still succeeds.
        store.remove(id).unwrap();
    }

    #[test]
    fn spawned_consumer_processes_queued_jobs() {
        let (work, _, _) = ScriptedWork::new(vec![Ok(())], true);
        let queue = Arc::new(InMemoryJobQueue::new());
        let store = Arc::new(InMemoryDurableStore::new());

        queue.push(Job::new(JobParameters::new().with_retry_count(1), work));

        let consumer = JobConsumer::new(queue.clone(), store);
        let handle = consumer.spawn(
            ConsumerConfig::default()
                .with_name("test-consumer")
                .with_poll_tick(Duration::from_millis(10)),
        );

        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.stats().jobs_processed == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        let stats = handle.stats();
        handle.shutdown();

        assert_eq!(stats.jobs_processed, 1);
        assert_eq!(stats.jobs_succeeded, 1);
        assert!(queue.is_empty());
    }
}
