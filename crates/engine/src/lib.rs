//! Background job execution engine with retry, backoff, and deferral.
//!
//! ## Design
//!
//! - Each consumer is one worker thread driving a straight-line retry loop
//! - Jobs are count-bounded (max attempts) or time-bounded (retry window)
//! - Exponential backoff capped at one hour and at the job's own window
//! - Deferred jobs re-enter the queue; an armed wake-up keeps them live
//! - Persistent jobs survive restarts through the durable store
//! - Groups serialize related jobs: at most one per group in flight
//!
//! ## Components
//!
//! - `JobConsumer`: runs jobs with the retry/deferral state machine
//! - `JobQueue` / `InMemoryJobQueue`: group-exclusive, requirement-gated dispatch
//! - `DurableStore` / `InMemoryDurableStore`: crash-recovery snapshots
//! - `BackoffRequirement`: timing gate + wake-up arming
//! - `WakeService`: external alarm the backoff policy arms

pub mod backoff;
pub mod consumer;
pub mod queue;
pub mod store;
pub mod wake;

pub use backoff::{BackoffRequirement, MAX_WAIT_MS, next_run_time};
pub use consumer::{ConsumerConfig, ConsumerHandle, ConsumerStats, JobConsumer, JobResult};
pub use queue::{InMemoryJobQueue, JobQueue};
pub use store::{DurableStore, InMemoryDurableStore, StoreError};
pub use wake::{RecordingWake, WakeService};
