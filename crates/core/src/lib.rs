//! `tasklift-core` — job domain building blocks.
//!
//! This crate contains the **pure domain** side of the job system: faults,
//! identifiers, job parameters/retry state, and the capability traits a job
//! body implements. No queue, storage, or scheduling concerns live here.

pub mod error;
pub mod id;
pub mod job;
pub mod params;
pub mod requirement;
pub mod resource;
pub mod time;
pub mod work;

pub use error::{Fault, WorkError, WorkResult};
pub use id::PersistentId;
pub use job::Job;
pub use params::{JobParameters, JobSnapshot, RetryState};
pub use requirement::Requirement;
pub use resource::ResourceLease;
pub use time::now_ms;
pub use work::Work;
