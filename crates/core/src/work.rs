//! The capability trait a job body implements.

use crate::error::{Fault, WorkResult};

/// Business logic of a job.
///
/// Implementations decide what a single attempt does and which of their own
/// faults are worth retrying. Everything else (counting attempts, backoff,
/// persistence, group exclusivity) is the engine's job.
pub trait Work: Send {
    /// Perform one execution attempt.
    fn run(&mut self) -> WorkResult;

    /// Asked once per recoverable fault. Returning `false` fails the job.
    fn on_should_retry(&mut self, fault: &Fault) -> bool;

    /// The job reached failure or was dropped after a storage failure.
    /// A notification, not a preemption signal.
    fn on_canceled(&mut self) {}
}
