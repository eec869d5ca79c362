//! Fault model for job execution.

use thiserror::Error;

/// Result type returned by a job's work function.
pub type WorkResult = Result<(), WorkError>;

/// A fault raised by a job's work function.
///
/// Faults are plain values: the engine never inspects them beyond logging.
/// Whether a recoverable fault is retried is the job's own decision, made in
/// [`crate::Work::on_should_retry`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct Fault {
    message: String,
}

impl Fault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Failure of a single execution attempt, split by recoverability.
///
/// `Recoverable` faults are routed through the job's retry policy.
/// `Fatal` faults are programming errors: they are never retried or
/// classified, they propagate and terminate the worker that hit them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkError {
    /// The attempt failed but the job may be retried.
    #[error("recoverable fault: {0}")]
    Recoverable(Fault),

    /// The attempt hit a programming error; the worker must not continue.
    #[error("fatal fault: {0}")]
    Fatal(Fault),
}

impl WorkError {
    pub fn recoverable(message: impl Into<String>) -> Self {
        Self::Recoverable(Fault::new(message))
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(Fault::new(message))
    }
}
