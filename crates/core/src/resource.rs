//! Resource leases held for the duration of a job.

/// A lease on an external resource (e.g. a wake lock) held while a job runs.
///
/// When the owning job's `resource_timeout` is 0, the engine releases the
/// lease on the terminal path; otherwise release is left to an external
/// mechanism and the engine never touches it.
pub trait ResourceLease: Send {
    fn release(&mut self);
}
