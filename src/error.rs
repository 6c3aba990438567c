//! Kernel-wide error type.
//!
//! Every fallible [`crate::Kernel`] method returns `Result<T, KernelError>`
//! rather than the raw "0 on success, negative on failure" status code a
//! C-shaped RTOS ABI would use — [`KernelError`] is the idiomatic-Rust
//! rendition of that convention, covering bad handles, out-of-range
//! arguments, exhausted pools, protocol violations, timeouts, and
//! delete-while-waiting.

use core::fmt;

/// The result type returned by every fallible [`crate::Kernel`] operation.
pub type KernelResult<T> = Result<T, KernelError>;

/// Everything that can go wrong calling into the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// A handle (task, semaphore, mutex, queue, event group) does not refer
    /// to a live object. Covers both "never created" and "deleted".
    BadId,
    /// An argument was out of range: priority ≥ `P_MAX`, a zero-size queue,
    /// `period == 0` for a periodic task, an unknown policy, and so on.
    InvalidArgument,
    /// The relevant slot pool (task registry, semaphore/mutex/event-group
    /// pool, queue pool) has no free capacity.
    Capacity,
    /// The call is well-formed but violates a protocol rule: unlocking a
    /// mutex you don't own, locking a mutex you already own, resuming a
    /// task that isn't suspended, signalling a semaphore already at its max
    /// count, deleting the current or idle task, suspending the idle task.
    Protocol(ProtocolError),
    /// A bounded wait expired before its resource became available.
    Timeout,
    /// The object was deleted while the caller was waiting on it.
    Destroyed,
}

/// The specific protocol rule a [`KernelError::Protocol`] violates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    NotOwner,
    AlreadyOwned,
    NotSuspended,
    AtMaxCount,
    CurrentOrIdleTask,
    IdleTaskNotSuspendable,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadId => write!(f, "handle does not refer to a live object"),
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::Capacity => write!(f, "no free capacity in the relevant slot pool"),
            Self::Protocol(p) => write!(f, "protocol violation: {p:?}"),
            Self::Timeout => write!(f, "timed out waiting for the resource"),
            Self::Destroyed => write!(f, "object was deleted while waiting on it"),
        }
    }
}

impl std::error::Error for KernelError {}

/// Log `err` at a level matching its severity, then return it.
///
/// Protocol violations and bad-id lookups are warnings (the call is
/// rejected but nothing was mutated); everything else is informational.
pub(crate) fn log_and_return<T>(err: KernelError) -> KernelResult<T> {
    match err {
        KernelError::Protocol(_) | KernelError::BadId => {
            log::warn!("kernel call rejected: {err}")
        }
        _ => log::debug!("kernel call rejected: {err}"),
    }
    Err(err)
}
