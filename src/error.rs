//! Error types for bunch submission, polling and execution.
//!
//! Provides [`BunchError`], the single error enum returned by every public
//! operation of the crate, and the [`Result`] alias built on it.

use thiserror::Error;

use crate::handle::GroupHandle;

/// Convenience alias used throughout the crate.
pub type Result<T, E = BunchError> = std::result::Result<T, E>;

/// Errors that can occur while submitting, polling or executing bunches.
///
/// Admission errors (`OversizedGroup`, `UseSingleUnitPath`,
/// `CapacityExceeded`) and `UnknownHandle` are reported synchronously by the
/// call that triggered them. Failures inside a background worker never
/// unwind into the caller; they surface later as [`BunchError::GroupFailed`].
///
/// # Examples
///
/// ```
/// use taskbunch::BunchError;
///
/// let err = BunchError::CapacityExceeded { active: 4, max: 4 };
/// assert!(err.is_retryable());
/// assert!(err.to_string().contains("4 of 4"));
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BunchError {
    /// The submitted batch is larger than the maximum group size.
    #[error("bunch of {size} tasks exceeds the maximum bunch size of {max}")]
    OversizedGroup {
        /// Number of submitted items.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The submitted batch is smaller than the minimum group size.
    #[error("bunch of {size} tasks is below the minimum of {min}; use the single task path")]
    UseSingleUnitPath {
        /// Number of submitted items.
        size: usize,
        /// Configured minimum.
        min: usize,
    },

    /// The registry already holds the maximum number of groups.
    #[error("parallel bunch limit reached: {active} of {max} groups registered")]
    CapacityExceeded {
        /// Groups registered when the submit was rejected.
        active: usize,
        /// Configured capacity.
        max: usize,
    },

    /// No group is registered under the handle.
    #[error("no such bunch: {handle}")]
    UnknownHandle {
        /// The handle that was looked up.
        handle: GroupHandle,
    },

    /// A unit's result cell was written twice.
    #[error("task {index} was computed more than once")]
    DoubleCompute {
        /// Index of the unit within its group.
        index: usize,
    },

    /// The group's worker failed; its remaining units will never be ready.
    #[error("bunch {handle} failed: {reason}")]
    GroupFailed {
        /// The failed group.
        handle: GroupHandle,
        /// What went wrong in the worker.
        reason: String,
    },

    /// The group was cancelled before all units were computed.
    #[error("bunch {handle} was cancelled")]
    GroupCancelled {
        /// The cancelled group.
        handle: GroupHandle,
    },

    /// Polling made no progress within the retry budget.
    #[error("bunch {handle} produced no results after {attempts} polls")]
    Stalled {
        /// The group being collected.
        handle: GroupHandle,
        /// Consecutive empty polls.
        attempts: u32,
    },

    /// The solver rejected its input.
    #[error("solve failed: {reason}")]
    Solve {
        /// Solver-provided description.
        reason: String,
    },

    /// A background computation was lost (panicked or aborted).
    #[error("worker lost: {reason}")]
    WorkerLost {
        /// Panic message or join error.
        reason: String,
    },

    /// `submit` was called outside a Tokio runtime, so no worker can run.
    #[error("no Tokio runtime available to run bunch workers")]
    NoRuntime,

    /// Every handle value of this registry has been used.
    #[error("bunch handles exhausted")]
    HandlesExhausted,

    /// Configuration values are inconsistent or unparsable.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// A line of task input could not be parsed.
    #[error("invalid input on line {line}: {reason}")]
    InvalidInput {
        /// 1-based line number.
        line: usize,
        /// Why the line was rejected.
        reason: String,
    },

    /// A retried operation kept failing.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The error returned by the final attempt.
        last: Box<BunchError>,
    },
}

impl BunchError {
    /// Returns `true` if the same call may succeed later without changes.
    ///
    /// Only capacity rejections are transient: every other kind either
    /// needs a different input or reports a terminal condition.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }

    /// Returns `true` for admission rejections raised by `submit`.
    pub fn is_admission(&self) -> bool {
        matches!(
            self,
            Self::OversizedGroup { .. }
                | Self::UseSingleUnitPath { .. }
                | Self::CapacityExceeded { .. }
        )
    }

    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub(crate) fn solve(reason: impl Into<String>) -> Self {
        Self::Solve {
            reason: reason.into(),
        }
    }
}
