use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while driving a [`Context`](crate::Context).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    /// An `assert_that` family call failed.
    ///
    /// The failure has already been counted and logged; the error only
    /// exists so that runner code can leave the current block with `?`.
    #[error("assertion failed in runner '{runner}' at {location}: {message}")]
    AssertionFailed {
        /// Runner that issued the assertion.
        runner: String,
        /// Source location of the assertion.
        location: String,
        /// Explanation of the failure.
        message: String,
    },
    /// The event queue drained while some runners were still suspended.
    #[error("deadlock at {time:?}: runners {runners:?} are waiting on conditions that can no longer change")]
    Deadlock {
        /// Virtual time at which the queue drained.
        time: Duration,
        /// Names of the runners left suspended.
        runners: Vec<String>,
    },
    /// More events were processed than the configured limit allows.
    #[error("event limit of {limit} exceeded")]
    EventLimitExceeded {
        /// The configured limit.
        limit: u64,
    },
    /// The kernel has been dropped and is no longer accessible.
    #[error("kernel has been shut down")]
    Shutdown,
    /// Runner code cannot continue. Returning it from a runner phase counts
    /// the runner as aborted.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

/// A type alias for `Result<T, KernelError>`.
pub type KernelResult<T> = Result<T, KernelError>;

/// Terminates the process on API misuse.
///
/// Misuse is a programming error in the test, not a test failure, so it is
/// never counted: it is logged and turned into a panic at the caller.
#[track_caller]
pub(crate) fn usage_error(message: &str) -> ! {
    let location = std::panic::Location::caller();
    tracing::error!(%location, "usage error: {}", message);
    panic!("usage error: {message}")
}
