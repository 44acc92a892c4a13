//! Run configuration.

/// Settings for one [`Context`](crate::Context).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextConfig {
    /// Seed of the context's random number generator.
    pub seed: u64,
    /// Keep every log record in an in-memory journal returned with the
    /// run report.
    pub journal: bool,
    /// Maximum number of queued events processed before the run is
    /// aborted with [`KernelError::EventLimitExceeded`](crate::KernelError::EventLimitExceeded).
    pub event_limit: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            journal: true,
            event_limit: 10_000_000,
        }
    }
}

impl ContextConfig {
    /// Configuration for quick runs that do not need the journal.
    pub fn quiet(seed: u64) -> Self {
        Self {
            seed,
            journal: false,
            ..Self::default()
        }
    }
}
