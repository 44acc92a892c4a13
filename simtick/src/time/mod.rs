//! Timers and stopwatches running on virtual time.

pub(crate) mod stopwatch;
pub(crate) mod timer;

pub use stopwatch::Stopwatch;
pub use timer::Timer;
