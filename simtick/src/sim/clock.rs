//! Virtual time source.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use crate::error::usage_error;

/// The single source of virtual time for a [`Context`](crate::Context).
///
/// Cloning yields another handle to the same clock. Reading the time never
/// touches the kernel, so condition leaves can consult it while the kernel
/// is busy dispatching an event.
#[derive(Debug, Clone, Default)]
pub struct LogicalClock {
    now: Rc<Cell<Duration>>,
}

impl LogicalClock {
    /// Creates a clock positioned at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current virtual time.
    pub fn now(&self) -> Duration {
        self.now.get()
    }

    /// Moves the clock to `time`.
    ///
    /// # Panics
    ///
    /// Panics if `time` lies in the past.
    #[track_caller]
    pub(crate) fn move_to(&self, time: Duration) {
        if time < self.now.get() {
            usage_error(&format!(
                "clock cannot move backwards from {:?} to {:?}",
                self.now.get(),
                time
            ));
        }
        self.now.set(time);
    }

    /// Advances the clock by `delta`.
    #[cfg(test)]
    pub(crate) fn move_forward(&self, delta: Duration) {
        self.now.set(self.now.get() + delta);
    }
}

/// Formats a virtual time or duration the way log lines print it.
pub(crate) fn format_time(time: Duration) -> String {
    if time.subsec_nanos() % 1_000_000 == 0 {
        format!("{} ms", time.as_millis())
    } else {
        format!("{:.6} ms", time.as_secs_f64() * 1000.0)
    }
}
