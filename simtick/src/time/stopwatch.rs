//! Stopwatches measuring elapsed virtual time.
//!
//! Comparing a stopwatch against a duration yields a [`Condition`] whose
//! value flips purely because time passes. While such a condition is being
//! watched (by a pending wait or an active invariant), the kernel schedules
//! edge events at the instants the lap time reaches each threshold and just
//! after it, so the flip is observed without polling.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use crate::reactive::condition::{Condition, Threshold};
use crate::reactive::operand::Relation;
use crate::sim::clock::{format_time, LogicalClock};
use crate::sim::ids::SourceId;
use crate::sim::kernel::{Kernel, WeakKernel};

#[derive(Debug)]
struct StopwatchState {
    running: bool,
    accumulated: Duration,
    anchor: Duration,
}

pub(crate) struct StopwatchCore {
    id: SourceId,
    clock: LogicalClock,
    state: RefCell<StopwatchState>,
    kernel: WeakKernel,
}

impl StopwatchCore {
    pub(crate) fn id(&self) -> SourceId {
        self.id
    }

    pub(crate) fn is_running(&self) -> bool {
        self.state.borrow().running
    }

    pub(crate) fn lap(&self) -> Duration {
        let state = self.state.borrow();
        if state.running {
            state.accumulated + (self.clock.now() - state.anchor)
        } else {
            state.accumulated
        }
    }

    fn changed(self: &Rc<Self>) {
        if let Ok(kernel) = self.kernel.upgrade() {
            kernel.stopwatch_changed(self);
        }
    }
}

/// Measures elapsed virtual time across start/stop intervals.
///
/// A stopwatch starts running when created. Clones share the same
/// measurement.
#[derive(Clone)]
pub struct Stopwatch {
    core: Rc<StopwatchCore>,
}

impl Stopwatch {
    pub(crate) fn new(kernel: &Kernel) -> Self {
        let clock = kernel.clock();
        let anchor = clock.now();
        Self {
            core: Rc::new(StopwatchCore {
                id: kernel.next_source_id(),
                clock,
                state: RefCell::new(StopwatchState {
                    running: true,
                    accumulated: Duration::ZERO,
                    anchor,
                }),
                kernel: kernel.downgrade(),
            }),
        }
    }

    /// Resumes measuring. No-op while running.
    pub fn start(&self) {
        {
            let mut state = self.core.state.borrow_mut();
            if state.running {
                return;
            }
            state.running = true;
            state.anchor = self.core.clock.now();
        }
        self.core.changed();
    }

    /// Pauses measuring, keeping the lap time. No-op while stopped.
    pub fn stop(&self) {
        {
            let mut state = self.core.state.borrow_mut();
            if !state.running {
                return;
            }
            let elapsed = self.core.clock.now() - state.anchor;
            state.accumulated += elapsed;
            state.running = false;
        }
        self.core.changed();
    }

    /// Sets the lap time back to zero without changing the running state.
    pub fn reset(&self) {
        {
            let mut state = self.core.state.borrow_mut();
            state.accumulated = Duration::ZERO;
            state.anchor = self.core.clock.now();
        }
        self.core.changed();
    }

    /// Returns the accumulated running time.
    pub fn lap(&self) -> Duration {
        self.core.lap()
    }

    /// Returns `true` while the stopwatch is measuring.
    pub fn is_running(&self) -> bool {
        self.core.is_running()
    }

    /// `lap == duration`
    pub fn equals(&self, duration: Duration) -> Condition {
        self.compare(Relation::Equal, duration)
    }

    /// `lap != duration`
    pub fn not_equals(&self, duration: Duration) -> Condition {
        self.compare(Relation::NotEqual, duration)
    }

    /// `lap < duration`
    pub fn lt(&self, duration: Duration) -> Condition {
        self.compare(Relation::Less, duration)
    }

    /// `lap <= duration`
    pub fn le(&self, duration: Duration) -> Condition {
        self.compare(Relation::LessOrEqual, duration)
    }

    /// `lap > duration`
    pub fn gt(&self, duration: Duration) -> Condition {
        self.compare(Relation::Greater, duration)
    }

    /// `lap >= duration`
    pub fn ge(&self, duration: Duration) -> Condition {
        self.compare(Relation::GreaterOrEqual, duration)
    }

    /// Compares the lap time with `duration`.
    pub fn compare(&self, relation: Relation, duration: Duration) -> Condition {
        let core = self.core.clone();
        let label = format!("stopwatch {} {}", relation.symbol(), format_time(duration));
        Condition::timed_leaf(
            label,
            Threshold {
                stopwatch: self.core.clone(),
                at: duration,
            },
            move || relation.holds(&core.lap(), &duration),
        )
    }
}

impl fmt::Debug for Stopwatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stopwatch")
            .field("lap", &self.lap())
            .field("running", &self.is_running())
            .finish()
    }
}
