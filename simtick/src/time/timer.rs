//! One-shot virtual timers.
//!
//! A timer invokes its callback once when its duration elapses in virtual
//! time. The callback runs on behalf of the runner that created the timer
//! and receives the timer itself, so it can restart it to build periodic
//! or recursive timers. Timers live in the kernel: dropping every handle of
//! a running timer does not cancel it.

use std::fmt;
use std::time::Duration;

use tracing::debug;

use crate::error::usage_error;
use crate::journal::{LogLevel, SourceLocation};
use crate::sim::clock::format_time;
use crate::sim::events::{Event, EventKey};
use crate::sim::ids::{RunnerId, TimerId};
use crate::sim::kernel::{Kernel, WeakKernel};

pub(crate) type TimerCallback = Box<dyn FnMut(&Timer)>;

pub(crate) struct TimerEntry {
    owner: Option<RunnerId>,
    location: SourceLocation,
    /// Duration of the latest start; what `reset` restarts with.
    duration: Option<Duration>,
    /// Time left when stopped; the full duration after expiry.
    remaining: Option<Duration>,
    pending: Option<EventKey>,
    callback: Option<TimerCallback>,
    handles: usize,
}

/// Handle to a timer.
///
/// Cloning yields another handle to the same timer.
pub struct Timer {
    kernel: WeakKernel,
    id: TimerId,
}

impl Timer {
    pub(crate) fn create(
        kernel: &Kernel,
        owner: Option<RunnerId>,
        location: SourceLocation,
        callback: TimerCallback,
    ) -> Self {
        let mut state = kernel.state();
        let id = TimerId(state.next_id());
        state.timers.insert(
            id,
            TimerEntry {
                owner,
                location,
                duration: None,
                remaining: None,
                pending: None,
                callback: Some(callback),
                handles: 1,
            },
        );
        Self {
            kernel: kernel.downgrade(),
            id,
        }
    }

    fn attach(kernel: &Kernel, id: TimerId) -> Option<Self> {
        let mut state = kernel.state();
        let entry = state.timers.get_mut(&id)?;
        entry.handles += 1;
        Some(Self {
            kernel: kernel.downgrade(),
            id,
        })
    }

    /// Runs `f` on the timer's entry, if the kernel and the entry are still
    /// around.
    fn with_entry<R>(&self, f: impl FnOnce(&Kernel, &mut TimerEntry) -> R) -> Option<R> {
        let kernel = self.kernel.upgrade().ok()?;
        let mut entry = kernel.state().timers.remove(&self.id)?;
        let result = f(&kernel, &mut entry);
        kernel.state().timers.insert(self.id, entry);
        Some(result)
    }

    /// Starts the timer so it fires after `duration`, replacing any pending
    /// expiry.
    pub fn start(&self, duration: Duration) {
        self.with_entry(|kernel, entry| {
            let mut state = kernel.state();
            if let Some(key) = entry.pending.take() {
                state.events.cancel(key);
            }
            entry.duration = Some(duration);
            entry.remaining = Some(duration);
            entry.pending = Some(state.schedule_in(duration, Event::TimerExpired { timer: self.id }));
            debug!(timer = ?self.id, duration = ?duration, "timer started");
        });
    }

    /// Restarts a stopped timer with the time it had left. After an expiry
    /// this is the full duration again. No-op while running.
    ///
    /// # Panics
    ///
    /// Panics if the timer was never started.
    #[track_caller]
    pub fn resume(&self) {
        self.with_entry(|kernel, entry| {
            if entry.pending.is_some() {
                return;
            }
            let Some(remaining) = entry.remaining else {
                usage_error("resume on a timer that was never started");
            };
            let mut state = kernel.state();
            entry.pending =
                Some(state.schedule_in(remaining, Event::TimerExpired { timer: self.id }));
            debug!(timer = ?self.id, remaining = ?remaining, "timer resumed");
        });
    }

    /// Stops the timer, keeping the time it had left. Idempotent.
    pub fn stop(&self) {
        self.with_entry(|kernel, entry| {
            let Some(key) = entry.pending.take() else {
                return;
            };
            let mut state = kernel.state();
            state.events.cancel(key);
            entry.remaining = Some(key.time().saturating_sub(state.clock.now()));
            debug!(timer = ?self.id, remaining = ?entry.remaining, "timer stopped");
        });
    }

    /// Restarts the timer from its full duration.
    ///
    /// # Panics
    ///
    /// Panics if the timer was never started.
    #[track_caller]
    pub fn reset(&self) {
        let duration = self.with_entry(|_, entry| entry.duration).flatten();
        match duration {
            Some(duration) => self.start(duration),
            None => usage_error("reset on a timer that was never started"),
        }
    }

    /// Returns `true` while an expiry is pending.
    pub fn is_running(&self) -> bool {
        self.with_entry(|_, entry| entry.pending.is_some())
            .unwrap_or(false)
    }

    /// Duration of the latest start.
    pub fn duration(&self) -> Option<Duration> {
        self.with_entry(|_, entry| entry.duration).flatten()
    }

    /// Time left until expiry while running, or the time a resume would
    /// wait while stopped.
    pub fn remaining(&self) -> Option<Duration> {
        self.with_entry(|kernel, entry| match entry.pending {
            Some(key) => Some(key.time().saturating_sub(kernel.now())),
            None => entry.remaining,
        })
        .flatten()
    }
}

impl Clone for Timer {
    fn clone(&self) -> Self {
        if let Ok(kernel) = self.kernel.upgrade() {
            if let Some(entry) = kernel.state().timers.get_mut(&self.id) {
                entry.handles += 1;
            }
        }
        Self {
            kernel: self.kernel.clone(),
            id: self.id,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let Ok(kernel) = self.kernel.upgrade() else {
            return;
        };
        let Ok(mut state) = kernel.try_state() else {
            return;
        };
        let released = match state.timers.get_mut(&self.id) {
            Some(entry) => {
                entry.handles = entry.handles.saturating_sub(1);
                entry.handles == 0 && entry.pending.is_none() && entry.callback.is_some()
            }
            None => false,
        };
        // The callback may own timer handles, so it is dropped after the
        // borrow is released.
        let removed = released.then(|| state.timers.remove(&self.id));
        drop(state);
        drop(removed);
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer").field("id", &self.id).finish()
    }
}

/// Expires `id`: invokes its callback once on behalf of its owner.
pub(crate) fn fire(kernel: &Kernel, id: TimerId) {
    let (owner, callback) = {
        let mut state = kernel.state();
        let Some(entry) = state.timers.get_mut(&id) else {
            return;
        };
        entry.pending = None;
        entry.remaining = entry.duration;
        let owner = entry.owner;
        let location = entry.location;
        let callback = entry.callback.take();
        let elapsed = entry.duration.map(format_time).unwrap_or_default();
        state.emit(
            LogLevel::Timer,
            owner,
            Some(location),
            format!("Timer expired after {elapsed}"),
        );
        (owner, callback)
    };

    let Some(mut callback) = callback else {
        return;
    };
    let Some(handle) = Timer::attach(kernel, id) else {
        return;
    };
    if let Some(owner) = owner {
        kernel.push_virtual(owner);
    }
    callback(&handle);
    if owner.is_some() {
        kernel.pop_virtual();
    }

    let leftover = {
        let mut state = kernel.state();
        match state.timers.get_mut(&id) {
            Some(entry) if entry.callback.is_none() => {
                entry.callback = Some(callback);
                None
            }
            _ => Some(callback),
        }
    };
    drop(leftover);
    drop(handle);
}
