//! Per-runner access to the kernel.

use std::fmt;
use std::future::Future;
use std::ops::RangeInclusive;
use std::panic::Location;
use std::rc::Rc;
use std::time::Duration;

use futures::FutureExt;
use rand::distr::uniform::SampleUniform;
use rand::Rng;

use super::wait::WaitFuture;
use crate::error::usage_error;
use crate::journal::{LogLevel, SourceLocation};
use crate::reactive::condition::Condition;
use crate::reactive::invariant::Invariant;
use crate::reactive::value::Value;
use crate::signal::channel::Signal;
use crate::signal::queue::QueuePort;
use crate::signal::sample::SamplePort;
use crate::sim::clock::{format_time, LogicalClock};
use crate::sim::ids::RunnerId;
use crate::sim::kernel::{Kernel, WeakKernel};
use crate::testing::manager::TestStats;
use crate::time::stopwatch::Stopwatch;
use crate::time::timer::Timer;

/// Handle through which a runner talks to the kernel.
///
/// Everything created through it (ports, timers, invariants) belongs to the
/// runner: listeners and timer callbacks run on its behalf and log under its
/// name. Cloning is cheap.
#[derive(Clone)]
pub struct RunnerContext {
    kernel: WeakKernel,
    id: RunnerId,
    name: Rc<str>,
}

impl RunnerContext {
    pub(crate) fn new(kernel: &Kernel, id: RunnerId, name: &str) -> Self {
        Self {
            kernel: kernel.downgrade(),
            id,
            name: Rc::from(name),
        }
    }

    #[track_caller]
    pub(crate) fn kernel(&self) -> Kernel {
        match self.kernel.upgrade() {
            Ok(kernel) => kernel,
            Err(_) => usage_error(&format!(
                "context of runner '{}' used after its run ended",
                self.name
            )),
        }
    }

    /// Name of the runner.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identifier of the runner.
    pub fn id(&self) -> RunnerId {
        self.id
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.kernel().now()
    }

    /// Handle to the virtual clock.
    pub fn clock(&self) -> LogicalClock {
        self.kernel().clock()
    }

    /// Snapshot of the verdict counters so far.
    pub fn stats(&self) -> TestStats {
        self.kernel().stats()
    }

    // Waiting

    /// Suspends until `condition` holds.
    ///
    /// Returns immediately when it already holds. A condition that can never
    /// become true blocks forever, which the run reports as a deadlock.
    ///
    /// # Panics
    ///
    /// Panics when awaited outside of this runner's `process`.
    #[track_caller]
    pub fn wait(&self, condition: impl Into<Condition>) -> impl Future<Output = ()> {
        self.wait_future(condition.into(), None).map(|_| ())
    }

    /// Suspends until `condition` holds or `timeout` elapses.
    ///
    /// Resolves to `true` when the condition held first. A condition that
    /// becomes true at the very instant the timeout elapses still wins.
    #[track_caller]
    pub fn wait_timeout(
        &self,
        condition: impl Into<Condition>,
        timeout: Duration,
    ) -> impl Future<Output = bool> {
        self.wait_future(condition.into(), Some(timeout))
    }

    /// Suspends for `duration` of virtual time.
    #[track_caller]
    pub fn sleep(&self, duration: Duration) -> impl Future<Output = ()> {
        self.wait_future(Condition::never(), Some(duration))
            .map(|_| ())
    }

    #[track_caller]
    fn wait_future(&self, condition: Condition, timeout: Option<Duration>) -> WaitFuture {
        WaitFuture::new(
            self.kernel.clone(),
            self.id,
            condition,
            timeout,
            Location::caller().into(),
        )
    }

    // Reactive sources

    /// Creates a signal. Signals are shared by every runner that holds a
    /// clone.
    pub fn signal<T: Clone + fmt::Debug + 'static>(&self, name: &str) -> Signal<T> {
        Signal::new(&self.kernel(), name)
    }

    /// Attaches a port keeping the latest value of `signal`.
    pub fn sample_port<T: Clone + fmt::Debug + 'static>(&self, signal: &Signal<T>) -> SamplePort<T> {
        SamplePort::attach(&self.kernel(), Some(self.id), signal)
    }

    /// Attaches a port queueing every value of `signal`.
    pub fn queue_port<T: Clone + fmt::Debug + 'static>(&self, signal: &Signal<T>) -> QueuePort<T> {
        QueuePort::attach(&self.kernel(), Some(self.id), signal)
    }

    /// Creates an observable variable.
    pub fn value<T: Clone + 'static>(&self, name: &str, initial: T) -> Value<T> {
        Value::new(&self.kernel(), name, initial)
    }

    /// Creates a running stopwatch.
    pub fn stopwatch(&self) -> Stopwatch {
        Stopwatch::new(&self.kernel())
    }

    // Timers

    /// Creates a stopped timer.
    #[track_caller]
    pub fn timer(&self, callback: impl FnMut(&Timer) + 'static) -> Timer {
        Timer::create(
            &self.kernel(),
            Some(self.id),
            Location::caller().into(),
            Box::new(callback),
        )
    }

    /// Creates a timer and starts it with `duration`.
    #[track_caller]
    pub fn start_timer(&self, duration: Duration, callback: impl FnMut(&Timer) + 'static) -> Timer {
        let timer = self.timer(callback);
        timer.start(duration);
        timer
    }

    // Invariants

    /// Starts monitoring `condition` until the returned handle is dropped.
    #[track_caller]
    pub fn create_invariant(&self, condition: impl Into<Condition>) -> Invariant {
        Invariant::create(
            &self.kernel(),
            Some(self.id),
            None,
            condition.into(),
            Location::caller().into(),
        )
    }

    /// Like [`create_invariant`](Self::create_invariant), also marking the
    /// declared site `site` as executed.
    #[track_caller]
    pub fn create_named_invariant(&self, site: &str, condition: impl Into<Condition>) -> Invariant {
        Invariant::create(
            &self.kernel(),
            Some(self.id),
            Some(site),
            condition.into(),
            Location::caller().into(),
        )
    }

    // Logging

    /// Logs an informational line.
    #[track_caller]
    pub fn info(&self, message: impl fmt::Display) {
        self.log(LogLevel::Info, Location::caller(), message.to_string());
    }

    /// Logs a warning.
    #[track_caller]
    pub fn warn(&self, message: impl fmt::Display) {
        self.log(LogLevel::Warn, Location::caller(), message.to_string());
    }

    pub(crate) fn log(&self, level: LogLevel, location: &'static Location<'static>, message: String) {
        self.kernel()
            .emit(level, Some(self.id), Some(location.into()), message);
    }

    /// Opens a numbered section; it is closed when the guard is dropped.
    #[track_caller]
    pub fn section(&self, name: &str) -> Section {
        let location: SourceLocation = Location::caller().into();
        let kernel = self.kernel();
        let number = {
            let mut state = kernel.state();
            let slot = &mut state.runners[self.id.index()];
            slot.sections += 1;
            slot.sections
        };
        kernel.emit(
            LogLevel::Section,
            Some(self.id),
            Some(location),
            format!("Section ({number}) {name}"),
        );
        Section {
            context: self.clone(),
            name: name.to_string(),
            number,
            location,
        }
    }

    // Randomness

    /// Draws uniformly from `range` using the run's seeded generator.
    pub fn random_range<T: SampleUniform + PartialOrd>(&self, range: RangeInclusive<T>) -> T {
        self.kernel().state().rng.random_range(range)
    }

    /// Draws a duration uniformly from `[from, to]`.
    pub fn random_duration(&self, from: Duration, to: Duration) -> Duration {
        if to <= from {
            return from;
        }
        let nanos = self.random_range(from.as_nanos()..=to.as_nanos());
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Draws an integer uniformly from `[0, to)`. Returns 0 when `to` is 0.
    pub fn random_below(&self, to: u64) -> u64 {
        if to == 0 {
            return 0;
        }
        self.random_range(0..=to - 1)
    }

    /// Returns `true` with the given probability.
    pub fn coin_flip(&self, probability: f64) -> bool {
        self.kernel()
            .state()
            .rng
            .random_bool(probability.clamp(0.0, 1.0))
    }
}

impl fmt::Debug for RunnerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerContext")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// Guard of a section opened with [`RunnerContext::section`].
#[must_use = "the section ends when the guard is dropped"]
pub struct Section {
    context: RunnerContext,
    name: String,
    number: u32,
    location: SourceLocation,
}

impl Section {
    /// Sequence number of the section within its runner.
    pub fn number(&self) -> u32 {
        self.number
    }
}

impl Drop for Section {
    fn drop(&mut self) {
        let Ok(kernel) = self.context.kernel.upgrade() else {
            return;
        };
        let Ok(mut state) = kernel.try_state() else {
            return;
        };
        let elapsed = format_time(state.clock.now());
        state.emit(
            LogLevel::Section,
            Some(self.context.id),
            Some(self.location),
            format!("End of section ({}) {} at {}", self.number, self.name, elapsed),
        );
    }
}

impl fmt::Debug for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Section")
            .field("name", &self.name)
            .field("number", &self.number)
            .finish()
    }
}
