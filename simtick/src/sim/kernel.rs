//! Shared kernel state and the handle types used to reach it.
//!
//! The kernel owns every piece of mutable run state: the clock, the event
//! queue, runner bookkeeping, pending waits, timers, invariants and the
//! verdict counters. It is reached through a [`Kernel`] handle
//! (`Rc<RefCell<KernelState>>`); ports, timers and stopwatches keep a
//! [`WeakKernel`] so they never keep a finished run alive.
//!
//! Borrows are never held while user code runs. Change propagation
//! ([`Kernel::notify_changed`]) collects the affected conditions under a
//! borrow, evaluates them without one, and applies the outcomes under a
//! fresh borrow.

use std::cell::{BorrowMutError, RefCell, RefMut};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument, trace};

use crate::error::{usage_error, KernelError, KernelResult};
use crate::journal::{Journal, LogLevel, LogRecord, LogSink, SourceLocation};
use crate::reactive::condition::Condition;
use crate::reactive::invariant::InvariantEntry;
use crate::sim::clock::{format_time, LogicalClock};
use crate::sim::config::ContextConfig;
use crate::sim::events::{Event, EventKey, EventQueue, ScheduledEvent};
use crate::sim::ids::{InvariantId, RunnerId, SourceId, TimerId};
use crate::testing::manager::{TestManager, TestStats};
use crate::time::stopwatch::StopwatchCore;
use crate::time::timer::{self, TimerEntry};

/// Lifecycle state of a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Registered with the context, not yet initialized.
    Registered,
    /// `initialize` completed, `process` not started.
    Initialized,
    /// Executing `process`.
    Active,
    /// Suspended in a wait.
    Suspended,
    /// `process` returned.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitOutcome {
    Satisfied,
    TimedOut,
}

pub(crate) struct PendingWait {
    condition: Condition,
    timeout: Option<EventKey>,
    started: Duration,
}

pub(crate) struct RunnerSlot {
    pub(crate) name: Rc<str>,
    pub(crate) state: RunnerState,
    wait: Option<PendingWait>,
    outcome: Option<WaitOutcome>,
    pub(crate) sections: u32,
}

pub(crate) struct KernelState {
    pub(crate) clock: LogicalClock,
    pub(crate) events: EventQueue,
    next_sequence: u64,
    next_id: u64,
    pub(crate) runners: Vec<RunnerSlot>,
    ready: VecDeque<RunnerId>,
    /// Waits whose timeout event fired, resolved once the instant settles.
    expired: Vec<(RunnerId, EventKey)>,
    current: Option<RunnerId>,
    virtual_stack: Vec<RunnerId>,
    pub(crate) invariants: BTreeMap<InvariantId, InvariantEntry>,
    pub(crate) timers: HashMap<TimerId, TimerEntry>,
    edges: BTreeMap<SourceId, Vec<EventKey>>,
    pub(crate) tests: TestManager,
    sinks: Vec<Box<dyn LogSink>>,
    journal: Option<Journal>,
    pub(crate) rng: ChaCha8Rng,
    pub(crate) config: ContextConfig,
    pub(crate) events_processed: u64,
}

impl KernelState {
    fn new(config: ContextConfig, sinks: Vec<Box<dyn LogSink>>) -> Self {
        Self {
            clock: LogicalClock::new(),
            events: EventQueue::new(),
            next_sequence: 0,
            next_id: 0,
            runners: Vec::new(),
            ready: VecDeque::new(),
            expired: Vec::new(),
            current: None,
            virtual_stack: Vec::new(),
            invariants: BTreeMap::new(),
            timers: HashMap::new(),
            edges: BTreeMap::new(),
            tests: TestManager::default(),
            sinks,
            journal: config.journal.then(Journal::new),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            events_processed: 0,
        }
    }

    pub(crate) fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Schedules an event `delay` after the current time.
    pub(crate) fn schedule_in(&mut self, delay: Duration, event: Event) -> EventKey {
        let time = self.clock.now() + delay;
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.events
            .schedule(ScheduledEvent::new(time, event, sequence))
    }

    /// Runner on whose behalf code is currently executing: the owner of the
    /// port or timer whose callback runs, otherwise the polled runner.
    pub(crate) fn acting_runner(&self) -> Option<RunnerId> {
        self.virtual_stack.last().copied().or(self.current)
    }

    pub(crate) fn runner_name(&self, runner: Option<RunnerId>) -> String {
        runner
            .and_then(|id| self.runners.get(id.0))
            .map(|slot| slot.name.to_string())
            .unwrap_or_else(|| "main".to_string())
    }

    /// Emits a record attributed to `runner`.
    pub(crate) fn emit(
        &mut self,
        level: LogLevel,
        runner: Option<RunnerId>,
        location: Option<SourceLocation>,
        message: String,
    ) {
        let record = LogRecord {
            time: self.clock.now(),
            level,
            runner: self.runner_name(runner),
            location,
            message,
        };
        for sink in &mut self.sinks {
            sink.record(&record);
        }
        if let Some(journal) = &mut self.journal {
            journal.record(&record);
        }
    }

    /// Emits a record attributed to the acting runner.
    pub(crate) fn log(&mut self, level: LogLevel, location: Option<SourceLocation>, message: String) {
        let runner = self.acting_runner();
        self.emit(level, runner, location, message);
    }

    fn slot_mut(&mut self, runner: RunnerId) -> &mut RunnerSlot {
        match self.runners.get_mut(runner.0) {
            Some(slot) => slot,
            None => usage_error(&format!("unknown {runner}")),
        }
    }

    /// Thresholds of `stopwatch` watched by pending waits and active
    /// invariants.
    fn watched_thresholds(&self, stopwatch: SourceId) -> BTreeSet<Duration> {
        let waits = self
            .runners
            .iter()
            .filter_map(|slot| slot.wait.as_ref())
            .map(|wait| &wait.condition);
        let invariants = self
            .invariants
            .values()
            .filter(|entry| entry.active)
            .map(|entry| &entry.condition);

        waits
            .chain(invariants)
            .flat_map(|condition| condition.thresholds())
            .filter(|threshold| threshold.stopwatch.id() == stopwatch)
            .map(|threshold| threshold.at)
            .collect()
    }

    /// Replaces the pending edge events of `stopwatch` with the ones its
    /// current watchers need.
    pub(crate) fn refresh_stopwatch(&mut self, stopwatch: &StopwatchCore) {
        if let Some(keys) = self.edges.remove(&stopwatch.id()) {
            for key in keys {
                self.events.cancel(key);
            }
        }
        if !stopwatch.is_running() {
            return;
        }

        let lap = stopwatch.lap();
        let deltas: BTreeSet<Duration> = self
            .watched_thresholds(stopwatch.id())
            .into_iter()
            .flat_map(|at| [at, at + Duration::from_nanos(1)])
            .filter(|edge| *edge > lap)
            .map(|edge| edge - lap)
            .collect();
        if deltas.is_empty() {
            return;
        }

        let keys = deltas
            .into_iter()
            .map(|delta| {
                self.schedule_in(
                    delta,
                    Event::StopwatchEdge {
                        stopwatch: stopwatch.id(),
                    },
                )
            })
            .collect();
        trace!(stopwatch = ?stopwatch.id(), "stopwatch edges rescheduled");
        self.edges.insert(stopwatch.id(), keys);
    }

    /// Refreshes every stopwatch the condition watches.
    pub(crate) fn refresh_thresholds(&mut self, condition: &Condition) {
        let mut seen = BTreeSet::new();
        for threshold in condition.thresholds() {
            if seen.insert(threshold.stopwatch.id()) {
                self.refresh_stopwatch(&threshold.stopwatch);
            }
        }
    }

    fn resolve_wait(&mut self, runner: RunnerId, outcome: WaitOutcome) {
        let Some(wait) = self.slot_mut(runner).wait.take() else {
            return;
        };
        if let Some(key) = wait.timeout {
            self.events.cancel(key);
        }
        let slot = self.slot_mut(runner);
        slot.outcome = Some(outcome);
        self.ready.push_back(runner);

        let waited = format_time(self.clock.now() - wait.started);
        let message = match outcome {
            WaitOutcome::Satisfied => format!("Condition '{}' met after {}", wait.condition, waited),
            WaitOutcome::TimedOut if wait.condition.is_constant() => {
                format!("Waited {waited}")
            }
            WaitOutcome::TimedOut => {
                format!("Timeout of {} waiting for '{}'", waited, wait.condition)
            }
        };
        self.emit(LogLevel::Wait, Some(runner), None, message);
        self.refresh_thresholds(&wait.condition);
    }

    fn apply_invariant(&mut self, id: InvariantId, holds: bool) {
        let Some(entry) = self.invariants.get_mut(&id) else {
            return;
        };
        if !entry.active {
            return;
        }
        let violated = entry.held && !holds;
        entry.held = holds;
        if violated {
            let (owner, location, condition) = (entry.owner, entry.location, entry.condition.clone());
            self.report_invariant(owner, location, &condition);
        }
    }

    pub(crate) fn report_invariant(
        &mut self,
        owner: Option<RunnerId>,
        location: SourceLocation,
        condition: &Condition,
    ) {
        self.tests.invariant_failed();
        self.emit(
            LogLevel::Invariant,
            owner,
            Some(location),
            format!("Invariant does not hold: '{condition}'"),
        );
    }
}

/// Handle to the kernel of a [`Context`](crate::Context).
#[derive(Clone)]
pub(crate) struct Kernel {
    inner: Rc<RefCell<KernelState>>,
}

/// Weak handle that does not keep the kernel alive.
#[derive(Clone)]
pub(crate) struct WeakKernel {
    inner: Weak<RefCell<KernelState>>,
}

impl WeakKernel {
    pub(crate) fn upgrade(&self) -> KernelResult<Kernel> {
        self.inner
            .upgrade()
            .map(|inner| Kernel { inner })
            .ok_or(KernelError::Shutdown)
    }
}

impl fmt::Debug for WeakKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakKernel")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl Kernel {
    pub(crate) fn new(config: ContextConfig, sinks: Vec<Box<dyn LogSink>>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(KernelState::new(config, sinks))),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakKernel {
        WeakKernel {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Mutable access to the state. Callers must not run user code while
    /// holding the returned guard.
    pub(crate) fn state(&self) -> RefMut<'_, KernelState> {
        self.inner.borrow_mut()
    }

    /// Like [`Kernel::state`], for drop paths that may run while the state
    /// is already borrowed.
    pub(crate) fn try_state(&self) -> Result<RefMut<'_, KernelState>, BorrowMutError> {
        self.inner.try_borrow_mut()
    }

    pub(crate) fn clock(&self) -> LogicalClock {
        self.inner.borrow().clock.clone()
    }

    pub(crate) fn now(&self) -> Duration {
        self.inner.borrow().clock.now()
    }

    pub(crate) fn next_source_id(&self) -> SourceId {
        SourceId(self.state().next_id())
    }

    pub(crate) fn log(&self, level: LogLevel, location: Option<SourceLocation>, message: String) {
        self.state().log(level, location, message);
    }

    pub(crate) fn emit(
        &self,
        level: LogLevel,
        runner: Option<RunnerId>,
        location: Option<SourceLocation>,
        message: String,
    ) {
        self.state().emit(level, runner, location, message);
    }

    pub(crate) fn config(&self) -> ContextConfig {
        self.inner.borrow().config.clone()
    }

    pub(crate) fn stats(&self) -> TestStats {
        self.inner.borrow().tests.snapshot()
    }

    pub(crate) fn events_processed(&self) -> u64 {
        self.inner.borrow().events_processed
    }

    pub(crate) fn take_journal(&self) -> Option<Journal> {
        self.state().journal.take()
    }

    // Runner bookkeeping

    pub(crate) fn register_runner(&self, name: &str) -> RunnerId {
        let mut state = self.state();
        let id = RunnerId(state.runners.len());
        state.runners.push(RunnerSlot {
            name: Rc::from(name),
            state: RunnerState::Registered,
            wait: None,
            outcome: None,
            sections: 0,
        });
        debug!(runner = name, %id, "runner registered");
        id
    }

    pub(crate) fn runner_state(&self, runner: RunnerId) -> RunnerState {
        self.state().slot_mut(runner).state
    }

    pub(crate) fn set_runner_state(&self, runner: RunnerId, runner_state: RunnerState) {
        self.state().slot_mut(runner).state = runner_state;
    }

    pub(crate) fn runner_name(&self, runner: RunnerId) -> String {
        self.inner.borrow().runner_name(Some(runner))
    }

    /// Marks `runner` as the one being executed.
    pub(crate) fn enter(&self, runner: RunnerId) {
        self.state().current = Some(runner);
    }

    pub(crate) fn leave(&self) {
        self.state().current = None;
    }

    /// Attributes nested callback activity to `owner` until the matching
    /// [`Kernel::pop_virtual`].
    pub(crate) fn push_virtual(&self, owner: RunnerId) {
        self.state().virtual_stack.push(owner);
    }

    pub(crate) fn pop_virtual(&self) {
        self.state().virtual_stack.pop();
    }

    pub(crate) fn pop_ready(&self) -> Option<RunnerId> {
        self.state().ready.pop_front()
    }

    pub(crate) fn is_waiting(&self, runner: RunnerId) -> bool {
        let state = self.inner.borrow();
        state
            .runners
            .get(runner.0)
            .map(|slot| slot.wait.is_some() || slot.outcome.is_some())
            .unwrap_or(false)
    }

    pub(crate) fn unfinished_runners(&self) -> Vec<String> {
        self.inner
            .borrow()
            .runners
            .iter()
            .filter(|slot| slot.state != RunnerState::Finished)
            .map(|slot| slot.name.to_string())
            .collect()
    }

    // Waits

    /// Starts a wait of `runner` on `condition`.
    ///
    /// Returns the result right away when the condition already holds or
    /// the timeout is zero; otherwise registers the wait and returns `None`.
    #[track_caller]
    pub(crate) fn begin_wait(
        &self,
        runner: RunnerId,
        condition: Condition,
        timeout: Option<Duration>,
        location: SourceLocation,
    ) -> Option<bool> {
        {
            let mut state = self.state();
            let current = state.current;
            let slot = state.slot_mut(runner);
            if slot.state == RunnerState::Finished {
                usage_error(&format!("runner '{}' waits after it finished", slot.name));
            }
            if current != Some(runner) {
                usage_error(&format!(
                    "wait of runner '{}' polled outside of that runner",
                    slot.name
                ));
            }
            if slot.wait.is_some() {
                usage_error(&format!("runner '{}' is already waiting", slot.name));
            }
        }

        let holds = condition.evaluate();

        let mut state = self.state();
        let message = match (condition.is_constant(), timeout) {
            (true, Some(duration)) => format!("Wait for {}", format_time(duration)),
            (_, Some(duration)) => {
                format!("Wait for '{}' (timeout {})", condition, format_time(duration))
            }
            (_, None) => format!("Wait for '{condition}'"),
        };
        state.emit(LogLevel::Wait, Some(runner), Some(location), message);

        if holds {
            return Some(true);
        }
        if timeout == Some(Duration::ZERO) {
            return Some(false);
        }

        let timeout = timeout.map(|delay| state.schedule_in(delay, Event::WaitTimeout { runner }));
        let started = state.clock.now();
        let slot = state.slot_mut(runner);
        slot.outcome = None;
        slot.state = RunnerState::Suspended;
        slot.wait = Some(PendingWait {
            condition: condition.clone(),
            timeout,
            started,
        });
        state.refresh_thresholds(&condition);
        None
    }

    pub(crate) fn take_wait_outcome(&self, runner: RunnerId) -> Option<WaitOutcome> {
        let mut state = self.state();
        let slot = state.slot_mut(runner);
        let outcome = slot.outcome.take();
        if outcome.is_some() {
            slot.state = RunnerState::Active;
        }
        outcome
    }

    /// Drops a pending wait whose future went away before resolving.
    pub(crate) fn cancel_wait(&self, runner: RunnerId) {
        let mut state = self.state();
        let slot = state.slot_mut(runner);
        slot.outcome = None;
        let Some(wait) = slot.wait.take() else {
            return;
        };
        if let Some(key) = wait.timeout {
            state.events.cancel(key);
        }
        state.refresh_thresholds(&wait.condition);
    }

    // Change propagation

    /// Re-evaluates every pending wait and active invariant that reads
    /// `source`.
    pub(crate) fn notify_changed(&self, source: SourceId) {
        let (invariants, waits) = {
            let state = self.inner.borrow();
            let invariants: Vec<(InvariantId, Condition)> = state
                .invariants
                .iter()
                .filter(|(_, entry)| entry.active && entry.condition.depends_on(source))
                .map(|(id, entry)| (*id, entry.condition.clone()))
                .collect();
            let waits: Vec<(RunnerId, Condition)> = state
                .runners
                .iter()
                .enumerate()
                .filter_map(|(index, slot)| {
                    slot.wait
                        .as_ref()
                        .filter(|wait| wait.condition.depends_on(source))
                        .map(|wait| (RunnerId(index), wait.condition.clone()))
                })
                .collect();
            (invariants, waits)
        };
        if invariants.is_empty() && waits.is_empty() {
            return;
        }

        let invariants: Vec<(InvariantId, bool)> = invariants
            .into_iter()
            .map(|(id, condition)| (id, condition.evaluate()))
            .collect();
        let satisfied: Vec<RunnerId> = waits
            .into_iter()
            .filter(|(_, condition)| condition.evaluate())
            .map(|(runner, _)| runner)
            .collect();

        let mut state = self.state();
        for (id, holds) in invariants {
            state.apply_invariant(id, holds);
        }
        for runner in satisfied {
            state.resolve_wait(runner, WaitOutcome::Satisfied);
        }
    }

    pub(crate) fn stopwatch_changed(&self, stopwatch: &StopwatchCore) {
        self.state().refresh_stopwatch(stopwatch);
        self.notify_changed(stopwatch.id());
    }

    // Event processing

    /// Pops the earliest event and advances the clock to it.
    #[instrument(skip(self), level = "trace")]
    pub(crate) fn step(&self) -> KernelResult<Option<ScheduledEvent>> {
        let mut state = self.state();
        let Some(scheduled) = state.events.pop_earliest() else {
            return Ok(None);
        };
        state.events_processed += 1;
        if state.events_processed > state.config.event_limit {
            return Err(KernelError::EventLimitExceeded {
                limit: state.config.event_limit,
            });
        }
        state.clock.move_to(scheduled.time());
        Ok(Some(scheduled))
    }

    /// Times out waits whose timeout event fired, once nothing else is due
    /// at the current instant. Pure sleeps resolve first; waits on a real
    /// condition only time out if nothing the sleepers did satisfied them.
    ///
    /// Returns `false` when nothing was pending.
    pub(crate) fn expire_timeouts(&self) -> bool {
        let mut state = self.state();
        if state.expired.is_empty() {
            return false;
        }
        let now = state.clock.now();
        if state.events.peek_time() == Some(now) {
            return false;
        }

        let expired = std::mem::take(&mut state.expired);
        let live: Vec<(RunnerId, EventKey, bool)> = expired
            .into_iter()
            .filter_map(|(runner, key)| {
                let wait = state.runners.get(runner.0)?.wait.as_ref()?;
                (wait.timeout == Some(key)).then(|| (runner, key, wait.condition.is_constant()))
            })
            .collect();

        let sleepers_first = live.iter().any(|(_, _, sleep)| *sleep);
        for (runner, key, sleep) in live {
            if sleep || !sleepers_first {
                state.resolve_wait(runner, WaitOutcome::TimedOut);
            } else {
                state.expired.push((runner, key));
            }
        }
        true
    }

    /// Applies the effect of a popped event.
    pub(crate) fn dispatch(&self, scheduled: ScheduledEvent) {
        let key = scheduled.key();
        match scheduled.into_event() {
            Event::WaitTimeout { runner } => {
                self.state().expired.push((runner, key));
            }
            Event::TimerExpired { timer } => timer::fire(self, timer),
            Event::StopwatchEdge { stopwatch } => {
                {
                    let mut state = self.state();
                    if let Some(keys) = state.edges.get_mut(&stopwatch) {
                        keys.retain(|pending| *pending != key);
                    }
                }
                self.notify_changed(stopwatch);
            }
        }
    }

    pub(crate) fn invariant(&self, id: InvariantId) -> Option<(bool, bool)> {
        self.inner
            .borrow()
            .invariants
            .get(&id)
            .map(|entry| (entry.held, entry.active))
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("Kernel")
            .field("now", &state.clock.now())
            .field("pending_events", &state.events.len())
            .field("runners", &state.runners.len())
            .finish()
    }
}
