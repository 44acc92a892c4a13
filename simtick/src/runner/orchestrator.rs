//! The scheduler loop driving runners over the virtual timeline.
//!
//! Runners are cooperative: each `process` future is polled by hand with a
//! no-op waker and only yields inside kernel waits. The loop alternates
//! between resuming runners made ready by the latest change and popping the
//! earliest event off the queue, so exactly one piece of code executes at a
//! time and the interleaving depends only on the program and its seed.
//!
//! Wait timeouts settle last within an instant: they are applied once no
//! other event is due at the current time, sleeps before condition waits,
//! so a condition that becomes true at the deadline wins the race.

use std::cell::RefCell;
use std::rc::Rc;
use std::task::{Context as TaskContext, Poll};

use futures::future::LocalBoxFuture;
use futures::task::noop_waker;
use tracing::{debug, instrument, warn};

use super::context::RunnerContext;
use super::lifecycle::Runner;
use crate::error::{usage_error, KernelError, KernelResult};
use crate::journal::LogLevel;
use crate::sim::ids::RunnerId;
use crate::sim::kernel::{Kernel, RunnerState};

type ProcessFuture = LocalBoxFuture<'static, KernelResult<()>>;

/// A registered runner and the context handed to it.
pub(crate) struct RunnerEntry {
    pub(crate) id: RunnerId,
    pub(crate) context: RunnerContext,
    pub(crate) runner: Rc<RefCell<Box<dyn Runner>>>,
}

/// Builds the future running `process`. The runner stays mutably borrowed
/// for as long as the future lives.
#[allow(clippy::await_holding_refcell_ref)]
fn process_future(entry: &RunnerEntry) -> ProcessFuture {
    let runner = entry.runner.clone();
    let context = entry.context.clone();
    Box::pin(async move {
        let mut runner = runner.borrow_mut();
        runner.process(&context).await
    })
}

pub(crate) struct Orchestrator<'a> {
    kernel: &'a Kernel,
    entries: &'a [RunnerEntry],
    tasks: Vec<Option<ProcessFuture>>,
}

impl<'a> Orchestrator<'a> {
    pub(crate) fn new(kernel: &'a Kernel, entries: &'a [RunnerEntry]) -> Self {
        Self {
            kernel,
            entries,
            tasks: Vec::new(),
        }
    }

    /// Runs every phase. Finalization happens even when the timeline ends
    /// in a deadlock or the event limit is hit.
    #[instrument(skip(self), fields(runners = self.entries.len()))]
    pub(crate) fn run(mut self) -> KernelResult<()> {
        self.initialize_all();

        let outcome = self.process_all();

        // Pending waits unregister when their futures go away, and the
        // runners are released for finalization.
        let stuck = self.kernel.unfinished_runners();
        self.tasks.clear();

        self.finalize_all();

        outcome?;
        if stuck.is_empty() {
            Ok(())
        } else {
            let time = self.kernel.now();
            warn!(?time, runners = ?stuck, "deadlock: timeline drained with suspended runners");
            Err(KernelError::Deadlock {
                time,
                runners: stuck,
            })
        }
    }

    fn initialize_all(&mut self) {
        for entry in self.entries {
            self.kernel.enter(entry.id);
            let result = entry.runner.borrow_mut().initialize(&entry.context);
            self.kernel.leave();
            self.kernel.set_runner_state(entry.id, RunnerState::Initialized);
            if let Err(err) = result {
                self.record_error(entry, "initialize", err);
            }
        }
    }

    fn process_all(&mut self) -> KernelResult<()> {
        self.tasks = self.entries.iter().map(|e| Some(process_future(e))).collect();
        for index in 0..self.entries.len() {
            self.poll_runner(RunnerId(index));
        }

        loop {
            while let Some(runner) = self.kernel.pop_ready() {
                self.poll_runner(runner);
            }
            if self.kernel.expire_timeouts() {
                continue;
            }
            match self.kernel.step()? {
                Some(event) => {
                    debug!(time = ?event.time(), event = ?event.event(), "processing event");
                    self.kernel.dispatch(event);
                }
                None => return Ok(()),
            }
        }
    }

    fn poll_runner(&mut self, runner: RunnerId) {
        let Some(task) = self.tasks.get_mut(runner.0).and_then(Option::as_mut) else {
            return;
        };

        self.kernel.enter(runner);
        self.kernel.set_runner_state(runner, RunnerState::Active);
        let waker = noop_waker();
        let mut cx = TaskContext::from_waker(&waker);
        let poll = task.as_mut().poll(&mut cx);
        self.kernel.leave();

        match poll {
            Poll::Ready(result) => {
                self.tasks[runner.0] = None;
                self.kernel.set_runner_state(runner, RunnerState::Finished);
                let entry = &self.entries[runner.0];
                match result {
                    Ok(()) => self.kernel.emit(
                        LogLevel::Info,
                        Some(runner),
                        None,
                        "Runner finished".to_string(),
                    ),
                    Err(KernelError::AssertionFailed { .. }) => self.kernel.emit(
                        LogLevel::Info,
                        Some(runner),
                        None,
                        "Runner stopped by a failed assertion".to_string(),
                    ),
                    Err(err) => self.record_error(entry, "process", err),
                }
            }
            Poll::Pending => {
                if !self.kernel.is_waiting(runner) {
                    usage_error(&format!(
                        "runner '{}' suspended outside of a kernel wait",
                        self.kernel.runner_name(runner)
                    ));
                }
            }
        }
    }

    fn finalize_all(&mut self) {
        for entry in self.entries {
            self.kernel.enter(entry.id);
            let result = entry.runner.borrow_mut().finalize(&entry.context);
            self.kernel.leave();
            if let Err(err) = result {
                self.record_error(entry, "finalize", err);
            }
        }
    }

    fn record_error(&self, entry: &RunnerEntry, phase: &str, err: KernelError) {
        if matches!(err, KernelError::AssertionFailed { .. }) {
            return;
        }
        self.kernel.state().tests.runner_aborted();
        self.kernel.emit(
            LogLevel::Fail,
            Some(entry.id),
            None,
            format!("{phase} failed: {err}"),
        );
    }
}
