//! Composition root: configure a context, register runners, run.
//!
//! ```ignore
//! let mut ctx = Context::builder().seed(42).build();
//! let temperature = ctx.signal::<i32>("temperature");
//! ctx.add_runner(Thermostat::new(temperature.clone()));
//! ctx.add_runner(runner_fn("sensor", move |ctx| async move {
//!     ctx.sleep(Duration::from_millis(100)).await;
//!     temperature.push(25);
//!     Ok(())
//! }));
//! let report = ctx.run()?;
//! assert_eq!(report.exit_code(), 0);
//! ```

use std::cell::RefCell;
use std::fmt;
use std::panic::Location;
use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing::info;

use super::context::RunnerContext;
use super::lifecycle::Runner;
use super::orchestrator::{Orchestrator, RunnerEntry};
use super::report::{RunReport, RunnerSummary};
use crate::error::KernelResult;
use crate::journal::{LogSink, TracingSink};
use crate::reactive::condition::Condition;
use crate::reactive::invariant::Invariant;
use crate::reactive::value::Value;
use crate::signal::channel::Signal;
use crate::sim::clock::LogicalClock;
use crate::sim::config::ContextConfig;
use crate::sim::ids::RunnerId;
use crate::sim::kernel::Kernel;
use crate::testing::manager::TestStats;
use crate::time::stopwatch::Stopwatch;

/// Builder for a [`Context`].
pub struct ContextBuilder {
    config: ContextConfig,
    sinks: Vec<Box<dyn LogSink>>,
    tracing: bool,
    declared_invariants: Vec<String>,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: ContextConfig::default(),
            sinks: Vec::new(),
            tracing: true,
            declared_invariants: Vec::new(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ContextConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the seed of the run's random number generator.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Keep (or not) every log record in the report's journal.
    pub fn journal(mut self, enabled: bool) -> Self {
        self.config.journal = enabled;
        self
    }

    /// Abort the run after `limit` processed events.
    pub fn event_limit(mut self, limit: u64) -> Self {
        self.config.event_limit = limit;
        self
    }

    /// Forward log records to `tracing` (on by default).
    pub fn tracing(mut self, enabled: bool) -> Self {
        self.tracing = enabled;
        self
    }

    /// Add a sink receiving every log record.
    pub fn log_sink(mut self, sink: impl LogSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Declare an invariant site. Sites never reached by
    /// [`RunnerContext::create_named_invariant`] are reported as not
    /// executed.
    pub fn declare_invariant(mut self, site: impl Into<String>) -> Self {
        self.declared_invariants.push(site.into());
        self
    }

    /// Build the context.
    pub fn build(self) -> Context {
        let mut sinks: Vec<Box<dyn LogSink>> = Vec::new();
        if self.tracing {
            sinks.push(Box::new(TracingSink));
        }
        sinks.extend(self.sinks);

        let kernel = Kernel::new(self.config, sinks);
        {
            let mut state = kernel.state();
            for site in self.declared_invariants {
                state.tests.declare_invariant(site);
            }
        }
        Context {
            kernel,
            entries: Vec::new(),
        }
    }
}

/// Owns a kernel and the runners it drives.
///
/// Signals, values and stopwatches created here are shared with runners by
/// cloning them into the runners before [`run`](Self::run).
pub struct Context {
    kernel: Kernel,
    entries: Vec<RunnerEntry>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Creates a context with the default configuration.
    pub fn new() -> Self {
        ContextBuilder::new().build()
    }

    /// Creates a context with `config`.
    pub fn with_config(config: ContextConfig) -> Self {
        ContextBuilder::new().config(config).build()
    }

    /// Returns a builder.
    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    /// Registers a runner. Runners are initialized and started in
    /// registration order.
    pub fn add_runner(&mut self, runner: impl Runner) -> RunnerId {
        let name = runner.name().to_string();
        let id = self.kernel.register_runner(&name);
        let boxed: Box<dyn Runner> = Box::new(runner);
        self.entries.push(RunnerEntry {
            id,
            context: RunnerContext::new(&self.kernel, id, &name),
            runner: Rc::new(RefCell::new(boxed)),
        });
        id
    }

    /// Creates a signal.
    pub fn signal<T: Clone + fmt::Debug + 'static>(&self, name: &str) -> Signal<T> {
        Signal::new(&self.kernel, name)
    }

    /// Creates an observable variable.
    pub fn value<T: Clone + 'static>(&self, name: &str, initial: T) -> Value<T> {
        Value::new(&self.kernel, name, initial)
    }

    /// Creates a running stopwatch.
    pub fn stopwatch(&self) -> Stopwatch {
        Stopwatch::new(&self.kernel)
    }

    /// Starts monitoring `condition` on behalf of no runner.
    #[track_caller]
    pub fn create_invariant(&self, condition: impl Into<Condition>) -> Invariant {
        Invariant::create(
            &self.kernel,
            None,
            None,
            condition.into(),
            Location::caller().into(),
        )
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.kernel.now()
    }

    /// Handle to the virtual clock.
    pub fn clock(&self) -> LogicalClock {
        self.kernel.clock()
    }

    /// Verdict counters so far.
    pub fn stats(&self) -> TestStats {
        self.kernel.stats()
    }

    /// Runs every runner to completion and reports the verdict.
    ///
    /// # Errors
    ///
    /// - [`KernelError::Deadlock`](crate::KernelError::Deadlock) when the
    ///   timeline drains while runners are still waiting.
    /// - [`KernelError::EventLimitExceeded`](crate::KernelError::EventLimitExceeded)
    ///   when the configured event limit is hit.
    ///
    /// `finalize` has run for every runner in both cases.
    pub fn run(self) -> KernelResult<RunReport> {
        let started = Instant::now();
        let config = self.kernel.config();
        info!(seed = config.seed, runners = self.entries.len(), "run starting");

        Orchestrator::new(&self.kernel, &self.entries).run()?;

        let runners = self
            .entries
            .iter()
            .map(|entry| RunnerSummary {
                name: entry.context.name().to_string(),
                state: self.kernel.runner_state(entry.id),
            })
            .collect();
        let missing_invariants = self.kernel.state().tests.missing_invariants();
        let report = RunReport {
            seed: config.seed,
            virtual_time: self.kernel.now(),
            wall_time: started.elapsed(),
            events_processed: self.kernel.events_processed(),
            runners,
            stats: self.kernel.stats(),
            missing_invariants,
            journal: self.kernel.take_journal(),
        };
        info!(
            virtual_time = ?report.virtual_time,
            events = report.events_processed,
            exit_code = report.exit_code(),
            "run finished"
        );
        Ok(report)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("kernel", &self.kernel)
            .field("runners", &self.entries.len())
            .finish()
    }
}
