//! # simtick
//!
//! A deterministic virtual-time kernel for testing reactive, timer-driven
//! code.
//!
//! Test code and the system under test run as cooperative [`Runner`]s on a
//! single logical thread. Time is virtual: it jumps straight to the next
//! scheduled event, so a test covering hours of timeouts finishes in
//! milliseconds and every run of the same program produces the same trace.
//!
//! ## Core Components
//!
//! - [`Context`]: owns the kernel, registers runners, drives the run
//! - [`Signal`], [`SamplePort`], [`QueuePort`]: typed value fan-out with
//!   listeners and filters
//! - [`Timer`], [`Stopwatch`]: one-shot callbacks and elapsed-time
//!   measurement on virtual time
//! - [`Condition`], [`Value`], [`Invariant`]: reactive expressions to wait on
//!   or to monitor continuously
//! - [`RunnerContext::assert_that`], [`RunnerContext::check_that`]: verdicts
//!   collected into a [`RunReport`]
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::time::Duration;
//! use simtick::{runner_fn, Context, Reactive};
//!
//! let mut ctx = Context::new();
//! let level = ctx.signal::<u32>("level");
//!
//! let input = level.clone();
//! ctx.add_runner(runner_fn("producer", move |ctx| async move {
//!     ctx.sleep(Duration::from_millis(100)).await;
//!     input.push(3);
//!     Ok(())
//! }));
//! ctx.add_runner(runner_fn("consumer", move |ctx| async move {
//!     let port = ctx.sample_port(&level);
//!     let seen = ctx.wait_timeout(port.equals(3), Duration::from_secs(1)).await;
//!     ctx.assert_that(seen, "level reached 3")?;
//!     ctx.assert_that(ctx.now() == Duration::from_millis(100), "after 100 ms")
//! }));
//!
//! let report = ctx.run().expect("no deadlock");
//! assert_eq!(report.exit_code(), 0);
//! ```
//!
//! ## Execution Model
//!
//! 1. `initialize` runs for every runner, in registration order
//! 2. every `process` starts; each runs until its first wait
//! 3. the kernel pops the earliest event, advances the clock to it and
//!    applies it; runners whose waits resolved resume one at a time
//! 4. when the queue drains, `finalize` runs for every runner; runners still
//!    waiting at that point are reported as a deadlock

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod error;
pub mod journal;
pub mod reactive;
pub mod runner;
pub mod signal;
pub mod sim;
pub mod testing;
pub mod time;

pub use async_trait::async_trait;

pub use error::{KernelError, KernelResult};
pub use journal::{Journal, LogLevel, LogRecord, LogSink, SourceLocation, TracingSink};
pub use reactive::{Condition, Invariant, Operand, Reactive, Relation, Value};
pub use runner::{
    runner_fn, Context, ContextBuilder, RunReport, Runner, RunnerContext, RunnerSummary, Section,
};
pub use signal::{FilterHandle, ListenerHandle, QueuePort, SamplePort, Signal};
pub use sim::{ContextConfig, LogicalClock, RunnerId, RunnerState};
pub use testing::{matchers, Matcher, TestStats};
pub use time::{Stopwatch, Timer};
