//! Runner trait for code driven by the kernel.
//!
//! A runner is a logical thread of test or system code. Each goes through
//! three phases:
//!
//! 1. **Initialize**: attach ports, register listeners, create invariants
//!    (sequential, in registration order)
//! 2. **Process**: main logic; suspends only at kernel waits
//! 3. **Finalize**: last checks once the timeline has drained (sequential)
//!
//! # Usage
//!
//! Implement the trait directly or use [`runner_fn`] for simple cases:
//!
//! ```ignore
//! use simtick::{async_trait, KernelResult, Runner, RunnerContext, runner_fn};
//!
//! struct Heater;
//!
//! #[async_trait(?Send)]
//! impl Runner for Heater {
//!     fn name(&self) -> &str { "heater" }
//!     async fn process(&mut self, ctx: &RunnerContext) -> KernelResult<()> {
//!         ctx.sleep(Duration::from_millis(100)).await;
//!         Ok(())
//!     }
//! }
//!
//! let probe = runner_fn("probe", |ctx| async move {
//!     ctx.info("probing");
//!     Ok(())
//! });
//! ```

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

use super::context::RunnerContext;
use crate::KernelResult;

/// A logical thread of execution driven by a [`Context`](crate::Context).
///
/// All runners finish `initialize` before any `process` starts, and
/// `finalize` runs for every runner once the run ends, deadlock included.
#[async_trait(?Send)]
pub trait Runner: 'static {
    /// Name used in log lines and reports.
    fn name(&self) -> &str;

    /// Initialization phase. Default implementation is a no-op.
    fn initialize(&mut self, _ctx: &RunnerContext) -> KernelResult<()> {
        Ok(())
    }

    /// Main logic.
    ///
    /// Returning `Err(KernelError::AssertionFailed { .. })` after a failed
    /// assertion simply ends the runner; the failure is already counted.
    /// Any other error counts as an aborted runner.
    async fn process(&mut self, ctx: &RunnerContext) -> KernelResult<()>;

    /// Finalization phase. Default implementation is a no-op.
    fn finalize(&mut self, _ctx: &RunnerContext) -> KernelResult<()> {
        Ok(())
    }
}

#[async_trait(?Send)]
impl Runner for Box<dyn Runner> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn initialize(&mut self, ctx: &RunnerContext) -> KernelResult<()> {
        (**self).initialize(ctx)
    }

    async fn process(&mut self, ctx: &RunnerContext) -> KernelResult<()> {
        (**self).process(ctx).await
    }

    fn finalize(&mut self, ctx: &RunnerContext) -> KernelResult<()> {
        (**self).finalize(ctx)
    }
}

/// Type-erased async closure for a runner's process function.
type BoxedProcessFn =
    Box<dyn FnOnce(RunnerContext) -> Pin<Box<dyn Future<Output = KernelResult<()>>>>>;

/// Closure-based runner adapter.
struct FnRunner {
    name: String,
    process_fn: Option<BoxedProcessFn>,
}

#[async_trait(?Send)]
impl Runner for FnRunner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&mut self, ctx: &RunnerContext) -> KernelResult<()> {
        match self.process_fn.take() {
            Some(f) => f(ctx.clone()).await,
            None => Ok(()),
        }
    }
}

/// Create a runner from an async closure.
///
/// The closure receives its own [`RunnerContext`] and returns a
/// `KernelResult<()>`. Only `process()` is implemented; `initialize()` and
/// `finalize()` are no-ops.
///
/// # Example
///
/// ```ignore
/// let r = runner_fn("sensor", move |ctx| async move {
///     ctx.sleep(Duration::from_millis(10)).await;
///     temperature.push(21);
///     Ok(())
/// });
/// ```
pub fn runner_fn<F, Fut>(name: impl Into<String>, f: F) -> Box<dyn Runner>
where
    F: FnOnce(RunnerContext) -> Fut + 'static,
    Fut: Future<Output = KernelResult<()>> + 'static,
{
    Box::new(FnRunner {
        name: name.into(),
        process_fn: Some(Box::new(move |ctx| Box::pin(f(ctx)))),
    })
}
