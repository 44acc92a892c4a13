//! Runners and the loop that drives them.
//!
//! - [`Runner`]: lifecycle trait implemented by test and system code
//! - [`RunnerContext`]: the runner's handle to the kernel
//! - [`Context`] / [`ContextBuilder`]: composition root and `run()`
//! - [`RunReport`]: outcome of a run

pub(crate) mod builder;
pub(crate) mod context;
pub(crate) mod lifecycle;
pub(crate) mod orchestrator;
pub(crate) mod report;
pub(crate) mod wait;

pub use builder::{Context, ContextBuilder};
pub use context::{RunnerContext, Section};
pub use lifecycle::{runner_fn, Runner};
pub use report::{RunReport, RunnerSummary};
