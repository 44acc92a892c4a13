//! Assertions and checks issued from runner code.
//!
//! Both record a verdict and log it with the caller location. A failed
//! assertion additionally returns an error so the runner can leave the
//! current block with `?`; a failed check only warns.

use std::fmt;
use std::panic::Location;

use crate::error::{KernelError, KernelResult};
use crate::journal::LogLevel;
use crate::runner::context::RunnerContext;

use super::matchers::{explain, Matcher};

impl RunnerContext {
    /// Records an assertion.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::AssertionFailed`] when `condition` is false.
    #[track_caller]
    pub fn assert_that(&self, condition: bool, message: impl fmt::Display) -> KernelResult<()> {
        let location = Location::caller();
        self.record_assertion(condition, location, message.to_string())
    }

    /// Records an assertion on `actual` using `matcher`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::AssertionFailed`] when the value does not match.
    #[track_caller]
    pub fn assert_matches<T: fmt::Debug + ?Sized>(
        &self,
        subject: &str,
        actual: &T,
        matcher: impl Matcher<T>,
    ) -> KernelResult<()> {
        let location = Location::caller();
        let passed = matcher.matches(actual);
        let message = if passed {
            format!("{} is {}", subject, matcher.describe())
        } else {
            explain(subject, actual, &matcher)
        };
        self.record_assertion(passed, location, message)
    }

    /// Records a check. Returns whether it held.
    #[track_caller]
    pub fn check_that(&self, condition: bool, message: impl fmt::Display) -> bool {
        let location = Location::caller();
        self.record_check(condition, location, message.to_string())
    }

    /// Records a check on `actual` using `matcher`. Returns whether it held.
    #[track_caller]
    pub fn check_matches<T: fmt::Debug + ?Sized>(
        &self,
        subject: &str,
        actual: &T,
        matcher: impl Matcher<T>,
    ) -> bool {
        let location = Location::caller();
        let passed = matcher.matches(actual);
        let message = if passed {
            format!("{} is {}", subject, matcher.describe())
        } else {
            explain(subject, actual, &matcher)
        };
        self.record_check(passed, location, message)
    }

    fn record_assertion(
        &self,
        passed: bool,
        location: &'static Location<'static>,
        message: String,
    ) -> KernelResult<()> {
        self.kernel().state().tests.assertion(passed);
        if passed {
            self.log(LogLevel::Pass, location, message);
            return Ok(());
        }
        self.log(LogLevel::Fail, location, message.clone());
        Err(KernelError::AssertionFailed {
            runner: self.name().to_string(),
            location: location.to_string(),
            message,
        })
    }

    fn record_check(&self, passed: bool, location: &'static Location<'static>, message: String) -> bool {
        self.kernel().state().tests.check(passed);
        let level = if passed { LogLevel::Pass } else { LogLevel::Warn };
        self.log(level, location, message);
        passed
    }
}
