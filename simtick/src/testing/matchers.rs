//! Value matchers for [`assert_matches`](crate::RunnerContext::assert_matches)
//! and [`check_matches`](crate::RunnerContext::check_matches).
//!
//! A matcher decides whether a value is acceptable and describes what it
//! expects, so a failure reads as "Value of / Expected / But is".

use std::fmt;
use std::ops::RangeInclusive;

/// Decides whether a value is acceptable.
pub trait Matcher<T: ?Sized> {
    /// Returns `true` when `actual` matches.
    fn matches(&self, actual: &T) -> bool;

    /// Describes what a matching value looks like.
    fn describe(&self) -> String;

    /// Describes what a non-matching value looks like. Used by [`not`].
    fn describe_negated(&self) -> String {
        format!("not {}", self.describe())
    }
}

struct Compare<T> {
    expected: T,
    verb: &'static str,
    accept: fn(&T, &T) -> bool,
}

impl<T: fmt::Debug> Matcher<T> for Compare<T> {
    fn matches(&self, actual: &T) -> bool {
        (self.accept)(actual, &self.expected)
    }

    fn describe(&self) -> String {
        format!("{} {:?}", self.verb, self.expected)
    }
}

/// Matches values equal to `expected`.
pub fn equal_to<T: PartialEq + fmt::Debug>(expected: T) -> impl Matcher<T> {
    Compare {
        expected,
        verb: "equal to",
        accept: |a, b| a == b,
    }
}

/// Matches values different from `expected`.
pub fn not_equal_to<T: PartialEq + fmt::Debug>(expected: T) -> impl Matcher<T> {
    Compare {
        expected,
        verb: "not equal to",
        accept: |a, b| a != b,
    }
}

/// Matches values strictly below `bound`.
pub fn less_than<T: PartialOrd + fmt::Debug>(bound: T) -> impl Matcher<T> {
    Compare {
        expected: bound,
        verb: "less than",
        accept: |a, b| a < b,
    }
}

/// Matches values below or equal to `bound`.
pub fn at_most<T: PartialOrd + fmt::Debug>(bound: T) -> impl Matcher<T> {
    Compare {
        expected: bound,
        verb: "at most",
        accept: |a, b| a <= b,
    }
}

/// Matches values strictly above `bound`.
pub fn greater_than<T: PartialOrd + fmt::Debug>(bound: T) -> impl Matcher<T> {
    Compare {
        expected: bound,
        verb: "greater than",
        accept: |a, b| a > b,
    }
}

/// Matches values above or equal to `bound`.
pub fn at_least<T: PartialOrd + fmt::Debug>(bound: T) -> impl Matcher<T> {
    Compare {
        expected: bound,
        verb: "at least",
        accept: |a, b| a >= b,
    }
}

struct InRange<T> {
    range: RangeInclusive<T>,
}

impl<T: PartialOrd + fmt::Debug> Matcher<T> for InRange<T> {
    fn matches(&self, actual: &T) -> bool {
        self.range.contains(actual)
    }

    fn describe(&self) -> String {
        format!(
            "in range [{:?}, {:?}]",
            self.range.start(),
            self.range.end()
        )
    }
}

/// Matches values inside the inclusive `range`.
pub fn in_range<T: PartialOrd + fmt::Debug>(range: RangeInclusive<T>) -> impl Matcher<T> {
    InRange { range }
}

struct Satisfies<F> {
    description: String,
    predicate: F,
}

impl<T: ?Sized, F: Fn(&T) -> bool> Matcher<T> for Satisfies<F> {
    fn matches(&self, actual: &T) -> bool {
        (self.predicate)(actual)
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

/// Matches values accepted by `predicate`, described as `description`.
pub fn satisfies<T: ?Sized>(
    description: impl Into<String>,
    predicate: impl Fn(&T) -> bool,
) -> impl Matcher<T> {
    Satisfies {
        description: description.into(),
        predicate,
    }
}

struct Not<M>(M);

impl<T: ?Sized, M: Matcher<T>> Matcher<T> for Not<M> {
    fn matches(&self, actual: &T) -> bool {
        !self.0.matches(actual)
    }

    fn describe(&self) -> String {
        self.0.describe_negated()
    }

    fn describe_negated(&self) -> String {
        self.0.describe()
    }
}

/// Inverts `matcher`.
pub fn not<T: ?Sized>(matcher: impl Matcher<T>) -> impl Matcher<T> {
    Not(matcher)
}

/// Renders the explanation logged for a failed match.
pub(crate) fn explain<T: fmt::Debug + ?Sized>(
    subject: &str,
    actual: &T,
    matcher: &dyn Matcher<T>,
) -> String {
    format!(
        "Value of: {}\nExpected: {}\n  But is: {:?}",
        subject,
        matcher.describe(),
        actual
    )
}
