//! Composable boolean expressions over reactive leaves.
//!
//! A [`Condition`] is an immutable tree whose leaves read ports, values or
//! stopwatches. The kernel never polls a condition: it re-evaluates it when
//! one of the leaves it depends on reports a change, and stopwatch leaves
//! contribute the time thresholds at which they may flip.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::rc::Rc;
use std::time::Duration;

use crate::sim::ids::SourceId;
use crate::time::stopwatch::StopwatchCore;

/// A point in a stopwatch's lap time at which a leaf may change value.
#[derive(Clone)]
pub(crate) struct Threshold {
    pub(crate) stopwatch: Rc<StopwatchCore>,
    pub(crate) at: Duration,
}

pub(crate) struct Leaf {
    label: String,
    sources: Vec<SourceId>,
    thresholds: Vec<Threshold>,
    eval: Box<dyn Fn() -> bool>,
}

enum Node {
    Literal(bool),
    Leaf(Leaf),
    Not(Condition),
    And(Condition, Condition),
    Or(Condition, Condition),
}

/// A boolean expression that the kernel can wait on or guard with an
/// invariant.
///
/// Conditions are built from comparisons on ports, values and stopwatches
/// (see [`Reactive`](crate::Reactive)) and combined with `&`, `|` and `!`.
/// Cloning is cheap and shares the tree.
#[derive(Clone)]
pub struct Condition {
    node: Rc<Node>,
}

impl Condition {
    /// A condition that is always true.
    pub fn always() -> Self {
        Self::literal(true)
    }

    /// A condition that is never true. Waiting on it is a plain sleep.
    pub fn never() -> Self {
        Self::literal(false)
    }

    fn literal(value: bool) -> Self {
        Self {
            node: Rc::new(Node::Literal(value)),
        }
    }

    pub(crate) fn leaf(
        label: impl Into<String>,
        sources: Vec<SourceId>,
        eval: impl Fn() -> bool + 'static,
    ) -> Self {
        Self {
            node: Rc::new(Node::Leaf(Leaf {
                label: label.into(),
                sources,
                thresholds: Vec::new(),
                eval: Box::new(eval),
            })),
        }
    }

    pub(crate) fn timed_leaf(
        label: impl Into<String>,
        threshold: Threshold,
        eval: impl Fn() -> bool + 'static,
    ) -> Self {
        Self {
            node: Rc::new(Node::Leaf(Leaf {
                label: label.into(),
                sources: vec![threshold.stopwatch.id()],
                thresholds: vec![threshold],
                eval: Box::new(eval),
            })),
        }
    }

    /// Evaluates the condition against the current state of its leaves.
    pub fn evaluate(&self) -> bool {
        match &*self.node {
            Node::Literal(value) => *value,
            Node::Leaf(leaf) => (leaf.eval)(),
            Node::Not(inner) => !inner.evaluate(),
            Node::And(lhs, rhs) => lhs.evaluate() && rhs.evaluate(),
            Node::Or(lhs, rhs) => lhs.evaluate() || rhs.evaluate(),
        }
    }

    /// Returns `true` when the condition contains no reactive leaf, so its
    /// value can never change.
    pub fn is_constant(&self) -> bool {
        self.sources().is_empty()
    }

    /// Returns the conjunction of `self` and `other`.
    pub fn and(self, other: impl Into<Condition>) -> Self {
        Self {
            node: Rc::new(Node::And(self, other.into())),
        }
    }

    /// Returns the disjunction of `self` and `other`.
    pub fn or(self, other: impl Into<Condition>) -> Self {
        Self {
            node: Rc::new(Node::Or(self, other.into())),
        }
    }

    /// Returns the negation of `self`.
    pub fn negate(self) -> Self {
        Self {
            node: Rc::new(Node::Not(self)),
        }
    }

    /// Every leaf this condition depends on.
    pub(crate) fn sources(&self) -> BTreeSet<SourceId> {
        let mut sources = BTreeSet::new();
        self.visit(&mut |leaf| sources.extend(leaf.sources.iter().copied()));
        sources
    }

    pub(crate) fn depends_on(&self, source: SourceId) -> bool {
        match &*self.node {
            Node::Literal(_) => false,
            Node::Leaf(leaf) => leaf.sources.contains(&source),
            Node::Not(inner) => inner.depends_on(source),
            Node::And(lhs, rhs) | Node::Or(lhs, rhs) => {
                lhs.depends_on(source) || rhs.depends_on(source)
            }
        }
    }

    /// Stopwatch thresholds watched by this condition.
    pub(crate) fn thresholds(&self) -> Vec<Threshold> {
        let mut thresholds = Vec::new();
        self.visit(&mut |leaf| thresholds.extend(leaf.thresholds.iter().cloned()));
        thresholds
    }

    fn visit(&self, f: &mut dyn FnMut(&Leaf)) {
        match &*self.node {
            Node::Literal(_) => {}
            Node::Leaf(leaf) => f(leaf),
            Node::Not(inner) => inner.visit(f),
            Node::And(lhs, rhs) | Node::Or(lhs, rhs) => {
                lhs.visit(f);
                rhs.visit(f);
            }
        }
    }
}

impl From<bool> for Condition {
    fn from(value: bool) -> Self {
        Self::literal(value)
    }
}

impl<R: Into<Condition>> BitAnd<R> for Condition {
    type Output = Condition;

    fn bitand(self, rhs: R) -> Condition {
        self.and(rhs)
    }
}

impl<R: Into<Condition>> BitOr<R> for Condition {
    type Output = Condition;

    fn bitor(self, rhs: R) -> Condition {
        self.or(rhs)
    }
}

impl Not for Condition {
    type Output = Condition;

    fn not(self) -> Condition {
        self.negate()
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.node {
            Node::Literal(value) => write!(f, "{value}"),
            Node::Leaf(leaf) => f.write_str(&leaf.label),
            Node::Not(inner) => write!(f, "!({inner})"),
            Node::And(lhs, rhs) => write!(f, "({lhs} && {rhs})"),
            Node::Or(lhs, rhs) => write!(f, "({lhs} || {rhs})"),
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Condition({self})")
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn flag(id: u64, label: &str) -> (Rc<Cell<bool>>, Condition) {
        let cell = Rc::new(Cell::new(false));
        let read = cell.clone();
        let condition = Condition::leaf(label, vec![SourceId(id)], move || read.get());
        (cell, condition)
    }

    #[test]
    fn composition_follows_boolean_algebra() {
        let (a, ca) = flag(1, "a");
        let (b, cb) = flag(2, "b");
        let both = ca.clone() & cb.clone();
        let either = ca.clone() | cb.clone();
        let not_a = !ca;

        assert!(!both.evaluate());
        assert!(!either.evaluate());
        assert!(not_a.evaluate());

        a.set(true);
        assert!(!both.evaluate());
        assert!(either.evaluate());
        assert!(!not_a.evaluate());

        b.set(true);
        assert!(both.evaluate());
    }

    #[test]
    fn literals_mix_with_leaves() {
        let (a, ca) = flag(1, "a");
        let gated = ca | false;
        assert!(!gated.evaluate());
        a.set(true);
        assert!(gated.evaluate());

        assert!(Condition::always().evaluate());
        assert!(Condition::never().is_constant());
        assert!(Condition::from(true).evaluate());
    }

    #[test]
    fn dependencies_and_rendering() {
        let (_, ca) = flag(7, "port == 3");
        let (_, cb) = flag(9, "value < 2");
        let condition = !(ca & cb);

        assert!(condition.depends_on(SourceId(7)));
        assert!(condition.depends_on(SourceId(9)));
        assert!(!condition.depends_on(SourceId(8)));
        assert_eq!(
            condition.sources().into_iter().collect::<Vec<_>>(),
            vec![SourceId(7), SourceId(9)]
        );
        assert_eq!(condition.to_string(), "!((port == 3 && value < 2))");
        assert!(!condition.is_constant());
    }
}
