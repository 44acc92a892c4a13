//! Reactive readings and the comparisons that turn them into conditions.

use std::fmt;
use std::rc::Rc;

use super::condition::Condition;
use crate::sim::ids::SourceId;

/// Relation used to compare two operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterOrEqual,
}

impl Relation {
    /// Applies the relation to two values.
    pub fn holds<T: PartialOrd + ?Sized>(self, lhs: &T, rhs: &T) -> bool {
        match self {
            Relation::Equal => lhs == rhs,
            Relation::NotEqual => lhs != rhs,
            Relation::Less => lhs < rhs,
            Relation::LessOrEqual => lhs <= rhs,
            Relation::Greater => lhs > rhs,
            Relation::GreaterOrEqual => lhs >= rhs,
        }
    }

    /// Operator symbol used when rendering conditions.
    pub fn symbol(self) -> &'static str {
        match self {
            Relation::Equal => "==",
            Relation::NotEqual => "!=",
            Relation::Less => "<",
            Relation::LessOrEqual => "<=",
            Relation::Greater => ">",
            Relation::GreaterOrEqual => ">=",
        }
    }
}

/// A reading of a reactive leaf, possibly transformed.
///
/// The reading is `None` while the leaf holds no value (an empty sample
/// port); every comparison involving an absent reading is false.
pub struct Operand<T> {
    label: String,
    sources: Vec<SourceId>,
    read: Rc<dyn Fn() -> Option<T>>,
}

impl<T> Clone for Operand<T> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            sources: self.sources.clone(),
            read: self.read.clone(),
        }
    }
}

impl<T: 'static> Operand<T> {
    pub(crate) fn new(
        label: impl Into<String>,
        sources: Vec<SourceId>,
        read: impl Fn() -> Option<T> + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            sources,
            read: Rc::new(read),
        }
    }

    /// An operand that always reads `value`.
    pub fn constant(value: T) -> Self
    where
        T: Clone + fmt::Debug,
    {
        let label = format!("{value:?}");
        Self::new(label, Vec::new(), move || Some(value.clone()))
    }

    /// Reads the current value.
    pub fn read(&self) -> Option<T> {
        (self.read)()
    }

    /// Rendering used inside condition descriptions.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns an operand reading `f` applied to this one.
    pub fn map<U: 'static>(self, name: &str, f: impl Fn(T) -> U + 'static) -> Operand<U> {
        let read = self.read;
        Operand {
            label: format!("{name}({})", self.label),
            sources: self.sources,
            read: Rc::new(move || read().map(&f)),
        }
    }

    /// Compares this operand with another reactive operand.
    pub fn compare(&self, relation: Relation, other: &Operand<T>) -> Condition
    where
        T: PartialOrd,
    {
        let lhs = self.read.clone();
        let rhs = other.read.clone();
        let mut sources = self.sources.clone();
        for source in &other.sources {
            if !sources.contains(source) {
                sources.push(*source);
            }
        }
        let label = format!("{} {} {}", self.label, relation.symbol(), other.label);
        Condition::leaf(label, sources, move || match (lhs(), rhs()) {
            (Some(a), Some(b)) => relation.holds(&a, &b),
            _ => false,
        })
    }
}

/// Something that can be read reactively and compared against constants.
///
/// Implemented by [`SamplePort`](crate::SamplePort), [`Value`](crate::Value)
/// and [`Operand`] itself.
pub trait Reactive<T: PartialOrd + Clone + fmt::Debug + 'static> {
    /// Returns a reading of the current value.
    fn operand(&self) -> Operand<T>;

    /// `self == value`
    fn equals(&self, value: T) -> Condition {
        self.operand()
            .compare(Relation::Equal, &Operand::constant(value))
    }

    /// `self != value`
    ///
    /// False while the reading is absent, like every other comparison, so
    /// on an empty sample port this differs from `!self.equals(value)`,
    /// which is true.
    fn not_equals(&self, value: T) -> Condition {
        self.operand()
            .compare(Relation::NotEqual, &Operand::constant(value))
    }

    /// `self < value`
    fn lt(&self, value: T) -> Condition {
        self.operand().compare(Relation::Less, &Operand::constant(value))
    }

    /// `self <= value`
    fn le(&self, value: T) -> Condition {
        self.operand()
            .compare(Relation::LessOrEqual, &Operand::constant(value))
    }

    /// `self > value`
    fn gt(&self, value: T) -> Condition {
        self.operand()
            .compare(Relation::Greater, &Operand::constant(value))
    }

    /// `self >= value`
    fn ge(&self, value: T) -> Condition {
        self.operand()
            .compare(Relation::GreaterOrEqual, &Operand::constant(value))
    }
}

impl<T: PartialOrd + Clone + fmt::Debug + 'static> Reactive<T> for Operand<T> {
    fn operand(&self) -> Operand<T> {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn cell_operand(id: u64, label: &str) -> (Rc<Cell<Option<i32>>>, Operand<i32>) {
        let cell = Rc::new(Cell::new(None));
        let read = cell.clone();
        (cell, Operand::new(label, vec![SourceId(id)], move || read.get()))
    }

    #[test]
    fn absent_readings_compare_false() {
        let (cell, operand) = cell_operand(1, "port");
        let eq = operand.equals(3);
        let ne = operand.not_equals(3);
        assert!(!eq.evaluate());
        assert!(!ne.evaluate());

        cell.set(Some(3));
        assert!(eq.evaluate());
        assert!(!ne.evaluate());
    }

    #[test]
    fn operands_compare_with_each_other() {
        let (left, lhs) = cell_operand(1, "a");
        let (right, rhs) = cell_operand(2, "b");
        let condition = lhs.compare(Relation::Less, &rhs);

        left.set(Some(1));
        right.set(Some(2));
        assert!(condition.evaluate());
        right.set(Some(1));
        assert!(!condition.evaluate());

        assert!(condition.depends_on(SourceId(1)));
        assert!(condition.depends_on(SourceId(2)));
        assert_eq!(condition.to_string(), "a < b");
    }

    #[test]
    fn mapped_operands_keep_their_sources() {
        let (cell, operand) = cell_operand(4, "x");
        let doubled = operand.map("double", |v| v * 2);
        let condition = doubled.ge(10);

        cell.set(Some(4));
        assert!(!condition.evaluate());
        cell.set(Some(5));
        assert!(condition.evaluate());
        assert!(condition.depends_on(SourceId(4)));
        assert_eq!(condition.to_string(), "double(x) >= 10");
    }
}
