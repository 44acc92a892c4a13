//! Reactive expressions: operands, conditions, observable values and
//! invariants.

pub(crate) mod condition;
pub(crate) mod invariant;
pub(crate) mod operand;
pub(crate) mod value;

pub use condition::Condition;
pub use invariant::Invariant;
pub use operand::{Operand, Reactive, Relation};
pub use value::Value;
