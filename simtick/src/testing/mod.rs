//! Verdict bookkeeping: assertions, checks, matchers and run statistics.

mod assertions;
pub(crate) mod manager;
pub mod matchers;

pub use manager::TestStats;
pub use matchers::Matcher;
