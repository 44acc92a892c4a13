//! Pass/fail bookkeeping for a run.

use std::collections::BTreeSet;
use std::fmt;

/// Counters kept by the kernel while a run progresses.
#[derive(Debug, Default)]
pub(crate) struct TestManager {
    stats: TestStats,
    declared_invariants: BTreeSet<String>,
    constructed_invariants: BTreeSet<String>,
}

impl TestManager {
    pub(crate) fn assertion(&mut self, passed: bool) {
        if passed {
            self.stats.passed_assertions += 1;
        } else {
            self.stats.failed_assertions += 1;
        }
    }

    pub(crate) fn check(&mut self, passed: bool) {
        if passed {
            self.stats.passed_checks += 1;
        } else {
            self.stats.failed_checks += 1;
        }
    }

    pub(crate) fn invariant_created(&mut self, site: Option<&str>) {
        self.stats.created_invariants += 1;
        if let Some(site) = site {
            self.constructed_invariants.insert(site.to_string());
        }
    }

    pub(crate) fn invariant_failed(&mut self) {
        self.stats.failed_invariants += 1;
    }

    pub(crate) fn runner_aborted(&mut self) {
        self.stats.aborted_runners += 1;
    }

    pub(crate) fn declare_invariant(&mut self, site: impl Into<String>) {
        self.declared_invariants.insert(site.into());
    }

    /// Declared invariant sites that never constructed an invariant.
    pub(crate) fn missing_invariants(&self) -> Vec<String> {
        self.declared_invariants
            .difference(&self.constructed_invariants)
            .cloned()
            .collect()
    }

    pub(crate) fn snapshot(&self) -> TestStats {
        TestStats {
            not_executed_invariants: self.missing_invariants().len() as u64,
            ..self.stats.clone()
        }
    }
}

/// Snapshot of the verdict counters of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestStats {
    /// Assertions that held.
    pub passed_assertions: u64,
    /// Assertions that failed.
    pub failed_assertions: u64,
    /// Checks that held.
    pub passed_checks: u64,
    /// Checks that failed.
    pub failed_checks: u64,
    /// Invariants constructed during the run.
    pub created_invariants: u64,
    /// Observed true-to-false transitions of active invariants, including
    /// invariants that were false when created.
    pub failed_invariants: u64,
    /// Declared invariant sites that never constructed an invariant.
    pub not_executed_invariants: u64,
    /// Runners whose `process` returned an error other than a failed
    /// assertion.
    pub aborted_runners: u64,
}

impl TestStats {
    /// Returns `true` when nothing failed.
    pub fn passed(&self) -> bool {
        self.failed_assertions == 0
            && self.failed_checks == 0
            && self.failed_invariants == 0
            && self.aborted_runners == 0
    }

    /// Process exit value for the run: `0` when everything passed.
    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for TestStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Assertions: {} passed, {} failed",
            self.passed_assertions, self.failed_assertions
        )?;
        writeln!(
            f,
            "Checks: {} passed, {} failed",
            self.passed_checks, self.failed_checks
        )?;
        writeln!(
            f,
            "Invariants: {} created, {} failed, {} not executed",
            self.created_invariants, self.failed_invariants, self.not_executed_invariants
        )?;
        if self.aborted_runners > 0 {
            writeln!(f, "Aborted runners: {}", self.aborted_runners)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_checks_fail_the_run() {
        let mut manager = TestManager::default();
        manager.assertion(true);
        manager.check(false);

        let stats = manager.snapshot();
        assert_eq!(stats.passed_assertions, 1);
        assert_eq!(stats.failed_checks, 1);
        assert!(!stats.passed());
        assert_eq!(stats.exit_code(), 1);
    }

    #[test]
    fn not_executed_invariants_are_reported_without_failing() {
        let mut manager = TestManager::default();
        manager.declare_invariant("queue-bounded");
        manager.declare_invariant("never-negative");
        manager.invariant_created(Some("never-negative"));
        manager.invariant_created(None);

        let stats = manager.snapshot();
        assert_eq!(stats.created_invariants, 2);
        assert_eq!(stats.not_executed_invariants, 1);
        assert_eq!(manager.missing_invariants(), vec!["queue-bounded".to_string()]);
        assert_eq!(stats.exit_code(), 0);
    }
}
