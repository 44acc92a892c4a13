//! Run metrics and reporting.

use std::fmt;
use std::time::Duration;

use crate::journal::{Journal, LogLevel};
use crate::sim::kernel::RunnerState;
use crate::testing::manager::TestStats;

/// Final state of one runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerSummary {
    /// Runner name.
    pub name: String,
    /// Lifecycle state at the end of the run.
    pub state: RunnerState,
}

/// Report of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Seed of the run's random number generator.
    pub seed: u64,
    /// Virtual time when the timeline drained.
    pub virtual_time: Duration,
    /// Wall-clock time taken by the run.
    pub wall_time: Duration,
    /// Number of queued events processed.
    pub events_processed: u64,
    /// Runners in registration order.
    pub runners: Vec<RunnerSummary>,
    /// Verdict counters.
    pub stats: TestStats,
    /// Declared invariant sites that never constructed an invariant.
    pub missing_invariants: Vec<String>,
    /// Every log record, when the journal was enabled.
    pub journal: Option<Journal>,
}

impl RunReport {
    /// Returns `true` when no assertion, check or invariant failed.
    pub fn passed(&self) -> bool {
        self.stats.passed()
    }

    /// Process exit value for the run: `0` when everything passed.
    pub fn exit_code(&self) -> i32 {
        self.stats.exit_code()
    }

    /// Messages of journal records of one category.
    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        self.journal
            .iter()
            .flat_map(|journal| journal.of_level(level))
            .map(|record| record.message.clone())
            .collect()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Run Report ===")?;
        writeln!(f, "Seed: {}", self.seed)?;
        writeln!(f, "Virtual Time: {:?}", self.virtual_time)?;
        writeln!(f, "Wall Time: {:?}", self.wall_time)?;
        writeln!(f, "Events Processed: {}", self.events_processed)?;
        writeln!(f)?;
        write!(f, "{}", self.stats)?;

        if !self.missing_invariants.is_empty() {
            writeln!(f)?;
            writeln!(f, "=== Invariants Not Executed ===")?;
            for site in &self.missing_invariants {
                writeln!(f, "  - {}", site)?;
            }
        }

        writeln!(f)?;
        writeln!(f, "Result: {}", if self.passed() { "PASSED" } else { "FAILED" })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(stats: TestStats) -> RunReport {
        RunReport {
            seed: 7,
            virtual_time: Duration::from_millis(1500),
            wall_time: Duration::ZERO,
            events_processed: 3,
            runners: vec![RunnerSummary {
                name: "probe".to_string(),
                state: RunnerState::Finished,
            }],
            stats,
            missing_invariants: vec!["queue-bounded".to_string()],
            journal: None,
        }
    }

    #[test]
    fn display_lists_counters_and_verdict() {
        let text = report(TestStats {
            passed_assertions: 2,
            failed_checks: 1,
            ..TestStats::default()
        })
        .to_string();

        assert!(text.contains("Seed: 7"));
        assert!(text.contains("Assertions: 2 passed, 0 failed"));
        assert!(text.contains("Checks: 0 passed, 1 failed"));
        assert!(text.contains("  - queue-bounded"));
        assert!(text.contains("Result: FAILED"));
    }

    #[test]
    fn clean_run_exits_zero() {
        let report = report(TestStats::default());
        assert!(report.passed());
        assert_eq!(report.exit_code(), 0);
        assert!(report.messages(LogLevel::Info).is_empty());
    }
}
