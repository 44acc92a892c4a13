//! Log records emitted by the kernel and the sinks that receive them.
//!
//! Every observable step (waits, pushes, handled values, timer expiries,
//! assertion verdicts) produces a [`LogRecord`] stamped with virtual time,
//! the acting runner and the caller location. Records are fanned out to the
//! configured [`LogSink`]s; by default they go to `tracing` and, when
//! enabled, to an in-memory [`Journal`] used for replay comparisons.

use std::fmt;
use std::panic::Location;
use std::time::Duration;

use crate::sim::clock::format_time;

/// Category of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    /// Free-form information.
    Info,
    /// Free-form warning, also used for failed checks.
    Warn,
    /// A passed assertion or check.
    Pass,
    /// A failed assertion.
    Fail,
    /// An invariant violation.
    Invariant,
    /// A runner starts or finishes waiting.
    Wait,
    /// A value was pushed into a signal.
    Push,
    /// A value was popped from a queue port.
    Pop,
    /// A port listener handled a value.
    Handle,
    /// Timer activity.
    Timer,
    /// Section boundaries.
    Section,
}

impl LogLevel {
    /// Returns the fixed-width tag printed in front of log lines.
    pub fn tag(self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Pass => "PASS",
            LogLevel::Fail => "FAIL",
            LogLevel::Invariant => "INVARIANT",
            LogLevel::Wait => "WAIT",
            LogLevel::Push => "PUSH",
            LogLevel::Pop => "POP",
            LogLevel::Handle => "HANDLE",
            LogLevel::Timer => "TIMER",
            LogLevel::Section => "SECTION",
        }
    }
}

/// A source location captured from the caller of a kernel API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    /// Source file.
    pub file: &'static str,
    /// Line number.
    pub line: u32,
}

impl From<&'static Location<'static>> for SourceLocation {
    fn from(location: &'static Location<'static>) -> Self {
        Self {
            file: location.file(),
            line: location.line(),
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// One entry of the run log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Virtual time at which the record was produced.
    pub time: Duration,
    /// Category of the record.
    pub level: LogLevel,
    /// Name of the acting runner, or `main` outside runner code.
    pub runner: String,
    /// Where the triggering call was made, when known.
    pub location: Option<SourceLocation>,
    /// Rendered message.
    pub message: String,
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:>12}] {:<9} {}: {}",
            format_time(self.time),
            self.level.tag(),
            self.runner,
            self.message
        )?;
        if let Some(location) = self.location {
            write!(f, " ({location})")?;
        }
        Ok(())
    }
}

/// Receives every record the kernel produces.
pub trait LogSink {
    /// Handles one record.
    fn record(&mut self, record: &LogRecord);
}

/// Forwards records to `tracing` as structured events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn record(&mut self, record: &LogRecord) {
        let time_ms = record.time.as_secs_f64() * 1000.0;
        let location = record.location.map(|l| l.to_string()).unwrap_or_default();
        match record.level {
            LogLevel::Fail | LogLevel::Invariant => tracing::error!(
                time_ms,
                runner = %record.runner,
                %location,
                tag = record.level.tag(),
                "{}",
                record.message
            ),
            LogLevel::Warn => tracing::warn!(
                time_ms,
                runner = %record.runner,
                %location,
                tag = record.level.tag(),
                "{}",
                record.message
            ),
            LogLevel::Info | LogLevel::Pass | LogLevel::Section => tracing::info!(
                time_ms,
                runner = %record.runner,
                %location,
                tag = record.level.tag(),
                "{}",
                record.message
            ),
            _ => tracing::debug!(
                time_ms,
                runner = %record.runner,
                %location,
                tag = record.level.tag(),
                "{}",
                record.message
            ),
        }
    }
}

/// In-memory record of a run.
///
/// Two runs of the same program produce equal journals, which is how
/// determinism is checked.
#[derive(Debug, Default, Clone)]
pub struct Journal {
    records: Vec<LogRecord>,
}

impl Journal {
    /// Creates an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the records in emission order.
    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    /// Returns the records of one category.
    pub fn of_level(&self, level: LogLevel) -> impl Iterator<Item = &LogRecord> {
        self.records.iter().filter(move |r| r.level == level)
    }

    /// Consumes the journal and returns its records.
    pub fn into_records(self) -> Vec<LogRecord> {
        self.records
    }
}

impl LogSink for Journal {
    fn record(&mut self, record: &LogRecord) {
        self.records.push(record.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_time_tag_and_location() {
        let record = LogRecord {
            time: Duration::from_millis(1500),
            level: LogLevel::Pass,
            runner: "checker".to_string(),
            location: Some(SourceLocation {
                file: "tests/demo.rs",
                line: 12,
            }),
            message: "temperature is stable".to_string(),
        };

        let line = record.to_string();
        assert!(line.contains("1500 ms"));
        assert!(line.contains("PASS"));
        assert!(line.contains("checker: temperature is stable"));
        assert!(line.ends_with("(tests/demo.rs:12)"));
    }

    #[test]
    fn journal_filters_by_level() {
        let mut journal = Journal::new();
        for (level, message) in [
            (LogLevel::Info, "a"),
            (LogLevel::Fail, "b"),
            (LogLevel::Info, "c"),
        ] {
            journal.record(&LogRecord {
                time: Duration::ZERO,
                level,
                runner: "main".to_string(),
                location: None,
                message: message.to_string(),
            });
        }

        let infos: Vec<&str> = journal
            .of_level(LogLevel::Info)
            .map(|r| r.message.as_str())
            .collect();
        assert_eq!(infos, vec!["a", "c"]);
        assert_eq!(journal.records().len(), 3);
    }
}
