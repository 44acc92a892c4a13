//! Assertions, checks, matchers, sections and the run report.

mod common;

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use common::init_tracing;
use simtick::{
    matchers, runner_fn, Context, Journal, KernelError, LogLevel, LogRecord, LogSink,
    RunnerState,
};

#[test]
fn failed_assertion_leaves_the_runner_and_fails_the_run() {
    init_tracing();
    let mut ctx = Context::new();
    let reached = Rc::new(Cell::new(false));

    let flag = reached.clone();
    ctx.add_runner(runner_fn("strict", move |ctx| async move {
        ctx.assert_that(1 + 1 == 2, "arithmetic")?;
        ctx.assert_that(ctx.now() > Duration::ZERO, "time has passed")?;
        flag.set(true);
        Ok(())
    }));

    let report = ctx.run().expect("run should complete");
    assert!(!reached.get());
    assert_eq!(report.stats.passed_assertions, 1);
    assert_eq!(report.stats.failed_assertions, 1);
    assert_eq!(report.stats.aborted_runners, 0);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.runners[0].state, RunnerState::Finished);
    assert_eq!(report.messages(LogLevel::Fail), vec!["time has passed".to_string()]);
    assert!(report
        .messages(LogLevel::Info)
        .contains(&"Runner stopped by a failed assertion".to_string()));
}

#[test]
fn failed_checks_warn_and_continue() {
    init_tracing();
    let mut ctx = Context::new();
    let reached = Rc::new(Cell::new(false));

    let flag = reached.clone();
    ctx.add_runner(runner_fn("lenient", move |ctx| async move {
        let held = ctx.check_that(false, "optional feature present");
        ctx.check_that(!held, "absence noticed");
        flag.set(true);
        Ok(())
    }));

    let report = ctx.run().expect("run should complete");
    assert!(reached.get());
    assert_eq!(report.stats.failed_checks, 1);
    assert_eq!(report.stats.passed_checks, 1);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(
        report.messages(LogLevel::Warn),
        vec!["optional feature present".to_string()]
    );
}

#[test]
fn matcher_failures_explain_the_value() {
    init_tracing();
    let mut ctx = Context::new();
    let outcome = Rc::new(Cell::new(None));

    let seen = outcome.clone();
    ctx.add_runner(runner_fn("matching", move |ctx| async move {
        let size = 3usize;
        let bounded = ctx.check_matches("queue size", &size, matchers::at_most(2));
        let in_window = ctx.check_matches("queue size", &size, matchers::in_range(1..=4));
        seen.set(Some((bounded, in_window)));
        ctx.assert_matches("state", &"idle", matchers::not(matchers::equal_to("idle")))
    }));

    let report = ctx.run().expect("run should complete");
    assert_eq!(outcome.get(), Some((false, true)));
    assert_eq!(
        report.messages(LogLevel::Warn),
        vec!["Value of: queue size\nExpected: at most 2\n  But is: 3".to_string()]
    );
    assert_eq!(
        report.messages(LogLevel::Pass),
        vec!["queue size is in range [1, 4]".to_string()]
    );
    assert_eq!(
        report.messages(LogLevel::Fail),
        vec!["Value of: state\nExpected: not equal to \"idle\"\n  But is: \"idle\"".to_string()]
    );
}

#[test]
fn assertion_errors_carry_runner_and_location() {
    init_tracing();
    let mut ctx = Context::new();
    let captured = Rc::new(std::cell::RefCell::new(None));

    let slot = captured.clone();
    ctx.add_runner(runner_fn("locator", move |ctx| async move {
        let err = ctx.assert_that(false, "pinned").expect_err("assertion fails");
        *slot.borrow_mut() = Some(err);
        Ok(())
    }));

    ctx.run().expect("run should complete");
    match captured.borrow_mut().take() {
        Some(KernelError::AssertionFailed {
            runner,
            location,
            message,
        }) => {
            assert_eq!(runner, "locator");
            assert!(location.contains("reporting.rs"), "location was {location}");
            assert_eq!(message, "pinned");
        }
        other => panic!("expected an assertion failure, got {other:?}"),
    };
}

#[test]
fn sections_and_messages_are_journaled_with_locations() {
    init_tracing();
    let mut ctx = Context::new();

    ctx.add_runner(runner_fn("narrator", |ctx| async move {
        {
            let setup = ctx.section("setup");
            assert_eq!(setup.number(), 1);
            ctx.info("configuring");
            ctx.sleep(Duration::from_millis(15)).await;
        }
        let _verify = ctx.section("verify");
        ctx.warn(format_args!("{} retries left", 2));
        Ok(())
    }));

    let report = ctx.run().expect("run should complete");
    assert_eq!(
        report.messages(LogLevel::Section),
        vec![
            "Section (1) setup".to_string(),
            "End of section (1) setup at 15 ms".to_string(),
            "Section (2) verify".to_string(),
            "End of section (2) verify at 15 ms".to_string(),
        ]
    );

    let journal = report.journal.as_ref().expect("journal enabled by default");
    let info = journal
        .records()
        .iter()
        .find(|record| record.message == "configuring")
        .expect("info recorded");
    assert_eq!(info.runner, "narrator");
    assert_eq!(info.level, LogLevel::Info);
    let location = info.location.expect("info carries its location");
    assert!(location.file.ends_with("reporting.rs"));
    assert_eq!(
        report.messages(LogLevel::Warn),
        vec!["2 retries left".to_string()]
    );
}

#[derive(Clone, Default)]
struct SharedSink(Rc<std::cell::RefCell<Vec<LogRecord>>>);

impl LogSink for SharedSink {
    fn record(&mut self, record: &LogRecord) {
        self.0.borrow_mut().push(record.clone());
    }
}

#[test]
fn custom_sinks_see_what_the_journal_sees() {
    init_tracing();
    let sink = SharedSink::default();
    let mut ctx = Context::builder().tracing(false).log_sink(sink.clone()).build();
    let ticks = ctx.signal::<u8>("ticks");

    ctx.add_runner(runner_fn("ticker", move |ctx| async move {
        let queue = ctx.queue_port(&ticks);
        ticks.push(1);
        ctx.sleep(Duration::from_millis(1)).await;
        queue.pop();
        Ok(())
    }));

    let report = ctx.run().expect("run should complete");
    let journal: Journal = report.journal.expect("journal enabled by default");
    assert_eq!(journal.records(), sink.0.borrow().as_slice());
    assert!(journal
        .records()
        .iter()
        .any(|record| record.to_string().contains("PUSH")));
}

#[test]
fn quiet_runs_keep_no_journal() {
    init_tracing();
    let mut ctx = Context::builder().seed(11).journal(false).build();
    ctx.add_runner(runner_fn("silent", |ctx| async move {
        ctx.info("not kept");
        Ok(())
    }));

    let report = ctx.run().expect("run should complete");
    assert!(report.journal.is_none());
    assert!(report.messages(LogLevel::Info).is_empty());
    assert_eq!(report.seed, 11);

    let text = report.to_string();
    assert!(text.starts_with("=== Run Report ==="));
    assert!(text.contains("Seed: 11"));
    assert!(text.contains("Result: PASSED"));
}
