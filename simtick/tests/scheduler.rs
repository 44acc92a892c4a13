//! Runner lifecycle, virtual time advancement and run termination.

mod common;

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use common::{init_tracing, Trace};
use simtick::{
    async_trait, runner_fn, Condition, Context, KernelError, KernelResult, Reactive, Runner,
    RunnerContext, RunnerState,
};

struct Sleeper {
    name: &'static str,
    sleep: Duration,
    trace: Trace,
}

#[async_trait(?Send)]
impl Runner for Sleeper {
    fn name(&self) -> &str {
        self.name
    }

    fn initialize(&mut self, _ctx: &RunnerContext) -> KernelResult<()> {
        self.trace.push(format!("init {}", self.name));
        Ok(())
    }

    async fn process(&mut self, ctx: &RunnerContext) -> KernelResult<()> {
        self.trace.push(format!("start {}", self.name));
        ctx.sleep(self.sleep).await;
        self.trace
            .push(format!("wake {} at {:?}", self.name, ctx.now()));
        Ok(())
    }

    fn finalize(&mut self, ctx: &RunnerContext) -> KernelResult<()> {
        self.trace
            .push(format!("final {} at {:?}", self.name, ctx.now()));
        Ok(())
    }
}

#[test]
fn phases_run_in_registration_order() {
    init_tracing();
    let trace = Trace::default();
    let mut ctx = Context::new();
    ctx.add_runner(Sleeper {
        name: "slow",
        sleep: Duration::from_millis(100),
        trace: trace.clone(),
    });
    ctx.add_runner(Sleeper {
        name: "fast",
        sleep: Duration::from_millis(50),
        trace: trace.clone(),
    });

    let report = ctx.run().expect("run should complete");

    assert_eq!(
        trace.entries(),
        vec![
            "init slow",
            "init fast",
            "start slow",
            "start fast",
            "wake fast at 50ms",
            "wake slow at 100ms",
            "final slow at 100ms",
            "final fast at 100ms",
        ]
    );
    assert_eq!(report.virtual_time, Duration::from_millis(100));
    assert_eq!(report.events_processed, 2);
    assert!(report
        .runners
        .iter()
        .all(|runner| runner.state == RunnerState::Finished));
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn waiting_on_a_true_condition_does_not_advance_time() {
    init_tracing();
    let mut ctx = Context::new();
    let ready = ctx.value("ready", 1);
    let observed = Rc::new(Cell::new(None));

    let seen = observed.clone();
    ctx.add_runner(runner_fn("probe", move |ctx| async move {
        ctx.wait(ready.equals(1)).await;
        let satisfied = ctx
            .wait_timeout(ready.equals(1), Duration::from_secs(5))
            .await;
        seen.set(Some((ctx.now(), satisfied)));
        Ok(())
    }));

    let report = ctx.run().expect("run should complete");
    assert_eq!(observed.get(), Some((Duration::ZERO, true)));
    assert_eq!(report.events_processed, 0);
}

#[test]
fn zero_timeout_polls_once() {
    init_tracing();
    let mut ctx = Context::new();
    let level = ctx.value("level", 0);
    let outcome = Rc::new(Cell::new(None));

    let seen = outcome.clone();
    ctx.add_runner(runner_fn("poller", move |ctx| async move {
        let satisfied = ctx.wait_timeout(level.gt(0), Duration::ZERO).await;
        seen.set(Some(satisfied));
        Ok(())
    }));

    ctx.run().expect("run should complete");
    assert_eq!(outcome.get(), Some(false));
}

struct Stuck {
    finalized: Rc<Cell<bool>>,
}

#[async_trait(?Send)]
impl Runner for Stuck {
    fn name(&self) -> &str {
        "stuck"
    }

    async fn process(&mut self, ctx: &RunnerContext) -> KernelResult<()> {
        ctx.wait(Condition::never()).await;
        Ok(())
    }

    fn finalize(&mut self, _ctx: &RunnerContext) -> KernelResult<()> {
        self.finalized.set(true);
        Ok(())
    }
}

#[test]
fn drained_timeline_with_waiting_runner_is_a_deadlock() {
    init_tracing();
    let finalized = Rc::new(Cell::new(false));
    let mut ctx = Context::new();
    ctx.add_runner(Stuck {
        finalized: finalized.clone(),
    });

    let err = ctx.run().expect_err("run should deadlock");
    assert_eq!(
        err,
        KernelError::Deadlock {
            time: Duration::ZERO,
            runners: vec!["stuck".to_string()],
        }
    );
    assert!(finalized.get(), "finalize runs even on deadlock");
}

#[test]
fn deadlock_is_reported_when_the_last_event_fires() {
    init_tracing();
    let mut ctx = Context::new();
    let flag = ctx.value("flag", false);

    ctx.add_runner(runner_fn("waiter", move |ctx| async move {
        ctx.wait(flag.equals(true)).await;
        Ok(())
    }));
    ctx.add_runner(runner_fn("sleeper", |ctx| async move {
        ctx.sleep(Duration::from_millis(300)).await;
        Ok(())
    }));

    match ctx.run() {
        Err(KernelError::Deadlock { time, runners }) => {
            assert_eq!(time, Duration::from_millis(300));
            assert_eq!(runners, vec!["waiter".to_string()]);
        }
        other => panic!("expected a deadlock, got {other:?}"),
    }
}

#[test]
fn event_limit_stops_runaway_timers() {
    init_tracing();
    let mut ctx = Context::builder().event_limit(50).journal(false).build();

    ctx.add_runner(runner_fn("ticker", |ctx| async move {
        let _timer = ctx.start_timer(Duration::from_millis(1), |timer| {
            timer.start(Duration::from_millis(1));
        });
        Ok(())
    }));

    assert_eq!(
        ctx.run().expect_err("run should hit the limit"),
        KernelError::EventLimitExceeded { limit: 50 }
    );
}

#[test]
fn runner_errors_count_as_aborted() {
    init_tracing();
    let mut ctx = Context::new();
    ctx.add_runner(runner_fn("broken", |_ctx| async move {
        Err(KernelError::InvalidState("sensor offline".to_string()))
    }));
    ctx.add_runner(runner_fn("healthy", |ctx| async move {
        ctx.sleep(Duration::from_millis(10)).await;
        Ok(())
    }));

    let report = ctx.run().expect("run should complete");
    assert_eq!(report.stats.aborted_runners, 1);
    assert_eq!(report.exit_code(), 1);
    assert!(report
        .messages(simtick::LogLevel::Fail)
        .iter()
        .any(|message| message.contains("sensor offline")));
}

#[test]
fn concurrent_sleepers_interleave_by_wake_time() {
    init_tracing();
    let trace = Trace::default();
    let mut ctx = Context::new();

    for (name, period) in [("a", 30u64), ("b", 40)] {
        let trace = trace.clone();
        ctx.add_runner(runner_fn(name, move |ctx| async move {
            for _ in 0..3 {
                ctx.sleep(Duration::from_millis(period)).await;
                trace.push(format!("{name}@{}", ctx.now().as_millis()));
            }
            Ok(())
        }));
    }

    let report = ctx.run().expect("run should complete");
    assert_eq!(
        trace.entries(),
        vec!["a@30", "b@40", "a@60", "b@80", "a@90", "b@120"]
    );
    assert_eq!(report.virtual_time, Duration::from_millis(120));
}
