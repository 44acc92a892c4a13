//! Waiting on composed conditions over values, ports and stopwatches.

mod common;

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use common::init_tracing;
use simtick::{runner_fn, Condition, Context, LogLevel, Reactive, Relation};

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

#[test]
fn conjunction_waits_for_both_sides() {
    init_tracing();
    let mut ctx = Context::new();
    let mode = ctx.value("mode", 0);
    let level = ctx.value("level", 0);
    let outcome = Rc::new(Cell::new(None));

    let (m, l, seen) = (mode.clone(), level.clone(), outcome.clone());
    ctx.add_runner(runner_fn("waiter", move |ctx| async move {
        ctx.wait(m.equals(1) & l.gt(5)).await;
        let resumed = ctx.now();
        let either = ctx
            .wait_timeout(m.equals(9) | l.lt(0), ms(5))
            .await;
        seen.set(Some((resumed, either)));
        Ok(())
    }));
    ctx.add_runner(runner_fn("setter", move |ctx| async move {
        ctx.sleep(ms(10)).await;
        mode.set(1);
        ctx.sleep(ms(10)).await;
        level.update(|value| *value += 6);
        Ok(())
    }));

    let report = ctx.run().expect("run should complete");
    assert_eq!(outcome.get(), Some((ms(20), false)));
    assert!(report
        .messages(LogLevel::Wait)
        .contains(&"Condition '(mode == 1 && level > 5)' met after 20 ms".to_string()));
}

#[test]
fn constant_conditions_resolve_immediately() {
    init_tracing();
    let mut ctx = Context::new();
    let outcome = Rc::new(Cell::new(None));

    let seen = outcome.clone();
    ctx.add_runner(runner_fn("probe", move |ctx| async move {
        ctx.wait(true).await;
        ctx.wait(Condition::always() | false).await;
        let never = ctx.wait_timeout(Condition::never(), ms(7)).await;
        seen.set(Some((never, ctx.now())));
        Ok(())
    }));

    ctx.run().expect("run should complete");
    assert_eq!(outcome.get(), Some((false, ms(7))));
}

#[test]
fn stopwatch_conditions_resume_exactly_at_the_threshold() {
    init_tracing();
    let mut ctx = Context::new();
    let outcome = Rc::new(Cell::new(None));

    let seen = outcome.clone();
    ctx.add_runner(runner_fn("timing", move |ctx| async move {
        let stopwatch = ctx.stopwatch();
        ctx.wait(stopwatch.ge(ms(300))).await;
        let at_least = ctx.now();
        ctx.wait(stopwatch.gt(ms(400))).await;
        let beyond = ctx.now();
        seen.set(Some((at_least, beyond)));
        Ok(())
    }));

    let report = ctx.run().expect("run should complete");
    assert_eq!(
        outcome.get(),
        Some((ms(300), ms(400) + Duration::from_nanos(1)))
    );
    assert_eq!(report.virtual_time, ms(400) + Duration::from_nanos(1));
}

#[test]
fn stopped_stopwatch_never_reaches_its_threshold() {
    init_tracing();
    let mut ctx = Context::new();
    let outcome = Rc::new(Cell::new(None));

    let seen = outcome.clone();
    ctx.add_runner(runner_fn("timing", move |ctx| async move {
        let stopwatch = ctx.stopwatch();
        ctx.sleep(ms(50)).await;
        stopwatch.stop();
        let reached = ctx.wait_timeout(stopwatch.ge(ms(100)), ms(500)).await;
        stopwatch.start();
        ctx.wait(stopwatch.ge(ms(100))).await;
        seen.set(Some((reached, ctx.now())));
        Ok(())
    }));

    ctx.run().expect("run should complete");
    assert_eq!(outcome.get(), Some((false, ms(600))));
}

#[test]
fn condition_true_at_the_deadline_beats_the_timeout() {
    init_tracing();
    let mut ctx = Context::new();
    let ready = ctx.value("ready", false);
    let outcome = Rc::new(Cell::new(None));

    let (flag, seen) = (ready.clone(), outcome.clone());
    ctx.add_runner(runner_fn("waiter", move |ctx| async move {
        let satisfied = ctx.wait_timeout(flag.equals(true), ms(500)).await;
        seen.set(Some((satisfied, ctx.now())));
        Ok(())
    }));
    ctx.add_runner(runner_fn("setter", move |ctx| async move {
        ctx.sleep(ms(500)).await;
        ready.set(true);
        Ok(())
    }));

    ctx.run().expect("run should complete");
    assert_eq!(outcome.get(), Some((true, ms(500))));
}

#[test]
fn stopwatch_edge_at_the_deadline_beats_the_timeout() {
    init_tracing();
    let mut ctx = Context::new();
    let outcome = Rc::new(Cell::new(None));

    let seen = outcome.clone();
    ctx.add_runner(runner_fn("timing", move |ctx| async move {
        let stopwatch = ctx.stopwatch();
        let reached = ctx.wait_timeout(stopwatch.ge(ms(250)), ms(250)).await;
        seen.set(Some(reached));
        Ok(())
    }));

    ctx.run().expect("run should complete");
    assert_eq!(outcome.get(), Some(true));
}

#[test]
fn a_condition_that_became_true_stays_met_for_the_waiter() {
    init_tracing();
    let mut ctx = Context::new();
    let door = ctx.value("door", "closed");
    let outcome = Rc::new(Cell::new(None));

    let (watched, seen) = (door.clone(), outcome.clone());
    ctx.add_runner(runner_fn("guard", move |ctx| async move {
        let opened = ctx
            .wait_timeout(watched.equals("open"), ms(100))
            .await;
        seen.set(Some((opened, watched.get(), ctx.now())));
        Ok(())
    }));
    ctx.add_runner(runner_fn("draft", move |ctx| async move {
        ctx.sleep(ms(30)).await;
        door.set("open");
        door.set("closed");
        Ok(())
    }));

    ctx.run().expect("run should complete");
    assert_eq!(outcome.get(), Some((true, "closed", ms(30))));
}

#[test]
fn operands_compare_with_each_other_and_through_mappings() {
    init_tracing();
    let mut ctx = Context::new();
    let produced = ctx.value("produced", 0u32);
    let consumed = ctx.value("consumed", 0u32);
    let orders = ctx.signal::<u32>("orders");
    let outcome = Rc::new(Cell::new(None));

    let (p, c, input, seen) = (
        produced.clone(),
        consumed.clone(),
        orders.clone(),
        outcome.clone(),
    );
    ctx.add_runner(runner_fn("auditor", move |ctx| async move {
        let backlog = p.operand().compare(Relation::Greater, &c.operand());
        ctx.wait(backlog.clone()).await;
        let first = ctx.now();
        ctx.wait(!backlog).await;
        let cleared = ctx.now();

        let queue = ctx.queue_port(&input);
        let doubled = queue.size_operand().map("double", |size| size * 2);
        ctx.wait(doubled.ge(4)).await;
        seen.set(Some((first, cleared, ctx.now(), queue.size())));
        Ok(())
    }));
    ctx.add_runner(runner_fn("factory", move |ctx| async move {
        ctx.sleep(ms(10)).await;
        produced.set(2);
        ctx.sleep(ms(10)).await;
        consumed.set(2);
        for order in [7, 8] {
            ctx.sleep(ms(10)).await;
            orders.push(order);
        }
        Ok(())
    }));

    ctx.run().expect("run should complete");
    assert_eq!(outcome.get(), Some((ms(10), ms(20), ms(40), 2)));
}

#[test]
fn sample_port_comparisons_ignore_empty_ports() {
    init_tracing();
    let mut ctx = Context::new();
    let pressure = ctx.signal::<f64>("pressure");
    let outcome = Rc::new(Cell::new(None));

    let (input, seen) = (pressure.clone(), outcome.clone());
    ctx.add_runner(runner_fn("gauge", move |ctx| async move {
        let port = ctx.sample_port(&input);
        let low = port.lt(1.0);
        let before = (
            low.evaluate(),
            port.not_equals(1.0).evaluate(),
            (!port.equals(1.0)).evaluate(),
        );
        ctx.wait(low).await;
        seen.set(Some((before, ctx.now(), port.get())));
        Ok(())
    }));
    ctx.add_runner(runner_fn("pump", move |ctx| async move {
        ctx.sleep(ms(5)).await;
        pressure.push(2.5);
        ctx.sleep(ms(5)).await;
        pressure.push(0.5);
        Ok(())
    }));

    ctx.run().expect("run should complete");
    assert_eq!(outcome.get(), Some(((false, false, true), ms(10), 0.5)));
}
