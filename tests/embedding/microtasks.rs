// Tests for depth-gated microtask draining

use std::cell::Cell;
use std::rc::Rc;

use super::{create_test_env, eval_int, run};
use jsembed::{HostLoop, RunMode};

#[test]
fn test_jobs_drain_when_script_returns() {
    let t = create_test_env();
    let env = &t.env;
    let during = eval_int(
        env,
        r#"
        globalThis.log = [];
        Promise.resolve().then(() => log.push("a")).then(() => log.push("b"));
        queueMicrotask(() => log.push("c"));
        log.length
    "#,
    );
    assert_eq!(during, 0);
    assert_eq!(super::eval_string(env, "log.join(',')"), "a,c,b");
}

#[test]
fn test_nested_entry_does_not_drain() {
    let t = create_test_env();
    let env = &t.env;
    let inner_length = Rc::new(Cell::new(-1));
    let sink = inner_length.clone();
    let observe = env
        .create_function("observe", move |env, _| {
            let source = env.create_string_utf8("queueMicrotask(() => log.push('job')); log.length")?;
            let length = env.run_script("nested.js", source)?;
            sink.set(env.get_value_int32(length)?);
            Ok(None)
        })
        .unwrap();
    let global = env.get_global().unwrap();
    env.set_named_property(global, "observe", observe).unwrap();

    run(env, "globalThis.log = []; observe();").unwrap();
    assert_eq!(inner_length.get(), 0);
    assert_eq!(eval_int(env, "log.length"), 1);
}

#[test]
fn test_checkpoint_call_drains_at_any_depth() {
    let t = create_test_env();
    let env = &t.env;
    let inner_length = Rc::new(Cell::new(-1));
    let sink = inner_length.clone();
    let observe = env
        .create_function("observe", move |env, info| {
            let global = env.get_global()?;
            let callback = info.arg(0).ok_or(jsembed::Error::InvalidArgument("callback".into()))?;
            env.call_function_with_checkpoint(global, callback, &[])?;
            let log = env.get_named_property(global, "log")?;
            sink.set(env.get_array_length(log)? as i32);
            Ok(None)
        })
        .unwrap();
    let global = env.get_global().unwrap();
    env.set_named_property(global, "observe", observe).unwrap();

    run(env, "globalThis.log = []; observe(() => queueMicrotask(() => log.push(1)));").unwrap();
    assert_eq!(inner_length.get(), 1);
}

#[test]
fn test_host_queued_microtask_runs_in_check_phase() {
    let t = create_test_env();
    let env = &t.env;
    run(env, "globalThis.ran = 0").unwrap();
    let task = run(env, "(() => { ran = ran + 1; })").unwrap();

    // No script on the stack: the queued job keeps the loop alive until the
    // check hook drains it.
    env.queue_microtask(task).unwrap();
    assert!(t.event_loop.is_alive());
    assert!(!t.event_loop.run(RunMode::Default));
    assert!(!t.event_loop.is_alive());
    assert_eq!(eval_int(env, "ran"), 1);
}

#[test]
fn test_idle_env_does_not_keep_loop_alive() {
    let t = create_test_env();
    run(&t.env, "1 + 1").unwrap();
    assert!(!t.event_loop.run(RunMode::NoWait));
}

#[test]
fn test_throwing_job_goes_to_uncaught_handler() {
    let t = create_test_env();
    let env = &t.env;
    let errors = Rc::new(Cell::new(0));
    let sink = errors.clone();
    env.on_uncaught_exception(move |_, _| sink.set(sink.get() + 1));

    run(env, "globalThis.after = false; queueMicrotask(() => { throw new Error('job'); }); queueMicrotask(() => { after = true; });").unwrap();
    assert_eq!(errors.get(), 1);
    assert!(super::eval_bool(env, "after"));
}
