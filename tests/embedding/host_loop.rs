// Tests for the prepare/check hooks an environment registers on its loop

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use super::{create_test_env, eval_int, run};
use jsembed::{HostLoop, RunMode};

#[test]
fn test_env_registers_three_handles() {
    let t = create_test_env();
    assert_eq!(t.event_loop.handle_count(), 3);
    assert!(!t.event_loop.is_alive());

    t.env.destroy().unwrap();
    t.event_loop.run(RunMode::NoWait);
    assert_eq!(t.event_loop.handle_count(), 0);
}

#[test]
fn test_timer_resolution_drains_without_script() {
    let t = create_test_env();
    let env = t.env.clone();
    let (deferred, promise) = env.create_promise().unwrap();
    let global = env.get_global().unwrap();
    env.set_named_property(global, "later", promise).unwrap();
    run(&env, "globalThis.value = 0; later.then((v) => { value = v; })").unwrap();

    let timer_env = env.clone();
    t.event_loop.add_timer(Duration::ZERO, move || {
        let result = timer_env.create_int32(21).unwrap();
        timer_env.resolve_deferred(deferred, result).unwrap();
    });
    assert!(!t.event_loop.run(RunMode::Default));
    assert_eq!(eval_int(&env, "value"), 21);
}

#[test]
fn test_check_hook_drains_jobs_queued_by_host() {
    let t = create_test_env();
    let env = &t.env;
    let calls = Rc::new(Cell::new(0));
    let sink = calls.clone();
    let tick = env
        .create_function("tick", move |_, _| {
            sink.set(sink.get() + 1);
            Ok(None)
        })
        .unwrap();

    env.queue_microtask(tick).unwrap();
    env.queue_microtask(tick).unwrap();
    assert_eq!(calls.get(), 0);

    t.event_loop.run(RunMode::Once);
    assert_eq!(calls.get(), 2);
    assert!(!t.event_loop.is_alive());
}

#[test]
fn test_two_envs_share_one_loop() {
    let t = create_test_env();
    let platform = t.env.get_env_platform().clone();
    let other = jsembed::Env::create(&platform, jsembed::EnvOptions::default()).unwrap();
    assert_eq!(t.event_loop.handle_count(), 6);
    assert!(other.get_env_platform().ptr_eq(&platform));

    run(&other, "globalThis.x = 1").unwrap();
    assert_eq!(eval_int(&t.env, "typeof x === 'undefined' ? 0 : 1"), 0);

    other.destroy().unwrap();
    t.event_loop.run(RunMode::NoWait);
    assert_eq!(t.event_loop.handle_count(), 3);
}
