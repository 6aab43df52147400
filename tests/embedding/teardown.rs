// Tests for teardown callbacks, deferred teardown and environment release

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::{create_test_env, run};
use jsembed::{DeferredTeardown, Env, Error, HostLoop, RunMode};

#[test]
fn test_teardown_callbacks_run_in_reverse_order() {
    let t = create_test_env();
    let env = &t.env;
    let log = Rc::new(RefCell::new(Vec::new()));
    for name in ["first", "second", "third"] {
        let log = log.clone();
        env.add_teardown_callback(move |_| log.borrow_mut().push(name)).unwrap();
    }

    env.destroy().unwrap();
    assert_eq!(*log.borrow(), vec!["third", "second", "first"]);
    assert!(env.is_destroyed());
}

#[test]
fn test_removed_teardown_callback_does_not_run() {
    let t = create_test_env();
    let env = &t.env;
    let ran = Rc::new(Cell::new(false));
    let flag = ran.clone();
    let id = env.add_teardown_callback(move |_| flag.set(true)).unwrap();
    env.remove_teardown_callback(id).unwrap();
    // Unknown ids are ignored.
    env.remove_teardown_callback(id).unwrap();

    env.destroy().unwrap();
    assert!(!ran.get());
}

#[test]
fn test_teardown_callback_can_still_use_env() {
    let t = create_test_env();
    let env = &t.env;
    let seen = Rc::new(Cell::new(0));
    let sink = seen.clone();
    run(env, "globalThis.counter = 5").unwrap();
    env.add_teardown_callback(move |env| {
        let global = env.get_global().unwrap();
        let counter = env.get_named_property(global, "counter").unwrap();
        sink.set(env.get_value_int32(counter).unwrap());
    })
    .unwrap();

    env.destroy().unwrap();
    assert_eq!(seen.get(), 5);
}

#[test]
fn test_destroyed_env_rejects_calls() {
    let t = create_test_env();
    let env = &t.env;
    env.destroy().unwrap();

    assert_eq!(env.create_object(), Err(Error::EnvDestroyed));
    assert_eq!(run(env, "1"), Err(Error::EnvDestroyed));
    assert_eq!(env.destroy(), Err(Error::EnvDestroyed));
}

#[test]
fn test_destroy_runs_finalizers() {
    let t = create_test_env();
    let env = &t.env;
    let finalized = Rc::new(Cell::new(false));
    let flag = finalized.clone();
    let object = env.create_object().unwrap();
    env.add_finalizer(object, Rc::new(()), Box::new(move |_: &Env, _: Rc<dyn Any>| flag.set(true)))
        .unwrap();
    env.create_reference(object, 1).unwrap();

    env.destroy().unwrap();
    assert!(finalized.get());
}

#[test]
fn test_deferred_teardown_waits_for_finish() {
    let t = create_test_env();
    let env = &t.env;
    let handle: Rc<Cell<Option<DeferredTeardown>>> = Rc::default();
    let slot = handle.clone();
    env.add_deferred_teardown_callback(move |_, done| slot.set(Some(done)))
        .unwrap();

    env.destroy().unwrap();
    assert!(!env.is_destroyed());
    assert!(t.event_loop.is_alive());

    let done = handle.get().unwrap();
    env.finish_deferred_teardown_callback(done).unwrap();
    assert!(!env.is_destroyed());

    assert!(!t.event_loop.run(RunMode::Default));
    assert!(env.is_destroyed());
    assert_eq!(t.event_loop.handle_count(), 0);
}

#[test]
fn test_finishing_unknown_deferred_teardown_fails() {
    let t = create_test_env();
    let env = &t.env;
    let done = env.add_deferred_teardown_callback(|_, _| {}).unwrap();
    // Not started yet: destroy has not run.
    assert_eq!(env.finish_deferred_teardown_callback(done), Err(Error::UnknownTeardown));
}

#[test]
fn test_deferred_finished_inside_callback_closes_immediately() {
    let t = create_test_env();
    let env = &t.env;
    env.add_deferred_teardown_callback(|env, done| {
        env.finish_deferred_teardown_callback(done).unwrap();
    })
    .unwrap();

    env.destroy().unwrap();
    assert!(env.is_destroyed());
    // The wake-up sent on finish is dropped with the closed handle.
    assert!(!t.event_loop.run(RunMode::NoWait));
    assert_eq!(t.event_loop.handle_count(), 0);
}
