// Tests for deferreds, promise inspection and unhandled rejections

use std::cell::RefCell;
use std::rc::Rc;

use super::{create_test_env, eval_int, eval_string, run};
use jsembed::{Env, Error, PromiseStatus};

/// Record the reason of every rejection reported as unhandled.
fn track_rejections(env: &Env) -> Rc<RefCell<Vec<String>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    env.on_unhandled_rejection(move |env, reason, promise| {
        let reason = env
            .get_value_string_utf8(reason)
            .or_else(|_| env.get_value_int32(reason).map(|n| n.to_string()))
            .unwrap_or_default();
        assert!(env.get_promise_state(promise).is_ok());
        sink.borrow_mut().push(reason);
    });
    seen
}

// ═══════════════════════════════════════════════════════════════════════════
// Deferreds
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_resolve_deferred() {
    let t = create_test_env();
    let env = &t.env;
    let (deferred, promise) = env.create_promise().unwrap();
    assert_eq!(env.get_promise_state(promise).unwrap(), PromiseStatus::Pending);
    let pending = env.get_promise_result(promise).unwrap();
    assert!(env.is_undefined(pending).unwrap());

    let value = env.create_int32(5).unwrap();
    env.resolve_deferred(deferred, value).unwrap();

    assert_eq!(env.get_promise_state(promise).unwrap(), PromiseStatus::Fulfilled);
    let result = env.get_promise_result(promise).unwrap();
    assert_eq!(env.get_value_int32(result).unwrap(), 5);
}

#[test]
fn test_reject_deferred() {
    let t = create_test_env();
    let env = &t.env;
    let (deferred, promise) = env.create_promise().unwrap();
    let reason = env.create_string_utf8("nope").unwrap();
    env.reject_deferred(deferred, reason).unwrap();

    assert_eq!(env.get_promise_state(promise).unwrap(), PromiseStatus::Rejected);
    let result = env.get_promise_result(promise).unwrap();
    assert_eq!(env.get_value_string_utf8(result).unwrap(), "nope");
}

#[test]
fn test_deferred_is_consumed() {
    let t = create_test_env();
    let env = &t.env;
    let (deferred, _) = env.create_promise().unwrap();
    let stale = jsembed::Deferred::from_bits(deferred.to_bits());
    let value = env.get_undefined().unwrap();
    env.resolve_deferred(deferred, value).unwrap();

    assert_eq!(env.reject_deferred(stale, value), Err(Error::InvalidHandle("deferred")));
}

#[test]
fn test_resolution_runs_reactions_outside_script() {
    let t = create_test_env();
    let env = &t.env;
    let (deferred, promise) = env.create_promise().unwrap();
    let global = env.get_global().unwrap();
    env.set_named_property(global, "pending", promise).unwrap();
    run(env, "globalThis.got = 0; pending.then((v) => { got = v; })").unwrap();
    assert_eq!(eval_int(env, "got"), 0);

    let value = env.create_int32(9).unwrap();
    env.resolve_deferred(deferred, value).unwrap();
    assert_eq!(eval_int(env, "got"), 9);
}

#[test]
fn test_deferreds_settled_together_react_in_order() {
    let t = create_test_env();
    let env = &t.env;
    let (first, p1) = env.create_promise().unwrap();
    let (second, p2) = env.create_promise().unwrap();
    let deferreds = RefCell::new(Some((first, second)));
    let settle = env
        .create_function("settleBoth", move |env, _| {
            if let Some((first, second)) = deferreds.borrow_mut().take() {
                env.resolve_deferred(first, env.create_int32(1)?)?;
                env.resolve_deferred(second, env.create_int32(2)?)?;
            }
            Ok(None)
        })
        .unwrap();
    let global = env.get_global().unwrap();
    env.set_named_property(global, "p1", p1).unwrap();
    env.set_named_property(global, "p2", p2).unwrap();
    env.set_named_property(global, "settleBoth", settle).unwrap();

    run(
        env,
        r#"
        globalThis.order = [];
        p2.then((v) => order.push(v));
        p1.then((v) => order.push(v));
        settleBoth();
        order.length
    "#,
    )
    .unwrap();
    assert_eq!(eval_string(env, "order.join(',')"), "1,2");
}

#[test]
fn test_promise_state_of_non_promise() {
    let t = create_test_env();
    let env = &t.env;
    let object = env.create_object().unwrap();
    assert!(matches!(env.get_promise_state(object), Err(Error::TypeMismatch { .. })));
    assert!(!env.is_promise(object).unwrap());
}

// ═══════════════════════════════════════════════════════════════════════════
// Unhandled rejections
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_unhandled_rejection_reported_after_script() {
    let t = create_test_env();
    let env = &t.env;
    let seen = track_rejections(env);

    run(env, "Promise.reject('lost'); 1").unwrap();
    assert_eq!(*seen.borrow(), vec!["lost"]);
}

#[test]
fn test_rejection_handled_in_same_turn_is_not_reported() {
    let t = create_test_env();
    let env = &t.env;
    let seen = track_rejections(env);

    run(env, "const p = Promise.reject('caught'); p.catch(() => {}); 1").unwrap();
    assert!(seen.borrow().is_empty());
}

#[test]
fn test_rejection_handled_by_later_job_is_not_reported() {
    let t = create_test_env();
    let env = &t.env;
    let seen = track_rejections(env);

    run(
        env,
        r#"
        const p = Promise.reject('late');
        Promise.resolve().then(() => Promise.resolve()).then(() => { p.catch(() => {}); });
        1
    "#,
    )
    .unwrap();
    assert!(seen.borrow().is_empty());

    run(env, "Promise.reject('dropped'); 1").unwrap();
    assert_eq!(*seen.borrow(), vec!["dropped"]);
}

#[test]
fn test_rejection_from_reaction_is_reported() {
    let t = create_test_env();
    let env = &t.env;
    let seen = track_rejections(env);

    run(env, "Promise.resolve(1).then(() => { throw 'later'; }); 1").unwrap();
    assert_eq!(*seen.borrow(), vec!["later"]);
}

#[test]
fn test_rejections_reported_in_order() {
    let t = create_test_env();
    let env = &t.env;
    let seen = track_rejections(env);

    run(env, "Promise.reject(1); Promise.reject(2); Promise.reject(3); 0").unwrap();
    assert_eq!(*seen.borrow(), vec!["1", "2", "3"]);
}

#[test]
fn test_rejections_ignored_without_callback() {
    let t = create_test_env();
    let env = &t.env;
    run(env, "Promise.reject('quiet'); 1").unwrap();
    assert!(!env.is_exception_pending());
}

#[test]
fn test_rejected_deferred_without_handler_is_reported() {
    let t = create_test_env();
    let env = &t.env;
    let seen = track_rejections(env);
    let (deferred, _promise) = env.create_promise().unwrap();
    let reason = env.create_string_utf8("host").unwrap();
    env.reject_deferred(deferred, reason).unwrap();

    assert_eq!(*seen.borrow(), vec!["host"]);
}
