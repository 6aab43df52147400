// Tests for the pending-exception slot and uncaught-exception routing

use std::cell::RefCell;
use std::rc::Rc;

use super::{create_test_env, eval_int, run, take_error_message};
use jsembed::Error;

#[test]
fn test_script_throw_leaves_exception_pending() {
    let t = create_test_env();
    let env = &t.env;
    assert_eq!(run(env, "throw new TypeError('bad type')"), Err(Error::PendingException));
    assert!(env.is_exception_pending());
    assert_eq!(take_error_message(env), "bad type");
    assert!(!env.is_exception_pending());
}

#[test]
fn test_pending_exception_blocks_script_entry() {
    let t = create_test_env();
    let env = &t.env;
    run(env, "throw 1").unwrap_err();
    assert_eq!(run(env, "2"), Err(Error::PendingException));

    let thrown = env.get_and_clear_last_exception().unwrap();
    assert_eq!(env.get_value_int32(thrown).unwrap(), 1);
    assert_eq!(eval_int(env, "2"), 2);
}

#[test]
fn test_clear_without_exception_is_undefined() {
    let t = create_test_env();
    let env = &t.env;
    let value = env.get_and_clear_last_exception().unwrap();
    assert!(env.is_undefined(value).unwrap());
}

#[test]
fn test_host_throw_with_code() {
    let t = create_test_env();
    let env = &t.env;
    env.throw_type_error(Some("ERR_INVALID_ARG_TYPE"), "expected a string").unwrap();

    let error = env.get_and_clear_last_exception().unwrap();
    let code = env.get_named_property(error, "code").unwrap();
    assert_eq!(env.get_value_string_utf8(code).unwrap(), "ERR_INVALID_ARG_TYPE");
    let name = env.get_named_property(error, "name").unwrap();
    assert_eq!(env.get_value_string_utf8(name).unwrap(), "TypeError");
}

#[test]
fn test_throw_arbitrary_value() {
    let t = create_test_env();
    let env = &t.env;
    let value = env.create_string_utf8("plain").unwrap();
    env.throw(value).unwrap();

    let thrown = env.get_and_clear_last_exception().unwrap();
    assert_eq!(env.get_value_string_utf8(thrown).unwrap(), "plain");
}

#[test]
fn test_uncaught_handler_receives_escaping_error() {
    let t = create_test_env();
    let env = &t.env;
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    env.on_uncaught_exception(move |env, error| {
        let message = env.get_named_property(error, "message").unwrap();
        sink.borrow_mut().push(env.get_value_string_utf8(message).unwrap());
    });

    assert_eq!(run(env, "throw new Error('escaped')"), Err(Error::UncaughtException));
    assert_eq!(*seen.borrow(), vec!["escaped"]);
    assert!(!env.is_exception_pending());
}

#[test]
fn test_nested_failure_stays_pending_for_caller() {
    let t = create_test_env();
    let env = &t.env;
    let escaped = Rc::new(RefCell::new(0));
    let sink = escaped.clone();
    env.on_uncaught_exception(move |_, _| *sink.borrow_mut() += 1);

    let inner = env
        .create_function("inner", |env, _| {
            let source = env.create_string_utf8("throw new Error('inner')")?;
            match env.run_script("inner.js", source) {
                Err(Error::PendingException) => {
                    // Swallow it: the outer script never sees the failure.
                    env.get_and_clear_last_exception()?;
                    env.create_int32(7).map(Some)
                }
                other => other.map(Some),
            }
        })
        .unwrap();
    let global = env.get_global().unwrap();
    env.set_named_property(global, "inner", inner).unwrap();

    assert_eq!(eval_int(env, "inner()"), 7);
    assert_eq!(*escaped.borrow(), 0);
}

#[test]
fn test_fatal_exception_goes_to_handler() {
    let t = create_test_env();
    let env = &t.env;
    let seen = Rc::new(RefCell::new(0));
    let sink = seen.clone();
    env.on_uncaught_exception(move |_, _| *sink.borrow_mut() += 1);

    let error = env.create_string_utf8("fatal").unwrap();
    env.fatal_exception(error).unwrap();
    assert_eq!(*seen.borrow(), 1);
}

#[test]
fn test_terminate_execution_is_permanent() {
    let t = create_test_env();
    let env = &t.env;
    env.terminate_execution().unwrap();

    assert!(run(env, "1").is_err());
    env.get_and_clear_last_exception().unwrap();
    assert!(run(env, "2").is_err());
}

#[test]
fn test_terminate_from_callback_is_uncatchable() {
    let t = create_test_env();
    let env = &t.env;
    let stop = env
        .create_function("stop", |env, _| {
            env.terminate_execution()?;
            Ok(None)
        })
        .unwrap();
    let global = env.get_global().unwrap();
    env.set_named_property(global, "stop", stop).unwrap();

    let result = run(
        env,
        "globalThis.caught = false; try { stop(); } catch (e) { caught = true; } 1",
    );
    assert_eq!(result, Err(Error::PendingException));
    env.get_and_clear_last_exception().unwrap();
    let caught = env.get_named_property(global, "caught").unwrap();
    assert!(!env.get_value_bool(caught).unwrap());
}

#[test]
fn test_unsupported_operation_leaves_error() {
    let t = create_test_env();
    let env = &t.env;
    assert_eq!(env.create_context(), Err(Error::Unsupported("create_context")));
    assert_eq!(take_error_message(env), "Unsupported operation");
    assert!(matches!(env.get_heap_statistics(), Err(Error::Unsupported(_))));
    env.get_and_clear_last_exception().unwrap();
}

#[test]
fn test_runaway_recursion_is_a_range_error() {
    // Default-sized thread stack, as hosts usually give worker threads.
    let messages = std::thread::spawn(|| {
        let t = create_test_env();
        let env = &t.env;
        run(env, "const f = n => n === 0 ? 0 : 1 + f(n - 1);").unwrap();

        let mut messages = Vec::new();
        for depth in [250, 100_000] {
            match run(env, &format!("f({depth})")) {
                Ok(value) => messages.push(env.get_value_int32(value).unwrap().to_string()),
                Err(_) => messages.push(take_error_message(env)),
            }
        }
        messages
    })
    .join()
    .unwrap();

    assert!(messages[0] == "250" || messages[0] == "Maximum call stack size exceeded");
    assert_eq!(messages[1], "Maximum call stack size exceeded");
}

#[test]
fn test_deeply_nested_source_is_a_syntax_error() {
    let t = create_test_env();
    let env = &t.env;
    let source = format!("{}1{}", "(".repeat(20_000), ")".repeat(20_000));
    assert_eq!(run(env, &source), Err(Error::PendingException));
    let error = env.get_and_clear_last_exception().unwrap();
    let name = env.get_named_property(error, "name").unwrap();
    assert_eq!(env.get_value_string_utf8(name).unwrap(), "SyntaxError");
}
