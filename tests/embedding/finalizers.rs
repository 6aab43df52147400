// Tests for wrap, finalizers, externals and type tags

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use super::create_test_env;
use jsembed::{Env, Error, FinalizeCallback, TypeTag, ValueType};

type Log = Rc<RefCell<Vec<String>>>;

/// A finalizer that records the `String` payload it receives.
fn recording(log: &Log) -> FinalizeCallback {
    let log = log.clone();
    Box::new(move |_: &Env, data: Rc<dyn Any>| {
        if let Ok(text) = data.downcast::<String>() {
            log.borrow_mut().push(text.to_string());
        }
    })
}

fn payload(text: &str) -> Rc<dyn Any> {
    Rc::new(text.to_string())
}

// ═══════════════════════════════════════════════════════════════════════════
// Wrap
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_wrap_finalizer_runs_on_release() {
    let t = create_test_env();
    let env = &t.env;
    let log: Log = Rc::default();

    let scope = env.open_handle_scope().unwrap();
    let object = env.create_object().unwrap();
    env.wrap(object, payload("native"), Some(recording(&log))).unwrap();
    assert!(log.borrow().is_empty());
    env.close_handle_scope(scope).unwrap();

    assert_eq!(*log.borrow(), vec!["native"]);
}

#[test]
fn test_unwrap_returns_wrapped_data() {
    let t = create_test_env();
    let env = &t.env;
    let object = env.create_object().unwrap();
    env.wrap(object, Rc::new(7u32), None).unwrap();

    let data = env.unwrap(object).unwrap();
    assert_eq!(data.downcast_ref::<u32>(), Some(&7));
    assert!(env.is_wrapped(object).unwrap());
}

#[test]
fn test_wrap_twice_fails() {
    let t = create_test_env();
    let env = &t.env;
    let object = env.create_object().unwrap();
    env.wrap(object, payload("first"), None).unwrap();
    assert_eq!(env.wrap(object, payload("second"), None), Err(Error::AlreadyWrapped));
}

#[test]
fn test_remove_wrap_skips_finalizer() {
    let t = create_test_env();
    let env = &t.env;
    let log: Log = Rc::default();

    let scope = env.open_handle_scope().unwrap();
    let object = env.create_object().unwrap();
    env.wrap(object, payload("detached"), Some(recording(&log))).unwrap();
    let data = env.remove_wrap(object).unwrap();
    assert_eq!(data.downcast_ref::<String>().map(String::as_str), Some("detached"));
    assert_eq!(env.unwrap(object).err(), Some(Error::NotWrapped));
    env.close_handle_scope(scope).unwrap();

    assert!(log.borrow().is_empty());
}

#[test]
fn test_wrap_primitive_is_type_mismatch() {
    let t = create_test_env();
    let env = &t.env;
    let number = env.create_int32(1).unwrap();
    assert!(matches!(
        env.wrap(number, payload("x"), None),
        Err(Error::TypeMismatch { .. })
    ));
}

// ═══════════════════════════════════════════════════════════════════════════
// Finalizers
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_finalizers_run_in_registration_order() {
    let t = create_test_env();
    let env = &t.env;
    let log: Log = Rc::default();

    let scope = env.open_handle_scope().unwrap();
    let object = env.create_object().unwrap();
    for name in ["first", "second", "third"] {
        env.add_finalizer(object, payload(name), recording(&log)).unwrap();
    }
    env.close_handle_scope(scope).unwrap();

    assert_eq!(*log.borrow(), vec!["first", "second", "third"]);
}

#[test]
fn test_finalizer_waits_for_script_owner() {
    let t = create_test_env();
    let env = &t.env;
    let log: Log = Rc::default();

    let scope = env.open_handle_scope().unwrap();
    let object = env.create_object().unwrap();
    let global = env.get_global().unwrap();
    env.set_named_property(global, "holder", object).unwrap();
    env.add_finalizer(object, payload("held"), recording(&log)).unwrap();
    env.close_handle_scope(scope).unwrap();
    assert!(log.borrow().is_empty());

    super::run(env, "holder = null").unwrap();
    assert_eq!(*log.borrow(), vec!["held"]);
}

#[test]
fn test_cycle_is_finalized_by_collection() {
    let t = create_test_env_exposing_gc();
    let env = &t.env;
    let log: Log = Rc::default();

    let scope = env.open_handle_scope().unwrap();
    let a = env.create_object().unwrap();
    let b = env.create_object().unwrap();
    env.set_named_property(a, "peer", b).unwrap();
    env.set_named_property(b, "peer", a).unwrap();
    env.add_finalizer(a, payload("cycle"), recording(&log)).unwrap();
    env.close_handle_scope(scope).unwrap();
    assert!(log.borrow().is_empty());

    env.request_garbage_collection().unwrap();
    assert_eq!(*log.borrow(), vec!["cycle"]);
}

fn create_test_env_exposing_gc() -> super::TestEnv {
    super::create_test_env_with(jsembed::PlatformOptions {
        expose_garbage_collection: true,
        trace_garbage_collection: true,
    })
}

// ═══════════════════════════════════════════════════════════════════════════
// Externals
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_external_round_trips_data() {
    let t = create_test_env();
    let env = &t.env;
    let external = env.create_external(Rc::new(vec![1u8, 2, 3]), None).unwrap();

    assert_eq!(env.type_of(external).unwrap(), ValueType::External);
    assert!(env.is_external(external).unwrap());
    let data = env.get_value_external(external).unwrap();
    assert_eq!(data.downcast_ref::<Vec<u8>>(), Some(&vec![1, 2, 3]));
}

#[test]
fn test_external_finalizer_runs_on_release() {
    let t = create_test_env();
    let env = &t.env;
    let log: Log = Rc::default();

    let scope = env.open_handle_scope().unwrap();
    env.create_external(payload("external"), Some(recording(&log))).unwrap();
    env.close_handle_scope(scope).unwrap();

    assert_eq!(*log.borrow(), vec!["external"]);
}

#[test]
fn test_external_has_no_prototype() {
    let t = create_test_env();
    let env = &t.env;
    let external = env.create_external(payload("x"), None).unwrap();
    let prototype = env.get_prototype(external).unwrap();
    assert!(env.is_null(prototype).unwrap());

    let object = env.create_object().unwrap();
    assert!(!env.is_external(object).unwrap());
    assert!(env.get_value_external(object).is_err());
}

// ═══════════════════════════════════════════════════════════════════════════
// Type tags
// ═══════════════════════════════════════════════════════════════════════════

const FILE_TAG: TypeTag = TypeTag {
    lower: 0xdaf6_8c1e_54b0_2c3a,
    upper: 0x9c2e_2b8b_1f55_4f00,
};

const SOCKET_TAG: TypeTag = TypeTag {
    lower: 0x1111_2222_3333_4444,
    upper: 0x5555_6666_7777_8888,
};

#[test]
fn test_type_tag_matches_only_itself() {
    let t = create_test_env();
    let env = &t.env;
    let object = env.create_object().unwrap();
    assert!(!env.check_type_tag(object, FILE_TAG).unwrap());

    env.add_type_tag(object, FILE_TAG).unwrap();
    assert!(env.check_type_tag(object, FILE_TAG).unwrap());
    assert!(!env.check_type_tag(object, SOCKET_TAG).unwrap());
}

#[test]
fn test_second_type_tag_is_rejected() {
    let t = create_test_env();
    let env = &t.env;
    let object = env.create_object().unwrap();
    env.add_type_tag(object, FILE_TAG).unwrap();

    assert_eq!(env.add_type_tag(object, SOCKET_TAG), Err(Error::AlreadyTagged));
    assert!(env.is_exception_pending());
    assert_eq!(super::take_error_message(env), "Object is already type tagged");
    assert!(env.check_type_tag(object, FILE_TAG).unwrap());
}
