// Tests for persistent references and weak/strong transitions

use super::create_test_env;
use jsembed::Error;

#[test]
fn test_strong_reference_outlives_scope() {
    let t = create_test_env();
    let env = &t.env;
    let scope = env.open_handle_scope().unwrap();
    let object = env.create_object().unwrap();
    let one = env.create_int32(1).unwrap();
    env.set_named_property(object, "x", one).unwrap();
    let reference = env.create_reference(object, 1).unwrap();
    env.close_handle_scope(scope).unwrap();

    let value = env.get_reference_value(reference).unwrap().unwrap();
    let x = env.get_named_property(value, "x").unwrap();
    assert_eq!(env.get_value_int32(x).unwrap(), 1);
}

#[test]
fn test_weak_reference_empties_when_object_released() {
    let t = create_test_env();
    let env = &t.env;
    let scope = env.open_handle_scope().unwrap();
    let object = env.create_object().unwrap();
    let reference = env.create_reference(object, 0).unwrap();
    assert!(env.get_reference_value(reference).unwrap().is_some());
    env.close_handle_scope(scope).unwrap();

    assert_eq!(env.get_reference_value(reference).unwrap(), None);
    assert_eq!(env.reference_count(reference).unwrap(), 0);
}

#[test]
fn test_weak_reference_follows_script_owner() {
    let t = create_test_env();
    let env = &t.env;
    let scope = env.open_handle_scope().unwrap();
    let object = env.create_object().unwrap();
    let global = env.get_global().unwrap();
    env.set_named_property(global, "kept", object).unwrap();
    let reference = env.create_reference(object, 0).unwrap();
    env.close_handle_scope(scope).unwrap();

    assert!(env.get_reference_value(reference).unwrap().is_some());
    super::run(env, "kept = undefined").unwrap();
    assert_eq!(env.get_reference_value(reference).unwrap(), None);
}

#[test]
fn test_ref_promotes_and_unref_demotes() {
    let t = create_test_env();
    let env = &t.env;
    let scope = env.open_handle_scope().unwrap();
    let object = env.create_object().unwrap();
    let reference = env.create_reference(object, 0).unwrap();
    assert_eq!(env.reference_ref(reference).unwrap(), 1);
    assert_eq!(env.reference_ref(reference).unwrap(), 2);
    env.close_handle_scope(scope).unwrap();

    assert_eq!(env.reference_unref(reference).unwrap(), 1);
    assert!(env.get_reference_value(reference).unwrap().is_some());

    assert_eq!(env.reference_unref(reference).unwrap(), 0);
    assert_eq!(env.get_reference_value(reference).unwrap(), None);
}

#[test]
fn test_unref_at_zero_stays_at_zero() {
    let t = create_test_env();
    let env = &t.env;
    let object = env.create_object().unwrap();
    let reference = env.create_reference(object, 0).unwrap();
    assert_eq!(env.reference_unref(reference).unwrap(), 0);
    assert_eq!(env.reference_count(reference).unwrap(), 0);
    assert!(env.get_reference_value(reference).unwrap().is_some());
}

#[test]
fn test_primitive_reference_is_never_weak() {
    let t = create_test_env();
    let env = &t.env;
    let scope = env.open_handle_scope().unwrap();
    let text = env.create_string_utf8("kept").unwrap();
    let reference = env.create_reference(text, 0).unwrap();
    env.close_handle_scope(scope).unwrap();

    let value = env.get_reference_value(reference).unwrap().unwrap();
    assert_eq!(env.get_value_string_utf8(value).unwrap(), "kept");
}

#[test]
fn test_deleted_reference_is_invalid() {
    let t = create_test_env();
    let env = &t.env;
    let object = env.create_object().unwrap();
    let reference = env.create_reference(object, 1).unwrap();
    env.delete_reference(reference).unwrap();

    assert_eq!(env.reference_ref(reference), Err(Error::InvalidHandle("reference")));
    assert_eq!(env.delete_reference(reference), Err(Error::InvalidHandle("reference")));
}

#[test]
fn test_weak_marker_is_invisible_to_script() {
    let t = create_test_env();
    let env = &t.env;
    let object = env.create_object().unwrap();
    let global = env.get_global().unwrap();
    env.set_named_property(global, "target", object).unwrap();
    env.create_reference(object, 0).unwrap();

    assert_eq!(super::eval_int(env, "Object.keys(target).length"), 0);
}

#[test]
fn test_ref_then_unref_restores_initial_count() {
    let t = create_test_env();
    let env = &t.env;
    let scope = env.open_handle_scope().unwrap();
    let object = env.create_object().unwrap();
    let reference = env.create_reference(object, 3).unwrap();
    env.close_handle_scope(scope).unwrap();

    for expected in 4..=8 {
        assert_eq!(env.reference_ref(reference).unwrap(), expected);
    }
    for expected in (3..=7).rev() {
        assert_eq!(env.reference_unref(reference).unwrap(), expected);
    }
    assert_eq!(env.reference_count(reference).unwrap(), 3);
    assert!(env.get_reference_value(reference).unwrap().is_some());
}

#[test]
fn test_ref_past_the_maximum_count_is_rejected() {
    let t = create_test_env();
    let env = &t.env;
    let object = env.create_object().unwrap();
    let reference = env.create_reference(object, u32::MAX).unwrap();
    assert!(matches!(env.reference_ref(reference), Err(Error::InvalidArgument(_))));
    assert_eq!(env.reference_count(reference).unwrap(), u32::MAX);
    assert_eq!(env.reference_unref(reference).unwrap(), u32::MAX - 1);
}
