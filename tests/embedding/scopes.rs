// Tests for handle scopes and escapable scopes

use super::create_test_env;
use jsembed::{Error, HandleScope, ValueType};

#[test]
fn test_closing_scope_releases_handles() {
    let t = create_test_env();
    let env = &t.env;
    let before = env.live_handles();

    let scope = env.open_handle_scope().unwrap();
    for text in ["a", "b", "c"] {
        env.create_string_utf8(text).unwrap();
    }
    assert_eq!(env.live_handles(), before + 3);

    env.close_handle_scope(scope).unwrap();
    assert_eq!(env.live_handles(), before);
}

#[test]
fn test_handle_is_invalid_after_its_scope_closes() {
    let t = create_test_env();
    let env = &t.env;
    let scope = env.open_handle_scope().unwrap();
    let value = env.create_object().unwrap();
    env.close_handle_scope(scope).unwrap();

    assert_eq!(env.type_of(value), Err(Error::InvalidHandle("value")));
}

#[test]
fn test_scopes_close_innermost_first() {
    let t = create_test_env();
    let env = &t.env;
    let outer = env.open_handle_scope().unwrap();
    let inner = env.open_handle_scope().unwrap();
    let depth = env.handle_scope_depth();

    assert_eq!(env.close_handle_scope(outer), Err(Error::ScopeMismatch));
    assert_eq!(env.handle_scope_depth(), depth);

    env.close_handle_scope(inner).unwrap();
    env.close_handle_scope(outer).unwrap();
    assert_eq!(env.handle_scope_depth(), depth - 2);
}

#[test]
fn test_root_scope_cannot_be_closed() {
    let t = create_test_env();
    let env = &t.env;
    assert_eq!(env.handle_scope_depth(), 1);
    assert_eq!(
        env.close_handle_scope(HandleScope::from_bits(0)),
        Err(Error::ScopeMismatch)
    );
}

#[test]
fn test_escaped_value_survives_in_parent() {
    let t = create_test_env();
    let env = &t.env;
    let outer = env.open_handle_scope().unwrap();

    let scope = env.open_escapable_handle_scope().unwrap();
    let object = env.create_object().unwrap();
    let answer = env.create_int32(42).unwrap();
    env.set_named_property(object, "answer", answer).unwrap();
    let escaped = env.escape_handle(scope, object).unwrap();
    env.close_escapable_handle_scope(scope).unwrap();

    assert_eq!(env.type_of(escaped).unwrap(), ValueType::Object);
    let answer = env.get_named_property(escaped, "answer").unwrap();
    assert_eq!(env.get_value_int32(answer).unwrap(), 42);

    env.close_handle_scope(outer).unwrap();
    assert!(env.type_of(escaped).is_err());
}

#[test]
fn test_escape_is_allowed_once() {
    let t = create_test_env();
    let env = &t.env;
    let scope = env.open_escapable_handle_scope().unwrap();
    let a = env.create_int32(1).unwrap();
    let b = env.create_int32(2).unwrap();

    env.escape_handle(scope, a).unwrap();
    assert_eq!(env.escape_handle(scope, b), Err(Error::AlreadyEscaped));
    env.close_escapable_handle_scope(scope).unwrap();
}

#[test]
fn test_escape_through_plain_scope_is_rejected() {
    let t = create_test_env();
    let env = &t.env;
    let scope = env.open_handle_scope().unwrap();
    let value = env.create_int32(1).unwrap();
    let fake = jsembed::EscapableHandleScope::from_bits(scope.to_bits());

    assert_eq!(env.escape_handle(fake, value), Err(Error::InvalidHandle("handle scope")));
    env.close_handle_scope(scope).unwrap();
}

#[test]
fn test_callback_scope_is_closed_after_call() {
    let t = create_test_env();
    let env = &t.env;
    let function = env
        .create_function("leaky", |env, _| {
            // Left open on purpose: the trampoline closes it.
            env.open_handle_scope()?;
            env.create_string_utf8("temporary")?;
            Ok(None)
        })
        .unwrap();
    let depth = env.handle_scope_depth();
    let handles = env.live_handles();

    let global = env.get_global().unwrap();
    env.call_function(global, function, &[]).unwrap();

    assert_eq!(env.handle_scope_depth(), depth);
    // Only the call's result was added to the current scope.
    assert_eq!(env.live_handles(), handles + 1);
}
