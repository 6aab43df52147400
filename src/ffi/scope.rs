//! Handle scopes and persistent references.

use crate::env::{EscapableHandleScope, HandleScope, Reference, Value};

use super::{JsembedEnv, NULL_ARGUMENT, env_from, value_to};

// ============================================================================
// Handle Scopes
// ============================================================================

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_open_handle_scope(env: *mut JsembedEnv, out: *mut u64) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env.env.open_handle_scope().map(HandleScope::to_bits);
    env.finish(result, out)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_close_handle_scope(env: *mut JsembedEnv, scope: u64) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env.env.close_handle_scope(HandleScope::from_bits(scope));
    env.finish_unit(result)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_open_escapable_handle_scope(env: *mut JsembedEnv, out: *mut u64) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env
        .env
        .open_escapable_handle_scope()
        .map(EscapableHandleScope::to_bits);
    env.finish(result, out)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_close_escapable_handle_scope(env: *mut JsembedEnv, scope: u64) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env
        .env
        .close_escapable_handle_scope(EscapableHandleScope::from_bits(scope));
    env.finish_unit(result)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_escape_handle(env: *mut JsembedEnv, scope: u64, escapee: u64, out: *mut u64) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env
        .env
        .escape_handle(EscapableHandleScope::from_bits(scope), Value::from_bits(escapee))
        .map(Value::to_bits);
    env.finish(result, out)
}

// ============================================================================
// References
// ============================================================================

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_create_reference(env: *mut JsembedEnv, value: u64, count: u32, out: *mut u64) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env
        .env
        .create_reference(Value::from_bits(value), count)
        .map(Reference::to_bits);
    env.finish(result, out)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_delete_reference(env: *mut JsembedEnv, reference: u64) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env.env.delete_reference(Reference::from_bits(reference));
    env.finish_unit(result)
}

/// Increment a reference. `out` (may be NULL) receives the new count.
#[unsafe(no_mangle)]
pub extern "C" fn jsembed_reference_ref(env: *mut JsembedEnv, reference: u64, out: *mut u32) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env.env.reference_ref(Reference::from_bits(reference));
    env.finish(result, out)
}

/// Decrement a reference. A reference at zero stays at zero.
#[unsafe(no_mangle)]
pub extern "C" fn jsembed_reference_unref(env: *mut JsembedEnv, reference: u64, out: *mut u32) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env.env.reference_unref(Reference::from_bits(reference));
    env.finish(result, out)
}

/// `out` receives `JSEMBED_NO_VALUE` once a weakly held object is gone.
#[unsafe(no_mangle)]
pub extern "C" fn jsembed_get_reference_value(env: *mut JsembedEnv, reference: u64, out: *mut u64) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env
        .env
        .get_reference_value(Reference::from_bits(reference))
        .map(value_to);
    env.finish(result, out)
}
