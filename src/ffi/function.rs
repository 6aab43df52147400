//! Host functions, calls, wrapped data and deferreds.

use std::any::Any;
use std::ffi::{c_char, c_void};
use std::rc::Rc;

use crate::env::{Deferred, Env, FinalizeCallback, TypeTag, Value};
use crate::error::{Error, Result};

use super::{JSEMBED_NO_VALUE, JsembedEnv, NULL_ARGUMENT, c_str, env_from, handles, value_from};

// ============================================================================
// Callback Types
// ============================================================================

/// Arguments handed to a [`JsembedFunctionFn`]. Handles are valid for the
/// duration of the call.
#[repr(C)]
pub struct JsembedCallbackInfo {
    pub argc: usize,
    pub argv: *const u64,
    pub receiver: u64,
    /// `JSEMBED_NO_VALUE` unless called through `new`.
    pub new_target: u64,
    pub data: *mut c_void,
}

/// A host function. Return `JSEMBED_NO_VALUE` for `undefined`; call
/// `jsembed_throw*` before returning to throw.
pub type JsembedFunctionFn = extern "C" fn(env: *mut JsembedEnv, info: *const JsembedCallbackInfo) -> u64;

/// Runs once when the object carrying `data` is released.
pub type JsembedFinalizeFn = extern "C" fn(env: *mut JsembedEnv, data: *mut c_void, hint: *mut c_void);

/// Host pointer stored as wrapped or external data.
struct ForeignData(*mut c_void);

fn foreign(data: Rc<dyn Any>) -> Result<*mut c_void> {
    data.downcast::<ForeignData>()
        .map(|d| d.0)
        .map_err(|_| Error::TypeMismatch { expected: "data created through the C API" })
}

fn finalizer(env: *mut JsembedEnv, finalize: Option<JsembedFinalizeFn>, hint: *mut c_void) -> Option<FinalizeCallback> {
    let finalize = finalize?;
    Some(Box::new(move |_: &Env, data: Rc<dyn Any>| {
        if let Ok(data) = foreign(data) {
            finalize(env, data, hint);
        }
    }))
}

// ============================================================================
// Functions
// ============================================================================

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_create_function(
    env: *mut JsembedEnv,
    name: *const c_char,
    callback: JsembedFunctionFn,
    data: *mut c_void,
    out: *mut u64,
) -> i32 {
    let raw = env;
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let name = match c_str(name) {
        Ok(name) => name.unwrap_or(""),
        Err(error) => return env.fail(error),
    };
    let result = env
        .env
        .create_function(name, move |_, info| {
            let argv: Vec<u64> = info.args().iter().map(|a| a.to_bits()).collect();
            let c_info = JsembedCallbackInfo {
                argc: argv.len(),
                argv: argv.as_ptr(),
                receiver: info.receiver().to_bits(),
                new_target: info.new_target().map_or(JSEMBED_NO_VALUE, Value::to_bits),
                data,
            };
            Ok(value_from(callback(raw, &c_info)))
        })
        .map(Value::to_bits);
    env.finish(result, out)
}

/// Call `function` with `receiver` as `this`.
#[unsafe(no_mangle)]
pub extern "C" fn jsembed_call_function(
    env: *mut JsembedEnv,
    receiver: u64,
    function: u64,
    argc: usize,
    argv: *const u64,
    out: *mut u64,
) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let args = handles(argv, argc);
    let result = env
        .env
        .call_function(Value::from_bits(receiver), Value::from_bits(function), &args)
        .map(Value::to_bits);
    env.finish(result, out)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_new_instance(
    env: *mut JsembedEnv,
    constructor: u64,
    argc: usize,
    argv: *const u64,
    out: *mut u64,
) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let args = handles(argv, argc);
    let result = env
        .env
        .new_instance(Value::from_bits(constructor), &args)
        .map(Value::to_bits);
    env.finish(result, out)
}

// ============================================================================
// Wrapped and external data
// ============================================================================

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_wrap(
    env: *mut JsembedEnv,
    object: u64,
    data: *mut c_void,
    finalize: Option<JsembedFinalizeFn>,
    hint: *mut c_void,
) -> i32 {
    let raw = env;
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env.env.wrap(
        Value::from_bits(object),
        Rc::new(ForeignData(data)),
        finalizer(raw, finalize, hint),
    );
    env.finish_unit(result)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_unwrap(env: *mut JsembedEnv, object: u64, out: *mut *mut c_void) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env.env.unwrap(Value::from_bits(object)).and_then(foreign);
    env.finish(result, out)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_remove_wrap(env: *mut JsembedEnv, object: u64, out: *mut *mut c_void) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env.env.remove_wrap(Value::from_bits(object)).and_then(foreign);
    env.finish(result, out)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_add_finalizer(
    env: *mut JsembedEnv,
    object: u64,
    data: *mut c_void,
    finalize: JsembedFinalizeFn,
    hint: *mut c_void,
) -> i32 {
    let raw = env;
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let Some(callback) = finalizer(raw, Some(finalize), hint) else {
        return NULL_ARGUMENT;
    };
    let result = env
        .env
        .add_finalizer(Value::from_bits(object), Rc::new(ForeignData(data)), callback);
    env.finish_unit(result)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_create_external(
    env: *mut JsembedEnv,
    data: *mut c_void,
    finalize: Option<JsembedFinalizeFn>,
    hint: *mut c_void,
    out: *mut u64,
) -> i32 {
    let raw = env;
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env
        .env
        .create_external(Rc::new(ForeignData(data)), finalizer(raw, finalize, hint))
        .map(Value::to_bits);
    env.finish(result, out)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_get_value_external(env: *mut JsembedEnv, value: u64, out: *mut *mut c_void) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env
        .env
        .get_value_external(Value::from_bits(value))
        .and_then(foreign);
    env.finish(result, out)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_add_type_tag(env: *mut JsembedEnv, object: u64, lower: u64, upper: u64) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env
        .env
        .add_type_tag(Value::from_bits(object), TypeTag { lower, upper });
    env.finish_unit(result)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_check_type_tag(env: *mut JsembedEnv, object: u64, lower: u64, upper: u64, out: *mut bool) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env
        .env
        .check_type_tag(Value::from_bits(object), TypeTag { lower, upper });
    env.finish(result, out)
}

// ============================================================================
// Promises
// ============================================================================

/// Create a promise. `deferred` receives the handle that settles it.
#[unsafe(no_mangle)]
pub extern "C" fn jsembed_create_promise(env: *mut JsembedEnv, deferred: *mut u64, promise: *mut u64) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    if deferred.is_null() {
        return NULL_ARGUMENT;
    }
    let result = env.env.create_promise().map(|(d, p)| {
        // SAFETY: deferred checked above
        unsafe { *deferred = d.to_bits() };
        p.to_bits()
    });
    env.finish(result, promise)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_resolve_deferred(env: *mut JsembedEnv, deferred: u64, resolution: u64) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env
        .env
        .resolve_deferred(Deferred::from_bits(deferred), Value::from_bits(resolution));
    env.finish_unit(result)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_reject_deferred(env: *mut JsembedEnv, deferred: u64, rejection: u64) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env
        .env
        .reject_deferred(Deferred::from_bits(deferred), Value::from_bits(rejection));
    env.finish_unit(result)
}
