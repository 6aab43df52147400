//! Source text modules.

use std::ffi::{c_char, c_void};
use std::rc::Rc;

use crate::env::{Env, Module, Value};
use crate::error::Error;

use super::{JSEMBED_NO_VALUE, JsembedEnv, NULL_ARGUMENT, c_str, env_from};

/// Resolve `specifier` imported by `referrer`. Returns a module handle, or
/// `JSEMBED_NO_VALUE` after throwing to fail the link.
pub type JsembedResolveFn = extern "C" fn(
    env: *mut JsembedEnv,
    specifier: u64,
    assertions: u64,
    referrer: u64,
    data: *mut c_void,
) -> u64;

/// Compile `source` as a module named `name`. A syntax error is left pending.
#[unsafe(no_mangle)]
pub extern "C" fn jsembed_create_module(env: *mut JsembedEnv, name: *const c_char, source: u64, out: *mut u64) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let name = match c_str(name) {
        Ok(Some(name)) => name,
        Ok(None) => return NULL_ARGUMENT,
        Err(error) => return env.fail(error),
    };
    let result = env
        .env
        .create_module(name, Value::from_bits(source), None)
        .map(Module::to_bits);
    env.finish(result, out)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_delete_module(env: *mut JsembedEnv, module: u64) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env.env.delete_module(Module::from_bits(module));
    env.finish_unit(result)
}

/// Link `module`, calling `resolve` for each static import.
#[unsafe(no_mangle)]
pub extern "C" fn jsembed_instantiate_module(
    env: *mut JsembedEnv,
    module: u64,
    resolve: JsembedResolveFn,
    data: *mut c_void,
) -> i32 {
    let raw = env;
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let resolver = Rc::new(move |env: &Env, specifier: Value, assertions: Value, referrer: Module| {
        let bits = resolve(raw, specifier.to_bits(), assertions.to_bits(), referrer.to_bits(), data);
        if bits != JSEMBED_NO_VALUE {
            return Ok(Module::from_bits(bits));
        }
        if env.is_exception_pending() {
            Err(Error::PendingException)
        } else {
            Err(Error::InvalidArgument("module resolver returned no module".into()))
        }
    });
    let result = env.env.instantiate_module(Module::from_bits(module), resolver);
    env.finish_unit(result)
}

/// Evaluate `module`. `out` receives a promise for the evaluation outcome.
#[unsafe(no_mangle)]
pub extern "C" fn jsembed_run_module(env: *mut JsembedEnv, module: u64, out: *mut u64) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env.env.run_module(Module::from_bits(module)).map(Value::to_bits);
    env.finish(result, out)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_get_module_namespace(env: *mut JsembedEnv, module: u64, out: *mut u64) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env
        .env
        .get_module_namespace(Module::from_bits(module))
        .map(Value::to_bits);
    env.finish(result, out)
}
