//! C ABI for jsembed.
//!
//! Platforms and environments are opaque pointers. Values, scopes,
//! references, modules and deferreds are 64-bit handles.
//!
//! # Status codes
//!
//! Every function returning `int32_t` returns `0` on success and a negative
//! [`Status`] on failure. A failed call stores a message readable through
//! `jsembed_get_last_error_message` until the next failing call. When the
//! status is `-1` a script exception is pending; take it with
//! `jsembed_get_and_clear_last_exception`.
//!
//! # Thread Safety
//!
//! Not thread-safe. An environment and its platform belong to one thread.

mod function;
mod module;
mod scope;
mod value;

pub use function::*;
pub use module::*;
pub use scope::*;
pub use value::*;

use std::cell::RefCell;
use std::ffi::{CStr, CString, c_char, c_void};
use std::ptr;
use std::rc::Rc;

use crate::env::{Env, EnvOptions, Value};
use crate::error::{Error, Result, Status};
use crate::platform::{EventLoop, Platform, PlatformOptions, RunMode};

// ============================================================================
// Version
// ============================================================================

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");

/// Library version string, valid for the lifetime of the library.
#[unsafe(no_mangle)]
pub extern "C" fn jsembed_version() -> *const c_char {
    VERSION.as_ptr() as *const c_char
}

// ============================================================================
// Opaque Types
// ============================================================================

/// Handle value meaning "no value".
pub const JSEMBED_NO_VALUE: u64 = u64::MAX;

/// A platform bound to its own [`EventLoop`].
pub struct JsembedPlatform {
    pub(crate) platform: Platform,
    pub(crate) event_loop: Rc<EventLoop>,
}

/// An environment plus the last error message reported through it.
pub struct JsembedEnv {
    pub(crate) env: Env,
    pub(crate) last_error: RefCell<Option<CString>>,
}

impl JsembedEnv {
    pub(crate) fn set_error(&self, message: String) {
        *self.last_error.borrow_mut() = CString::new(message).ok();
    }

    /// Record `error` and return its status code.
    pub(crate) fn fail(&self, error: Error) -> i32 {
        self.set_error(error.to_string());
        error.status() as i32
    }

    /// Store `value` through `out` and return the status code.
    pub(crate) fn finish<T>(&self, result: Result<T>, out: *mut T) -> i32 {
        match result {
            Ok(value) => {
                // SAFETY: out is checked for null and points to caller-owned storage
                if let Some(slot) = unsafe { out.as_mut() } {
                    *slot = value;
                }
                Status::Ok as i32
            }
            Err(error) => self.fail(error),
        }
    }

    pub(crate) fn finish_unit(&self, result: Result<()>) -> i32 {
        match result {
            Ok(()) => Status::Ok as i32,
            Err(error) => self.fail(error),
        }
    }
}

/// Borrow an environment from a C pointer. Host callbacks re-enter with
/// the same pointer, so only shared borrows are ever handed out.
pub(crate) fn env_from<'a>(env: *mut JsembedEnv) -> Option<&'a JsembedEnv> {
    // SAFETY: callers pass pointers obtained from jsembed_create_env
    unsafe { env.as_ref() }
}

pub(crate) fn value_from(bits: u64) -> Option<Value> {
    (bits != JSEMBED_NO_VALUE).then(|| Value::from_bits(bits))
}

pub(crate) fn value_to(value: Option<Value>) -> u64 {
    value.map_or(JSEMBED_NO_VALUE, Value::to_bits)
}

/// Read a NUL-terminated UTF-8 string. Null reads as `None`.
pub(crate) fn c_str<'a>(s: *const c_char) -> std::result::Result<Option<&'a str>, Error> {
    if s.is_null() {
        return Ok(None);
    }
    // SAFETY: s is non-null and points to a NUL-terminated string
    unsafe { CStr::from_ptr(s) }
        .to_str()
        .map(Some)
        .map_err(|_| Error::InvalidArgument("string is not valid UTF-8".into()))
}

/// Collect `argc` handles from `argv`.
pub(crate) fn handles(argv: *const u64, argc: usize) -> Vec<Value> {
    if argv.is_null() || argc == 0 {
        return Vec::new();
    }
    // SAFETY: argv points to argc handles
    let raw = unsafe { std::slice::from_raw_parts(argv, argc) };
    raw.iter().map(|&bits| Value::from_bits(bits)).collect()
}

const NULL_ARGUMENT: i32 = Status::InvalidArgument as i32;

// ============================================================================
// Platform
// ============================================================================

/// Create a platform with its own event loop. `options_json` may be NULL.
#[unsafe(no_mangle)]
pub extern "C" fn jsembed_create_platform(options_json: *const c_char, out: *mut *mut JsembedPlatform) -> i32 {
    if out.is_null() {
        return NULL_ARGUMENT;
    }
    let options = match c_str(options_json) {
        Ok(Some(json)) => match serde_json::from_str::<PlatformOptions>(json) {
            Ok(options) => options,
            Err(_) => return NULL_ARGUMENT,
        },
        Ok(None) => PlatformOptions::default(),
        Err(error) => return error.status() as i32,
    };
    let event_loop = EventLoop::new();
    let platform = Platform::new(event_loop.clone(), options);
    // SAFETY: out checked above
    unsafe { *out = Box::into_raw(Box::new(JsembedPlatform { platform, event_loop })) };
    Status::Ok as i32
}

/// Free a platform. Environments created on it must be destroyed first.
#[unsafe(no_mangle)]
pub extern "C" fn jsembed_destroy_platform(platform: *mut JsembedPlatform) {
    if !platform.is_null() {
        // SAFETY: platform came from jsembed_create_platform
        drop(unsafe { Box::from_raw(platform) });
    }
}

/// Run the platform's loop. `mode`: 0 = until idle, 1 = once, 2 = no wait.
/// Returns whether the loop still has live handles.
#[unsafe(no_mangle)]
pub extern "C" fn jsembed_run_loop(platform: *mut JsembedPlatform, mode: i32) -> bool {
    // SAFETY: platform came from jsembed_create_platform
    let Some(platform) = (unsafe { platform.as_ref() }) else {
        return false;
    };
    let mode = match mode {
        1 => RunMode::Once,
        2 => RunMode::NoWait,
        _ => RunMode::Default,
    };
    platform.event_loop.run(mode)
}

// ============================================================================
// Environment
// ============================================================================

/// Create an environment. `options_json` may be NULL.
#[unsafe(no_mangle)]
pub extern "C" fn jsembed_create_env(
    platform: *mut JsembedPlatform,
    options_json: *const c_char,
    out: *mut *mut JsembedEnv,
) -> i32 {
    // SAFETY: platform came from jsembed_create_platform
    let Some(platform) = (unsafe { platform.as_ref() }) else {
        return NULL_ARGUMENT;
    };
    if out.is_null() {
        return NULL_ARGUMENT;
    }
    let options = match c_str(options_json) {
        Ok(Some(json)) => match EnvOptions::from_json(json) {
            Ok(options) => options,
            Err(error) => return error.status() as i32,
        },
        Ok(None) => EnvOptions::default(),
        Err(error) => return error.status() as i32,
    };
    match Env::create(&platform.platform, options) {
        Ok(env) => {
            let boxed = Box::new(JsembedEnv {
                env,
                last_error: RefCell::new(None),
            });
            // SAFETY: out checked above
            unsafe { *out = Box::into_raw(boxed) };
            Status::Ok as i32
        }
        Err(error) => error.status() as i32,
    }
}

/// Run teardown callbacks, release the environment and free it.
#[unsafe(no_mangle)]
pub extern "C" fn jsembed_destroy_env(env: *mut JsembedEnv) -> i32 {
    if env.is_null() {
        return NULL_ARGUMENT;
    }
    // SAFETY: env came from jsembed_create_env and is not used after this call
    let boxed = unsafe { Box::from_raw(env) };
    match boxed.env.destroy() {
        Ok(()) => Status::Ok as i32,
        Err(error) => error.status() as i32,
    }
}

/// Message of the last failed call, or NULL. Valid until the next failure.
#[unsafe(no_mangle)]
pub extern "C" fn jsembed_get_last_error_message(env: *mut JsembedEnv) -> *const c_char {
    env_from(env).map_or(ptr::null(), |e| {
        e.last_error.borrow().as_ref().map_or(ptr::null(), |s| s.as_ptr())
    })
}

pub type JsembedTeardownFn = extern "C" fn(data: *mut c_void);

/// Register a callback run when the environment is destroyed.
#[unsafe(no_mangle)]
pub extern "C" fn jsembed_add_teardown_callback(
    env: *mut JsembedEnv,
    callback: JsembedTeardownFn,
    data: *mut c_void,
    out: *mut u64,
) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env
        .env
        .add_teardown_callback(move |_| callback(data))
        .map(|id| id.to_bits());
    env.finish(result, out)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_remove_teardown_callback(env: *mut JsembedEnv, id: u64) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env.env.remove_teardown_callback(crate::env::TeardownId::from_bits(id));
    env.finish_unit(result)
}

/// Run a full collection if the platform exposes it.
#[unsafe(no_mangle)]
pub extern "C" fn jsembed_request_garbage_collection(env: *mut JsembedEnv) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env.env.request_garbage_collection();
    env.finish_unit(result)
}
