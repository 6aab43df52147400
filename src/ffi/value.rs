//! Values, properties, scripts and exceptions.

use std::ffi::c_char;

use crate::env::{Value, ValueType};
use crate::error::Status;

use super::{JsembedEnv, NULL_ARGUMENT, c_str, env_from};

// ============================================================================
// Value Types
// ============================================================================

/// Result of `jsembed_typeof`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsembedValueType {
    Undefined = 0,
    Null = 1,
    Boolean = 2,
    Number = 3,
    String = 4,
    Symbol = 5,
    Object = 6,
    Function = 7,
    External = 8,
    BigInt = 9,
}

impl From<ValueType> for JsembedValueType {
    fn from(t: ValueType) -> Self {
        match t {
            ValueType::Undefined => JsembedValueType::Undefined,
            ValueType::Null => JsembedValueType::Null,
            ValueType::Boolean => JsembedValueType::Boolean,
            ValueType::Number => JsembedValueType::Number,
            ValueType::String => JsembedValueType::String,
            ValueType::Symbol => JsembedValueType::Symbol,
            ValueType::Object => JsembedValueType::Object,
            ValueType::Function => JsembedValueType::Function,
            ValueType::External => JsembedValueType::External,
            ValueType::BigInt => JsembedValueType::BigInt,
        }
    }
}

// ============================================================================
// Creation
// ============================================================================

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_get_undefined(env: *mut JsembedEnv, out: *mut u64) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env.env.get_undefined().map(Value::to_bits);
    env.finish(result, out)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_get_null(env: *mut JsembedEnv, out: *mut u64) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env.env.get_null().map(Value::to_bits);
    env.finish(result, out)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_get_boolean(env: *mut JsembedEnv, value: bool, out: *mut u64) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env.env.get_boolean(value).map(Value::to_bits);
    env.finish(result, out)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_create_int32(env: *mut JsembedEnv, value: i32, out: *mut u64) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env.env.create_int32(value).map(Value::to_bits);
    env.finish(result, out)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_create_double(env: *mut JsembedEnv, value: f64, out: *mut u64) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env.env.create_double(value).map(Value::to_bits);
    env.finish(result, out)
}

/// Create a string from `len` bytes of UTF-8. Invalid sequences are replaced.
#[unsafe(no_mangle)]
pub extern "C" fn jsembed_create_string_utf8(
    env: *mut JsembedEnv,
    data: *const c_char,
    len: usize,
    out: *mut u64,
) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let bytes: &[u8] = if data.is_null() || len == 0 {
        &[]
    } else {
        // SAFETY: data points to len readable bytes
        unsafe { std::slice::from_raw_parts(data as *const u8, len) }
    };
    let text = String::from_utf8_lossy(bytes);
    let result = env.env.create_string_utf8(&text).map(Value::to_bits);
    env.finish(result, out)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_create_object(env: *mut JsembedEnv, out: *mut u64) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env.env.create_object().map(Value::to_bits);
    env.finish(result, out)
}

// ============================================================================
// Reading
// ============================================================================

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_typeof(env: *mut JsembedEnv, value: u64, out: *mut JsembedValueType) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env.env.type_of(Value::from_bits(value)).map(JsembedValueType::from);
    env.finish(result, out)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_get_value_bool(env: *mut JsembedEnv, value: u64, out: *mut bool) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env.env.get_value_bool(Value::from_bits(value));
    env.finish(result, out)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_get_value_int32(env: *mut JsembedEnv, value: u64, out: *mut i32) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env.env.get_value_int32(Value::from_bits(value));
    env.finish(result, out)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_get_value_double(env: *mut JsembedEnv, value: u64, out: *mut f64) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env.env.get_value_double(Value::from_bits(value));
    env.finish(result, out)
}

/// Copy a string as UTF-8 into `buf`, truncated to `bufsize - 1` bytes and
/// NUL-terminated. With a NULL `buf`, `out_len` receives the full length.
#[unsafe(no_mangle)]
pub extern "C" fn jsembed_get_value_string_utf8(
    env: *mut JsembedEnv,
    value: u64,
    buf: *mut c_char,
    bufsize: usize,
    out_len: *mut usize,
) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let text = match env.env.get_value_string_utf8(Value::from_bits(value)) {
        Ok(text) => text,
        Err(error) => return env.fail(error),
    };
    let bytes = text.as_bytes();
    let written = if buf.is_null() || bufsize == 0 {
        bytes.len()
    } else {
        let mut n = bytes.len().min(bufsize - 1);
        while n > 0 && !text.is_char_boundary(n) {
            n -= 1;
        }
        // SAFETY: buf points to bufsize writable bytes and n < bufsize
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), buf as *mut u8, n);
            *buf.add(n) = 0;
        }
        n
    };
    // SAFETY: out_len is checked for null
    if let Some(slot) = unsafe { out_len.as_mut() } {
        *slot = written;
    }
    Status::Ok as i32
}

// ============================================================================
// Properties and globals
// ============================================================================

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_get_global(env: *mut JsembedEnv, out: *mut u64) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env.env.get_global().map(Value::to_bits);
    env.finish(result, out)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_get_named_property(
    env: *mut JsembedEnv,
    object: u64,
    name: *const c_char,
    out: *mut u64,
) -> i32 {
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
        .get_named_property(Value::from_bits(object), name)
        .map(Value::to_bits);
    env.finish(result, out)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_set_named_property(env: *mut JsembedEnv, object: u64, name: *const c_char, value: u64) -> i32 {
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
        .set_named_property(Value::from_bits(object), name, Value::from_bits(value));
    env.finish_unit(result)
}

// ============================================================================
// Scripts
// ============================================================================

/// Evaluate the string `source` as a classic script named `file`.
#[unsafe(no_mangle)]
pub extern "C" fn jsembed_run_script(env: *mut JsembedEnv, file: *const c_char, source: u64, out: *mut u64) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let file = match c_str(file) {
        Ok(file) => file.unwrap_or("<anonymous>"),
        Err(error) => return env.fail(error),
    };
    let result = env
        .env
        .run_script(file, Value::from_bits(source))
        .map(Value::to_bits);
    env.finish(result, out)
}

// ============================================================================
// Exceptions
// ============================================================================

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_throw(env: *mut JsembedEnv, error: u64) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env.env.throw(Value::from_bits(error));
    env.finish_unit(result)
}

/// Leave an `Error` with `message` (and `code`, if not NULL) pending.
#[unsafe(no_mangle)]
pub extern "C" fn jsembed_throw_error(env: *mut JsembedEnv, code: *const c_char, message: *const c_char) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let (code, message) = match (c_str(code), c_str(message)) {
        (Ok(code), Ok(message)) => (code, message.unwrap_or("")),
        (Err(error), _) | (_, Err(error)) => return env.fail(error),
    };
    let result = env.env.throw_error(code, message);
    env.finish_unit(result)
}

#[unsafe(no_mangle)]
pub extern "C" fn jsembed_is_exception_pending(env: *mut JsembedEnv) -> bool {
    env_from(env).is_some_and(|env| env.env.is_exception_pending())
}

/// Take the pending exception; `undefined` when none is pending.
#[unsafe(no_mangle)]
pub extern "C" fn jsembed_get_and_clear_last_exception(env: *mut JsembedEnv, out: *mut u64) -> i32 {
    let Some(env) = env_from(env) else {
        return NULL_ARGUMENT;
    };
    let result = env.env.get_and_clear_last_exception().map(Value::to_bits);
    env.finish(result, out)
}
