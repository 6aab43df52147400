// Tests for the C ABI, driven from Rust through raw pointers

use std::cell::Cell;
use std::ffi::{CStr, c_char, c_void};
use std::ptr;

use jsembed::ffi::*;

struct Handles {
    platform: *mut JsembedPlatform,
    env: *mut JsembedEnv,
}

impl Handles {
    fn new() -> Self {
        let mut platform = ptr::null_mut();
        assert_eq!(jsembed_create_platform(ptr::null(), &mut platform), 0);
        let mut env = ptr::null_mut();
        assert_eq!(jsembed_create_env(platform, ptr::null(), &mut env), 0);
        Handles { platform, env }
    }

    fn string(&self, text: &str) -> u64 {
        let mut out = 0;
        assert_eq!(
            jsembed_create_string_utf8(self.env, text.as_ptr() as *const c_char, text.len(), &mut out),
            0
        );
        out
    }

    fn run(&self, source: &str) -> (i32, u64) {
        let source = self.string(source);
        let mut out = JSEMBED_NO_VALUE;
        let status = jsembed_run_script(self.env, c"test.js".as_ptr(), source, &mut out);
        (status, out)
    }

    fn int(&self, source: &str) -> i32 {
        let (status, value) = self.run(source);
        assert_eq!(status, 0);
        let mut n = 0;
        assert_eq!(jsembed_get_value_int32(self.env, value, &mut n), 0);
        n
    }

    fn read_string(&self, value: u64) -> String {
        let mut len = 0;
        assert_eq!(jsembed_get_value_string_utf8(self.env, value, ptr::null_mut(), 0, &mut len), 0);
        let mut buf = vec![0u8; len + 1];
        assert_eq!(
            jsembed_get_value_string_utf8(self.env, value, buf.as_mut_ptr() as *mut c_char, buf.len(), &mut len),
            0
        );
        buf.truncate(len);
        String::from_utf8(buf).unwrap()
    }

    fn last_error(&self) -> String {
        let message = jsembed_get_last_error_message(self.env);
        assert!(!message.is_null());
        unsafe { CStr::from_ptr(message) }.to_string_lossy().into_owned()
    }
}

impl Drop for Handles {
    fn drop(&mut self) {
        if !self.env.is_null() {
            jsembed_destroy_env(self.env);
        }
        jsembed_destroy_platform(self.platform);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Values and scripts
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_version_is_package_version() {
    let version = unsafe { CStr::from_ptr(jsembed_version()) };
    assert_eq!(version.to_str().unwrap(), env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_run_script_and_read_result() {
    let h = Handles::new();
    assert_eq!(h.int("const a = 20; a + 22"), 42);

    let (status, value) = h.run("'ab' + 'cd'");
    assert_eq!(status, 0);
    assert_eq!(h.read_string(value), "abcd");

    let mut kind = JsembedValueType::Undefined;
    assert_eq!(jsembed_typeof(h.env, value, &mut kind), 0);
    assert_eq!(kind, JsembedValueType::String);
}

#[test]
fn test_string_copy_truncates_on_char_boundary() {
    let h = Handles::new();
    let value = h.string("aé");
    let mut buf = [0x7fu8; 3];
    let mut len = 0;
    assert_eq!(
        jsembed_get_value_string_utf8(h.env, value, buf.as_mut_ptr() as *mut c_char, buf.len(), &mut len),
        0
    );
    assert_eq!(len, 1);
    assert_eq!(&buf[..2], b"a\0");
}

#[test]
fn test_named_properties_on_global() {
    let h = Handles::new();
    let mut global = 0;
    assert_eq!(jsembed_get_global(h.env, &mut global), 0);
    let mut number = 0;
    assert_eq!(jsembed_create_int32(h.env, 7, &mut number), 0);
    assert_eq!(jsembed_set_named_property(h.env, global, c"seven".as_ptr(), number), 0);
    assert_eq!(h.int("seven * 6"), 42);
}

#[test]
fn test_type_mismatch_reports_status_and_message() {
    let h = Handles::new();
    let value = h.string("not a number");
    let mut n = 0;
    let status = jsembed_get_value_int32(h.env, value, &mut n);
    assert_eq!(status, jsembed::Status::TypeMismatch as i32);
    assert!(h.last_error().contains("number"));
}

#[test]
fn test_null_env_is_rejected() {
    let mut out = 0;
    assert_eq!(
        jsembed_get_undefined(ptr::null_mut(), &mut out),
        jsembed::Status::InvalidArgument as i32
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// Exceptions
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_script_throw_is_pending() {
    let h = Handles::new();
    let (status, _) = h.run("throw new Error('boom')");
    assert_eq!(status, jsembed::Status::PendingException as i32);
    assert!(jsembed_is_exception_pending(h.env));

    let mut error = 0;
    assert_eq!(jsembed_get_and_clear_last_exception(h.env, &mut error), 0);
    let mut message = 0;
    assert_eq!(jsembed_get_named_property(h.env, error, c"message".as_ptr(), &mut message), 0);
    assert_eq!(h.read_string(message), "boom");
    assert!(!jsembed_is_exception_pending(h.env));
}

extern "C" fn throwing(env: *mut JsembedEnv, _info: *const JsembedCallbackInfo) -> u64 {
    jsembed_throw_error(env, c"ERR_HOST".as_ptr(), c"host failed".as_ptr());
    JSEMBED_NO_VALUE
}

#[test]
fn test_host_throw_reaches_script() {
    let h = Handles::new();
    let mut function = 0;
    assert_eq!(
        jsembed_create_function(h.env, c"fail".as_ptr(), throwing, ptr::null_mut(), &mut function),
        0
    );
    let mut global = 0;
    jsembed_get_global(h.env, &mut global);
    jsembed_set_named_property(h.env, global, c"fail".as_ptr(), function);

    let (status, value) = h.run("let c = ''; try { fail(); } catch (e) { c = e.code + ':' + e.message; } c");
    assert_eq!(status, 0);
    assert_eq!(h.read_string(value), "ERR_HOST:host failed");
}

// ═══════════════════════════════════════════════════════════════════════════
// Functions and data
// ═══════════════════════════════════════════════════════════════════════════

extern "C" fn sum(env: *mut JsembedEnv, info: *const JsembedCallbackInfo) -> u64 {
    let info = unsafe { &*info };
    let args = unsafe { std::slice::from_raw_parts(info.argv, info.argc) };
    let offset = unsafe { *(info.data as *const i32) };
    let mut total = offset;
    for &arg in args {
        let mut n = 0;
        jsembed_get_value_int32(env, arg, &mut n);
        total += n;
    }
    let mut out = JSEMBED_NO_VALUE;
    jsembed_create_int32(env, total, &mut out);
    out
}

#[test]
fn test_host_function_receives_args_and_data() {
    let h = Handles::new();
    let mut offset = 100i32;
    let mut function = 0;
    assert_eq!(
        jsembed_create_function(
            h.env,
            c"sum".as_ptr(),
            sum,
            &mut offset as *mut i32 as *mut c_void,
            &mut function
        ),
        0
    );
    let mut global = 0;
    jsembed_get_global(h.env, &mut global);
    jsembed_set_named_property(h.env, global, c"sum".as_ptr(), function);
    assert_eq!(h.int("sum(1, 2, 3)"), 106);

    let mut undefined = 0;
    jsembed_get_undefined(h.env, &mut undefined);
    let mut four = 0;
    jsembed_create_int32(h.env, 4, &mut four);
    let mut result = 0;
    assert_eq!(jsembed_call_function(h.env, undefined, function, 1, &four, &mut result), 0);
    let mut n = 0;
    jsembed_get_value_int32(h.env, result, &mut n);
    assert_eq!(n, 104);
}

thread_local! {
    static FINALIZED: Cell<usize> = const { Cell::new(0) };
}

extern "C" fn count_finalize(_env: *mut JsembedEnv, data: *mut c_void, _hint: *mut c_void) {
    FINALIZED.with(|f| f.set(f.get() + unsafe { *(data as *const usize) }));
}

#[test]
fn test_wrap_unwrap_and_finalize() {
    let h = Handles::new();
    let mut weight = 5usize;
    let data = &mut weight as *mut usize as *mut c_void;

    let mut scope = 0;
    assert_eq!(jsembed_open_handle_scope(h.env, &mut scope), 0);
    let mut object = 0;
    jsembed_create_object(h.env, &mut object);
    assert_eq!(jsembed_wrap(h.env, object, data, Some(count_finalize), ptr::null_mut()), 0);
    let mut back = ptr::null_mut();
    assert_eq!(jsembed_unwrap(h.env, object, &mut back), 0);
    assert_eq!(back, data);
    assert_eq!(
        jsembed_wrap(h.env, object, data, None, ptr::null_mut()),
        jsembed::Status::AlreadyWrapped as i32
    );
    assert_eq!(jsembed_close_handle_scope(h.env, scope), 0);

    assert_eq!(FINALIZED.with(Cell::get), 5);
}

#[test]
fn test_type_tags() {
    let h = Handles::new();
    let mut object = 0;
    jsembed_create_object(h.env, &mut object);
    assert_eq!(jsembed_add_type_tag(h.env, object, 1, 2), 0);
    let mut matches = false;
    assert_eq!(jsembed_check_type_tag(h.env, object, 1, 2, &mut matches), 0);
    assert!(matches);
    assert_eq!(jsembed_check_type_tag(h.env, object, 2, 1, &mut matches), 0);
    assert!(!matches);
}

// ═══════════════════════════════════════════════════════════════════════════
// Scopes and references
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_escape_and_reference() {
    let h = Handles::new();
    let mut outer = 0;
    jsembed_open_handle_scope(h.env, &mut outer);
    let mut inner = 0;
    jsembed_open_escapable_handle_scope(h.env, &mut inner);
    let mut object = 0;
    jsembed_create_object(h.env, &mut object);
    let mut escaped = 0;
    assert_eq!(jsembed_escape_handle(h.env, inner, object, &mut escaped), 0);
    let mut again = 0;
    assert_eq!(
        jsembed_escape_handle(h.env, inner, object, &mut again),
        jsembed::Status::AlreadyEscaped as i32
    );
    jsembed_close_escapable_handle_scope(h.env, inner);

    let mut reference = 0;
    assert_eq!(jsembed_create_reference(h.env, escaped, 0, &mut reference), 0);
    let mut count = 0;
    assert_eq!(jsembed_reference_ref(h.env, reference, &mut count), 0);
    assert_eq!(count, 1);
    assert_eq!(jsembed_reference_unref(h.env, reference, &mut count), 0);
    assert_eq!(count, 0);

    jsembed_close_handle_scope(h.env, outer);
    let mut value = 0;
    assert_eq!(jsembed_get_reference_value(h.env, reference, &mut value), 0);
    assert_eq!(value, JSEMBED_NO_VALUE);
    assert_eq!(jsembed_delete_reference(h.env, reference), 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// Promises and modules
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_deferred_resolution_from_host() {
    let h = Handles::new();
    let mut deferred = 0;
    let mut promise = 0;
    assert_eq!(jsembed_create_promise(h.env, &mut deferred, &mut promise), 0);
    let mut global = 0;
    jsembed_get_global(h.env, &mut global);
    jsembed_set_named_property(h.env, global, c"pending".as_ptr(), promise);
    let (status, _) = h.run("var got = 0; pending.then(v => { got = v; });");
    assert_eq!(status, 0);

    let mut value = 0;
    jsembed_create_int32(h.env, 9, &mut value);
    assert_eq!(jsembed_resolve_deferred(h.env, deferred, value), 0);
    assert_eq!(h.int("got"), 9);
    assert_eq!(
        jsembed_reject_deferred(h.env, deferred, value),
        jsembed::Status::InvalidHandle as i32
    );
}

extern "C" fn resolve_dep(env: *mut JsembedEnv, _specifier: u64, _assertions: u64, _referrer: u64, _data: *mut c_void) -> u64 {
    let text = "export const answer = 42;";
    let mut source = 0;
    jsembed_create_string_utf8(env, text.as_ptr() as *const c_char, text.len(), &mut source);
    let mut module = JSEMBED_NO_VALUE;
    jsembed_create_module(env, c"dep.js".as_ptr(), source, &mut module);
    module
}

extern "C" fn resolve_nothing(env: *mut JsembedEnv, _: u64, _: u64, _: u64, _: *mut c_void) -> u64 {
    jsembed_throw_error(env, ptr::null(), c"no such module".as_ptr());
    JSEMBED_NO_VALUE
}

#[test]
fn test_module_link_and_run() {
    let h = Handles::new();
    let source = h.string("import { answer } from './dep.js'; export const doubled = answer * 2;");
    let mut module = 0;
    assert_eq!(jsembed_create_module(h.env, c"main.js".as_ptr(), source, &mut module), 0);
    assert_eq!(jsembed_instantiate_module(h.env, module, resolve_dep, ptr::null_mut()), 0);
    let mut promise = 0;
    assert_eq!(jsembed_run_module(h.env, module, &mut promise), 0);

    let mut namespace = 0;
    assert_eq!(jsembed_get_module_namespace(h.env, module, &mut namespace), 0);
    let mut doubled = 0;
    jsembed_get_named_property(h.env, namespace, c"doubled".as_ptr(), &mut doubled);
    let mut n = 0;
    jsembed_get_value_int32(h.env, doubled, &mut n);
    assert_eq!(n, 84);
    assert_eq!(jsembed_delete_module(h.env, module), 0);
}

#[test]
fn test_module_resolver_failure_is_pending() {
    let h = Handles::new();
    let source = h.string("import './missing.js';");
    let mut module = 0;
    jsembed_create_module(h.env, c"main.js".as_ptr(), source, &mut module);
    assert_eq!(
        jsembed_instantiate_module(h.env, module, resolve_nothing, ptr::null_mut()),
        jsembed::Status::PendingException as i32
    );
    let mut error = 0;
    jsembed_get_and_clear_last_exception(h.env, &mut error);
    let mut message = 0;
    jsembed_get_named_property(h.env, error, c"message".as_ptr(), &mut message);
    assert_eq!(h.read_string(message), "no such module");
}

// ═══════════════════════════════════════════════════════════════════════════
// Teardown
// ═══════════════════════════════════════════════════════════════════════════

extern "C" fn mark(data: *mut c_void) {
    unsafe { *(data as *mut u32) += 1 };
}

#[test]
fn test_destroy_runs_teardown_callbacks() {
    let mut h = Handles::new();
    let mut hits = 0u32;
    let data = &mut hits as *mut u32 as *mut c_void;
    let mut kept = 0;
    let mut removed = 0;
    assert_eq!(jsembed_add_teardown_callback(h.env, mark, data, &mut kept), 0);
    assert_eq!(jsembed_add_teardown_callback(h.env, mark, data, &mut removed), 0);
    assert_eq!(jsembed_remove_teardown_callback(h.env, removed), 0);

    assert_eq!(jsembed_destroy_env(h.env), 0);
    h.env = ptr::null_mut();
    assert_eq!(hits, 1);
    assert!(!jsembed_run_loop(h.platform, 0));
}
