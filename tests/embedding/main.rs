//! Integration tests for the embedding API, organized by feature
//!
//! Every test drives a fresh [`Env`] on its own [`EventLoop`] through the
//! public API only.
//!
//! ## Logging
//!
//! ```bash
//! RUST_LOG=jsembed=trace cargo test    # trace scope and reference traffic
//! ```

mod exceptions;
#[cfg(feature = "c-api")]
mod ffi;
mod finalizers;
mod functions;
mod host_loop;
mod microtasks;
mod modules;
mod promises;
mod references;
mod scopes;
mod teardown;
mod values;

use std::rc::Rc;

use jsembed::{Env, EnvOptions, Error, EventLoop, Platform, PlatformOptions, Value};

/// A loop, a platform on it and an environment with default options.
pub struct TestEnv {
    pub event_loop: Rc<EventLoop>,
    pub env: Env,
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn create_test_env() -> TestEnv {
    create_test_env_with(PlatformOptions::default())
}

#[allow(clippy::expect_used)]
pub fn create_test_env_with(options: PlatformOptions) -> TestEnv {
    init_logging();
    let event_loop = EventLoop::new();
    let platform = Platform::new(event_loop.clone(), options);
    let env = Env::create(&platform, EnvOptions::default()).expect("env creation failed");
    TestEnv { event_loop, env }
}

/// Evaluate `source` as a classic script.
pub fn run(env: &Env, source: &str) -> Result<Value, Error> {
    let source = env.create_string_utf8(source)?;
    env.run_script("test.js", source)
}

#[allow(clippy::expect_used)]
pub fn eval_int(env: &Env, source: &str) -> i32 {
    let value = run(env, source).expect("script failed");
    env.get_value_int32(value).expect("not a number")
}

#[allow(clippy::expect_used)]
pub fn eval_string(env: &Env, source: &str) -> String {
    let value = run(env, source).expect("script failed");
    env.get_value_string_utf8(value).expect("not a string")
}

#[allow(clippy::expect_used)]
pub fn eval_bool(env: &Env, source: &str) -> bool {
    let value = run(env, source).expect("script failed");
    env.get_value_bool(value).expect("not a boolean")
}

/// Take the pending exception and return its `message`.
#[allow(clippy::expect_used)]
pub fn take_error_message(env: &Env) -> String {
    let error = env.get_and_clear_last_exception().expect("no exception");
    let message = env.get_named_property(error, "message").expect("no message");
    env.get_value_string_utf8(message).expect("message is not a string")
}
