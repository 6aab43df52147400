//! Embedding layer for a reference-counted JavaScript engine
//!
//! Hosts drive scripts through an [`Env`]: values come back as handles owned
//! by handle scopes, long-lived values are kept in persistent references,
//! and microtasks are drained whenever the outermost call into script
//! returns or the host loop reaches its check phase.
//!
//! # Example
//!
//! ```
//! use jsembed::{Env, EnvOptions, EventLoop, Platform, PlatformOptions};
//!
//! let platform = Platform::new(EventLoop::new(), PlatformOptions::default());
//! let env = Env::create(&platform, EnvOptions::default()).unwrap();
//!
//! let source = env.create_string_utf8("1 + 1").unwrap();
//! let result = env.run_script("main.js", source).unwrap();
//! assert_eq!(env.get_value_int32(result).unwrap(), 2);
//!
//! env.destroy().unwrap();
//! ```

pub mod engine;
pub mod env;
pub mod error;
#[cfg(feature = "c-api")]
pub mod ffi;
pub mod platform;

mod prelude;

pub use engine::{ModuleStatus, PromiseStatus, TypedArrayKind};
pub use env::{
    CallbackInfo, Deferred, DeferredTeardown, Delegate, Env, EnvOptions, EscapableHandleScope, FinalizeCallback,
    FunctionCallback, HandleScope, Module, ModuleMetaCallback, ModuleResolver, PropertyAttributes,
    PropertyDescriptor, PropertyName, Reference, SyntheticEvaluator, TeardownId, TypeTag, Value, ValueType,
};
pub use error::{Error, Result, Status};
pub use platform::{EventLoop, HostLoop, Platform, PlatformOptions, RunMode};
