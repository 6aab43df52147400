//! Execution environments: the host-facing embedding layer.
//!
//! An [`Env`] owns one engine [`Runtime`] and everything the host needs to
//! drive it: a stack of handle scopes that own [`Value`] handles, persistent
//! [`Reference`]s, finalizers, module records with resolver and evaluator
//! chains, a pending-exception slot, the unhandled-rejection list and the
//! teardown queue.
//!
//! # Depth and microtasks
//!
//! Every entry point that runs script (`run_script`, `call_function`,
//! `new_instance`, `instantiate_module`, `run_module`) bumps a depth counter.
//! When the outermost entry returns, pending microtasks are drained and
//! surviving promise rejections are delivered to the unhandled-rejection
//! callback. Nested entries made from inside host callbacks never drain.
//!
//! # Errors
//!
//! Script exceptions are not returned as values. A failing call leaves the
//! exception in the pending slot and returns [`Error::PendingException`];
//! fetch it with [`Env::get_and_clear_last_exception`]. When an exception
//! escapes the outermost entry and an uncaught-exception callback is
//! registered, the callback receives it instead and the call returns
//! [`Error::UncaughtException`].
//!
//! # Example
//!
//! ```ignore
//! use jsembed::{Env, EnvOptions, EventLoop, Platform, PlatformOptions};
//!
//! let platform = Platform::new(EventLoop::new(), PlatformOptions::default());
//! let env = Env::create(&platform, EnvOptions::default())?;
//!
//! let source = env.create_string_utf8("1 + 1")?;
//! let result = env.run_script("main.js", source)?;
//! assert_eq!(env.get_value_int32(result)?, 2);
//!
//! env.destroy()?;
//! ```

mod arena;
mod delegate;
mod exception;
mod finalizer;
mod function;
mod module;
mod promise;
mod property;
mod reference;
mod scope;
mod teardown;
mod value;

pub use arena::Index;
pub use delegate::Delegate;
pub use finalizer::{FinalizeCallback, TypeTag};
pub use function::{CallbackInfo, FunctionCallback, PropertyAttributes, PropertyDescriptor, PropertyName};
pub use module::{DynamicImportHandler, Module, ModuleMetaCallback, ModuleResolver, SyntheticEvaluator};
pub use promise::Deferred;
pub use reference::Reference;
pub use scope::{EscapableHandleScope, HandleScope};
pub use teardown::{DeferredTeardown, TeardownId};
pub use value::{Value, ValueType};

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::engine::runtime::DEFAULT_MAX_CALL_DEPTH;
use crate::engine::{ErrorKind, JsSymbol, JsValue, ModuleDef, Object, Runtime, RuntimeOptions, Throw};
use crate::error::{Error, Result};
use crate::platform::{HostLoop, LoopHandle, Platform};

use arena::Arena;
use module::{EvaluatorFrame, ModuleEntry, ResolverFrame};
use promise::DeferredRecord;
use reference::ReferenceRecord;
use scope::ScopeRecord;
use teardown::TeardownQueue;

/// Per-environment options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvOptions {
    /// Allocations between automatic cycle collections. 0 = manual only.
    pub gc_threshold: usize,
    /// Nested call bound before `RangeError: Maximum call stack size exceeded`.
    pub max_call_depth: usize,
}

impl Default for EnvOptions {
    fn default() -> Self {
        Self {
            gc_threshold: 0,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl EnvOptions {
    /// Parse options from JSON. Missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::InvalidArgument(e.to_string()))
    }
}

pub type UncaughtExceptionHandler = Rc<dyn Fn(&Env, Value)>;

/// Receives `(reason, promise)`.
pub type UnhandledRejectionHandler = Rc<dyn Fn(&Env, Value, Value)>;

#[derive(Default)]
struct Callbacks {
    uncaught_exception: Option<UncaughtExceptionHandler>,
    unhandled_rejection: Option<UnhandledRejectionHandler>,
    dynamic_import: Option<DynamicImportHandler>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifecycle {
    Alive,
    /// `destroy` ran; waiting for deferred teardowns to finish.
    Destroying,
    Closed,
}

/// Private keys for host metadata attached to script objects.
struct HiddenKeys {
    wrap: JsSymbol,
    finalizers: JsSymbol,
    type_tag: JsSymbol,
}

#[derive(Clone, Copy)]
struct LoopHooks {
    prepare: LoopHandle,
    check: LoopHandle,
    teardown: LoopHandle,
}

pub(crate) struct EnvInner {
    runtime: Runtime,
    platform: Platform,
    options: EnvOptions,
    bindings: RefCell<Option<Object>>,

    values: RefCell<Arena<JsValue>>,
    scopes: RefCell<Vec<ScopeRecord>>,
    next_scope: Cell<u64>,

    references: RefCell<Arena<ReferenceRecord>>,
    deferreds: RefCell<Arena<DeferredRecord>>,
    modules: RefCell<Arena<ModuleEntry>>,
    resolvers: RefCell<Vec<ResolverFrame>>,
    evaluators: RefCell<Vec<EvaluatorFrame>>,

    exception: RefCell<Option<Throw>>,
    rejections: RefCell<Vec<(Object, JsValue)>>,
    callbacks: RefCell<Callbacks>,
    depth: Cell<u32>,
    keys: HiddenKeys,

    teardown: RefCell<TeardownQueue>,
    hooks: LoopHooks,
    external_memory: Cell<i64>,
    lifecycle: Cell<Lifecycle>,
}

/// Handle to an execution environment. Cloning shares the environment.
#[derive(Clone)]
pub struct Env(Rc<EnvInner>);

impl Env {
    /// Create an environment on `platform`, registering its loop hooks.
    pub fn create(platform: &Platform, options: EnvOptions) -> Result<Env> {
        let runtime = Runtime::new(RuntimeOptions {
            gc_threshold: options.gc_threshold,
            max_call_depth: options.max_call_depth,
        });
        let host_loop = platform.host_loop().clone();

        let inner = Rc::new_cyclic(|weak: &Weak<EnvInner>| {
            let prepare = {
                let weak = weak.clone();
                host_loop.prepare_init(Rc::new(move || {
                    if let Some(env) = Env::upgrade(&weak) {
                        env.check_liveness();
                    }
                }))
            };
            let check = {
                let weak = weak.clone();
                host_loop.check_init(Rc::new(move || {
                    if let Some(env) = Env::upgrade(&weak) {
                        env.on_check();
                    }
                }))
            };
            let teardown = {
                let weak = weak.clone();
                host_loop.async_init(Rc::new(move || {
                    if let Some(env) = Env::upgrade(&weak) {
                        env.on_teardown_wake();
                    }
                }))
            };

            EnvInner {
                runtime,
                platform: platform.clone(),
                options,
                bindings: RefCell::new(None),
                values: RefCell::new(Arena::new()),
                scopes: RefCell::new(Vec::new()),
                next_scope: Cell::new(0),
                references: RefCell::new(Arena::new()),
                deferreds: RefCell::new(Arena::new()),
                modules: RefCell::new(Arena::new()),
                resolvers: RefCell::new(Vec::new()),
                evaluators: RefCell::new(Vec::new()),
                exception: RefCell::new(None),
                rejections: RefCell::new(Vec::new()),
                callbacks: RefCell::new(Callbacks::default()),
                depth: Cell::new(0),
                keys: HiddenKeys {
                    wrap: JsSymbol::new_private("wrap"),
                    finalizers: JsSymbol::new_private("finalizers"),
                    type_tag: JsSymbol::new_private("type_tag"),
                },
                teardown: RefCell::new(TeardownQueue::default()),
                hooks: LoopHooks {
                    prepare,
                    check,
                    teardown,
                },
                external_memory: Cell::new(0),
                lifecycle: Cell::new(Lifecycle::Alive),
            }
        });
        let env = Env(inner);

        env.install_runtime_hooks();
        *env.0.bindings.borrow_mut() = Some(env.0.runtime.new_object());
        env.open_root_scope();

        // The check hook only produces work; it never keeps the loop alive.
        host_loop.start(env.0.hooks.check);
        host_loop.set_ref(env.0.hooks.check, false);
        host_loop.set_ref(env.0.hooks.teardown, false);

        debug!("env created (depth limit {})", options.max_call_depth);
        Ok(env)
    }

    fn install_runtime_hooks(&self) {
        let rt = &self.0.runtime;
        let classes = Platform::classes();

        let weak = self.downgrade();
        rt.set_rejection_tracker(Some(Rc::new(move |_: &Runtime, promise: &Object, reason: &JsValue, handled: bool| {
            if let Some(env) = Env::upgrade(&weak) {
                env.on_promise_rejection(promise, reason, handled);
            }
        })));

        let weak = self.downgrade();
        rt.set_module_loader(Some(Rc::new(
            move |rt: &Runtime, specifier: &str, referrer: Option<&ModuleDef>| match Env::upgrade(&weak) {
                Some(env) => env.on_resolve_module(specifier, referrer),
                None => Err(destroyed_error(rt)),
            },
        )));

        for class in [classes.external, classes.finalizer, classes.delegate] {
            let weak = self.downgrade();
            rt.register_class(
                class,
                Rc::new(move |_: &Runtime, data: Rc<dyn Any>| {
                    if let Some(env) = Env::upgrade(&weak) {
                        env.on_finalize(data);
                    }
                }),
            );
        }

        let weak = self.downgrade();
        rt.register_class(
            classes.weak_marker,
            Rc::new(move |_: &Runtime, data: Rc<dyn Any>| {
                if let Some(env) = Env::upgrade(&weak) {
                    env.on_weak_marker_finalize(data);
                }
            }),
        );
    }

    pub(crate) fn downgrade(&self) -> Weak<EnvInner> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn upgrade(weak: &Weak<EnvInner>) -> Option<Env> {
        weak.upgrade().map(Env)
    }

    pub fn ptr_eq(&self, other: &Env) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// The engine runtime this environment drives.
    pub fn runtime(&self) -> &Runtime {
        &self.0.runtime
    }

    pub fn options(&self) -> &EnvOptions {
        &self.0.options
    }

    pub fn get_env_platform(&self) -> &Platform {
        &self.0.platform
    }

    pub fn get_env_loop(&self) -> &Rc<dyn HostLoop> {
        self.0.platform.host_loop()
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.lifecycle.get() == Lifecycle::Closed
    }

    /// Current re-entrancy depth. Zero outside any entry point.
    pub fn depth(&self) -> u32 {
        self.0.depth.get()
    }

    // ------------------------------------------------------------------
    // Callbacks
    // ------------------------------------------------------------------

    pub fn on_uncaught_exception(&self, callback: impl Fn(&Env, Value) + 'static) {
        self.0.callbacks.borrow_mut().uncaught_exception = Some(Rc::new(callback));
    }

    /// Register the unhandled-rejection callback. Rejections are only
    /// tracked while a callback is registered.
    pub fn on_unhandled_rejection(&self, callback: impl Fn(&Env, Value, Value) + 'static) {
        self.0.callbacks.borrow_mut().unhandled_rejection = Some(Rc::new(callback));
    }

    pub fn on_dynamic_import(&self, callback: impl Fn(&Env, Value, Value, Value) -> Result<Module> + 'static) {
        self.0.callbacks.borrow_mut().dynamic_import = Some(Rc::new(callback));
    }

    // ------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------

    /// Evaluate `source` as a classic script and return its completion value.
    pub fn run_script(&self, file: &str, source: Value) -> Result<Value> {
        self.ensure_ready()?;
        let text = self.string_of(source)?;
        let value = self.enter(|rt| rt.eval_script(text.as_str(), file))?;
        self.attach(value)
    }

    /// Run `f` as an entry point: bump the depth, drain microtasks when the
    /// outermost entry returns and route a failure escaping it.
    fn enter<T>(&self, f: impl FnOnce(&Runtime) -> std::result::Result<T, Throw>) -> Result<T> {
        let depth = self.0.depth.get() + 1;
        self.0.depth.set(depth);
        let result = f(&self.0.runtime);
        if depth == 1 {
            self.run_microtasks();
        }
        self.0.depth.set(depth - 1);

        match result {
            Ok(value) => Ok(value),
            Err(thrown) => {
                if depth == 1 {
                    self.route_uncaught(thrown);
                } else {
                    self.set_exception(thrown);
                }
                Err(self.failure())
            }
        }
    }

    /// The error an entry point reports after a script failure.
    fn failure(&self) -> Error {
        if self.0.exception.borrow().is_some() {
            Error::PendingException
        } else {
            Error::UncaughtException
        }
    }

    /// Hand `thrown` to the uncaught-exception callback, or leave it pending
    /// when none is registered.
    fn route_uncaught(&self, thrown: Throw) {
        let callback = self.0.callbacks.borrow().uncaught_exception.clone();
        match callback {
            Some(callback) => {
                self.with_scope(|| {
                    if let Ok(error) = self.attach(thrown.value) {
                        callback(self, error);
                    }
                });
            }
            None => self.set_exception(thrown),
        }
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    /// Fail fast when the environment is gone or an exception is pending.
    fn ensure_ready(&self) -> Result<()> {
        if self.0.lifecycle.get() == Lifecycle::Closed {
            return Err(Error::EnvDestroyed);
        }
        if self.0.exception.borrow().is_some() {
            return Err(Error::PendingException);
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.0.lifecycle.get() == Lifecycle::Closed {
            Err(Error::EnvDestroyed)
        } else {
            Ok(())
        }
    }

    /// Convert an engine failure into the pending exception.
    fn check<T>(&self, result: std::result::Result<T, Throw>) -> Result<T> {
        result.map_err(|thrown| {
            self.set_exception(thrown);
            Error::PendingException
        })
    }

    fn set_exception(&self, thrown: Throw) {
        let previous = self.0.exception.borrow_mut().replace(thrown);
        drop(previous);
    }

    fn take_exception(&self) -> Option<Throw> {
        self.0.exception.borrow_mut().take()
    }

    /// Turn a host callback failure into an engine throw. A pending
    /// exception wins; otherwise the error message becomes an `Error`.
    fn callback_failure(&self, error: &Error) -> Throw {
        match self.take_exception() {
            Some(thrown) => thrown,
            None => self.0.runtime.throw_error(ErrorKind::Error, &error.to_string()),
        }
    }

    /// Run finalizers of objects released so far, inside a scope of their own.
    fn run_finalizers(&self) {
        if !self.0.runtime.heap().has_pending_finalizers() {
            return;
        }
        if self.0.lifecycle.get() == Lifecycle::Closed {
            self.0.runtime.run_finalizers();
            return;
        }
        self.with_scope(|| {
            self.0.runtime.run_finalizers();
        });
    }

    // ------------------------------------------------------------------
    // Environment objects
    // ------------------------------------------------------------------

    /// Per-environment object for host bindings. Not reachable from script.
    pub fn get_bindings(&self) -> Result<Value> {
        self.ensure_open()?;
        let bindings = self.0.bindings.borrow().clone();
        match bindings {
            Some(obj) => self.attach(JsValue::Object(obj)),
            None => Err(Error::EnvDestroyed),
        }
    }

    pub fn get_global(&self) -> Result<Value> {
        self.ensure_open()?;
        self.attach(JsValue::Object(self.0.runtime.global().clone()))
    }

    /// Track host memory held on behalf of script objects. Returns the total.
    pub fn adjust_external_memory(&self, change_in_bytes: i64) -> i64 {
        let total = self.0.external_memory.get().saturating_add(change_in_bytes);
        self.0.external_memory.set(total);
        total
    }

    /// Run a full collection. Ignored unless the platform exposes it.
    pub fn request_garbage_collection(&self) -> Result<()> {
        self.ensure_open()?;
        let options = self.0.platform.options();
        if !options.expose_garbage_collection {
            return Ok(());
        }
        let stats = self.0.runtime.run_gc();
        if options.trace_garbage_collection {
            debug!(
                "gc: collected {} objects, {} live",
                stats.collected, stats.live_objects
            );
        }
        self.run_finalizers();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Host loop hooks
    // ------------------------------------------------------------------

    /// Keep the prepare hook armed while the engine has queued work.
    fn check_liveness(&self) {
        if self.0.lifecycle.get() == Lifecycle::Closed {
            return;
        }
        let host_loop = self.get_env_loop();
        if self.0.runtime.has_pending_jobs() {
            host_loop.start(self.0.hooks.prepare);
        } else {
            host_loop.stop(self.0.hooks.prepare);
        }
    }

    fn on_check(&self) {
        if self.0.lifecycle.get() == Lifecycle::Closed {
            return;
        }
        if self.0.depth.get() == 0 {
            self.run_microtasks();
        }
        if self.get_env_loop().is_alive() {
            return;
        }
        self.check_liveness();
    }

    // ------------------------------------------------------------------
    // Unsupported surface
    // ------------------------------------------------------------------

    /// Leave an `Error("Unsupported operation")` pending.
    fn unsupported<T>(&self, operation: &'static str) -> Result<T> {
        warn!("unsupported operation: {}", operation);
        if self.0.lifecycle.get() != Lifecycle::Closed && self.0.exception.borrow().is_none() {
            let thrown = self.0.runtime.throw_error(ErrorKind::Error, "Unsupported operation");
            self.set_exception(thrown);
        }
        Err(Error::Unsupported(operation))
    }

    pub fn create_context(&self) -> Result<()> {
        self.unsupported("create_context")
    }

    pub fn create_threadsafe_function(&self, _function: Value) -> Result<()> {
        self.unsupported("create_threadsafe_function")
    }

    pub fn create_inspector(&self) -> Result<()> {
        self.unsupported("create_inspector")
    }

    pub fn get_heap_statistics(&self) -> Result<()> {
        self.unsupported("get_heap_statistics")
    }
}

fn destroyed_error(rt: &Runtime) -> Throw {
    rt.throw_error(ErrorKind::InternalError, "environment has been destroyed")
}

impl Drop for EnvInner {
    fn drop(&mut self) {
        if self.lifecycle.get() == Lifecycle::Closed {
            return;
        }
        let host_loop = self.platform.host_loop();
        host_loop.close(self.hooks.prepare);
        host_loop.close(self.hooks.check);
        host_loop.close(self.hooks.teardown);
        self.values.get_mut().drain();
        self.runtime.dispose();
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("depth", &self.0.depth.get())
            .field("scopes", &self.0.scopes.borrow().len())
            .field("values", &self.0.values.borrow().len())
            .field("lifecycle", &self.0.lifecycle.get())
            .finish()
    }
}
