//! Host event-loop capability and the platform object that binds it.
//!
//! An environment never drives a loop itself. It registers a *prepare* hook
//! (runs before the loop blocks for I/O) and a *check* hook (runs right after
//! I/O), plus one *async* handle used to wake the loop during deferred
//! teardown. Anything implementing [`HostLoop`] can host environments;
//! [`EventLoop`] is a single-threaded implementation with libuv's phase order.

mod event_loop;

pub use event_loop::{EventLoop, RunMode};

use std::fmt;
use std::rc::Rc;
use std::sync::OnceLock;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::engine::ClassId;

/// Identity of a handle registered with a [`HostLoop`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopHandle(pub u64);

/// Callback attached to a loop handle.
pub type LoopCallback = Rc<dyn Fn()>;

/// The hooks an environment needs from its host loop.
///
/// Handles start out stopped (prepare/check) and referenced. A referenced,
/// active handle keeps the loop alive; an unreferenced one never does.
pub trait HostLoop {
    /// Register a hook run once per iteration before the loop polls.
    fn prepare_init(&self, callback: LoopCallback) -> LoopHandle;

    /// Register a hook run once per iteration after the loop polls.
    fn check_init(&self, callback: LoopCallback) -> LoopHandle;

    /// Register a wake-up handle. It is active from creation until closed.
    fn async_init(&self, callback: LoopCallback) -> LoopHandle;

    fn start(&self, handle: LoopHandle);

    fn stop(&self, handle: LoopHandle);

    /// Reference or unreference a handle.
    fn set_ref(&self, handle: LoopHandle, referenced: bool);

    /// Wake the loop and run the async handle's callback on its next poll.
    fn send(&self, handle: LoopHandle);

    /// Release a handle. Its callback never runs again.
    fn close(&self, handle: LoopHandle);

    /// Whether any referenced, active handle or timer remains.
    fn is_alive(&self) -> bool;
}

/// Platform-wide options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformOptions {
    /// Honour `request_garbage_collection`. Ignored otherwise.
    pub expose_garbage_collection: bool,
    /// Log every collection pass.
    pub trace_garbage_collection: bool,
}

/// Classes used for host-backed objects. Allocated once per process.
#[derive(Debug)]
pub struct EnvClasses {
    /// `create_external` values.
    pub external: ClassId,
    /// Hidden markers that observe collection of weakly referenced objects.
    pub weak_marker: ClassId,
    /// Objects created through `create_delegate`.
    pub delegate: ClassId,
    /// Carriers of `add_finalizer` / `wrap` callbacks.
    pub finalizer: ClassId,
}

static ENV_CLASSES: OnceLock<EnvClasses> = OnceLock::new();

struct PlatformInner {
    host_loop: Rc<dyn HostLoop>,
    options: PlatformOptions,
}

/// A host loop plus platform options, shared by every environment created
/// on it.
#[derive(Clone)]
pub struct Platform(Rc<PlatformInner>);

impl Platform {
    pub const IDENTIFIER: &'static str = "jsembed";
    pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    pub fn new(host_loop: Rc<dyn HostLoop>, options: PlatformOptions) -> Self {
        let classes = Self::classes();
        debug!(
            "platform {} {} created (external class {})",
            Self::IDENTIFIER,
            Self::VERSION,
            classes.external.raw()
        );
        Platform(Rc::new(PlatformInner { host_loop, options }))
    }

    pub fn identifier(&self) -> &'static str {
        Self::IDENTIFIER
    }

    pub fn version(&self) -> &'static str {
        Self::VERSION
    }

    pub fn host_loop(&self) -> &Rc<dyn HostLoop> {
        &self.0.host_loop
    }

    pub fn options(&self) -> &PlatformOptions {
        &self.0.options
    }

    pub fn ptr_eq(&self, other: &Platform) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Process-wide class ids for host-backed objects.
    pub fn classes() -> &'static EnvClasses {
        ENV_CLASSES.get_or_init(|| EnvClasses {
            external: ClassId::allocate(),
            weak_marker: ClassId::allocate(),
            delegate: ClassId::allocate(),
            finalizer: ClassId::allocate(),
        })
    }
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform")
            .field("identifier", &Self::IDENTIFIER)
            .field("version", &Self::VERSION)
            .field("options", &self.0.options)
            .finish()
    }
}
