//! The script engine embedded by [`crate::env`].
//!
//! Values are reference counted and released eagerly. Objects reachable only
//! through cycles are reclaimed by [`Runtime::run_gc`]. Class instances carry
//! an opaque payload handed to the class finalize hook on release.

pub mod ast;
pub mod builtins;
pub(crate) mod eval;
pub mod heap;
pub mod lexer;
pub mod module;
pub mod object;
pub mod parser;
pub mod promise;
pub mod runtime;
pub mod stack;
pub mod value;

pub use heap::GcStats;
pub use module::{ModuleDef, ModuleLoader, ModuleStatus, SyntheticEvaluate};
pub use object::{
    ArrayBufferData, BackingStore, ClassId, ExoticObject, Object, ObjectData, PropertyDelegate, TypedArrayKind,
    WeakObject,
};
pub use promise::{PromiseStatus, RejectionTracker};
pub use runtime::{CallArgs, ErrorKind, FinalizeHook, Runtime, RuntimeOptions};
pub use value::{CheapClone, JsString, JsSymbol, JsValue, Property, PropertyKey};

/// A thrown script value.
#[derive(Clone, Debug)]
pub struct Throw {
    pub value: JsValue,
    /// Raised by termination; `catch` blocks and promise handlers never see it.
    pub uncatchable: bool,
}

impl Throw {
    pub fn new(value: JsValue) -> Self {
        Throw {
            value,
            uncatchable: false,
        }
    }

    pub fn uncatchable(value: JsValue) -> Self {
        Throw {
            value,
            uncatchable: true,
        }
    }
}

impl From<JsValue> for Throw {
    fn from(value: JsValue) -> Self {
        Throw::new(value)
    }
}
