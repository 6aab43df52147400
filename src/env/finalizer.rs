//! Finalizers, wrapped native data, externals and type tags.
//!
//! Host data is attached to a script object through a hidden marker object
//! stored under a private key. The marker carries the data as its opaque
//! payload, so it is released together with the object it is attached to
//! and its class hook runs the finalizer at the next safe point.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use log::trace;

use crate::engine::{ErrorKind, ExoticObject, JsSymbol, JsValue, Object, Property, PropertyKey};
use crate::error::{Error, Result};
use crate::platform::Platform;

use super::{Env, Value};

/// Called once with the registered data when its object is released.
pub type FinalizeCallback = Box<dyn FnOnce(&Env, Rc<dyn Any>)>;

pub(super) struct Finalizer {
    data: Rc<dyn Any>,
    callback: RefCell<Option<FinalizeCallback>>,
}

impl Finalizer {
    pub(super) fn new(data: Rc<dyn Any>, callback: Option<FinalizeCallback>) -> Self {
        Finalizer {
            data,
            callback: RefCell::new(callback),
        }
    }

    fn run(&self, env: &Env) {
        let callback = self.callback.borrow_mut().take();
        if let Some(callback) = callback {
            callback(env, self.data.clone());
        }
    }

    /// Drop the callback without running it.
    fn disarm(&self) {
        self.callback.borrow_mut().take();
    }
}

#[derive(Default)]
struct FinalizerList {
    entries: RefCell<Vec<Rc<Finalizer>>>,
}

/// 128-bit tag identifying the native type behind an object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TypeTag {
    pub lower: u64,
    pub upper: u64,
}

impl TypeTag {
    fn to_bigint(self) -> i128 {
        ((u128::from(self.upper) << 64) | u128::from(self.lower)) as i128
    }
}

impl Env {
    fn hidden_marker(&self, object: &Object, key: &JsSymbol) -> Option<Object> {
        match object.get_own_property(&PropertyKey::Symbol(key.clone()))?.value {
            JsValue::Object(marker) => Some(marker),
            _ => None,
        }
    }

    fn wrap_of(&self, object: &Object) -> Option<Rc<Finalizer>> {
        self.hidden_marker(object, &self.0.keys.wrap)?
            .opaque_of(Platform::classes().finalizer)?
            .downcast::<Finalizer>()
            .ok()
    }

    fn new_marker(&self, payload: Rc<dyn Any>) -> Object {
        let rt = &self.0.runtime;
        let marker = rt.new_object_with_class(Platform::classes().finalizer, payload, ExoticObject::Ordinary);
        marker.set_prototype(None);
        marker
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Wrap
    // ═══════════════════════════════════════════════════════════════════════

    /// Associate native `data` with `object`. An object carries at most one wrap.
    pub fn wrap(&self, object: Value, data: Rc<dyn Any>, finalize: Option<FinalizeCallback>) -> Result<()> {
        self.ensure_open()?;
        let object = self.object(object)?;
        if self.wrap_of(&object).is_some() {
            return Err(Error::AlreadyWrapped);
        }
        let marker = self.new_marker(Rc::new(Finalizer::new(data, finalize)));
        object.define_own_property(
            PropertyKey::Symbol(self.0.keys.wrap.clone()),
            Property::hidden(JsValue::Object(marker)),
        );
        trace!("wrapped object {}", object.id());
        Ok(())
    }

    pub fn unwrap(&self, object: Value) -> Result<Rc<dyn Any>> {
        self.ensure_open()?;
        let object = self.object(object)?;
        self.wrap_of(&object).map(|f| f.data.clone()).ok_or(Error::NotWrapped)
    }

    /// Detach the wrap without finalizing it and return its data.
    pub fn remove_wrap(&self, object: Value) -> Result<Rc<dyn Any>> {
        self.ensure_open()?;
        let object = self.object(object)?;
        let finalizer = self.wrap_of(&object).ok_or(Error::NotWrapped)?;
        finalizer.disarm();
        object.delete_own_property(&PropertyKey::Symbol(self.0.keys.wrap.clone()));
        self.run_finalizers();
        Ok(finalizer.data.clone())
    }

    pub fn is_wrapped(&self, object: Value) -> Result<bool> {
        let object = self.object(object)?;
        Ok(self.wrap_of(&object).is_some())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Finalizers
    // ═══════════════════════════════════════════════════════════════════════

    /// Run `finalize` with `data` once `object` is released. Finalizers on
    /// one object run in registration order.
    pub fn add_finalizer(&self, object: Value, data: Rc<dyn Any>, finalize: FinalizeCallback) -> Result<()> {
        self.ensure_open()?;
        let object = self.object(object)?;
        let entry = Rc::new(Finalizer::new(data, Some(finalize)));

        let list = self
            .hidden_marker(&object, &self.0.keys.finalizers)
            .and_then(|marker| marker.opaque_of(Platform::classes().finalizer))
            .and_then(|opaque| opaque.downcast::<FinalizerList>().ok());
        match list {
            Some(list) => list.entries.borrow_mut().push(entry),
            None => {
                let list = Rc::new(FinalizerList::default());
                list.entries.borrow_mut().push(entry);
                let marker = self.new_marker(list);
                object.define_own_property(
                    PropertyKey::Symbol(self.0.keys.finalizers.clone()),
                    Property::hidden(JsValue::Object(marker)),
                );
            }
        }
        Ok(())
    }

    /// Class hook for externals, wraps, finalizer lists and delegates.
    pub(super) fn on_finalize(&self, data: Rc<dyn Any>) {
        let data = match data.downcast::<Finalizer>() {
            Ok(finalizer) => {
                finalizer.run(self);
                return;
            }
            Err(data) => data,
        };
        if let Ok(list) = data.downcast::<FinalizerList>() {
            let entries = std::mem::take(&mut *list.entries.borrow_mut());
            for entry in entries {
                entry.run(self);
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Externals
    // ═══════════════════════════════════════════════════════════════════════

    /// An object that only carries native `data`.
    pub fn create_external(&self, data: Rc<dyn Any>, finalize: Option<FinalizeCallback>) -> Result<Value> {
        self.ensure_open()?;
        let rt = &self.0.runtime;
        let external = rt.new_object_with_class(
            Platform::classes().external,
            Rc::new(Finalizer::new(data, finalize)),
            ExoticObject::Ordinary,
        );
        external.set_prototype(None);
        self.attach(JsValue::Object(external))
    }

    pub fn get_value_external(&self, external: Value) -> Result<Rc<dyn Any>> {
        let object = self.object(external)?;
        object
            .opaque_of(Platform::classes().external)
            .and_then(|opaque| opaque.downcast::<Finalizer>().ok())
            .map(|f| f.data.clone())
            .ok_or(Error::TypeMismatch { expected: "an external" })
    }

    pub fn is_external(&self, value: Value) -> Result<bool> {
        Ok(match self.value(value)? {
            JsValue::Object(obj) => obj.class_id() == Some(Platform::classes().external),
            _ => false,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Type tags
    // ═══════════════════════════════════════════════════════════════════════

    /// Tag `object` once. A second tag leaves an `Error` pending.
    pub fn add_type_tag(&self, object: Value, tag: TypeTag) -> Result<()> {
        self.ensure_ready()?;
        let object = self.object(object)?;
        let key = PropertyKey::Symbol(self.0.keys.type_tag.clone());
        if object.has_own_property(&key) {
            let thrown = self
                .0
                .runtime
                .throw_error(ErrorKind::Error, "Object is already type tagged");
            self.set_exception(thrown);
            return Err(Error::AlreadyTagged);
        }
        object.define_own_property(key, Property::with_flags(JsValue::BigInt(tag.to_bigint()), false, false, false));
        Ok(())
    }

    pub fn check_type_tag(&self, object: Value, tag: TypeTag) -> Result<bool> {
        let object = self.object(object)?;
        let key = PropertyKey::Symbol(self.0.keys.type_tag.clone());
        Ok(match object.get_own_property(&key) {
            Some(property) => matches!(property.value, JsValue::BigInt(n) if n == tag.to_bigint()),
            None => false,
        })
    }
}
