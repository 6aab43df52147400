//! Persistent references.
//!
//! A reference holds its value strongly while its count is above zero. At
//! zero an object value is held weakly: the reference keeps a weak pointer
//! and plants a marker object on the target under a private key unique to
//! the reference. The marker dies with the target and its class hook tells
//! the reference its value is gone for good.

use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;

use log::{trace, warn};

use crate::engine::{CheapClone, ExoticObject, JsSymbol, JsValue, Object, Property, PropertyKey, WeakObject};
use crate::error::{Error, Result};
use crate::platform::Platform;

use super::arena::Index;
use super::{Env, Value};

/// Handle to a persistent reference. Valid until deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Reference(Index);

impl Reference {
    pub fn to_bits(self) -> u64 {
        self.0.to_bits()
    }

    pub fn from_bits(bits: u64) -> Self {
        Reference(Index::from_bits(bits))
    }
}

enum Held {
    /// Primitives are always held strongly, whatever the count.
    Primitive(JsValue),
    Strong(Object),
    Weak {
        target: WeakObject,
        marker: Rc<WeakMarker>,
    },
    /// The weakly held object was released. Terminal.
    Finalized,
}

pub(super) struct ReferenceRecord {
    count: u32,
    held: Held,
    symbol: JsSymbol,
}

struct WeakMarker {
    reference: Index,
    armed: Cell<bool>,
}

impl Env {
    fn marker_key(record: &ReferenceRecord) -> PropertyKey {
        PropertyKey::Symbol(record.symbol.clone())
    }

    /// Demote a strongly held object to a weak hold.
    fn make_weak(&self, index: Index, object: Object, symbol: &JsSymbol) -> Held {
        let marker = Rc::new(WeakMarker {
            reference: index,
            armed: Cell::new(true),
        });
        let marker_object = self.0.runtime.new_object_with_class(
            Platform::classes().weak_marker,
            marker.clone(),
            ExoticObject::Ordinary,
        );
        marker_object.set_prototype(None);
        object.define_own_property(
            PropertyKey::Symbol(symbol.clone()),
            Property::hidden(JsValue::Object(marker_object)),
        );
        Held::Weak {
            target: object.downgrade(),
            marker,
        }
    }

    /// Remove the weak marker from its target, if the target is still alive.
    fn clear_marker(record: &ReferenceRecord) -> Option<Object> {
        let Held::Weak { target, marker } = &record.held else {
            return None;
        };
        marker.armed.set(false);
        let object = target.upgrade()?;
        object.delete_own_property(&Self::marker_key(record));
        Some(object)
    }

    pub fn create_reference(&self, value: Value, initial_count: u32) -> Result<Reference> {
        self.ensure_open()?;
        let value = self.value(value)?;
        let symbol = JsSymbol::new_private("reference");
        let index = self.0.references.borrow_mut().insert(ReferenceRecord {
            count: initial_count,
            held: Held::Finalized,
            symbol: symbol.clone(),
        });

        let held = match value {
            JsValue::Object(object) if initial_count == 0 => self.make_weak(index, object, &symbol),
            JsValue::Object(object) => Held::Strong(object),
            other => Held::Primitive(other),
        };
        if let Some(record) = self.0.references.borrow_mut().get_mut(index) {
            record.held = held;
        }
        trace!("created reference {:?} (count {})", index, initial_count);
        Ok(Reference(index))
    }

    pub fn delete_reference(&self, reference: Reference) -> Result<()> {
        let record = self
            .0
            .references
            .borrow_mut()
            .remove(reference.0)
            .ok_or(Error::InvalidHandle("reference"))?;
        Self::clear_marker(&record);
        drop(record);
        self.run_finalizers();
        Ok(())
    }

    /// Increment the count, promoting a weak hold to strong on 0 -> 1.
    pub fn reference_ref(&self, reference: Reference) -> Result<u32> {
        let count = {
            let mut references = self.0.references.borrow_mut();
            let record = references.get_mut(reference.0).ok_or(Error::InvalidHandle("reference"))?;
            record.count = record
                .count
                .checked_add(1)
                .ok_or_else(|| Error::InvalidArgument("reference count overflow".into()))?;
            if record.count == 1 {
                let revived = Self::clear_marker(record);
                if let Held::Weak { .. } = record.held {
                    record.held = match revived {
                        Some(object) => Held::Strong(object),
                        None => Held::Finalized,
                    };
                }
            }
            record.count
        };
        self.run_finalizers();
        Ok(count)
    }

    /// Decrement the count, demoting a strong object hold to weak on 1 -> 0.
    /// Decrementing a reference already at zero changes nothing.
    pub fn reference_unref(&self, reference: Reference) -> Result<u32> {
        let demote = {
            let mut references = self.0.references.borrow_mut();
            let record = references.get_mut(reference.0).ok_or(Error::InvalidHandle("reference"))?;
            if record.count == 0 {
                warn!("reference {:?} decremented below zero; ignoring", reference.0);
                return Ok(0);
            }
            record.count -= 1;
            if record.count > 0 {
                return Ok(record.count);
            }
            match std::mem::replace(&mut record.held, Held::Finalized) {
                Held::Strong(object) => Some((object, record.symbol.clone())),
                other => {
                    record.held = other;
                    None
                }
            }
        };

        if let Some((object, symbol)) = demote {
            let held = self.make_weak(reference.0, object, &symbol);
            if let Some(record) = self.0.references.borrow_mut().get_mut(reference.0) {
                record.held = held;
            }
        }
        self.run_finalizers();
        Ok(0)
    }

    /// The referenced value, or `None` once a weakly held object is gone.
    pub fn get_reference_value(&self, reference: Reference) -> Result<Option<Value>> {
        let value = {
            let mut references = self.0.references.borrow_mut();
            let record = references.get_mut(reference.0).ok_or(Error::InvalidHandle("reference"))?;
            match &record.held {
                Held::Primitive(value) => Some(value.clone()),
                Held::Strong(object) => Some(JsValue::Object(object.cheap_clone())),
                Held::Weak { target, .. } => match target.upgrade() {
                    Some(object) => Some(JsValue::Object(object)),
                    None => {
                        record.held = Held::Finalized;
                        None
                    }
                },
                Held::Finalized => None,
            }
        };
        value.map(|v| self.attach(v)).transpose()
    }

    pub fn reference_count(&self, reference: Reference) -> Result<u32> {
        self.0
            .references
            .borrow()
            .get(reference.0)
            .map(|r| r.count)
            .ok_or(Error::InvalidHandle("reference"))
    }

    /// Class hook for weak markers: the target they were planted on is gone.
    pub(super) fn on_weak_marker_finalize(&self, data: Rc<dyn Any>) {
        let Ok(marker) = data.downcast::<WeakMarker>() else {
            return;
        };
        if !marker.armed.get() {
            return;
        }
        if let Some(record) = self.0.references.borrow_mut().get_mut(marker.reference) {
            trace!("reference {:?} finalized", marker.reference);
            record.held = Held::Finalized;
        }
    }
}
