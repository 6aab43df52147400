//! Property access on object handles.

use crate::engine::{JsValue, Object, Property, PropertyKey};
use crate::error::Result;

use super::function::{PropertyDescriptor, PropertyName};
use super::{Env, Value};

impl Env {
    fn property_key(&self, key: Value) -> Result<PropertyKey> {
        let key = self.value(key)?;
        let rt = &self.0.runtime;
        self.check(rt.to_property_key(&key))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Keyed access
    // ═══════════════════════════════════════════════════════════════════════

    pub fn get_property(&self, object: Value, key: Value) -> Result<Value> {
        self.ensure_ready()?;
        let target = self.value(object)?;
        let key = self.property_key(key)?;
        let value = self.check(self.0.runtime.get_value(&target, &key))?;
        self.attach(value)
    }

    pub fn has_property(&self, object: Value, key: Value) -> Result<bool> {
        self.ensure_ready()?;
        let object = self.object(object)?;
        let key = self.property_key(key)?;
        self.check(self.0.runtime.has_property(&object, &key))
    }

    pub fn has_own_property(&self, object: Value, key: Value) -> Result<bool> {
        self.ensure_ready()?;
        let object = self.object(object)?;
        let key = self.property_key(key)?;
        self.check(self.0.runtime.has_own_property(&object, &key))
    }

    pub fn set_property(&self, object: Value, key: Value, value: Value) -> Result<()> {
        self.ensure_ready()?;
        let target = self.value(object)?;
        let key = self.property_key(key)?;
        let value = self.value(value)?;
        self.check(self.0.runtime.set_value(&target, key, value))
    }

    /// Returns whether the property is gone afterwards.
    pub fn delete_property(&self, object: Value, key: Value) -> Result<bool> {
        self.ensure_ready()?;
        let object = self.object(object)?;
        let key = self.property_key(key)?;
        self.check(self.0.runtime.delete_property(&object, &key))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Named and indexed access
    // ═══════════════════════════════════════════════════════════════════════

    pub fn get_named_property(&self, object: Value, name: &str) -> Result<Value> {
        self.ensure_ready()?;
        let target = self.value(object)?;
        let value = self.check(self.0.runtime.get_value(&target, &PropertyKey::from_string(name.into())))?;
        self.attach(value)
    }

    pub fn has_named_property(&self, object: Value, name: &str) -> Result<bool> {
        self.ensure_ready()?;
        let object = self.object(object)?;
        self.check(self.0.runtime.has_property(&object, &PropertyKey::from_string(name.into())))
    }

    pub fn delete_named_property(&self, object: Value, name: &str) -> Result<bool> {
        self.ensure_ready()?;
        let object = self.object(object)?;
        self.check(self.0.runtime.delete_property(&object, &PropertyKey::from_string(name.into())))
    }

    pub fn set_named_property(&self, object: Value, name: &str, value: Value) -> Result<()> {
        self.ensure_ready()?;
        let target = self.value(object)?;
        let value = self.value(value)?;
        self.check(self.0.runtime.set_value(&target, PropertyKey::from_string(name.into()), value))
    }

    pub fn get_element(&self, object: Value, index: u32) -> Result<Value> {
        self.ensure_ready()?;
        let target = self.value(object)?;
        let value = self.check(self.0.runtime.get_value(&target, &PropertyKey::Index(index)))?;
        self.attach(value)
    }

    pub fn has_element(&self, object: Value, index: u32) -> Result<bool> {
        self.ensure_ready()?;
        let object = self.object(object)?;
        self.check(self.0.runtime.has_property(&object, &PropertyKey::Index(index)))
    }

    pub fn set_element(&self, object: Value, index: u32, value: Value) -> Result<()> {
        self.ensure_ready()?;
        let target = self.value(object)?;
        let value = self.value(value)?;
        self.check(self.0.runtime.set_value(&target, PropertyKey::Index(index), value))
    }

    pub fn delete_element(&self, object: Value, index: u32) -> Result<bool> {
        self.ensure_ready()?;
        let object = self.object(object)?;
        self.check(self.0.runtime.delete_property(&object, &PropertyKey::Index(index)))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Shape
    // ═══════════════════════════════════════════════════════════════════════

    /// Enumerable own string keys, as an array.
    pub fn get_property_names(&self, object: Value) -> Result<Value> {
        self.ensure_ready()?;
        let object = self.object(object)?;
        let keys = self.check(self.0.runtime.enumerable_own_keys(&object))?;
        let names = keys
            .iter()
            .filter(|key| !matches!(key, PropertyKey::Symbol(_)))
            .map(PropertyKey::to_value)
            .collect();
        self.attach(JsValue::Object(self.0.runtime.new_array(names)))
    }

    pub fn get_prototype(&self, object: Value) -> Result<Value> {
        self.ensure_ready()?;
        let object = self.object(object)?;
        let proto = match object.prototype() {
            Some(proto) => JsValue::Object(proto),
            None => JsValue::Null,
        };
        self.attach(proto)
    }

    pub fn define_properties(&self, object: Value, properties: &[PropertyDescriptor]) -> Result<()> {
        self.ensure_ready()?;
        let object = self.object(object)?;
        for descriptor in properties {
            self.define_property(&object, descriptor)?;
        }
        Ok(())
    }

    pub(super) fn define_property(&self, target: &Object, descriptor: &PropertyDescriptor) -> Result<()> {
        let key = match &descriptor.name {
            PropertyName::Named(name) => PropertyKey::from_string(name.as_str().into()),
            PropertyName::Key(key) => self.property_key(*key)?,
        };
        let name = key.to_value();
        let label = match &name {
            JsValue::String(s) => s.to_string(),
            _ => String::new(),
        };
        let attrs = descriptor.attributes;

        let property = if descriptor.getter.is_some() || descriptor.setter.is_some() {
            let getter = descriptor
                .getter
                .as_ref()
                .map(|cb| self.native_function(&format!("get {}", label), cb.clone()));
            let setter = descriptor
                .setter
                .as_ref()
                .map(|cb| self.native_function(&format!("set {}", label), cb.clone()));
            Property::accessor(getter, setter, attrs.enumerable, attrs.configurable)
        } else if let Some(method) = &descriptor.method {
            let function = self.native_function(&label, method.clone());
            Property::with_flags(JsValue::Object(function), attrs.writable, attrs.enumerable, attrs.configurable)
        } else {
            let value = match descriptor.value {
                Some(value) => self.value(value)?,
                None => JsValue::Undefined,
            };
            Property::with_flags(value, attrs.writable, attrs.enumerable, attrs.configurable)
        };
        target.define_own_property(key, property);
        Ok(())
    }
}
