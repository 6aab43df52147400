//! Delegate objects: property access answered by host code.

use std::any::Any;
use std::rc::{Rc, Weak};

use crate::engine::{JsValue, PropertyDelegate, PropertyKey, Runtime, Throw};
use crate::error::Result;
use crate::platform::Platform;

use super::finalizer::{FinalizeCallback, Finalizer};
use super::function::env_for_call;
use super::{Env, EnvInner, Value};

/// Host hooks for a delegate object. Every hook may decline by returning
/// `Ok(None)`, in which case the object behaves like an ordinary one.
pub trait Delegate {
    fn get(&self, _env: &Env, _property: Value) -> Result<Option<Value>> {
        Ok(None)
    }

    fn has(&self, _env: &Env, _property: Value) -> Result<Option<bool>> {
        Ok(None)
    }

    /// `Some(true)` if the assignment was handled.
    fn set(&self, _env: &Env, _property: Value, _value: Value) -> Result<Option<bool>> {
        Ok(None)
    }

    fn delete_property(&self, _env: &Env, _property: Value) -> Result<Option<bool>> {
        Ok(None)
    }

    /// An array of property names.
    fn own_keys(&self, _env: &Env) -> Result<Option<Value>> {
        Ok(None)
    }
}

struct DelegateAdapter {
    env: Weak<EnvInner>,
    delegate: Box<dyn Delegate>,
}

impl DelegateAdapter {
    /// Run a hook in a scope of its own with the key as a handle.
    fn hook<T>(
        &self,
        rt: &Runtime,
        key: Option<&PropertyKey>,
        f: impl FnOnce(&Env, Option<Value>) -> Result<Option<T>>,
    ) -> std::result::Result<Option<T>, Throw> {
        let env = env_for_call(&self.env, rt)?;
        env.with_scope(|| {
            let outcome = match key {
                Some(key) => env.attach(key.to_value()).and_then(|k| f(&env, Some(k))),
                None => f(&env, None),
            };
            if let Some(thrown) = env.take_exception() {
                return Err(thrown);
            }
            outcome.map_err(|e| env.callback_failure(&e))
        })
    }
}

impl PropertyDelegate for DelegateAdapter {
    fn get(&self, rt: &Runtime, key: &PropertyKey) -> std::result::Result<Option<JsValue>, Throw> {
        self.hook(rt, Some(key), |env, property| {
            let Some(property) = property else { return Ok(None) };
            if self.delegate.has(env, property)? == Some(false) {
                return Ok(None);
            }
            match self.delegate.get(env, property)? {
                Some(value) => env.value(value).map(Some),
                None => Ok(None),
            }
        })
    }

    fn has(&self, rt: &Runtime, key: &PropertyKey) -> std::result::Result<Option<bool>, Throw> {
        self.hook(rt, Some(key), |env, property| match property {
            Some(property) => self.delegate.has(env, property),
            None => Ok(None),
        })
    }

    fn set(&self, rt: &Runtime, key: &PropertyKey, value: &JsValue) -> std::result::Result<Option<bool>, Throw> {
        self.hook(rt, Some(key), |env, property| {
            let Some(property) = property else { return Ok(None) };
            let value = env.attach(value.clone())?;
            self.delegate.set(env, property, value)
        })
    }

    fn delete(&self, rt: &Runtime, key: &PropertyKey) -> std::result::Result<Option<bool>, Throw> {
        self.hook(rt, Some(key), |env, property| match property {
            Some(property) => self.delegate.delete_property(env, property),
            None => Ok(None),
        })
    }

    fn own_keys(&self, rt: &Runtime) -> std::result::Result<Option<Vec<PropertyKey>>, Throw> {
        let keys = self.hook(rt, None, |env, _| match self.delegate.own_keys(env)? {
            Some(array) => env.value(array).map(Some),
            None => Ok(None),
        })?;
        let Some(keys) = keys else { return Ok(None) };
        let array = match &keys {
            JsValue::Object(array) if array.is_array() => array,
            _ => return Err(rt.type_error("Delegate ownKeys must return an array")),
        };
        let length = rt.get(array, &PropertyKey::from("length"))?;
        let length = rt.to_number(&length)? as u32;
        let mut out = Vec::new();
        for i in 0..length {
            let key = rt.get(array, &PropertyKey::Index(i))?;
            out.push(rt.to_property_key(&key)?);
        }
        Ok(Some(out))
    }
}

impl Env {
    /// An object whose property access goes through `delegate`. `finalize`
    /// runs with `data` once the object is collected.
    pub fn create_delegate(
        &self,
        delegate: impl Delegate + 'static,
        data: Rc<dyn Any>,
        finalize: Option<FinalizeCallback>,
    ) -> Result<Value> {
        self.ensure_open()?;
        let adapter = Rc::new(DelegateAdapter {
            env: self.downgrade(),
            delegate: Box::new(delegate),
        });
        let finalizer = Rc::new(Finalizer::new(data, finalize));
        let object = self
            .0
            .runtime
            .new_delegate(adapter, Platform::classes().delegate, finalizer);
        self.attach(JsValue::Object(object))
    }
}
