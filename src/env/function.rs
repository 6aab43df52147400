//! Host functions, classes and calls into script.
//!
//! A host function is an engine native function whose closure holds the
//! host callback and a weak handle to the environment. On every call the
//! trampoline opens a scope, hands the arguments to the callback as
//! [`Value`]s and copies the result out before the scope closes. A pending
//! exception left by the callback is thrown into the caller.

use std::rc::{Rc, Weak};

use log::trace;

use crate::engine::lexer::is_identifier;
use crate::engine::{CallArgs, CheapClone, JsString, JsValue, Object, Property, PropertyKey, Runtime, Throw};
use crate::error::{Error, Result};

use super::{Env, EnvInner, Value, destroyed_error};

pub type FunctionCallback = Rc<dyn Fn(&Env, &CallbackInfo) -> Result<Option<Value>>>;

/// Arguments of a host function call. Handles live in the call's scope.
#[derive(Debug)]
pub struct CallbackInfo {
    args: Vec<Value>,
    receiver: Value,
    new_target: Option<Value>,
}

impl CallbackInfo {
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Option<Value> {
        self.args.get(index).copied()
    }

    pub fn argc(&self) -> usize {
        self.args.len()
    }

    /// `this` of the call; the fresh instance for constructor calls.
    pub fn receiver(&self) -> Value {
        self.receiver
    }

    /// Set only when invoked through `new`.
    pub fn new_target(&self) -> Option<Value> {
        self.new_target
    }
}

/// Name of a property being defined.
#[derive(Clone, Debug)]
pub enum PropertyName {
    Named(String),
    Key(Value),
}

impl From<&str> for PropertyName {
    fn from(name: &str) -> Self {
        PropertyName::Named(name.to_string())
    }
}

impl From<String> for PropertyName {
    fn from(name: String) -> Self {
        PropertyName::Named(name)
    }
}

impl From<Value> for PropertyName {
    fn from(key: Value) -> Self {
        PropertyName::Key(key)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PropertyAttributes {
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
    /// For `define_class`: define on the constructor, not the prototype.
    pub is_static: bool,
}

impl PropertyAttributes {
    pub const WRITABLE: u32 = 1;
    pub const ENUMERABLE: u32 = 1 << 1;
    pub const CONFIGURABLE: u32 = 1 << 2;
    pub const STATIC: u32 = 1 << 10;

    pub fn from_bits(bits: u32) -> Self {
        PropertyAttributes {
            writable: bits & Self::WRITABLE != 0,
            enumerable: bits & Self::ENUMERABLE != 0,
            configurable: bits & Self::CONFIGURABLE != 0,
            is_static: bits & Self::STATIC != 0,
        }
    }

    /// Writable, enumerable and configurable.
    pub fn all() -> Self {
        PropertyAttributes {
            writable: true,
            enumerable: true,
            configurable: true,
            is_static: false,
        }
    }
}

/// One property for `define_properties` / `define_class`. A getter or
/// setter makes it an accessor; otherwise `method` wins over `value`.
#[derive(Clone)]
pub struct PropertyDescriptor {
    pub name: PropertyName,
    pub value: Option<Value>,
    pub method: Option<FunctionCallback>,
    pub getter: Option<FunctionCallback>,
    pub setter: Option<FunctionCallback>,
    pub attributes: PropertyAttributes,
}

impl PropertyDescriptor {
    pub fn value(name: impl Into<PropertyName>, value: Value) -> Self {
        PropertyDescriptor {
            name: name.into(),
            value: Some(value),
            method: None,
            getter: None,
            setter: None,
            attributes: PropertyAttributes::default(),
        }
    }

    pub fn method(
        name: impl Into<PropertyName>,
        method: impl Fn(&Env, &CallbackInfo) -> Result<Option<Value>> + 'static,
    ) -> Self {
        PropertyDescriptor {
            name: name.into(),
            value: None,
            method: Some(Rc::new(method)),
            getter: None,
            setter: None,
            attributes: PropertyAttributes::default(),
        }
    }

    pub fn accessor(
        name: impl Into<PropertyName>,
        getter: Option<FunctionCallback>,
        setter: Option<FunctionCallback>,
    ) -> Self {
        PropertyDescriptor {
            name: name.into(),
            value: None,
            method: None,
            getter,
            setter,
            attributes: PropertyAttributes::default(),
        }
    }

    pub fn with_attributes(mut self, attributes: PropertyAttributes) -> Self {
        self.attributes = attributes;
        self
    }
}

impl std::fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("method", &self.method.is_some())
            .field("getter", &self.getter.is_some())
            .field("setter", &self.setter.is_some())
            .field("attributes", &self.attributes)
            .finish()
    }
}

impl Env {
    // ═══════════════════════════════════════════════════════════════════════
    // Trampolines
    // ═══════════════════════════════════════════════════════════════════════

    fn callback_info(&self, call: &CallArgs, receiver: JsValue) -> Result<CallbackInfo> {
        let args = call
            .args
            .iter()
            .map(|arg| self.attach(arg.clone()))
            .collect::<Result<Vec<_>>>()?;
        let new_target = match &call.new_target {
            Some(target) => Some(self.attach(JsValue::Object(target.cheap_clone()))?),
            None => None,
        };
        Ok(CallbackInfo {
            args,
            receiver: self.attach(receiver)?,
            new_target,
        })
    }

    /// Run a host callback for an engine call.
    pub(super) fn invoke_callback(
        &self,
        callback: &FunctionCallback,
        call: &CallArgs,
        receiver: JsValue,
    ) -> std::result::Result<JsValue, Throw> {
        self.with_scope(|| {
            let outcome = self
                .callback_info(call, receiver)
                .and_then(|info| callback(self, &info))
                .and_then(|result| match result {
                    Some(value) => self.value(value),
                    None => Ok(JsValue::Undefined),
                });
            if let Some(thrown) = self.take_exception() {
                return Err(thrown);
            }
            outcome.map_err(|e| self.callback_failure(&e))
        })
    }

    pub(super) fn native_function(&self, name: &str, callback: FunctionCallback) -> Object {
        let weak = self.downgrade();
        self.0.runtime.new_native_function(name, false, move |rt, call| {
            let env = env_for_call(&weak, rt)?;
            env.invoke_callback(&callback, call, call.this.clone())
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Creation
    // ═══════════════════════════════════════════════════════════════════════

    pub fn create_function(
        &self,
        name: &str,
        callback: impl Fn(&Env, &CallbackInfo) -> Result<Option<Value>> + 'static,
    ) -> Result<Value> {
        self.ensure_open()?;
        let function = self.native_function(name, Rc::new(callback));
        self.attach(JsValue::Object(function))
    }

    /// Compile `source` as the body of an arrow function taking `args`.
    pub fn create_function_with_source(
        &self,
        name: Option<&str>,
        file: &str,
        args: &[Value],
        source: Value,
    ) -> Result<Value> {
        self.ensure_ready()?;
        if let Some(name) = name
            && !is_identifier(name)
        {
            return Err(Error::InvalidArgument(format!("'{}' is not a valid function name", name)));
        }
        let params = args
            .iter()
            .map(|&a| self.string_of(a).map(|s| s.to_string()))
            .collect::<Result<Vec<_>>>()?;
        if let Some(param) = params.iter().find(|p| !is_identifier(p)) {
            return Err(Error::InvalidArgument(format!("'{}' is not a valid parameter name", param)));
        }
        let body = self.string_of(source)?;

        let mut text = String::from("(");
        text.push_str(&params.join(", "));
        text.push_str(") => {\n");
        text.push_str(body.as_str());
        text.push_str("\n}\n");

        let function = self.enter(|rt| {
            let function = rt.compile_function(&text, file)?;
            if let (Some(name), JsValue::Object(object)) = (name, &function) {
                rt.set_function_name(object, JsString::from(name));
            }
            Ok(function)
        })?;
        self.attach(function)
    }

    /// A constructor whose instances get their prototype from `new.target`.
    /// Static properties land on the constructor, the rest on its prototype.
    pub fn define_class(
        &self,
        name: &str,
        constructor: impl Fn(&Env, &CallbackInfo) -> Result<Option<Value>> + 'static,
        properties: &[PropertyDescriptor],
    ) -> Result<Value> {
        self.ensure_ready()?;
        let rt = &self.0.runtime;
        let callback: FunctionCallback = Rc::new(constructor);
        let weak = self.downgrade();
        let class_name = name.to_string();

        let class = rt.new_native_function(name, true, move |rt, call| {
            let env = env_for_call(&weak, rt)?;
            let Some(new_target) = &call.new_target else {
                return Err(rt.type_error(&format!(
                    "Class constructor {} cannot be invoked without 'new'",
                    class_name
                )));
            };
            let receiver = rt.object_for_constructor(new_target, &rt.realm().object_prototype)?;
            env.invoke_callback(&callback, call, JsValue::Object(receiver.cheap_clone()))?;
            Ok(JsValue::Object(receiver))
        });

        let prototype = rt.new_object();
        prototype.define_own_property(
            PropertyKey::from("constructor"),
            Property::hidden(JsValue::Object(class.cheap_clone())),
        );
        class.define_own_property(
            PropertyKey::from("prototype"),
            Property::with_flags(JsValue::Object(prototype.cheap_clone()), false, false, false),
        );

        for descriptor in properties {
            let target = if descriptor.attributes.is_static {
                &class
            } else {
                &prototype
            };
            self.define_property(target, descriptor)?;
        }
        trace!("defined class {}", name);
        self.attach(JsValue::Object(class))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Calls
    // ═══════════════════════════════════════════════════════════════════════

    fn call_parts(&self, receiver: Value, function: Value, args: &[Value]) -> Result<(JsValue, Object, Vec<JsValue>)> {
        let this = self.value(receiver)?;
        let function = self.function(function)?;
        let args = args.iter().map(|&a| self.value(a)).collect::<Result<Vec<_>>>()?;
        Ok((this, function, args))
    }

    pub fn call_function(&self, receiver: Value, function: Value, args: &[Value]) -> Result<Value> {
        self.ensure_ready()?;
        let (this, function, args) = self.call_parts(receiver, function, args)?;
        let value = self.enter(|rt| rt.call_object(&function, this, args))?;
        self.attach(value)
    }

    /// Like `call_function`, but drains microtasks on return at any depth
    /// and routes a failure to the uncaught-exception path.
    pub fn call_function_with_checkpoint(&self, receiver: Value, function: Value, args: &[Value]) -> Result<Value> {
        self.ensure_ready()?;
        let (this, function, args) = self.call_parts(receiver, function, args)?;

        let depth = self.0.depth.get();
        self.0.depth.set(depth + 1);
        let result = self.0.runtime.call_object(&function, this, args);
        self.run_microtasks();
        self.0.depth.set(depth);

        match result {
            Ok(value) => self.attach(value),
            Err(thrown) => {
                self.route_uncaught(thrown);
                Err(self.failure())
            }
        }
    }

    pub fn new_instance(&self, constructor: Value, args: &[Value]) -> Result<Value> {
        self.ensure_ready()?;
        let constructor = self.function(constructor)?;
        let args = args.iter().map(|&a| self.value(a)).collect::<Result<Vec<_>>>()?;
        let value = self.enter(|rt| rt.construct(&constructor, args, None))?;
        self.attach(value)
    }
}

pub(super) fn env_for_call(weak: &Weak<EnvInner>, rt: &Runtime) -> std::result::Result<Env, Throw> {
    Env::upgrade(weak).ok_or_else(|| destroyed_error(rt))
}
