//! The engine runtime: realm, property protocol, calls, coercions and the
//! finalizer dispatch for native classes.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use log::{trace, warn};

use crate::prelude::FxHashMap;

use super::Throw;
use super::builtins::Realm;
use super::heap::{GcStats, Heap};
use super::module::{ModuleDef, ModuleLoader};
use super::object::{
    ArrayBufferData, ClassId, ExoticObject, FunctionKind, JsFunction, NativeFn, Object, ObjectData,
    PropertyDelegate, TypedArrayKind,
};
use super::promise::{Job, RejectionTracker};
use super::stack;
use super::value::{CheapClone, JsString, JsSymbol, JsValue, Property, PropertyKey, number_to_string, string_to_number};

/// Default bound on nested calls before a `RangeError` is raised.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// Hook run with the opaque payload of a released class instance.
pub type FinalizeHook = Rc<dyn Fn(&Runtime, Rc<dyn Any>)>;

#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// Allocations between automatic cycle collections; 0 = manual only.
    pub gc_threshold: usize,
    pub max_call_depth: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            gc_threshold: 0,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Error,
    TypeError,
    RangeError,
    SyntaxError,
    ReferenceError,
    InternalError,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::InternalError => "InternalError",
        }
    }
}

/// Arguments of a native call.
pub struct CallArgs {
    pub this: JsValue,
    pub args: Vec<JsValue>,
    /// Set when invoked through `new`.
    pub new_target: Option<Object>,
    pub callee: Object,
}

impl CallArgs {
    /// Argument `i`, or `undefined` when absent.
    pub fn arg(&self, i: usize) -> JsValue {
        self.args.get(i).cloned().unwrap_or_default()
    }
}

pub(crate) struct RuntimeInner {
    pub(crate) heap: Rc<Heap>,
    pub(crate) realm: Realm,
    pub(crate) jobs: RefCell<VecDeque<Job>>,
    class_hooks: RefCell<FxHashMap<ClassId, FinalizeHook>>,
    pub(crate) module_loader: RefCell<Option<ModuleLoader>>,
    pub(crate) rejection_tracker: RefCell<Option<RejectionTracker>>,
    pub(crate) module_stack: RefCell<Vec<ModuleDef>>,
    terminated: Cell<bool>,
    call_depth: Cell<usize>,
    max_call_depth: usize,
    /// Stack position of the outermost evaluation; 0 when idle.
    stack_base: Cell<usize>,
}

/// Handle to an engine runtime. Cloning shares the same runtime.
#[derive(Clone)]
pub struct Runtime(pub(crate) Rc<RuntimeInner>);

impl CheapClone for Runtime {}

impl Runtime {
    pub fn new(options: RuntimeOptions) -> Self {
        let heap = Heap::new();
        heap.set_gc_threshold(options.gc_threshold);
        let realm = Realm::new(&heap);
        Runtime(Rc::new(RuntimeInner {
            heap,
            realm,
            jobs: RefCell::new(VecDeque::new()),
            class_hooks: RefCell::new(FxHashMap::default()),
            module_loader: RefCell::new(None),
            rejection_tracker: RefCell::new(None),
            module_stack: RefCell::new(Vec::new()),
            terminated: Cell::new(false),
            call_depth: Cell::new(0),
            max_call_depth: options.max_call_depth,
            stack_base: Cell::new(0),
        }))
    }

    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn realm(&self) -> &Realm {
        &self.0.realm
    }

    pub fn heap(&self) -> &Rc<Heap> {
        &self.0.heap
    }

    pub fn global(&self) -> &Object {
        &self.0.realm.global
    }

    // ------------------------------------------------------------------
    // Classes, finalizers, collection
    // ------------------------------------------------------------------

    pub fn register_class(&self, class: ClassId, hook: FinalizeHook) {
        self.0.class_hooks.borrow_mut().insert(class, hook);
    }

    /// Run finalize hooks for every class instance released so far, including
    /// instances released by the hooks themselves. Returns the number run.
    pub fn run_finalizers(&self) -> usize {
        let mut count = 0;
        loop {
            let batch = self.0.heap.take_pending_finalizers();
            if batch.is_empty() {
                return count;
            }
            for (class, data) in batch {
                let hook = self.0.class_hooks.borrow().get(&class).cloned();
                match hook {
                    Some(hook) => {
                        hook(self, data);
                        count += 1;
                    }
                    None => warn!("no finalize hook registered for class {}", class.raw()),
                }
            }
        }
    }

    /// Run a cycle collection pass, then the finalizers it made due.
    pub fn run_gc(&self) -> GcStats {
        let stats = self.0.heap.collect();
        self.run_finalizers();
        stats
    }

    /// Collect if the allocation threshold has been reached.
    pub fn maybe_gc(&self) {
        if self.0.heap.wants_collection() {
            self.run_gc();
        }
    }

    /// Release everything the runtime owns: queued jobs, hooks and every
    /// object's slots. Finalizers for class instances run before returning.
    pub fn dispose(&self) {
        let jobs = std::mem::take(&mut *self.0.jobs.borrow_mut());
        drop(jobs);
        let loader = self.0.module_loader.borrow_mut().take();
        drop(loader);
        let tracker = self.0.rejection_tracker.borrow_mut().take();
        drop(tracker);
        let modules = std::mem::take(&mut *self.0.module_stack.borrow_mut());
        drop(modules);
        self.0.heap.clear_all();
        self.run_finalizers();
    }

    // ------------------------------------------------------------------
    // Termination and call depth
    // ------------------------------------------------------------------

    /// Make every later evaluation fail with an uncatchable error.
    pub fn terminate(&self) {
        self.0.terminated.set(true);
    }

    pub fn is_terminated(&self) -> bool {
        self.0.terminated.get()
    }

    pub fn terminated_error(&self) -> Throw {
        Throw::uncatchable(JsValue::Object(self.new_error(ErrorKind::InternalError, "terminated")))
    }

    pub(crate) fn check_terminated(&self) -> Result<(), Throw> {
        if self.is_terminated() {
            Err(self.terminated_error())
        } else {
            Ok(())
        }
    }

    /// Run `f` with stack accounting anchored here, unless an outer
    /// evaluation already holds the anchor.
    pub(crate) fn with_stack_base<T>(&self, f: impl FnOnce() -> T) -> T {
        if self.0.stack_base.get() != 0 {
            return f();
        }
        self.0.stack_base.set(stack::position());
        let result = f();
        self.0.stack_base.set(0);
        result
    }

    /// Fail with a `RangeError` once evaluation has used its stack budget.
    pub(crate) fn check_stack(&self) -> Result<(), Throw> {
        let base = self.0.stack_base.get();
        if base != 0 && stack::used_since(base) > stack::EVAL_STACK_BUDGET {
            return Err(self.throw_error(ErrorKind::RangeError, "Maximum call stack size exceeded"));
        }
        Ok(())
    }

    fn enter_call(&self) -> Result<(), Throw> {
        self.check_terminated()?;
        let depth = self.0.call_depth.get();
        if depth >= self.0.max_call_depth {
            return Err(self.throw_error(ErrorKind::RangeError, "Maximum call stack size exceeded"));
        }
        self.check_stack()?;
        self.0.call_depth.set(depth + 1);
        Ok(())
    }

    fn exit_call(&self) {
        self.0.call_depth.set(self.0.call_depth.get().saturating_sub(1));
    }

    // ------------------------------------------------------------------
    // Allocation
    // ------------------------------------------------------------------

    pub fn alloc(&self, data: ObjectData) -> Object {
        self.0.heap.alloc(data)
    }

    pub fn new_object(&self) -> Object {
        self.alloc(ObjectData::new(
            Some(self.0.realm.object_prototype.cheap_clone()),
            ExoticObject::Ordinary,
        ))
    }

    pub fn new_object_with_proto(&self, proto: Option<Object>) -> Object {
        self.alloc(ObjectData::new(proto, ExoticObject::Ordinary))
    }

    /// Class instance with an opaque payload; the class finalize hook runs
    /// with the payload once the object is released.
    pub fn new_object_with_class(&self, class: ClassId, opaque: Rc<dyn Any>, exotic: ExoticObject) -> Object {
        let data = ObjectData::new(Some(self.0.realm.object_prototype.cheap_clone()), exotic);
        self.0.heap.alloc_with_opaque(data, class, opaque)
    }

    pub fn new_array(&self, elements: Vec<JsValue>) -> Object {
        self.alloc(ObjectData::new(
            Some(self.0.realm.array_prototype.cheap_clone()),
            ExoticObject::Array(elements),
        ))
    }

    pub fn new_date(&self, time: f64) -> Object {
        self.alloc(ObjectData::new(
            Some(self.0.realm.date_prototype.cheap_clone()),
            ExoticObject::Date(time),
        ))
    }

    pub fn new_native_function(
        &self,
        name: &str,
        constructor: bool,
        f: impl Fn(&Runtime, &CallArgs) -> Result<JsValue, Throw> + 'static,
    ) -> Object {
        let native: NativeFn = Rc::new(f);
        new_function_object(
            &self.0.heap,
            &self.0.realm.function_prototype,
            name,
            FunctionKind::Native(native),
            constructor,
        )
    }

    /// Rename a function, updating both its internal name and `name`.
    pub fn set_function_name(&self, function: &Object, name: JsString) {
        if let ExoticObject::Function(f) = &mut function.borrow_mut().exotic {
            f.name = name.cheap_clone();
        }
        function.define_own_property(
            PropertyKey::from("name"),
            Property::with_flags(JsValue::String(name), false, false, true),
        );
    }

    pub(crate) fn new_function(&self, name: JsString, kind: FunctionKind, constructor: bool) -> Object {
        let obj = self.alloc(ObjectData::new(
            Some(self.0.realm.function_prototype.cheap_clone()),
            ExoticObject::Function(JsFunction {
                name: name.cheap_clone(),
                kind,
                constructor,
            }),
        ));
        obj.define_own_property(
            PropertyKey::from("name"),
            Property::with_flags(JsValue::String(name), false, false, true),
        );
        obj
    }

    pub fn new_error(&self, kind: ErrorKind, message: &str) -> Object {
        let proto = self.0.realm.error_prototype_for(kind).cheap_clone();
        let obj = self.alloc(ObjectData::new(Some(proto), ExoticObject::Error));
        obj.define_own_property(PropertyKey::from("message"), Property::hidden(JsValue::from(message)));
        obj.define_own_property(
            PropertyKey::from("stack"),
            Property::hidden(JsValue::from(format!("{}: {}\n    at <anonymous>", kind.name(), message))),
        );
        obj
    }

    pub fn throw_error(&self, kind: ErrorKind, message: &str) -> Throw {
        Throw::new(JsValue::Object(self.new_error(kind, message)))
    }

    pub fn type_error(&self, message: &str) -> Throw {
        self.throw_error(ErrorKind::TypeError, message)
    }

    pub fn new_array_buffer(&self, bytes: Vec<u8>, external: bool) -> Object {
        self.alloc(ObjectData::new(
            Some(self.0.realm.array_buffer_prototype.cheap_clone()),
            ExoticObject::ArrayBuffer(ArrayBufferData {
                store: Some(Rc::new(RefCell::new(bytes))),
                external,
            }),
        ))
    }

    pub fn new_shared_array_buffer(&self, store: super::object::BackingStore) -> Object {
        self.alloc(ObjectData::new(
            Some(self.0.realm.shared_array_buffer_prototype.cheap_clone()),
            ExoticObject::SharedArrayBuffer(store),
        ))
    }

    pub fn new_delegate(&self, delegate: Rc<dyn PropertyDelegate>, class: ClassId, opaque: Rc<dyn Any>) -> Object {
        self.new_object_with_class(class, opaque, ExoticObject::Delegate(delegate))
    }

    /// The `prototype` property of a constructor, created on first use.
    pub fn constructor_prototype(&self, ctor: &Object) -> Result<JsValue, Throw> {
        self.get(ctor, &PropertyKey::from("prototype"))
    }

    fn ensure_prototype_property(&self, func: &Object) -> Option<JsValue> {
        let is_script_constructor = matches!(
            &func.borrow().exotic,
            ExoticObject::Function(JsFunction {
                kind: FunctionKind::Script { .. },
                constructor: true,
                ..
            })
        );
        if !is_script_constructor {
            return None;
        }
        let proto = self.new_object();
        proto.define_own_property(
            PropertyKey::from("constructor"),
            Property::hidden(JsValue::Object(func.cheap_clone())),
        );
        func.define_own_property(
            PropertyKey::from("prototype"),
            Property::with_flags(JsValue::Object(proto.cheap_clone()), true, false, false),
        );
        Some(JsValue::Object(proto))
    }

    // ------------------------------------------------------------------
    // Property protocol
    // ------------------------------------------------------------------

    pub fn get(&self, obj: &Object, key: &PropertyKey) -> Result<JsValue, Throw> {
        self.get_with_receiver(obj, key, &JsValue::Object(obj.cheap_clone()))
    }

    pub fn get_with_receiver(&self, obj: &Object, key: &PropertyKey, receiver: &JsValue) -> Result<JsValue, Throw> {
        let mut current = obj.cheap_clone();
        loop {
            if !key.is_private()
                && let Some(delegate) = delegate_of(&current)
            {
                let exists = delegate.has(self, key)?;
                if exists != Some(false)
                    && let Some(value) = delegate.get(self, key)?
                {
                    return Ok(value);
                }
            }
            if let Some(value) = self.exotic_get(&current, key) {
                return Ok(value);
            }
            if let Some(prop) = current.get_own_property(key) {
                if prop.is_accessor() {
                    return match prop.getter {
                        Some(getter) => self.call_object(&getter, receiver.clone(), Vec::new()),
                        None => Ok(JsValue::Undefined),
                    };
                }
                return Ok(prop.value);
            }
            if matches!(key, PropertyKey::String(s) if s.as_str() == "prototype")
                && let Some(proto) = self.ensure_prototype_property(&current)
            {
                return Ok(proto);
            }
            match current.prototype() {
                Some(proto) => current = proto,
                None => return Ok(JsValue::Undefined),
            }
        }
    }

    /// Property read on any value. Primitives read through their prototype.
    pub fn get_value(&self, value: &JsValue, key: &PropertyKey) -> Result<JsValue, Throw> {
        match value {
            JsValue::Object(obj) => self.get(obj, key),
            JsValue::Undefined | JsValue::Null => Err(self.type_error(&format!(
                "Cannot read properties of {} (reading '{}')",
                if value.is_null() { "null" } else { "undefined" },
                key
            ))),
            JsValue::String(s) => {
                if matches!(key, PropertyKey::String(k) if k.as_str() == "length") {
                    return Ok(JsValue::Number(s.utf16_len() as f64));
                }
                if let Some(idx) = key.as_index() {
                    return Ok(s
                        .as_str()
                        .encode_utf16()
                        .nth(idx as usize)
                        .map_or(JsValue::Undefined, |unit| JsValue::from(String::from_utf16_lossy(&[unit]))));
                }
                let proto = self.0.realm.string_prototype.cheap_clone();
                self.get_with_receiver(&proto, key, value)
            }
            JsValue::Symbol(sym) => {
                if matches!(key, PropertyKey::String(k) if k.as_str() == "description") {
                    return Ok(sym.description().map_or(JsValue::Undefined, |d| JsValue::String(d.cheap_clone())));
                }
                let proto = self.0.realm.symbol_prototype.cheap_clone();
                self.get_with_receiver(&proto, key, value)
            }
            JsValue::Boolean(_) | JsValue::Number(_) | JsValue::BigInt(_) => {
                let proto = self.0.realm.object_prototype.cheap_clone();
                self.get_with_receiver(&proto, key, value)
            }
        }
    }

    /// Set a property, honouring setters, read-only slots and delegates.
    /// Returns false when the assignment was refused.
    pub fn set(&self, obj: &Object, key: PropertyKey, value: JsValue) -> Result<bool, Throw> {
        if !key.is_private()
            && let Some(delegate) = delegate_of(obj)
            && let Some(done) = delegate.set(self, &key, &value)?
        {
            return Ok(done);
        }
        if let Some(done) = self.exotic_set(obj, &key, &value) {
            return Ok(done);
        }

        let mut current = Some(obj.cheap_clone());
        while let Some(o) = current {
            if let Some(prop) = o.get_own_property(&key) {
                if prop.is_accessor() {
                    return match prop.setter {
                        Some(setter) => {
                            self.call_object(&setter, JsValue::Object(obj.cheap_clone()), vec![value])?;
                            Ok(true)
                        }
                        None => Ok(false),
                    };
                }
                if !prop.writable {
                    return Ok(false);
                }
                if o.ptr_eq(obj) {
                    obj.define_own_property(
                        key,
                        Property::with_flags(value, prop.writable, prop.enumerable, prop.configurable),
                    );
                    return Ok(true);
                }
                break;
            }
            current = o.prototype();
        }

        if !obj.borrow().extensible {
            return Ok(false);
        }
        obj.define_own_property(key, Property::data(value));
        Ok(true)
    }

    /// Set on any value; primitives silently ignore the write.
    pub fn set_value(&self, target: &JsValue, key: PropertyKey, value: JsValue) -> Result<(), Throw> {
        match target {
            JsValue::Object(obj) => {
                self.set(obj, key, value)?;
                Ok(())
            }
            JsValue::Undefined | JsValue::Null => {
                Err(self.type_error(&format!("Cannot set properties of {:?} (setting '{}')", target, key)))
            }
            _ => Ok(()),
        }
    }

    pub fn has_property(&self, obj: &Object, key: &PropertyKey) -> Result<bool, Throw> {
        let mut current = Some(obj.cheap_clone());
        while let Some(o) = current {
            if !key.is_private()
                && let Some(delegate) = delegate_of(&o)
            {
                if let Some(found) = delegate.has(self, key)? {
                    if found {
                        return Ok(true);
                    }
                } else if delegate.get(self, key)?.is_some() {
                    return Ok(true);
                }
            }
            if self.exotic_get(&o, key).is_some() || o.has_own_property(key) {
                return Ok(true);
            }
            current = o.prototype();
        }
        Ok(false)
    }

    pub fn has_own_property(&self, obj: &Object, key: &PropertyKey) -> Result<bool, Throw> {
        if !key.is_private()
            && let Some(delegate) = delegate_of(obj)
        {
            if let Some(found) = delegate.has(self, key)? {
                return Ok(found || obj.has_own_property(key));
            }
            if delegate.get(self, key)?.is_some() {
                return Ok(true);
            }
        }
        Ok(self.exotic_get(obj, key).is_some() || obj.has_own_property(key))
    }

    pub fn delete_property(&self, obj: &Object, key: &PropertyKey) -> Result<bool, Throw> {
        if !key.is_private()
            && let Some(delegate) = delegate_of(obj)
            && let Some(done) = delegate.delete(self, key)?
        {
            return Ok(done);
        }
        match obj.get_own_property(key) {
            Some(prop) if !prop.configurable => Ok(false),
            Some(_) => Ok(obj.delete_own_property(key)),
            None => Ok(true),
        }
    }

    /// Own keys, consulting a delegate first. Private symbols are never listed.
    pub fn own_keys(&self, obj: &Object) -> Result<Vec<PropertyKey>, Throw> {
        if let Some(delegate) = delegate_of(obj)
            && let Some(keys) = delegate.own_keys(self)?
        {
            return Ok(keys.into_iter().filter(|k| !k.is_private()).collect());
        }
        let mut keys = Vec::new();
        if let ExoticObject::TypedArray(t) = &obj.borrow().exotic {
            keys.extend((0..t.length as u32).map(PropertyKey::Index));
        }
        keys.extend(obj.own_keys());
        Ok(keys)
    }

    /// Enumerable own string keys plus delegate-provided keys.
    pub fn enumerable_own_keys(&self, obj: &Object) -> Result<Vec<PropertyKey>, Throw> {
        if delegate_of(obj).is_some() {
            return Ok(self
                .own_keys(obj)?
                .into_iter()
                .filter(|k| !matches!(k, PropertyKey::Symbol(_)))
                .collect());
        }
        let mut keys = Vec::new();
        if let ExoticObject::TypedArray(t) = &obj.borrow().exotic {
            keys.extend((0..t.length as u32).map(PropertyKey::Index));
        }
        keys.extend(obj.enumerable_keys());
        Ok(keys)
    }

    /// Reads served by internal slots rather than the property table.
    fn exotic_get(&self, obj: &Object, key: &PropertyKey) -> Option<JsValue> {
        let data = obj.borrow();
        let name = match key {
            PropertyKey::String(s) => Some(s.as_str()),
            _ => None,
        };
        match &data.exotic {
            ExoticObject::TypedArray(t) => {
                if let Some(idx) = key.as_index() {
                    let idx = idx as usize;
                    if idx >= t.length {
                        return Some(JsValue::Undefined);
                    }
                    return Some(typed_array_read(&t.buffer, t.kind, t.byte_offset + idx * t.kind.element_size()));
                }
                match name {
                    Some("length") => Some(JsValue::Number(t.length as f64)),
                    Some("byteLength") => Some(JsValue::Number((t.length * t.kind.element_size()) as f64)),
                    Some("byteOffset") => Some(JsValue::Number(t.byte_offset as f64)),
                    Some("buffer") => Some(JsValue::Object(t.buffer.cheap_clone())),
                    _ => None,
                }
            }
            ExoticObject::ArrayBuffer(b) if name == Some("byteLength") => Some(JsValue::Number(
                b.store.as_ref().map_or(0, |s| s.borrow().len()) as f64,
            )),
            ExoticObject::SharedArrayBuffer(s) if name == Some("byteLength") => {
                Some(JsValue::Number(s.borrow().len() as f64))
            }
            ExoticObject::DataView(d) => match name {
                Some("byteLength") => Some(JsValue::Number(d.byte_length as f64)),
                Some("byteOffset") => Some(JsValue::Number(d.byte_offset as f64)),
                Some("buffer") => Some(JsValue::Object(d.buffer.cheap_clone())),
                _ => None,
            },
            _ => None,
        }
    }

    fn exotic_set(&self, obj: &Object, key: &PropertyKey, value: &JsValue) -> Option<bool> {
        let (kind, buffer, offset, length) = match &obj.borrow().exotic {
            ExoticObject::TypedArray(t) => (t.kind, t.buffer.cheap_clone(), t.byte_offset, t.length),
            _ => return None,
        };
        let idx = key.as_index()? as usize;
        if idx >= length {
            return Some(false);
        }
        typed_array_write(&buffer, kind, offset + idx * kind.element_size(), value);
        Some(true)
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    pub fn call(&self, func: &JsValue, this: JsValue, args: Vec<JsValue>) -> Result<JsValue, Throw> {
        match func {
            JsValue::Object(obj) => self.call_object(obj, this, args),
            _ => Err(self.type_error(&format!("{:?} is not a function", func))),
        }
    }

    pub fn call_object(&self, func: &Object, this: JsValue, args: Vec<JsValue>) -> Result<JsValue, Throw> {
        self.invoke(func, this, args, None)
    }

    /// `new func(...args)`. `new_target` defaults to `func`.
    pub fn construct(&self, func: &Object, args: Vec<JsValue>, new_target: Option<&Object>) -> Result<JsValue, Throw> {
        if !func.is_constructor() {
            let name = func.function_name().map_or_else(|| "value".to_string(), |n| n.to_string());
            return Err(self.type_error(&format!("{} is not a constructor", name)));
        }
        let new_target = new_target.unwrap_or(func).cheap_clone();
        let is_script = matches!(
            &func.borrow().exotic,
            ExoticObject::Function(JsFunction {
                kind: FunctionKind::Script { .. },
                ..
            })
        );
        if !is_script {
            return self.invoke(func, JsValue::Undefined, args, Some(new_target));
        }
        let receiver = self.object_for_constructor(&new_target, &self.0.realm.object_prototype)?;
        let result = self.invoke(func, JsValue::Object(receiver.cheap_clone()), args, Some(new_target))?;
        match result {
            JsValue::Object(_) => Ok(result),
            _ => Ok(JsValue::Object(receiver)),
        }
    }

    /// Fresh receiver whose prototype is `new_target.prototype`.
    pub fn object_for_constructor(&self, new_target: &Object, fallback: &Object) -> Result<Object, Throw> {
        let proto = match self.constructor_prototype(new_target)? {
            JsValue::Object(p) => p,
            _ => fallback.cheap_clone(),
        };
        Ok(self.new_object_with_proto(Some(proto)))
    }

    fn invoke(
        &self,
        func: &Object,
        this: JsValue,
        args: Vec<JsValue>,
        new_target: Option<Object>,
    ) -> Result<JsValue, Throw> {
        enum Target {
            Native(NativeFn),
            Script {
                def: Rc<super::ast::FunctionDef>,
                scope: Object,
                this: Option<JsValue>,
                module: Option<ModuleDef>,
            },
            Resolving {
                promise: Object,
                already: Rc<Cell<bool>>,
                reject: bool,
            },
        }

        let target = match &func.borrow().exotic {
            ExoticObject::Function(f) => match &f.kind {
                FunctionKind::Native(n) => Target::Native(n.cheap_clone()),
                FunctionKind::Script {
                    def,
                    scope,
                    this,
                    module,
                } => Target::Script {
                    def: def.cheap_clone(),
                    scope: scope.cheap_clone(),
                    this: this.clone(),
                    module: module.clone(),
                },
                FunctionKind::Resolving {
                    promise,
                    already_resolved,
                    reject,
                } => Target::Resolving {
                    promise: promise.cheap_clone(),
                    already: already_resolved.cheap_clone(),
                    reject: *reject,
                },
            },
            _ => return Err(self.type_error(&format!("{:?} is not a function", func))),
        };

        self.enter_call()?;
        trace!("call {:?}", func);
        let result = self.with_stack_base(|| match target {
            Target::Native(native) => native(
                self,
                &CallArgs {
                    this,
                    args,
                    new_target,
                    callee: func.cheap_clone(),
                },
            ),
            Target::Script {
                def,
                scope,
                this: lexical_this,
                module,
            } => {
                let this = lexical_this.unwrap_or(this);
                super::eval::call_script_function(self, &def, &scope, this, args, module)
            }
            Target::Resolving {
                promise,
                already,
                reject,
            } => {
                if !already.get() {
                    already.set(true);
                    let value = args.into_iter().next().unwrap_or_default();
                    if reject {
                        self.reject_promise(&promise, value);
                    } else {
                        self.resolve_promise(&promise, value);
                    }
                }
                Ok(JsValue::Undefined)
            }
        });
        self.exit_call();
        result
    }

    // ------------------------------------------------------------------
    // Coercions
    // ------------------------------------------------------------------

    pub fn to_primitive(&self, value: &JsValue, prefer_string: bool) -> Result<JsValue, Throw> {
        let JsValue::Object(obj) = value else {
            return Ok(value.clone());
        };
        match &obj.borrow().exotic {
            ExoticObject::Primitive(inner) => return Ok(inner.clone()),
            ExoticObject::Date(t) if !prefer_string => return Ok(JsValue::Number(*t)),
            _ => {}
        }
        let order: [&str; 2] = if prefer_string {
            ["toString", "valueOf"]
        } else {
            ["valueOf", "toString"]
        };
        for name in order {
            let method = self.get(obj, &PropertyKey::from(name))?;
            if method.is_callable() {
                let result = self.call(&method, value.clone(), Vec::new())?;
                if !result.is_object() {
                    return Ok(result);
                }
            }
        }
        Err(self.type_error("Cannot convert object to primitive value"))
    }

    pub fn to_number(&self, value: &JsValue) -> Result<f64, Throw> {
        match value {
            JsValue::Undefined => Ok(f64::NAN),
            JsValue::Null => Ok(0.0),
            JsValue::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            JsValue::Number(n) => Ok(*n),
            JsValue::String(s) => Ok(string_to_number(s.as_str())),
            JsValue::BigInt(_) => Err(self.type_error("Cannot convert a BigInt value to a number")),
            JsValue::Symbol(_) => Err(self.type_error("Cannot convert a Symbol value to a number")),
            JsValue::Object(_) => {
                let prim = self.to_primitive(value, false)?;
                self.to_number(&prim)
            }
        }
    }

    pub fn to_string(&self, value: &JsValue) -> Result<JsString, Throw> {
        match value {
            JsValue::Undefined => Ok(JsString::from("undefined")),
            JsValue::Null => Ok(JsString::from("null")),
            JsValue::Boolean(b) => Ok(JsString::from(if *b { "true" } else { "false" })),
            JsValue::Number(n) => Ok(JsString::from(number_to_string(*n))),
            JsValue::BigInt(n) => Ok(JsString::from(n.to_string())),
            JsValue::String(s) => Ok(s.cheap_clone()),
            JsValue::Symbol(_) => Err(self.type_error("Cannot convert a Symbol value to a string")),
            JsValue::Object(_) => {
                let prim = self.to_primitive(value, true)?;
                self.to_string(&prim)
            }
        }
    }

    pub fn to_object(&self, value: &JsValue) -> Result<Object, Throw> {
        let proto = match value {
            JsValue::Object(obj) => return Ok(obj.cheap_clone()),
            JsValue::Undefined | JsValue::Null => {
                return Err(self.type_error("Cannot convert undefined or null to object"));
            }
            JsValue::String(_) => &self.0.realm.string_prototype,
            JsValue::Symbol(_) => &self.0.realm.symbol_prototype,
            _ => &self.0.realm.object_prototype,
        };
        Ok(self.alloc(ObjectData::new(
            Some(proto.cheap_clone()),
            ExoticObject::Primitive(value.clone()),
        )))
    }

    pub fn to_property_key(&self, value: &JsValue) -> Result<PropertyKey, Throw> {
        match value {
            JsValue::Symbol(s) => Ok(PropertyKey::Symbol(s.cheap_clone())),
            JsValue::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n < f64::from(u32::MAX) => {
                Ok(PropertyKey::Index(*n as u32))
            }
            other => Ok(PropertyKey::from_string(self.to_string(other)?)),
        }
    }

    pub fn to_int32(&self, value: &JsValue) -> Result<i32, Throw> {
        Ok(number_to_int32(self.to_number(value)?))
    }

    pub fn to_uint32(&self, value: &JsValue) -> Result<u32, Throw> {
        Ok(number_to_int32(self.to_number(value)?) as u32)
    }

    /// `value instanceof ctor`
    pub fn instance_of(&self, value: &JsValue, ctor: &JsValue) -> Result<bool, Throw> {
        let JsValue::Object(ctor_obj) = ctor else {
            return Err(self.type_error("Right-hand side of 'instanceof' is not callable"));
        };
        if !ctor_obj.is_callable() {
            return Err(self.type_error("Right-hand side of 'instanceof' is not callable"));
        }
        let JsValue::Object(obj) = value else {
            return Ok(false);
        };
        let JsValue::Object(proto) = self.constructor_prototype(ctor_obj)? else {
            return Err(self.type_error("Function has non-object prototype in instanceof check"));
        };
        let mut current = obj.prototype();
        while let Some(p) = current {
            if p.ptr_eq(&proto) {
                return Ok(true);
            }
            current = p.prototype();
        }
        Ok(false)
    }

    /// Abstract equality (`==`).
    pub fn loose_equals(&self, a: &JsValue, b: &JsValue) -> Result<bool, Throw> {
        match (a, b) {
            (JsValue::Undefined | JsValue::Null, JsValue::Undefined | JsValue::Null) => Ok(true),
            (JsValue::Undefined | JsValue::Null, _) | (_, JsValue::Undefined | JsValue::Null) => Ok(false),
            (JsValue::Number(_), JsValue::String(_)) | (JsValue::String(_), JsValue::Number(_)) => {
                Ok(self.to_number(a)? == self.to_number(b)?)
            }
            (JsValue::BigInt(x), JsValue::Number(y)) | (JsValue::Number(y), JsValue::BigInt(x)) => Ok(*x as f64 == *y),
            (JsValue::Boolean(_), _) => {
                let n = JsValue::Number(self.to_number(a)?);
                self.loose_equals(&n, b)
            }
            (_, JsValue::Boolean(_)) => {
                let n = JsValue::Number(self.to_number(b)?);
                self.loose_equals(a, &n)
            }
            (JsValue::Object(_), JsValue::Object(_)) => Ok(a.strict_equals(b)),
            (JsValue::Object(_), _) => {
                let prim = self.to_primitive(a, false)?;
                self.loose_equals(&prim, b)
            }
            (_, JsValue::Object(_)) => {
                let prim = self.to_primitive(b, false)?;
                self.loose_equals(a, &prim)
            }
            _ => Ok(a.strict_equals(b)),
        }
    }

    pub fn new_symbol(&self, description: Option<JsString>) -> JsValue {
        JsValue::Symbol(JsSymbol::new(description))
    }
}

pub(crate) fn new_function_object(
    heap: &Rc<Heap>,
    function_prototype: &Object,
    name: &str,
    kind: FunctionKind,
    constructor: bool,
) -> Object {
    let obj = heap.alloc(ObjectData::new(
        Some(function_prototype.cheap_clone()),
        ExoticObject::Function(JsFunction {
            name: JsString::from(name),
            kind,
            constructor,
        }),
    ));
    obj.define_own_property(
        PropertyKey::from("name"),
        Property::with_flags(JsValue::from(name), false, false, true),
    );
    obj
}

fn delegate_of(obj: &Object) -> Option<Rc<dyn PropertyDelegate>> {
    match &obj.borrow().exotic {
        ExoticObject::Delegate(d) => Some(d.cheap_clone()),
        _ => None,
    }
}

pub fn number_to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    let n = n.trunc() % 4_294_967_296.0;
    let n = if n < 0.0 { n + 4_294_967_296.0 } else { n };
    (n as u64 as u32) as i32
}

fn buffer_store(buffer: &Object) -> Option<super::object::BackingStore> {
    match &buffer.borrow().exotic {
        ExoticObject::ArrayBuffer(b) => b.store.clone(),
        ExoticObject::SharedArrayBuffer(s) => Some(s.cheap_clone()),
        _ => None,
    }
}

fn read_bytes<const N: usize>(bytes: &[u8], offset: usize) -> Option<[u8; N]> {
    bytes.get(offset..offset + N)?.try_into().ok()
}

pub(crate) fn typed_array_read(buffer: &Object, kind: TypedArrayKind, offset: usize) -> JsValue {
    let Some(store) = buffer_store(buffer) else {
        return JsValue::Undefined;
    };
    let bytes = store.borrow();
    let value = match kind {
        TypedArrayKind::Int8 => read_bytes::<1>(&bytes, offset).map(|b| JsValue::from(i32::from(i8::from_le_bytes(b)))),
        TypedArrayKind::Uint8 | TypedArrayKind::Uint8Clamped => {
            read_bytes::<1>(&bytes, offset).map(|b| JsValue::from(u32::from(b[0])))
        }
        TypedArrayKind::Int16 => read_bytes::<2>(&bytes, offset).map(|b| JsValue::from(i32::from(i16::from_le_bytes(b)))),
        TypedArrayKind::Uint16 => read_bytes::<2>(&bytes, offset).map(|b| JsValue::from(u32::from(u16::from_le_bytes(b)))),
        TypedArrayKind::Int32 => read_bytes::<4>(&bytes, offset).map(|b| JsValue::from(i32::from_le_bytes(b))),
        TypedArrayKind::Uint32 => read_bytes::<4>(&bytes, offset).map(|b| JsValue::from(u32::from_le_bytes(b))),
        TypedArrayKind::Float32 => {
            read_bytes::<4>(&bytes, offset).map(|b| JsValue::Number(f64::from(f32::from_le_bytes(b))))
        }
        TypedArrayKind::Float64 => read_bytes::<8>(&bytes, offset).map(|b| JsValue::Number(f64::from_le_bytes(b))),
        TypedArrayKind::BigInt64 => {
            read_bytes::<8>(&bytes, offset).map(|b| JsValue::BigInt(i128::from(i64::from_le_bytes(b))))
        }
        TypedArrayKind::BigUint64 => {
            read_bytes::<8>(&bytes, offset).map(|b| JsValue::BigInt(i128::from(u64::from_le_bytes(b))))
        }
    };
    value.unwrap_or_default()
}

pub(crate) fn typed_array_write(buffer: &Object, kind: TypedArrayKind, offset: usize, value: &JsValue) {
    let Some(store) = buffer_store(buffer) else {
        return;
    };
    let number = match value {
        JsValue::Number(n) => *n,
        JsValue::Boolean(b) => f64::from(u8::from(*b)),
        JsValue::BigInt(n) => *n as f64,
        _ => f64::NAN,
    };
    let big = match value {
        JsValue::BigInt(n) => *n,
        _ => number as i128,
    };
    let encoded: Vec<u8> = match kind {
        TypedArrayKind::Int8 | TypedArrayKind::Uint8 => vec![number_to_int32(number) as u8],
        TypedArrayKind::Uint8Clamped => vec![if number.is_nan() { 0 } else { number.round().clamp(0.0, 255.0) as u8 }],
        TypedArrayKind::Int16 | TypedArrayKind::Uint16 => (number_to_int32(number) as u16).to_le_bytes().to_vec(),
        TypedArrayKind::Int32 | TypedArrayKind::Uint32 => number_to_int32(number).to_le_bytes().to_vec(),
        TypedArrayKind::Float32 => (number as f32).to_le_bytes().to_vec(),
        TypedArrayKind::Float64 => number.to_le_bytes().to_vec(),
        TypedArrayKind::BigInt64 | TypedArrayKind::BigUint64 => (big as i64).to_le_bytes().to_vec(),
    };
    let mut bytes = store.borrow_mut();
    if let Some(dest) = bytes.get_mut(offset..offset + encoded.len()) {
        dest.copy_from_slice(&encoded);
    }
}
