//! Object cells, exotic object kinds and the class registry.

use std::any::Any;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU32, Ordering};

use crate::prelude::{IndexMap, index_map_new};

use super::Throw;
use super::ast::FunctionDef;
use super::heap::Heap;
use super::module::ModuleDef;
use super::promise::PromiseState;
use super::runtime::{CallArgs, Runtime};
use super::value::{CheapClone, JsString, JsValue, Property, PropertyKey};

// ============================================================================
// Classes
// ============================================================================

static NEXT_CLASS_ID: AtomicU32 = AtomicU32::new(1);

/// Identity of a native-backed object class.
///
/// Class ids are process-wide so the same id is valid in every runtime.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ClassId(u32);

impl ClassId {
    pub fn allocate() -> Self {
        ClassId(NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Opaque payload carried by class instances. Queued for the class finalize
/// hook when the object is released.
pub(crate) struct Opaque {
    pub(crate) class: ClassId,
    pub(crate) data: Rc<dyn Any>,
    pub(crate) sink: Weak<Heap>,
}

// ============================================================================
// Object
// ============================================================================

pub struct ObjectCell {
    data: RefCell<ObjectData>,
    opaque: RefCell<Option<Opaque>>,
}

impl Drop for ObjectCell {
    fn drop(&mut self) {
        if let Some(opaque) = self.opaque.get_mut().take()
            && let Some(heap) = opaque.sink.upgrade()
        {
            heap.queue_finalizer(opaque.class, opaque.data);
        }
    }
}

/// Strong handle to an engine object.
///
/// Cloning duplicates the handle; the object's storage is released when the
/// last strong handle is dropped.
#[derive(Clone)]
pub struct Object(Rc<ObjectCell>);

impl CheapClone for Object {}

/// Non-owning handle; never keeps its target alive.
#[derive(Clone)]
pub struct WeakObject(Weak<ObjectCell>);

impl WeakObject {
    pub fn upgrade(&self) -> Option<Object> {
        self.0.upgrade().map(Object)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl Object {
    pub(crate) fn from_parts(data: ObjectData, opaque: Option<Opaque>) -> Self {
        Object(Rc::new(ObjectCell {
            data: RefCell::new(data),
            opaque: RefCell::new(opaque),
        }))
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Stable address used for identity comparisons and debug output.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub fn downgrade(&self) -> WeakObject {
        WeakObject(Rc::downgrade(&self.0))
    }

    pub(crate) fn cell_weak(&self) -> Weak<ObjectCell> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn from_cell(cell: Rc<ObjectCell>) -> Self {
        Object(cell)
    }

    /// Number of strong handles, including this one.
    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    pub fn borrow(&self) -> Ref<'_, ObjectData> {
        self.0.data.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, ObjectData> {
        self.0.data.borrow_mut()
    }

    pub(crate) fn try_borrow(&self) -> Option<Ref<'_, ObjectData>> {
        self.0.data.try_borrow().ok()
    }

    pub(crate) fn try_borrow_mut(&self) -> Option<RefMut<'_, ObjectData>> {
        self.0.data.try_borrow_mut().ok()
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.borrow().exotic, ExoticObject::Function(_))
    }

    pub fn is_constructor(&self) -> bool {
        matches!(&self.borrow().exotic, ExoticObject::Function(f) if f.constructor)
    }

    pub fn is_array(&self) -> bool {
        matches!(self.borrow().exotic, ExoticObject::Array(_))
    }

    pub fn class_id(&self) -> Option<ClassId> {
        self.0.opaque.borrow().as_ref().map(|o| o.class)
    }

    /// Opaque payload, if this object was created with one.
    pub fn opaque(&self) -> Option<Rc<dyn Any>> {
        self.0.opaque.borrow().as_ref().map(|o| o.data.cheap_clone())
    }

    /// Opaque payload when the object belongs to `class`.
    pub fn opaque_of(&self, class: ClassId) -> Option<Rc<dyn Any>> {
        self.0
            .opaque
            .borrow()
            .as_ref()
            .filter(|o| o.class == class)
            .map(|o| o.data.cheap_clone())
    }

    pub fn prototype(&self) -> Option<Object> {
        self.borrow().prototype.clone()
    }

    pub fn set_prototype(&self, proto: Option<Object>) {
        let old = std::mem::replace(&mut self.borrow_mut().prototype, proto);
        drop(old);
    }

    /// Own property lookup without invoking accessors or delegates.
    pub fn get_own_property(&self, key: &PropertyKey) -> Option<Property> {
        let data = self.borrow();
        if let Some(idx) = key.as_index() {
            match &data.exotic {
                ExoticObject::Array(elements) => {
                    return elements.get(idx as usize).map(|v| Property::data(v.clone()));
                }
                ExoticObject::Primitive(JsValue::String(s)) => {
                    if let Some(ch) = s.as_str().encode_utf16().nth(idx as usize) {
                        let unit = String::from_utf16_lossy(&[ch]);
                        return Some(Property::with_flags(JsValue::from(unit), false, true, false));
                    }
                }
                _ => {}
            }
        }
        if let PropertyKey::String(s) = key
            && s.as_str() == "length"
            && let ExoticObject::Array(elements) = &data.exotic
        {
            return Some(Property::with_flags(
                JsValue::Number(elements.len() as f64),
                true,
                false,
                false,
            ));
        }
        data.properties.get(key).cloned()
    }

    pub fn has_own_property(&self, key: &PropertyKey) -> bool {
        self.get_own_property(key).is_some()
    }

    /// Define (or overwrite) an own property. Array indices and `length` on
    /// arrays go to the element storage.
    pub fn define_own_property(&self, key: PropertyKey, prop: Property) {
        let replaced = {
            let mut data = self.borrow_mut();
            if let ExoticObject::Array(elements) = &mut data.exotic {
                if let Some(idx) = key.as_index()
                    && !prop.is_accessor()
                {
                    let idx = idx as usize;
                    if idx >= elements.len() {
                        elements.resize(idx + 1, JsValue::Undefined);
                    }
                    let slot = elements.get_mut(idx);
                    return drop(slot.map(|s| std::mem::replace(s, prop.value)));
                }
                if matches!(&key, PropertyKey::String(s) if s.as_str() == "length") {
                    let len = match prop.value {
                        JsValue::Number(n) if n >= 0.0 => n as usize,
                        _ => elements.len(),
                    };
                    let removed: Vec<JsValue> = if len < elements.len() {
                        elements.drain(len..).collect()
                    } else {
                        elements.resize(len, JsValue::Undefined);
                        Vec::new()
                    };
                    return drop(removed);
                }
            }
            data.properties.insert(key, prop)
        };
        drop(replaced);
    }

    pub fn delete_own_property(&self, key: &PropertyKey) -> bool {
        let removed = {
            let mut data = self.borrow_mut();
            if let (ExoticObject::Array(elements), Some(idx)) = (&mut data.exotic, key.as_index()) {
                elements
                    .get_mut(idx as usize)
                    .map(|slot| Property::data(std::mem::take(slot)))
            } else {
                data.properties.shift_remove(key)
            }
        };
        match removed {
            Some(prop) => {
                drop(prop);
                true
            }
            None => false,
        }
    }

    /// Own keys in insertion order: array indices first, private symbols skipped.
    pub fn own_keys(&self) -> Vec<PropertyKey> {
        let data = self.borrow();
        let mut keys = Vec::new();
        match &data.exotic {
            ExoticObject::Array(elements) => {
                keys.extend((0..elements.len() as u32).map(PropertyKey::Index));
            }
            ExoticObject::Primitive(JsValue::String(s)) => {
                keys.extend((0..s.utf16_len() as u32).map(PropertyKey::Index));
            }
            _ => {}
        }
        keys.extend(
            data.properties
                .keys()
                .filter(|k| !k.is_private())
                .cloned(),
        );
        keys
    }

    /// Enumerable own string keys, as `Object.keys` reports them.
    pub fn enumerable_keys(&self) -> Vec<PropertyKey> {
        self.own_keys()
            .into_iter()
            .filter(|k| !matches!(k, PropertyKey::Symbol(_)))
            .filter(|k| self.get_own_property(k).is_some_and(|p| p.enumerable))
            .collect()
    }

    pub fn function_name(&self) -> Option<JsString> {
        match &self.borrow().exotic {
            ExoticObject::Function(f) => Some(f.name.cheap_clone()),
            _ => None,
        }
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Object {}

impl Hash for Object {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_borrow() {
            Some(data) => write!(f, "[{} #{:x}]", data.exotic.kind_name(), self.id()),
            None => write!(f, "[object #{:x}]", self.id()),
        }
    }
}

// ============================================================================
// Object data
// ============================================================================

/// Mutable state of an object.
pub struct ObjectData {
    pub prototype: Option<Object>,
    pub properties: IndexMap<PropertyKey, Property>,
    pub exotic: ExoticObject,
    pub extensible: bool,
}

impl Default for ObjectData {
    fn default() -> Self {
        Self {
            prototype: None,
            properties: index_map_new(),
            exotic: ExoticObject::Ordinary,
            extensible: true,
        }
    }
}

impl ObjectData {
    pub fn new(prototype: Option<Object>, exotic: ExoticObject) -> Self {
        Self {
            prototype,
            properties: index_map_new(),
            exotic,
            extensible: true,
        }
    }

    /// Visit every object this one holds a strong handle to. Each handle is
    /// visited once, so visits can be counted against the reference count.
    pub(crate) fn trace(&self, visit: &mut dyn FnMut(&Object)) {
        if let Some(proto) = &self.prototype {
            visit(proto);
        }
        for prop in self.properties.values() {
            trace_value(&prop.value, visit);
            if let Some(g) = &prop.getter {
                visit(g);
            }
            if let Some(s) = &prop.setter {
                visit(s);
            }
        }
        self.exotic.trace(visit);
    }
}

fn trace_value(value: &JsValue, visit: &mut dyn FnMut(&Object)) {
    if let JsValue::Object(o) = value {
        visit(o);
    }
}

/// Host hooks backing a delegate object. `None` from a hook means "not
/// handled", in which case ordinary property semantics apply.
pub trait PropertyDelegate {
    fn get(&self, _rt: &Runtime, _key: &PropertyKey) -> Result<Option<JsValue>, Throw> {
        Ok(None)
    }

    fn has(&self, _rt: &Runtime, _key: &PropertyKey) -> Result<Option<bool>, Throw> {
        Ok(None)
    }

    fn set(&self, _rt: &Runtime, _key: &PropertyKey, _value: &JsValue) -> Result<Option<bool>, Throw> {
        Ok(None)
    }

    fn delete(&self, _rt: &Runtime, _key: &PropertyKey) -> Result<Option<bool>, Throw> {
        Ok(None)
    }

    fn own_keys(&self, _rt: &Runtime) -> Result<Option<Vec<PropertyKey>>, Throw> {
        Ok(None)
    }
}

/// Shared byte storage for array buffers.
pub type BackingStore = Rc<RefCell<Vec<u8>>>;

pub struct ArrayBufferData {
    /// `None` once detached.
    pub store: Option<BackingStore>,
    /// Externally provided memory; cannot be detached into a fresh buffer.
    pub external: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TypedArrayKind {
    Int8,
    Uint8,
    Uint8Clamped,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
    BigInt64,
    BigUint64,
}

impl TypedArrayKind {
    pub fn element_size(self) -> usize {
        match self {
            TypedArrayKind::Int8 | TypedArrayKind::Uint8 | TypedArrayKind::Uint8Clamped => 1,
            TypedArrayKind::Int16 | TypedArrayKind::Uint16 => 2,
            TypedArrayKind::Int32 | TypedArrayKind::Uint32 | TypedArrayKind::Float32 => 4,
            TypedArrayKind::Float64 | TypedArrayKind::BigInt64 | TypedArrayKind::BigUint64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TypedArrayKind::Int8 => "Int8Array",
            TypedArrayKind::Uint8 => "Uint8Array",
            TypedArrayKind::Uint8Clamped => "Uint8ClampedArray",
            TypedArrayKind::Int16 => "Int16Array",
            TypedArrayKind::Uint16 => "Uint16Array",
            TypedArrayKind::Int32 => "Int32Array",
            TypedArrayKind::Uint32 => "Uint32Array",
            TypedArrayKind::Float32 => "Float32Array",
            TypedArrayKind::Float64 => "Float64Array",
            TypedArrayKind::BigInt64 => "BigInt64Array",
            TypedArrayKind::BigUint64 => "BigUint64Array",
        }
    }
}

pub struct TypedArrayData {
    pub kind: TypedArrayKind,
    pub buffer: Object,
    pub byte_offset: usize,
    pub length: usize,
}

pub struct DataViewData {
    pub buffer: Object,
    pub byte_offset: usize,
    pub byte_length: usize,
}

/// Signature of host-implemented functions.
pub type NativeFn = Rc<dyn Fn(&Runtime, &CallArgs) -> Result<JsValue, Throw>>;

pub enum FunctionKind {
    Native(NativeFn),
    Script {
        def: Rc<FunctionDef>,
        scope: Object,
        /// Captured `this` for arrow functions.
        this: Option<JsValue>,
        module: Option<ModuleDef>,
    },
    /// The resolve or reject function of a promise capability.
    Resolving {
        promise: Object,
        already_resolved: Rc<Cell<bool>>,
        reject: bool,
    },
}

pub struct JsFunction {
    pub name: JsString,
    pub kind: FunctionKind,
    pub constructor: bool,
}

/// Behaviour-bearing internal slots of an object.
pub enum ExoticObject {
    Ordinary,
    Array(Vec<JsValue>),
    Function(JsFunction),
    Error,
    Date(f64),
    Promise(PromiseState),
    ArrayBuffer(ArrayBufferData),
    SharedArrayBuffer(BackingStore),
    TypedArray(TypedArrayData),
    DataView(DataViewData),
    Namespace,
    Delegate(Rc<dyn PropertyDelegate>),
    /// Variable bindings of a lexical scope; parent scope is the prototype.
    Environment,
    /// Boxed primitive produced by `ToObject`.
    Primitive(JsValue),
}

impl ExoticObject {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ExoticObject::Ordinary => "Object",
            ExoticObject::Array(_) => "Array",
            ExoticObject::Function(_) => "Function",
            ExoticObject::Error => "Error",
            ExoticObject::Date(_) => "Date",
            ExoticObject::Promise(_) => "Promise",
            ExoticObject::ArrayBuffer(_) => "ArrayBuffer",
            ExoticObject::SharedArrayBuffer(_) => "SharedArrayBuffer",
            ExoticObject::TypedArray(t) => t.kind.name(),
            ExoticObject::DataView(_) => "DataView",
            ExoticObject::Namespace => "Module",
            ExoticObject::Delegate(_) => "Delegate",
            ExoticObject::Environment => "Environment",
            ExoticObject::Primitive(_) => "Primitive",
        }
    }

    fn trace(&self, visit: &mut dyn FnMut(&Object)) {
        match self {
            ExoticObject::Array(elements) => {
                for v in elements {
                    trace_value(v, visit);
                }
            }
            ExoticObject::Function(f) => match &f.kind {
                FunctionKind::Script { scope, this, .. } => {
                    visit(scope);
                    if let Some(this) = this {
                        trace_value(this, visit);
                    }
                }
                FunctionKind::Resolving { promise, .. } => visit(promise),
                FunctionKind::Native(_) => {}
            },
            ExoticObject::Promise(state) => state.trace(visit),
            ExoticObject::TypedArray(t) => visit(&t.buffer),
            ExoticObject::DataView(d) => visit(&d.buffer),
            ExoticObject::Primitive(v) => trace_value(v, visit),
            ExoticObject::Ordinary
            | ExoticObject::Error
            | ExoticObject::Date(_)
            | ExoticObject::ArrayBuffer(_)
            | ExoticObject::SharedArrayBuffer(_)
            | ExoticObject::Namespace
            | ExoticObject::Delegate(_)
            | ExoticObject::Environment => {}
        }
    }
}
