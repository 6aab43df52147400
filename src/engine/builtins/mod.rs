//! Realm setup: intrinsic prototypes and the global object.

mod buffer;
mod console;
mod date;
mod error;
mod function;
pub mod json;
mod object;
mod promise;

use std::rc::Rc;

use super::Throw;
use super::heap::Heap;
use super::object::{ExoticObject, FunctionKind, Object, ObjectData};
use super::runtime::{CallArgs, ErrorKind, Runtime, new_function_object};
use super::value::{CheapClone, JsValue, Property, PropertyKey};

/// Signature of builtin functions.
type Builtin = fn(&Runtime, &CallArgs) -> Result<JsValue, Throw>;

/// Intrinsic objects of a runtime.
pub struct Realm {
    pub global: Object,
    /// Scope record for top-level `let`/`const` of classic scripts.
    pub global_scope: Object,
    pub object_prototype: Object,
    pub function_prototype: Object,
    pub array_prototype: Object,
    pub string_prototype: Object,
    pub symbol_prototype: Object,
    pub error_prototype: Object,
    pub type_error_prototype: Object,
    pub range_error_prototype: Object,
    pub syntax_error_prototype: Object,
    pub reference_error_prototype: Object,
    pub internal_error_prototype: Object,
    pub promise_prototype: Object,
    pub date_prototype: Object,
    pub array_buffer_prototype: Object,
    pub shared_array_buffer_prototype: Object,
    pub typed_array_prototype: Object,
    pub data_view_prototype: Object,
}

impl Realm {
    pub(crate) fn new(heap: &Rc<Heap>) -> Self {
        let object_prototype = heap.alloc(ObjectData::new(None, ExoticObject::Ordinary));
        let derived = |exotic: ExoticObject| heap.alloc(ObjectData::new(Some(object_prototype.cheap_clone()), exotic));
        let function_prototype = derived(ExoticObject::Ordinary);
        let error_prototype = derived(ExoticObject::Ordinary);
        let error_child = || {
            heap.alloc(ObjectData::new(
                Some(error_prototype.cheap_clone()),
                ExoticObject::Ordinary,
            ))
        };

        let realm = Realm {
            global: derived(ExoticObject::Ordinary),
            global_scope: heap.alloc(ObjectData::new(None, ExoticObject::Environment)),
            array_prototype: derived(ExoticObject::Array(Vec::new())),
            string_prototype: derived(ExoticObject::Ordinary),
            symbol_prototype: derived(ExoticObject::Ordinary),
            type_error_prototype: error_child(),
            range_error_prototype: error_child(),
            syntax_error_prototype: error_child(),
            reference_error_prototype: error_child(),
            internal_error_prototype: error_child(),
            promise_prototype: derived(ExoticObject::Ordinary),
            date_prototype: derived(ExoticObject::Ordinary),
            array_buffer_prototype: derived(ExoticObject::Ordinary),
            shared_array_buffer_prototype: derived(ExoticObject::Ordinary),
            typed_array_prototype: derived(ExoticObject::Ordinary),
            data_view_prototype: derived(ExoticObject::Ordinary),
            error_prototype,
            function_prototype,
            object_prototype,
        };

        let init = Init { heap, realm: &realm };
        init.value(&realm.global, "globalThis", JsValue::Object(realm.global.cheap_clone()));
        object::init(&init);
        function::init(&init);
        error::init(&init);
        promise::init(&init);
        date::init(&init);
        buffer::init(&init);
        json::init(&init);
        console::init(&init);
        realm
    }

    pub fn error_prototype_for(&self, kind: ErrorKind) -> &Object {
        match kind {
            ErrorKind::Error => &self.error_prototype,
            ErrorKind::TypeError => &self.type_error_prototype,
            ErrorKind::RangeError => &self.range_error_prototype,
            ErrorKind::SyntaxError => &self.syntax_error_prototype,
            ErrorKind::ReferenceError => &self.reference_error_prototype,
            ErrorKind::InternalError => &self.internal_error_prototype,
        }
    }
}

/// Helpers used while populating a realm.
struct Init<'a> {
    heap: &'a Rc<Heap>,
    realm: &'a Realm,
}

impl Init<'_> {
    fn function(&self, name: &str, f: Builtin, constructor: bool) -> Object {
        new_function_object(
            self.heap,
            &self.realm.function_prototype,
            name,
            FunctionKind::Native(Rc::new(f)),
            constructor,
        )
    }

    fn object(&self) -> Object {
        self.heap.alloc(ObjectData::new(
            Some(self.realm.object_prototype.cheap_clone()),
            ExoticObject::Ordinary,
        ))
    }

    /// Non-enumerable data property.
    fn value(&self, target: &Object, name: &str, value: JsValue) {
        target.define_own_property(PropertyKey::from(name), Property::hidden(value));
    }

    fn method(&self, target: &Object, name: &str, f: Builtin) {
        let func = self.function(name, f, false);
        self.value(target, name, JsValue::Object(func));
    }

    /// A global constructor linked with its prototype.
    fn constructor(&self, name: &str, f: Builtin, prototype: &Object) -> Object {
        let ctor = self.function(name, f, true);
        ctor.define_own_property(
            PropertyKey::from("prototype"),
            Property::with_flags(JsValue::Object(prototype.cheap_clone()), false, false, false),
        );
        self.value(prototype, "constructor", JsValue::Object(ctor.cheap_clone()));
        self.value(&self.realm.global, name, JsValue::Object(ctor.cheap_clone()));
        ctor
    }

    /// A global plain function.
    fn global_function(&self, name: &str, f: Builtin) -> Object {
        let func = self.function(name, f, false);
        self.value(&self.realm.global, name, JsValue::Object(func.cheap_clone()));
        func
    }
}

/// `this` as an object, or a `TypeError` naming the method.
fn this_object(rt: &Runtime, args: &CallArgs, method: &str) -> Result<Object, Throw> {
    match &args.this {
        JsValue::Object(obj) => Ok(obj.cheap_clone()),
        _ => Err(rt.type_error(&format!("{} called on non-object", method))),
    }
}
