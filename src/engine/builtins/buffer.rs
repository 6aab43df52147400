//! ArrayBuffer, SharedArrayBuffer, typed arrays and DataView.

use std::rc::Rc;

use super::super::Throw;
use super::super::object::{BackingStore, DataViewData, ExoticObject, FunctionKind, Object, ObjectData, TypedArrayData, TypedArrayKind};
use super::super::runtime::{CallArgs, ErrorKind, Runtime, new_function_object};
use super::super::value::{CheapClone, JsValue, PropertyKey};
use super::Init;

const TYPED_ARRAY_KINDS: [TypedArrayKind; 11] = [
    TypedArrayKind::Int8,
    TypedArrayKind::Uint8,
    TypedArrayKind::Uint8Clamped,
    TypedArrayKind::Int16,
    TypedArrayKind::Uint16,
    TypedArrayKind::Int32,
    TypedArrayKind::Uint32,
    TypedArrayKind::Float32,
    TypedArrayKind::Float64,
    TypedArrayKind::BigInt64,
    TypedArrayKind::BigUint64,
];

pub(super) fn init(init: &Init) {
    let realm = init.realm;
    init.constructor("ArrayBuffer", array_buffer_constructor, &realm.array_buffer_prototype);
    init.constructor(
        "SharedArrayBuffer",
        shared_array_buffer_constructor,
        &realm.shared_array_buffer_prototype,
    );
    init.constructor("DataView", data_view_constructor, &realm.data_view_prototype);

    for kind in TYPED_ARRAY_KINDS {
        let ctor = new_function_object(
            init.heap,
            &realm.function_prototype,
            kind.name(),
            FunctionKind::Native(Rc::new(move |rt: &Runtime, args: &CallArgs| {
                typed_array_constructor(rt, args, kind)
            })),
            true,
        );
        init.value(&ctor, "prototype", JsValue::Object(realm.typed_array_prototype.cheap_clone()));
        init.value(&ctor, "BYTES_PER_ELEMENT", JsValue::from(kind.element_size() as u32));
        init.value(&realm.global, kind.name(), JsValue::Object(ctor));
    }
}

fn index_arg(rt: &Runtime, value: &JsValue, what: &str) -> Result<usize, Throw> {
    if value.is_undefined() {
        return Ok(0);
    }
    let n = rt.to_number(value)?;
    if n.is_nan() {
        return Ok(0);
    }
    if n < 0.0 || n.fract() != 0.0 || n > 9_007_199_254_740_991.0 {
        return Err(rt.throw_error(ErrorKind::RangeError, &format!("Invalid {}", what)));
    }
    Ok(n as usize)
}

fn array_buffer_constructor(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    if args.new_target.is_none() {
        return Err(rt.type_error("Constructor ArrayBuffer requires 'new'"));
    }
    let len = index_arg(rt, &args.arg(0), "array buffer length")?;
    Ok(JsValue::Object(rt.new_array_buffer(vec![0; len], false)))
}

fn shared_array_buffer_constructor(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    if args.new_target.is_none() {
        return Err(rt.type_error("Constructor SharedArrayBuffer requires 'new'"));
    }
    let len = index_arg(rt, &args.arg(0), "array buffer length")?;
    let store: BackingStore = Rc::new(std::cell::RefCell::new(vec![0; len]));
    Ok(JsValue::Object(rt.new_shared_array_buffer(store)))
}

fn typed_array_constructor(rt: &Runtime, args: &CallArgs, kind: TypedArrayKind) -> Result<JsValue, Throw> {
    if args.new_target.is_none() {
        return Err(rt.type_error(&format!("Constructor {} requires 'new'", kind.name())));
    }
    let first = args.arg(0);
    let array = match &first {
        JsValue::Object(obj) if rt.array_buffer_store(obj).is_some() => {
            let offset = index_arg(rt, &args.arg(1), "typed array offset")?;
            let length = match args.arg(2) {
                JsValue::Undefined => {
                    let total = rt.array_buffer_store(obj).map_or(0, |s| s.borrow().len());
                    if total < offset || (total - offset) % kind.element_size() != 0 {
                        return Err(rt.throw_error(
                            ErrorKind::RangeError,
                            &format!("byte length of {} should be a multiple of {}", kind.name(), kind.element_size()),
                        ));
                    }
                    (total - offset) / kind.element_size()
                }
                other => index_arg(rt, &other, "typed array length")?,
            };
            rt.new_typed_array(kind, obj, offset, length)?
        }
        JsValue::Object(obj) if obj.is_array() => {
            let elements: Vec<JsValue> = match &obj.borrow().exotic {
                ExoticObject::Array(e) => e.clone(),
                _ => Vec::new(),
            };
            let buffer = rt.new_array_buffer(vec![0; elements.len() * kind.element_size()], false);
            let array = rt.new_typed_array(kind, &buffer, 0, elements.len())?;
            for (i, value) in elements.into_iter().enumerate() {
                rt.set(&array, PropertyKey::Index(i as u32), value)?;
            }
            array
        }
        other => {
            let length = index_arg(rt, other, "typed array length")?;
            let buffer = rt.new_array_buffer(vec![0; length * kind.element_size()], false);
            rt.new_typed_array(kind, &buffer, 0, length)?
        }
    };
    Ok(JsValue::Object(array))
}

fn data_view_constructor(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    if args.new_target.is_none() {
        return Err(rt.type_error("Constructor DataView requires 'new'"));
    }
    let JsValue::Object(buffer) = args.arg(0) else {
        return Err(rt.type_error("First argument to DataView constructor must be an ArrayBuffer"));
    };
    let total = rt
        .array_buffer_store(&buffer)
        .map(|s| s.borrow().len())
        .ok_or_else(|| rt.type_error("First argument to DataView constructor must be an ArrayBuffer"))?;
    let offset = index_arg(rt, &args.arg(1), "DataView offset")?;
    let length = match args.arg(2) {
        JsValue::Undefined => total.saturating_sub(offset),
        other => index_arg(rt, &other, "DataView length")?,
    };
    Ok(JsValue::Object(rt.new_data_view(&buffer, offset, length)?))
}

impl Runtime {
    /// Backing store of an ArrayBuffer or SharedArrayBuffer; `None` for other
    /// objects and detached buffers.
    pub fn array_buffer_store(&self, obj: &Object) -> Option<BackingStore> {
        match &obj.borrow().exotic {
            ExoticObject::ArrayBuffer(b) => b.store.clone(),
            ExoticObject::SharedArrayBuffer(s) => Some(s.cheap_clone()),
            _ => None,
        }
    }

    pub fn is_array_buffer(&self, obj: &Object) -> bool {
        matches!(obj.borrow().exotic, ExoticObject::ArrayBuffer(_))
    }

    /// Detach an ArrayBuffer. Its contents are dropped and its length becomes 0.
    pub fn detach_array_buffer(&self, obj: &Object) -> Result<(), Throw> {
        match &mut obj.borrow_mut().exotic {
            ExoticObject::ArrayBuffer(b) => {
                b.store = None;
                Ok(())
            }
            _ => Err(self.type_error("Cannot detach a non-ArrayBuffer object")),
        }
    }

    pub fn is_detached_array_buffer(&self, obj: &Object) -> bool {
        matches!(&obj.borrow().exotic, ExoticObject::ArrayBuffer(b) if b.store.is_none())
    }

    /// View `length` elements of `buffer` starting at `byte_offset`.
    pub fn new_typed_array(
        &self,
        kind: TypedArrayKind,
        buffer: &Object,
        byte_offset: usize,
        length: usize,
    ) -> Result<Object, Throw> {
        let total = self
            .array_buffer_store(buffer)
            .map(|s| s.borrow().len())
            .ok_or_else(|| self.type_error("Typed array requires an ArrayBuffer"))?;
        if byte_offset % kind.element_size() != 0 {
            return Err(self.throw_error(
                ErrorKind::RangeError,
                &format!("start offset of {} should be a multiple of {}", kind.name(), kind.element_size()),
            ));
        }
        let end = length
            .checked_mul(kind.element_size())
            .and_then(|bytes| bytes.checked_add(byte_offset));
        if end.is_none_or(|end| end > total) {
            return Err(self.throw_error(ErrorKind::RangeError, &format!("Invalid typed array length: {}", length)));
        }
        Ok(self.alloc(ObjectData::new(
            Some(self.0.realm.typed_array_prototype.cheap_clone()),
            ExoticObject::TypedArray(TypedArrayData {
                kind,
                buffer: buffer.cheap_clone(),
                byte_offset,
                length,
            }),
        )))
    }

    pub fn new_data_view(&self, buffer: &Object, byte_offset: usize, byte_length: usize) -> Result<Object, Throw> {
        let total = self
            .array_buffer_store(buffer)
            .map(|s| s.borrow().len())
            .ok_or_else(|| self.type_error("DataView requires an ArrayBuffer"))?;
        if byte_offset.checked_add(byte_length).is_none_or(|end| end > total) {
            return Err(self.throw_error(ErrorKind::RangeError, "Invalid DataView length"));
        }
        Ok(self.alloc(ObjectData::new(
            Some(self.0.realm.data_view_prototype.cheap_clone()),
            ExoticObject::DataView(DataViewData {
                buffer: buffer.cheap_clone(),
                byte_offset,
                byte_length,
            }),
        )))
    }
}
