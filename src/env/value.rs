//! Value handles: creation, inspection and coercion.

use crate::engine::builtins::json;
use crate::engine::{BackingStore, ErrorKind, ExoticObject, JsString, JsValue, Object, PropertyKey, TypedArrayKind};
use crate::error::{Error, Result};
use crate::platform::Platform;

use super::Env;
use super::arena::Index;

/// Handle to a value owned by a handle scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Value(pub(crate) Index);

impl Value {
    pub fn to_bits(self) -> u64 {
        self.0.to_bits()
    }

    pub fn from_bits(bits: u64) -> Self {
        Value(Index::from_bits(bits))
    }
}

/// Result of [`Env::type_of`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    Symbol,
    Object,
    Function,
    External,
    BigInt,
}

const BIGINT_MIN: i128 = i64::MIN as i128;
const UINT64_MAX: i128 = u64::MAX as i128;

impl Env {
    // ═══════════════════════════════════════════════════════════════════════
    // Lookup helpers
    // ═══════════════════════════════════════════════════════════════════════

    pub(super) fn object(&self, handle: Value) -> Result<Object> {
        match self.value(handle)? {
            JsValue::Object(obj) => Ok(obj),
            _ => Err(Error::TypeMismatch { expected: "an object" }),
        }
    }

    pub(super) fn function(&self, handle: Value) -> Result<Object> {
        match self.value(handle)? {
            JsValue::Object(obj) if obj.is_callable() => Ok(obj),
            _ => Err(Error::TypeMismatch { expected: "a function" }),
        }
    }

    pub(super) fn string_of(&self, handle: Value) -> Result<JsString> {
        match self.value(handle)? {
            JsValue::String(s) => Ok(s),
            _ => Err(Error::TypeMismatch { expected: "a string" }),
        }
    }

    fn number_of(&self, handle: Value) -> Result<f64> {
        match self.value(handle)? {
            JsValue::Number(n) => Ok(n),
            _ => Err(Error::TypeMismatch { expected: "a number" }),
        }
    }

    fn bigint_of(&self, handle: Value) -> Result<i128> {
        match self.value(handle)? {
            JsValue::BigInt(n) => Ok(n),
            _ => Err(Error::TypeMismatch { expected: "a bigint" }),
        }
    }

    fn exotic_is(&self, handle: Value, test: impl Fn(&ExoticObject) -> bool) -> Result<bool> {
        Ok(match self.value(handle)? {
            JsValue::Object(obj) => test(&obj.borrow().exotic),
            _ => false,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Primitives
    // ═══════════════════════════════════════════════════════════════════════

    pub fn get_undefined(&self) -> Result<Value> {
        self.attach(JsValue::Undefined)
    }

    pub fn get_null(&self) -> Result<Value> {
        self.attach(JsValue::Null)
    }

    pub fn get_boolean(&self, value: bool) -> Result<Value> {
        self.attach(JsValue::Boolean(value))
    }

    pub fn create_int32(&self, value: i32) -> Result<Value> {
        self.attach(JsValue::from(value))
    }

    pub fn create_uint32(&self, value: u32) -> Result<Value> {
        self.attach(JsValue::from(value))
    }

    pub fn create_int64(&self, value: i64) -> Result<Value> {
        self.attach(JsValue::Number(value as f64))
    }

    pub fn create_double(&self, value: f64) -> Result<Value> {
        self.attach(JsValue::Number(value))
    }

    pub fn create_bigint_int64(&self, value: i64) -> Result<Value> {
        self.attach(JsValue::BigInt(i128::from(value)))
    }

    pub fn create_bigint_uint64(&self, value: u64) -> Result<Value> {
        self.attach(JsValue::BigInt(i128::from(value)))
    }

    pub fn create_string_utf8(&self, value: &str) -> Result<Value> {
        self.attach(JsValue::from(value))
    }

    /// Unpaired surrogates are replaced with U+FFFD.
    pub fn create_string_utf16(&self, value: &[u16]) -> Result<Value> {
        self.attach(JsValue::from(String::from_utf16_lossy(value)))
    }

    pub fn create_string_latin1(&self, value: &[u8]) -> Result<Value> {
        let text: String = value.iter().map(|&b| char::from(b)).collect();
        self.attach(JsValue::from(text))
    }

    pub fn create_symbol(&self, description: Option<Value>) -> Result<Value> {
        let description = match description {
            Some(d) => Some(self.string_of(d)?),
            None => None,
        };
        let symbol = self.0.runtime.new_symbol(description);
        self.attach(symbol)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Objects
    // ═══════════════════════════════════════════════════════════════════════

    pub fn create_object(&self) -> Result<Value> {
        self.attach(JsValue::Object(self.0.runtime.new_object()))
    }

    pub fn create_array(&self) -> Result<Value> {
        self.attach(JsValue::Object(self.0.runtime.new_array(Vec::new())))
    }

    /// An array of `len` holes (read as `undefined`).
    pub fn create_array_with_length(&self, len: usize) -> Result<Value> {
        let elements = vec![JsValue::Undefined; len];
        self.attach(JsValue::Object(self.0.runtime.new_array(elements)))
    }

    pub fn create_date(&self, time: f64) -> Result<Value> {
        self.attach(JsValue::Object(self.0.runtime.new_date(time)))
    }

    /// Build a value from JSON. Objects and arrays are created fresh.
    pub fn create_from_json(&self, value: &serde_json::Value) -> Result<Value> {
        self.ensure_open()?;
        self.attach(json::from_json(&self.0.runtime, value))
    }

    /// Serialize with `JSON.stringify` semantics. `None` for values JSON
    /// omits.
    pub fn to_json(&self, value: Value) -> Result<Option<serde_json::Value>> {
        let value = self.value(value)?;
        let result = json::to_json(&self.0.runtime, &value);
        self.check(result)
    }

    fn create_error_of(&self, kind: ErrorKind, code: Option<Value>, message: Value) -> Result<Value> {
        let message = self.string_of(message)?;
        let error = self.0.runtime.new_error(kind, message.as_str());
        if let Some(code) = code {
            let code = self.value(code)?;
            error.define_own_property(PropertyKey::from("code"), crate::engine::Property::data(code));
        }
        self.attach(JsValue::Object(error))
    }

    pub fn create_error(&self, code: Option<Value>, message: Value) -> Result<Value> {
        self.create_error_of(ErrorKind::Error, code, message)
    }

    pub fn create_type_error(&self, code: Option<Value>, message: Value) -> Result<Value> {
        self.create_error_of(ErrorKind::TypeError, code, message)
    }

    pub fn create_range_error(&self, code: Option<Value>, message: Value) -> Result<Value> {
        self.create_error_of(ErrorKind::RangeError, code, message)
    }

    pub fn create_syntax_error(&self, code: Option<Value>, message: Value) -> Result<Value> {
        self.create_error_of(ErrorKind::SyntaxError, code, message)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Buffers
    // ═══════════════════════════════════════════════════════════════════════

    /// A zero-filled ArrayBuffer of `len` bytes.
    pub fn create_arraybuffer(&self, len: usize) -> Result<Value> {
        self.attach(JsValue::Object(self.0.runtime.new_array_buffer(vec![0; len], false)))
    }

    /// An ArrayBuffer over host-provided bytes.
    pub fn create_external_arraybuffer(&self, bytes: Vec<u8>) -> Result<Value> {
        self.attach(JsValue::Object(self.0.runtime.new_array_buffer(bytes, true)))
    }

    pub fn create_sharedarraybuffer(&self, len: usize) -> Result<Value> {
        let store: BackingStore = std::rc::Rc::new(std::cell::RefCell::new(vec![0; len]));
        self.attach(JsValue::Object(self.0.runtime.new_shared_array_buffer(store)))
    }

    /// A SharedArrayBuffer over an existing backing store.
    pub fn create_sharedarraybuffer_with_backing_store(&self, store: BackingStore) -> Result<Value> {
        self.attach(JsValue::Object(self.0.runtime.new_shared_array_buffer(store)))
    }

    pub fn detach_arraybuffer(&self, arraybuffer: Value) -> Result<()> {
        let obj = self.object(arraybuffer)?;
        let result = self.0.runtime.detach_array_buffer(&obj);
        self.check(result)
    }

    /// Backing store of an ArrayBuffer or SharedArrayBuffer. Detached
    /// buffers report `None`.
    pub fn get_arraybuffer_backing_store(&self, buffer: Value) -> Result<Option<BackingStore>> {
        let obj = self.object(buffer)?;
        if !matches!(
            obj.borrow().exotic,
            ExoticObject::ArrayBuffer(_) | ExoticObject::SharedArrayBuffer(_)
        ) {
            return Err(Error::TypeMismatch {
                expected: "an ArrayBuffer",
            });
        }
        Ok(self.0.runtime.array_buffer_store(&obj))
    }

    /// Copy of the bytes of an ArrayBuffer or SharedArrayBuffer.
    pub fn get_arraybuffer_info(&self, buffer: Value) -> Result<Vec<u8>> {
        Ok(self
            .get_arraybuffer_backing_store(buffer)?
            .map(|store| store.borrow().clone())
            .unwrap_or_default())
    }

    pub fn create_typedarray(&self, kind: TypedArrayKind, len: usize, arraybuffer: Value, offset: usize) -> Result<Value> {
        let buffer = self.object(arraybuffer)?;
        let result = self.0.runtime.new_typed_array(kind, &buffer, offset, len);
        let array = self.check(result)?;
        self.attach(JsValue::Object(array))
    }

    pub fn create_dataview(&self, len: usize, arraybuffer: Value, offset: usize) -> Result<Value> {
        let buffer = self.object(arraybuffer)?;
        let result = self.0.runtime.new_data_view(&buffer, offset, len);
        let view = self.check(result)?;
        self.attach(JsValue::Object(view))
    }

    /// `(kind, buffer, byte offset, element length)` of a typed array.
    pub fn get_typedarray_info(&self, typedarray: Value) -> Result<(TypedArrayKind, Value, usize, usize)> {
        let obj = self.object(typedarray)?;
        let info = match &obj.borrow().exotic {
            ExoticObject::TypedArray(t) => Some((t.kind, t.buffer.clone(), t.byte_offset, t.length)),
            _ => None,
        };
        let (kind, buffer, offset, len) = info.ok_or(Error::TypeMismatch { expected: "a typed array" })?;
        Ok((kind, self.attach(JsValue::Object(buffer))?, offset, len))
    }

    /// `(buffer, byte offset, byte length)` of a DataView.
    pub fn get_dataview_info(&self, dataview: Value) -> Result<(Value, usize, usize)> {
        let obj = self.object(dataview)?;
        let info = match &obj.borrow().exotic {
            ExoticObject::DataView(d) => Some((d.buffer.clone(), d.byte_offset, d.byte_length)),
            _ => None,
        };
        let (buffer, offset, len) = info.ok_or(Error::TypeMismatch { expected: "a DataView" })?;
        Ok((self.attach(JsValue::Object(buffer))?, offset, len))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Reading values
    // ═══════════════════════════════════════════════════════════════════════

    pub fn get_value_bool(&self, value: Value) -> Result<bool> {
        match self.value(value)? {
            JsValue::Boolean(b) => Ok(b),
            _ => Err(Error::TypeMismatch { expected: "a boolean" }),
        }
    }

    pub fn get_value_int32(&self, value: Value) -> Result<i32> {
        Ok(crate::engine::runtime::number_to_int32(self.number_of(value)?))
    }

    pub fn get_value_uint32(&self, value: Value) -> Result<u32> {
        Ok(crate::engine::runtime::number_to_int32(self.number_of(value)?) as u32)
    }

    /// Truncates toward zero; NaN reads as 0 and out-of-range values saturate.
    pub fn get_value_int64(&self, value: Value) -> Result<i64> {
        Ok(self.number_of(value)? as i64)
    }

    pub fn get_value_double(&self, value: Value) -> Result<f64> {
        self.number_of(value)
    }

    /// The bigint wrapped to 64 bits, plus whether that was lossless.
    pub fn get_value_bigint_int64(&self, value: Value) -> Result<(i64, bool)> {
        let n = self.bigint_of(value)?;
        let lossless = (BIGINT_MIN..=i128::from(i64::MAX)).contains(&n);
        Ok((n as i64, lossless))
    }

    pub fn get_value_bigint_uint64(&self, value: Value) -> Result<(u64, bool)> {
        let n = self.bigint_of(value)?;
        let lossless = (0..=UINT64_MAX).contains(&n);
        Ok((n as u64, lossless))
    }

    pub fn get_value_string_utf8(&self, value: Value) -> Result<String> {
        Ok(self.string_of(value)?.to_string())
    }

    pub fn get_value_string_utf16(&self, value: Value) -> Result<Vec<u16>> {
        Ok(self.string_of(value)?.as_str().encode_utf16().collect())
    }

    /// Characters above U+00FF are replaced with `?`.
    pub fn get_value_string_latin1(&self, value: Value) -> Result<Vec<u8>> {
        Ok(self
            .string_of(value)?
            .as_str()
            .chars()
            .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
            .collect())
    }

    pub fn get_value_date(&self, value: Value) -> Result<f64> {
        let obj = self.object(value)?;
        match obj.borrow().exotic {
            ExoticObject::Date(t) => Ok(t),
            _ => Err(Error::TypeMismatch { expected: "a Date" }),
        }
    }

    pub fn get_array_length(&self, array: Value) -> Result<u32> {
        let obj = self.object(array)?;
        match &obj.borrow().exotic {
            ExoticObject::Array(elements) => Ok(elements.len() as u32),
            _ => Err(Error::TypeMismatch { expected: "an array" }),
        }
    }

    /// Up to `len` elements starting at `offset`.
    pub fn get_array_elements(&self, array: Value, offset: usize, len: usize) -> Result<Vec<Value>> {
        let obj = self.object(array)?;
        let elements: Vec<JsValue> = match &obj.borrow().exotic {
            ExoticObject::Array(elements) => elements.iter().skip(offset).take(len).cloned().collect(),
            _ => return Err(Error::TypeMismatch { expected: "an array" }),
        };
        elements.into_iter().map(|v| self.attach(v)).collect()
    }

    /// Write `elements` starting at `offset`, growing the array as needed.
    pub fn set_array_elements(&self, array: Value, elements: &[Value], offset: usize) -> Result<()> {
        let obj = self.object(array)?;
        if !obj.is_array() {
            return Err(Error::TypeMismatch { expected: "an array" });
        }
        let values = elements.iter().map(|&v| self.value(v)).collect::<Result<Vec<_>>>()?;
        for (i, value) in values.into_iter().enumerate() {
            let key = PropertyKey::from((offset + i) as u32);
            obj.define_own_property(key, crate::engine::Property::data(value));
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Type inspection
    // ═══════════════════════════════════════════════════════════════════════

    pub fn type_of(&self, value: Value) -> Result<ValueType> {
        Ok(match self.value(value)? {
            JsValue::Undefined => ValueType::Undefined,
            JsValue::Null => ValueType::Null,
            JsValue::Boolean(_) => ValueType::Boolean,
            JsValue::Number(_) => ValueType::Number,
            JsValue::BigInt(_) => ValueType::BigInt,
            JsValue::String(_) => ValueType::String,
            JsValue::Symbol(_) => ValueType::Symbol,
            JsValue::Object(obj) if obj.is_callable() => ValueType::Function,
            JsValue::Object(obj) if obj.class_id() == Some(Platform::classes().external) => ValueType::External,
            JsValue::Object(_) => ValueType::Object,
        })
    }

    pub fn instanceof(&self, object: Value, constructor: Value) -> Result<bool> {
        self.ensure_ready()?;
        let (object, constructor) = (self.value(object)?, self.value(constructor)?);
        let result = self.0.runtime.instance_of(&object, &constructor);
        self.check(result)
    }

    pub fn strict_equals(&self, a: Value, b: Value) -> Result<bool> {
        Ok(self.value(a)?.strict_equals(&self.value(b)?))
    }

    pub fn is_undefined(&self, value: Value) -> Result<bool> {
        Ok(self.value(value)?.is_undefined())
    }

    pub fn is_null(&self, value: Value) -> Result<bool> {
        Ok(self.value(value)?.is_null())
    }

    pub fn is_boolean(&self, value: Value) -> Result<bool> {
        Ok(matches!(self.value(value)?, JsValue::Boolean(_)))
    }

    pub fn is_number(&self, value: Value) -> Result<bool> {
        Ok(matches!(self.value(value)?, JsValue::Number(_)))
    }

    pub fn is_string(&self, value: Value) -> Result<bool> {
        Ok(matches!(self.value(value)?, JsValue::String(_)))
    }

    pub fn is_symbol(&self, value: Value) -> Result<bool> {
        Ok(matches!(self.value(value)?, JsValue::Symbol(_)))
    }

    pub fn is_bigint(&self, value: Value) -> Result<bool> {
        Ok(matches!(self.value(value)?, JsValue::BigInt(_)))
    }

    /// True for functions as well as plain objects.
    pub fn is_object(&self, value: Value) -> Result<bool> {
        Ok(self.value(value)?.is_object())
    }

    pub fn is_function(&self, value: Value) -> Result<bool> {
        Ok(self.value(value)?.is_callable())
    }

    /// The engine has no async functions.
    pub fn is_async_function(&self, value: Value) -> Result<bool> {
        self.value(value).map(|_| false)
    }

    /// The engine has no generators.
    pub fn is_generator_function(&self, value: Value) -> Result<bool> {
        self.value(value).map(|_| false)
    }

    pub fn is_generator(&self, value: Value) -> Result<bool> {
        self.value(value).map(|_| false)
    }

    pub fn is_array(&self, value: Value) -> Result<bool> {
        self.exotic_is(value, |e| matches!(e, ExoticObject::Array(_)))
    }

    pub fn is_date(&self, value: Value) -> Result<bool> {
        self.exotic_is(value, |e| matches!(e, ExoticObject::Date(_)))
    }

    pub fn is_error(&self, value: Value) -> Result<bool> {
        self.exotic_is(value, |e| matches!(e, ExoticObject::Error))
    }

    pub fn is_promise(&self, value: Value) -> Result<bool> {
        self.exotic_is(value, |e| matches!(e, ExoticObject::Promise(_)))
    }

    pub fn is_arraybuffer(&self, value: Value) -> Result<bool> {
        self.exotic_is(value, |e| matches!(e, ExoticObject::ArrayBuffer(_)))
    }

    pub fn is_detached_arraybuffer(&self, value: Value) -> Result<bool> {
        self.exotic_is(value, |e| matches!(e, ExoticObject::ArrayBuffer(b) if b.store.is_none()))
    }

    pub fn is_sharedarraybuffer(&self, value: Value) -> Result<bool> {
        self.exotic_is(value, |e| matches!(e, ExoticObject::SharedArrayBuffer(_)))
    }

    pub fn is_typedarray(&self, value: Value) -> Result<bool> {
        self.exotic_is(value, |e| matches!(e, ExoticObject::TypedArray(_)))
    }

    pub fn is_dataview(&self, value: Value) -> Result<bool> {
        self.exotic_is(value, |e| matches!(e, ExoticObject::DataView(_)))
    }

    pub fn is_module_namespace(&self, value: Value) -> Result<bool> {
        self.exotic_is(value, |e| matches!(e, ExoticObject::Namespace))
    }

    pub fn is_delegate(&self, value: Value) -> Result<bool> {
        Ok(match self.value(value)? {
            JsValue::Object(obj) => obj.class_id() == Some(Platform::classes().delegate),
            _ => false,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Coercion
    // ═══════════════════════════════════════════════════════════════════════

    pub fn coerce_to_boolean(&self, value: Value) -> Result<Value> {
        let b = self.value(value)?.to_boolean();
        self.attach(JsValue::Boolean(b))
    }

    pub fn coerce_to_number(&self, value: Value) -> Result<Value> {
        self.ensure_ready()?;
        let value = self.value(value)?;
        let result = self.0.runtime.to_number(&value);
        let n = self.check(result)?;
        self.attach(JsValue::Number(n))
    }

    pub fn coerce_to_string(&self, value: Value) -> Result<Value> {
        self.ensure_ready()?;
        let value = self.value(value)?;
        let result = self.0.runtime.to_string(&value);
        let s = self.check(result)?;
        self.attach(JsValue::String(s))
    }

    pub fn coerce_to_object(&self, value: Value) -> Result<Value> {
        self.ensure_ready()?;
        let value = self.value(value)?;
        let result = self.0.runtime.to_object(&value);
        let obj = self.check(result)?;
        self.attach(JsValue::Object(obj))
    }
}
