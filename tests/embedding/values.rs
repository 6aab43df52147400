// Tests for value creation, inspection, properties and delegates

use std::cell::RefCell;
use std::rc::Rc;

use super::{create_test_env, eval_bool, eval_int, eval_string, run};
use jsembed::{
    Delegate, Env, Error, FunctionCallback, PropertyAttributes, PropertyDescriptor, Result, TypedArrayKind, Value,
    ValueType,
};
use serde_json::json;

// ═══════════════════════════════════════════════════════════════════════════
// Primitives
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_type_of_each_kind() {
    let t = create_test_env();
    let env = &t.env;
    let cases = [
        (env.get_undefined().unwrap(), ValueType::Undefined),
        (env.get_null().unwrap(), ValueType::Null),
        (env.get_boolean(true).unwrap(), ValueType::Boolean),
        (env.create_double(1.5).unwrap(), ValueType::Number),
        (env.create_string_utf8("s").unwrap(), ValueType::String),
        (env.create_symbol(None).unwrap(), ValueType::Symbol),
        (env.create_object().unwrap(), ValueType::Object),
        (env.create_bigint_int64(-3).unwrap(), ValueType::BigInt),
        (run(env, "(() => 1)").unwrap(), ValueType::Function),
    ];
    for (value, expected) in cases {
        assert_eq!(env.type_of(value).unwrap(), expected);
    }
}

#[test]
fn test_number_conversions() {
    let t = create_test_env();
    let env = &t.env;
    let big = env.create_double(4_294_967_301.0).unwrap();
    assert_eq!(env.get_value_int32(big).unwrap(), 5);
    assert_eq!(env.get_value_int64(big).unwrap(), 4_294_967_301);

    let nan = env.create_double(f64::NAN).unwrap();
    assert_eq!(env.get_value_int32(nan).unwrap(), 0);

    let text = env.create_string_utf8("12").unwrap();
    assert!(matches!(env.get_value_int32(text), Err(Error::TypeMismatch { .. })));
}

#[test]
fn test_bigint_lossless_flag() {
    let t = create_test_env();
    let env = &t.env;
    let small = env.create_bigint_int64(-42).unwrap();
    assert_eq!(env.get_value_bigint_int64(small).unwrap(), (-42, true));

    let large = run(env, "18446744073709551616n").unwrap();
    let (_, lossless) = env.get_value_bigint_uint64(large).unwrap();
    assert!(!lossless);
}

#[test]
fn test_string_encodings() {
    let t = create_test_env();
    let env = &t.env;
    let utf16: Vec<u16> = "héllo ✓".encode_utf16().collect();
    let value = env.create_string_utf16(&utf16).unwrap();
    assert_eq!(env.get_value_string_utf8(value).unwrap(), "héllo ✓");
    assert_eq!(env.get_value_string_utf16(value).unwrap(), utf16);

    let latin1 = env.create_string_latin1(&[0x63, 0x61, 0x66, 0xe9]).unwrap();
    assert_eq!(env.get_value_string_utf8(latin1).unwrap(), "café");
    assert_eq!(env.get_value_string_latin1(latin1).unwrap(), vec![0x63, 0x61, 0x66, 0xe9]);
}

#[test]
fn test_coercion_uses_script_semantics() {
    let t = create_test_env();
    let env = &t.env;
    let text = env.create_string_utf8("  8 ").unwrap();
    let number = env.coerce_to_number(text).unwrap();
    assert_eq!(env.get_value_double(number).unwrap(), 8.0);

    let empty = env.create_string_utf8("").unwrap();
    let flag = env.coerce_to_boolean(empty).unwrap();
    assert!(!env.get_value_bool(flag).unwrap());

    let null = env.get_null().unwrap();
    assert_eq!(env.coerce_to_object(null), Err(Error::PendingException));
    env.get_and_clear_last_exception().unwrap();
}

#[test]
fn test_strict_equality_and_instanceof() {
    let t = create_test_env();
    let env = &t.env;
    let a = env.create_string_utf8("x").unwrap();
    let b = env.create_string_utf8("x").unwrap();
    assert!(env.strict_equals(a, b).unwrap());

    let error = run(env, "new RangeError('r')").unwrap();
    let ctor = run(env, "Error").unwrap();
    assert!(env.instanceof(error, ctor).unwrap());
    assert!(env.is_error(error).unwrap());
}

// ═══════════════════════════════════════════════════════════════════════════
// JSON, arrays and dates
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_value_from_json() {
    let t = create_test_env();
    let env = &t.env;
    let value = env
        .create_from_json(&json!({ "name": "svc", "ports": [80, 443], "tls": true }))
        .unwrap();
    let global = env.get_global().unwrap();
    env.set_named_property(global, "config", value).unwrap();

    assert_eq!(eval_string(env, "config.name"), "svc");
    assert_eq!(eval_int(env, "config.ports[1]"), 443);
    assert!(eval_bool(env, "config.tls"));
}

#[test]
fn test_to_json_skips_functions() {
    let t = create_test_env();
    let env = &t.env;
    let value = run(env, "({ a: 1, f: () => 1, nested: { b: [null, 'x'] } })").unwrap();
    assert_eq!(
        env.to_json(value).unwrap(),
        Some(json!({ "a": 1.0, "nested": { "b": [null, "x"] } }))
    );

    let function = run(env, "(() => 1)").unwrap();
    assert_eq!(env.to_json(function).unwrap(), None);
}

#[test]
fn test_array_elements() {
    let t = create_test_env();
    let env = &t.env;
    let array = env.create_array_with_length(2).unwrap();
    assert_eq!(env.get_array_length(array).unwrap(), 2);

    let items = [env.create_int32(1).unwrap(), env.create_int32(2).unwrap(), env.create_int32(3).unwrap()];
    env.set_array_elements(array, &items, 1).unwrap();
    assert_eq!(env.get_array_length(array).unwrap(), 4);

    let tail = env.get_array_elements(array, 2, 2).unwrap();
    let numbers: Vec<i32> = tail.iter().map(|&v| env.get_value_int32(v).unwrap()).collect();
    assert_eq!(numbers, vec![2, 3]);
    assert!(env.is_array(array).unwrap());
}

#[test]
fn test_date_round_trip() {
    let t = create_test_env();
    let env = &t.env;
    let date = env.create_date(1_700_000_000_000.0).unwrap();
    assert!(env.is_date(date).unwrap());
    assert_eq!(env.get_value_date(date).unwrap(), 1_700_000_000_000.0);
}

#[test]
fn test_typed_array_over_buffer() {
    let t = create_test_env();
    let env = &t.env;
    let buffer = env.create_external_arraybuffer(vec![1, 0, 2, 0, 3, 0]).unwrap();
    let view = env.create_typedarray(TypedArrayKind::Uint16, 2, buffer, 2).unwrap();

    let (kind, backing, offset, len) = env.get_typedarray_info(view).unwrap();
    assert_eq!((kind, offset, len), (TypedArrayKind::Uint16, 2, 2));
    assert!(env.strict_equals(backing, buffer).unwrap());

    env.detach_arraybuffer(buffer).unwrap();
    assert!(env.is_detached_arraybuffer(buffer).unwrap());
    assert!(env.get_arraybuffer_info(buffer).unwrap().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════
// Properties
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_keyed_and_indexed_properties() {
    let t = create_test_env();
    let env = &t.env;
    let object = env.create_object().unwrap();
    let key = env.create_string_utf8("k").unwrap();
    let value = env.create_int32(1).unwrap();

    env.set_property(object, key, value).unwrap();
    assert!(env.has_property(object, key).unwrap());
    assert!(env.has_own_property(object, key).unwrap());
    assert!(env.delete_property(object, key).unwrap());
    assert!(!env.has_named_property(object, "k").unwrap());

    env.set_element(object, 3, value).unwrap();
    assert!(env.has_element(object, 3).unwrap());
    let got = env.get_element(object, 3).unwrap();
    assert_eq!(env.get_value_int32(got).unwrap(), 1);
    assert!(env.delete_element(object, 3).unwrap());
}

#[test]
fn test_named_property_delete() {
    let t = create_test_env();
    let env = &t.env;
    let object = run(env, "globalThis.o = { a: 1 }; o").unwrap();
    let two = env.create_int32(2).unwrap();
    env.define_properties(object, &[PropertyDescriptor::value("pinned", two)])
        .unwrap();

    assert!(env.delete_named_property(object, "a").unwrap());
    assert!(!env.has_named_property(object, "a").unwrap());
    assert!(env.delete_named_property(object, "missing").unwrap());
    assert!(!env.delete_named_property(object, "pinned").unwrap());
    assert_eq!(eval_int(env, "o.pinned"), 2);

    let number = env.create_int32(1).unwrap();
    assert!(matches!(
        env.delete_named_property(number, "a"),
        Err(Error::TypeMismatch { .. })
    ));
}

#[test]
fn test_inherited_property_is_not_own() {
    let t = create_test_env();
    let env = &t.env;
    let object = run(env, "({})").unwrap();
    let key = env.create_string_utf8("toString").unwrap();
    assert!(env.has_property(object, key).unwrap());
    assert!(!env.has_own_property(object, key).unwrap());
}

#[test]
fn test_property_names_are_enumerable_strings() {
    let t = create_test_env();
    let env = &t.env;
    let object = run(env, "const o = { b: 1, a: 2 }; o[Symbol('s')] = 3; o").unwrap();
    let hidden = env.create_int32(0).unwrap();
    env.define_properties(object, &[PropertyDescriptor::value("hidden", hidden)])
        .unwrap();

    let names = env.get_property_names(object).unwrap();
    let names: Vec<String> = env
        .get_array_elements(names, 0, 8)
        .unwrap()
        .into_iter()
        .map(|n| env.get_value_string_utf8(n).unwrap())
        .collect();
    assert_eq!(names, vec!["b", "a"]);
}

#[test]
fn test_define_accessor_and_readonly_value() {
    let t = create_test_env();
    let env = &t.env;
    let store = Rc::new(RefCell::new(0.0));
    let (read, write) = (store.clone(), store.clone());
    let getter: FunctionCallback = Rc::new(move |env: &Env, _: &jsembed::CallbackInfo| {
        env.create_double(*read.borrow()).map(Some)
    });
    let setter: FunctionCallback = Rc::new(move |env: &Env, info: &jsembed::CallbackInfo| {
        let value = info.arg(0).ok_or(Error::InvalidArgument("value".into()))?;
        *write.borrow_mut() = env.get_value_double(value)?;
        Ok(None)
    });
    let fixed = env.create_int32(1).unwrap();

    let object = env.create_object().unwrap();
    env.define_properties(
        object,
        &[
            PropertyDescriptor::accessor("level", Some(getter), Some(setter))
                .with_attributes(PropertyAttributes::from_bits(PropertyAttributes::ENUMERABLE)),
            PropertyDescriptor::value("fixed", fixed)
                .with_attributes(PropertyAttributes::from_bits(PropertyAttributes::ENUMERABLE)),
        ],
    )
    .unwrap();
    let global = env.get_global().unwrap();
    env.set_named_property(global, "dial", object).unwrap();

    run(env, "dial.level = 11; dial.fixed = 2;").unwrap();
    assert_eq!(*store.borrow(), 11.0);
    assert_eq!(eval_int(env, "dial.level + dial.fixed"), 12);
}

#[test]
fn test_prototype_of_script_object() {
    let t = create_test_env();
    let env = &t.env;
    let array = run(env, "[]").unwrap();
    let prototype = env.get_prototype(array).unwrap();
    let expected = run(env, "Array.prototype").unwrap();
    assert!(env.strict_equals(prototype, expected).unwrap());
}

// ═══════════════════════════════════════════════════════════════════════════
// Delegates
// ═══════════════════════════════════════════════════════════════════════════

/// Answers reads of `upper_*` names with the upper-cased suffix.
struct Shouting {
    writes: Rc<RefCell<Vec<String>>>,
}

impl Delegate for Shouting {
    fn get(&self, env: &Env, property: Value) -> Result<Option<Value>> {
        let name = match env.get_value_string_utf8(property) {
            Ok(name) => name,
            Err(_) => return Ok(None),
        };
        match name.strip_prefix("upper_") {
            Some(rest) => env.create_string_utf8(&rest.to_uppercase()).map(Some),
            None => Ok(None),
        }
    }

    fn has(&self, env: &Env, property: Value) -> Result<Option<bool>> {
        let name = env.get_value_string_utf8(property).unwrap_or_default();
        Ok(name.starts_with("upper_").then_some(true))
    }

    fn set(&self, env: &Env, property: Value, _value: Value) -> Result<Option<bool>> {
        self.writes.borrow_mut().push(env.get_value_string_utf8(property)?);
        Ok(Some(true))
    }

    fn own_keys(&self, env: &Env) -> Result<Option<Value>> {
        let array = env.create_array()?;
        let key = env.create_string_utf8("upper_x")?;
        env.set_element(array, 0, key)?;
        Ok(Some(array))
    }
}

#[test]
fn test_delegate_answers_property_access() {
    let t = create_test_env();
    let env = &t.env;
    let writes = Rc::new(RefCell::new(Vec::new()));
    let delegate = Shouting { writes: writes.clone() };
    let object = env.create_delegate(delegate, Rc::new(()), None).unwrap();
    assert!(env.is_delegate(object).unwrap());
    let global = env.get_global().unwrap();
    env.set_named_property(global, "loud", object).unwrap();

    assert_eq!(eval_string(env, "loud.upper_hello"), "HELLO");
    assert!(eval_bool(env, "'upper_any' in loud"));
    assert!(eval_bool(env, "loud.other === undefined"));
    run(env, "loud.written = 1").unwrap();
    assert_eq!(*writes.borrow(), vec!["written"]);
    assert_eq!(eval_string(env, "Object.keys(loud).join(',')"), "upper_x");
}

#[test]
fn test_delegate_error_is_thrown_into_script() {
    struct Failing;
    impl Delegate for Failing {
        fn get(&self, env: &Env, _property: Value) -> Result<Option<Value>> {
            env.throw_error(Some("ERR_DENIED"), "access denied")?;
            Err(Error::PendingException)
        }
    }

    let t = create_test_env();
    let env = &t.env;
    let object = env.create_delegate(Failing, Rc::new(()), None).unwrap();
    let global = env.get_global().unwrap();
    env.set_named_property(global, "locked", object).unwrap();

    assert_eq!(
        eval_string(env, "let m = ''; try { locked.secret; } catch (e) { m = e.code; } m"),
        "ERR_DENIED"
    );
}

#[test]
fn test_delegate_keys_must_be_a_real_array() {
    struct ArrayLike;
    impl Delegate for ArrayLike {
        fn own_keys(&self, env: &Env) -> Result<Option<Value>> {
            let global = env.get_global()?;
            env.get_named_property(global, "fake").map(Some)
        }
    }

    let t = create_test_env();
    let env = &t.env;
    run(env, "globalThis.fake = { length: 4294967295 };").unwrap();
    let object = env.create_delegate(ArrayLike, Rc::new(()), None).unwrap();
    let global = env.get_global().unwrap();
    env.set_named_property(global, "sneaky", object).unwrap();

    assert_eq!(
        eval_string(env, "let m = ''; try { Object.keys(sneaky); } catch (e) { m = e.message; } m"),
        "Delegate ownKeys must return an array"
    );
}
