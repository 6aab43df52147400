//! Object, Array, String, Number, Boolean and Symbol.

use super::super::Throw;
use super::super::object::ExoticObject;
use super::super::runtime::{CallArgs, Runtime};
use super::super::value::{CheapClone, JsString, JsValue, PropertyKey};
use super::{Init, this_object};

pub(super) fn init(init: &Init) {
    let realm = init.realm;

    let object = init.constructor("Object", object_constructor, &realm.object_prototype);
    init.method(&object, "keys", object_keys);
    init.method(&object, "getPrototypeOf", object_get_prototype_of);
    init.method(&realm.object_prototype, "toString", object_to_string);
    init.method(&realm.object_prototype, "valueOf", object_value_of);
    init.method(&realm.object_prototype, "hasOwnProperty", object_has_own_property);

    let array = init.constructor("Array", array_constructor, &realm.array_prototype);
    init.method(&array, "isArray", array_is_array);
    init.method(&realm.array_prototype, "push", array_push);
    init.method(&realm.array_prototype, "join", array_join);
    init.method(&realm.array_prototype, "toString", array_to_string);

    init.global_function("String", string_convert);
    init.global_function("Number", number_convert);
    init.global_function("Boolean", boolean_convert);

    let symbol = init.global_function("Symbol", symbol_create);
    init.value(&symbol, "prototype", JsValue::Object(realm.symbol_prototype.cheap_clone()));
    init.method(&realm.symbol_prototype, "toString", symbol_to_string);
}

fn object_constructor(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    let value = args.arg(0);
    if value.is_nullish() {
        return Ok(JsValue::Object(rt.new_object()));
    }
    Ok(JsValue::Object(rt.to_object(&value)?))
}

fn object_keys(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    let obj = rt.to_object(&args.arg(0))?;
    let keys = rt
        .enumerable_own_keys(&obj)?
        .into_iter()
        .filter(|k| !matches!(k, PropertyKey::Symbol(_)))
        .map(|k| JsValue::from(k.to_string()))
        .collect();
    Ok(JsValue::Object(rt.new_array(keys)))
}

fn object_get_prototype_of(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    let obj = rt.to_object(&args.arg(0))?;
    Ok(obj.prototype().map_or(JsValue::Null, JsValue::Object))
}

fn object_to_string(_rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    let tag = match &args.this {
        JsValue::Undefined => "Undefined",
        JsValue::Null => "Null",
        JsValue::Object(obj) => match &obj.borrow().exotic {
            ExoticObject::Array(_) => "Array",
            ExoticObject::Function(_) => "Function",
            ExoticObject::Error => "Error",
            ExoticObject::Date(_) => "Date",
            ExoticObject::Promise(_) => "Promise",
            _ => "Object",
        },
        JsValue::Boolean(_) => "Boolean",
        JsValue::Number(_) => "Number",
        JsValue::String(_) => "String",
        JsValue::Symbol(_) => "Symbol",
        JsValue::BigInt(_) => "BigInt",
    };
    Ok(JsValue::from(format!("[object {}]", tag)))
}

fn object_value_of(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    Ok(JsValue::Object(rt.to_object(&args.this)?))
}

fn object_has_own_property(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    let key = rt.to_property_key(&args.arg(0))?;
    let obj = rt.to_object(&args.this)?;
    Ok(JsValue::Boolean(rt.has_own_property(&obj, &key)?))
}

fn array_constructor(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    if let [JsValue::Number(len)] = args.args.as_slice() {
        if len.fract() != 0.0 || *len < 0.0 || *len > f64::from(u32::MAX) {
            return Err(rt.throw_error(super::ErrorKind::RangeError, "Invalid array length"));
        }
        return Ok(JsValue::Object(rt.new_array(vec![JsValue::Undefined; *len as usize])));
    }
    Ok(JsValue::Object(rt.new_array(args.args.clone())))
}

fn array_is_array(_rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    Ok(JsValue::Boolean(args.arg(0).as_object().is_some_and(|o| o.is_array())))
}

fn array_push(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    let obj = this_object(rt, args, "Array.prototype.push")?;
    let mut data = obj.borrow_mut();
    let ExoticObject::Array(elements) = &mut data.exotic else {
        return Err(rt.type_error("Array.prototype.push called on non-array"));
    };
    elements.extend(args.args.iter().cloned());
    Ok(JsValue::Number(elements.len() as f64))
}

fn array_join(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    let obj = this_object(rt, args, "Array.prototype.join")?;
    let separator = match args.arg(0) {
        JsValue::Undefined => JsString::from(","),
        other => rt.to_string(&other)?,
    };
    let elements: Vec<JsValue> = match &obj.borrow().exotic {
        ExoticObject::Array(elements) => elements.clone(),
        _ => Vec::new(),
    };
    let mut parts = Vec::with_capacity(elements.len());
    for element in &elements {
        if element.is_nullish() {
            parts.push(String::new());
        } else {
            parts.push(rt.to_string(element)?.to_string());
        }
    }
    Ok(JsValue::from(parts.join(separator.as_str())))
}

fn array_to_string(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    array_join(
        rt,
        &CallArgs {
            this: args.this.clone(),
            args: Vec::new(),
            new_target: None,
            callee: args.callee.cheap_clone(),
        },
    )
}

fn string_convert(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    match args.args.first() {
        None => Ok(JsValue::from("")),
        Some(JsValue::Symbol(sym)) => Ok(JsValue::from(symbol_descriptive_string(sym.description()))),
        Some(value) => Ok(JsValue::String(rt.to_string(value)?)),
    }
}

fn number_convert(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    match args.args.first() {
        None => Ok(JsValue::Number(0.0)),
        Some(JsValue::BigInt(n)) => Ok(JsValue::Number(*n as f64)),
        Some(value) => Ok(JsValue::Number(rt.to_number(value)?)),
    }
}

fn boolean_convert(_rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    Ok(JsValue::Boolean(args.arg(0).to_boolean()))
}

fn symbol_create(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    let description = match args.arg(0) {
        JsValue::Undefined => None,
        other => Some(rt.to_string(&other)?),
    };
    Ok(rt.new_symbol(description))
}

fn symbol_to_string(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    let symbol = match &args.this {
        JsValue::Symbol(s) => s.cheap_clone(),
        JsValue::Object(obj) => match &obj.borrow().exotic {
            ExoticObject::Primitive(JsValue::Symbol(s)) => s.cheap_clone(),
            _ => return Err(rt.type_error("Symbol.prototype.toString requires a symbol")),
        },
        _ => return Err(rt.type_error("Symbol.prototype.toString requires a symbol")),
    };
    Ok(JsValue::from(symbol_descriptive_string(symbol.description())))
}

fn symbol_descriptive_string(description: Option<&JsString>) -> String {
    format!("Symbol({})", description.map_or("", |d| d.as_str()))
}

