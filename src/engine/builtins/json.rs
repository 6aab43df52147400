//! JSON global and conversions between `serde_json::Value` and engine values.

use std::collections::HashSet;

use serde_json::{Map, Number, Value as Json};

use super::super::Throw;
use super::super::object::{ExoticObject, Object};
use super::super::runtime::{CallArgs, ErrorKind, Runtime};
use super::super::value::{JsValue, Property, PropertyKey};
use super::Init;

pub(super) fn init(init: &Init) {
    let json = init.object();
    init.method(&json, "parse", json_parse);
    init.method(&json, "stringify", json_stringify);
    init.value(&init.realm.global, "JSON", JsValue::Object(json));
}

fn json_parse(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    let text = rt.to_string(&args.arg(0))?;
    parse(rt, text.as_str())
}

fn json_stringify(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    let indent = matches!(args.arg(2), JsValue::Number(n) if n > 0.0);
    let Some(json) = to_json(rt, &args.arg(0))? else {
        return Ok(JsValue::Undefined);
    };
    let text = if indent {
        serde_json::to_string_pretty(&json)
    } else {
        serde_json::to_string(&json)
    };
    text.map(JsValue::from)
        .map_err(|e| rt.throw_error(ErrorKind::Error, &e.to_string()))
}

/// Parse JSON text into an engine value. Malformed input throws a `SyntaxError`.
pub fn parse(rt: &Runtime, text: &str) -> Result<JsValue, Throw> {
    let json: Json = serde_json::from_str(text)
        .map_err(|e| rt.throw_error(ErrorKind::SyntaxError, &format!("Unexpected token in JSON: {}", e)))?;
    Ok(from_json(rt, &json))
}

pub fn from_json(rt: &Runtime, json: &Json) -> JsValue {
    match json {
        Json::Null => JsValue::Null,
        Json::Bool(b) => JsValue::Boolean(*b),
        Json::Number(n) => JsValue::Number(n.as_f64().unwrap_or(f64::NAN)),
        Json::String(s) => JsValue::from(s.as_str()),
        Json::Array(items) => JsValue::Object(rt.new_array(items.iter().map(|v| from_json(rt, v)).collect())),
        Json::Object(map) => {
            let obj = rt.new_object();
            for (key, value) in map {
                obj.define_own_property(
                    PropertyKey::from_string(key.as_str().into()),
                    Property::data(from_json(rt, value)),
                );
            }
            JsValue::Object(obj)
        }
    }
}

/// Serialize an engine value. `None` for values JSON omits (undefined,
/// functions, symbols).
pub fn to_json(rt: &Runtime, value: &JsValue) -> Result<Option<Json>, Throw> {
    let mut visiting = HashSet::new();
    to_json_inner(rt, value, &mut visiting)
}

fn to_json_inner(rt: &Runtime, value: &JsValue, visiting: &mut HashSet<usize>) -> Result<Option<Json>, Throw> {
    Ok(Some(match value {
        JsValue::Undefined | JsValue::Symbol(_) => return Ok(None),
        JsValue::Null => Json::Null,
        JsValue::Boolean(b) => Json::Bool(*b),
        JsValue::Number(n) => Number::from_f64(*n).map_or(Json::Null, Json::Number),
        JsValue::String(s) => Json::String(s.to_string()),
        JsValue::BigInt(_) => return Err(rt.type_error("Do not know how to serialize a BigInt")),
        JsValue::Object(obj) => {
            if obj.is_callable() {
                return Ok(None);
            }
            if !visiting.insert(obj.id()) {
                return Err(rt.type_error("Converting circular structure to JSON"));
            }
            let result = object_to_json(rt, obj, visiting);
            visiting.remove(&obj.id());
            result?
        }
    }))
}

fn object_to_json(rt: &Runtime, obj: &Object, visiting: &mut HashSet<usize>) -> Result<Json, Throw> {
    let primitive = match &obj.borrow().exotic {
        ExoticObject::Primitive(inner) => Some(inner.clone()),
        _ => None,
    };
    if let Some(inner) = primitive {
        return Ok(to_json_inner(rt, &inner, visiting)?.unwrap_or(Json::Null));
    }
    if obj.is_array() {
        let elements: Vec<JsValue> = match &obj.borrow().exotic {
            ExoticObject::Array(e) => e.clone(),
            _ => Vec::new(),
        };
        let mut items = Vec::with_capacity(elements.len());
        for element in &elements {
            items.push(to_json_inner(rt, element, visiting)?.unwrap_or(Json::Null));
        }
        return Ok(Json::Array(items));
    }
    let mut map = Map::new();
    for key in rt.enumerable_own_keys(obj)? {
        if matches!(key, PropertyKey::Symbol(_)) {
            continue;
        }
        let value = rt.get(obj, &key)?;
        if let Some(json) = to_json_inner(rt, &value, visiting)? {
            map.insert(key.to_string(), json);
        }
    }
    Ok(Json::Object(map))
}
