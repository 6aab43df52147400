//! Error constructors and prototypes.

use super::super::Throw;
use super::super::runtime::{CallArgs, ErrorKind, Runtime};
use super::super::value::{CheapClone, JsValue, Property, PropertyKey};
use super::Init;

pub(super) fn init(init: &Init) {
    let realm = init.realm;
    let kinds: [(ErrorKind, super::Builtin); 5] = [
        (ErrorKind::Error, error_constructor),
        (ErrorKind::TypeError, type_error_constructor),
        (ErrorKind::RangeError, range_error_constructor),
        (ErrorKind::SyntaxError, syntax_error_constructor),
        (ErrorKind::ReferenceError, reference_error_constructor),
    ];
    for (kind, ctor) in kinds {
        let proto = realm.error_prototype_for(kind);
        init.constructor(kind.name(), ctor, proto);
        init.value(proto, "name", JsValue::from(kind.name()));
        init.value(proto, "message", JsValue::from(""));
    }
    let internal = realm.error_prototype_for(ErrorKind::InternalError);
    init.value(internal, "name", JsValue::from(ErrorKind::InternalError.name()));
    init.value(internal, "message", JsValue::from(""));
    init.method(&realm.error_prototype, "toString", error_to_string);
}

fn construct_error(rt: &Runtime, args: &CallArgs, kind: ErrorKind) -> Result<JsValue, Throw> {
    let message = match args.arg(0) {
        JsValue::Undefined => None,
        other => Some(rt.to_string(&other)?),
    };
    let error = rt.new_error(kind, message.as_ref().map_or("", |m| m.as_str()));
    if message.is_none() {
        error.delete_own_property(&PropertyKey::from("message"));
    }
    if let Some(target) = &args.new_target
        && !target.ptr_eq(&args.callee)
        && let JsValue::Object(proto) = rt.constructor_prototype(target)?
    {
        error.set_prototype(Some(proto.cheap_clone()));
    }
    if let JsValue::Object(options) = args.arg(1) {
        let cause = PropertyKey::from("cause");
        if rt.has_property(&options, &cause)? {
            let value = rt.get(&options, &cause)?;
            error.define_own_property(cause, Property::hidden(value));
        }
    }
    Ok(JsValue::Object(error))
}

fn error_constructor(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    construct_error(rt, args, ErrorKind::Error)
}

fn type_error_constructor(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    construct_error(rt, args, ErrorKind::TypeError)
}

fn range_error_constructor(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    construct_error(rt, args, ErrorKind::RangeError)
}

fn syntax_error_constructor(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    construct_error(rt, args, ErrorKind::SyntaxError)
}

fn reference_error_constructor(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    construct_error(rt, args, ErrorKind::ReferenceError)
}

fn error_to_string(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    let JsValue::Object(obj) = &args.this else {
        return Err(rt.type_error("Error.prototype.toString called on non-object"));
    };
    let name = match rt.get(obj, &PropertyKey::from("name"))? {
        JsValue::Undefined => "Error".to_string(),
        other => rt.to_string(&other)?.to_string(),
    };
    let message = match rt.get(obj, &PropertyKey::from("message"))? {
        JsValue::Undefined => String::new(),
        other => rt.to_string(&other)?.to_string(),
    };
    Ok(JsValue::from(match (name.is_empty(), message.is_empty()) {
        (_, true) => name,
        (true, false) => message,
        (false, false) => format!("{}: {}", name, message),
    }))
}
