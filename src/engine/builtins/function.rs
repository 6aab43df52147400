//! Function.prototype methods and `queueMicrotask`.

use super::super::Throw;
use super::super::runtime::{CallArgs, Runtime};
use super::super::value::JsValue;
use super::Init;

pub(super) fn init(init: &Init) {
    let proto = &init.realm.function_prototype;
    init.method(proto, "call", function_call);
    init.method(proto, "apply", function_apply);
    init.method(proto, "toString", function_to_string);
    init.global_function("queueMicrotask", queue_microtask);
}

fn function_call(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    let this = args.arg(0);
    let rest = args.args.iter().skip(1).cloned().collect();
    rt.call(&args.this, this, rest)
}

fn function_apply(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    let this = args.arg(0);
    let list = match args.arg(1) {
        JsValue::Undefined | JsValue::Null => Vec::new(),
        JsValue::Object(obj) => match &obj.borrow().exotic {
            super::ExoticObject::Array(elements) => elements.clone(),
            _ => return Err(rt.type_error("CreateListFromArrayLike called on non-array")),
        },
        _ => return Err(rt.type_error("CreateListFromArrayLike called on non-object")),
    };
    rt.call(&args.this, this, list)
}

fn function_to_string(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    match &args.this {
        JsValue::Object(obj) if obj.is_callable() => {
            let name = obj.function_name().map(|n| n.to_string()).unwrap_or_default();
            Ok(JsValue::from(format!("function {}() {{ [native code] }}", name)))
        }
        _ => Err(rt.type_error("Function.prototype.toString requires that 'this' be a Function")),
    }
}

fn queue_microtask(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    let callback = args.arg(0);
    if !callback.is_callable() {
        return Err(rt.type_error("queueMicrotask requires a function"));
    }
    rt.enqueue_callback(move |rt| rt.call(&callback, JsValue::Undefined, Vec::new()).map(|_| ()));
    Ok(JsValue::Undefined)
}
