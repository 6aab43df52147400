//! Promise constructor, statics and prototype methods.

use super::super::Throw;
use super::super::object::Object;
use super::super::runtime::{CallArgs, Runtime};
use super::super::value::{CheapClone, JsValue};
use super::Init;

pub(super) fn init(init: &Init) {
    let proto = &init.realm.promise_prototype;
    let ctor = init.constructor("Promise", promise_constructor, proto);
    init.method(&ctor, "resolve", promise_resolve_static);
    init.method(&ctor, "reject", promise_reject_static);
    init.method(proto, "then", promise_then);
    init.method(proto, "catch", promise_catch);
    init.method(proto, "finally", promise_finally);
}

fn this_promise(rt: &Runtime, args: &CallArgs, method: &str) -> Result<Object, Throw> {
    match &args.this {
        JsValue::Object(obj) if rt.is_promise(&args.this) => Ok(obj.cheap_clone()),
        _ => Err(rt.type_error(&format!("Method Promise.prototype.{} called on incompatible receiver", method))),
    }
}

fn promise_constructor(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    if args.new_target.is_none() {
        return Err(rt.type_error("Promise constructor cannot be invoked without 'new'"));
    }
    let executor = args.arg(0);
    if !executor.is_callable() {
        return Err(rt.type_error("Promise resolver is not a function"));
    }
    let (promise, resolve, reject) = rt.new_promise_capability();
    let result = rt.call(
        &executor,
        JsValue::Undefined,
        vec![JsValue::Object(resolve), JsValue::Object(reject.cheap_clone())],
    );
    match result {
        Err(err) if err.uncatchable => return Err(err),
        Err(err) => {
            rt.call_object(&reject, JsValue::Undefined, vec![err.value])?;
        }
        Ok(_) => {}
    }
    Ok(JsValue::Object(promise))
}

fn promise_resolve_static(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    Ok(JsValue::Object(rt.promise_resolve(args.arg(0))))
}

fn promise_reject_static(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    Ok(JsValue::Object(rt.promise_reject(args.arg(0))))
}

fn promise_then(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    let promise = this_promise(rt, args, "then")?;
    Ok(JsValue::Object(rt.promise_then(&promise, args.arg(0), args.arg(1))))
}

fn promise_catch(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    let promise = this_promise(rt, args, "catch")?;
    Ok(JsValue::Object(rt.promise_then(&promise, JsValue::Undefined, args.arg(0))))
}

/// `finally(f)`: runs `f` on either outcome, then passes the original
/// outcome through unless `f` throws.
fn promise_finally(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    let promise = this_promise(rt, args, "finally")?;
    let on_finally = args.arg(0);
    if !on_finally.is_callable() {
        return Ok(JsValue::Object(rt.promise_then(&promise, on_finally.clone(), on_finally)));
    }
    let fulfilled_cb = on_finally.clone();
    let on_fulfilled = rt.new_native_function("", false, move |rt, args| {
        rt.call(&fulfilled_cb, JsValue::Undefined, Vec::new())?;
        Ok(args.arg(0))
    });
    let on_rejected = rt.new_native_function("", false, move |rt, args| {
        rt.call(&on_finally, JsValue::Undefined, Vec::new())?;
        Err(Throw::new(args.arg(0)))
    });
    Ok(JsValue::Object(rt.promise_then(
        &promise,
        JsValue::Object(on_fulfilled),
        JsValue::Object(on_rejected),
    )))
}
