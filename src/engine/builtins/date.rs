//! Date: time values only.

use std::time::{SystemTime, UNIX_EPOCH};

use super::super::Throw;
use super::super::object::ExoticObject;
use super::super::runtime::{CallArgs, Runtime};
use super::super::value::JsValue;
use super::Init;

pub(super) fn init(init: &Init) {
    let proto = &init.realm.date_prototype;
    let ctor = init.constructor("Date", date_constructor, proto);
    init.method(&ctor, "now", date_now);
    init.method(proto, "getTime", date_get_time);
    init.method(proto, "valueOf", date_get_time);
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_millis() as f64)
}

/// Clip to the representable time range, as `TimeClip` does.
pub(crate) fn time_clip(time: f64) -> f64 {
    if !time.is_finite() || time.abs() > 8.64e15 {
        return f64::NAN;
    }
    time.trunc() + 0.0
}

fn date_constructor(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    let time = match args.args.first() {
        None => now_millis(),
        Some(value) => time_clip(rt.to_number(value)?),
    };
    if args.new_target.is_none() {
        return Ok(JsValue::from(format!("{}", time)));
    }
    let date = rt.new_date(time);
    if let Some(target) = &args.new_target
        && let JsValue::Object(proto) = rt.constructor_prototype(target)?
    {
        date.set_prototype(Some(proto));
    }
    Ok(JsValue::Object(date))
}

fn date_now(_rt: &Runtime, _args: &CallArgs) -> Result<JsValue, Throw> {
    Ok(JsValue::Number(now_millis()))
}

fn date_get_time(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    if let JsValue::Object(obj) = &args.this
        && let ExoticObject::Date(time) = &obj.borrow().exotic
    {
        return Ok(JsValue::Number(*time));
    }
    Err(rt.type_error("this is not a Date object."))
}
