//! `console` routed to the `log` facade.

use log::{debug, error, info, warn};

use super::super::Throw;
use super::super::runtime::{CallArgs, Runtime};
use super::super::value::JsValue;
use super::Init;

pub(super) fn init(init: &Init) {
    let console = init.object();
    init.method(&console, "log", console_log);
    init.method(&console, "info", console_log);
    init.method(&console, "debug", console_debug);
    init.method(&console, "warn", console_warn);
    init.method(&console, "error", console_error);
    init.value(&init.realm.global, "console", JsValue::Object(console));
}

fn join_args(rt: &Runtime, args: &CallArgs) -> Result<String, Throw> {
    let mut parts = Vec::with_capacity(args.args.len());
    for arg in &args.args {
        match arg {
            JsValue::Symbol(_) => parts.push(format!("{:?}", arg)),
            other => parts.push(rt.to_string(other)?.to_string()),
        }
    }
    Ok(parts.join(" "))
}

fn console_log(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    info!(target: "console", "{}", join_args(rt, args)?);
    Ok(JsValue::Undefined)
}

fn console_debug(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    debug!(target: "console", "{}", join_args(rt, args)?);
    Ok(JsValue::Undefined)
}

fn console_warn(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    warn!(target: "console", "{}", join_args(rt, args)?);
    Ok(JsValue::Undefined)
}

fn console_error(rt: &Runtime, args: &CallArgs) -> Result<JsValue, Throw> {
    error!(target: "console", "{}", join_args(rt, args)?);
    Ok(JsValue::Undefined)
}
