//! The pending-exception slot.

use log::warn;

use crate::engine::{ErrorKind, JsValue, Property, PropertyKey, Throw};
use crate::error::Result;

use super::{Env, Value};

impl Env {
    /// Make `error` the pending exception.
    pub fn throw(&self, error: Value) -> Result<()> {
        self.ensure_open()?;
        let value = self.value(error)?;
        self.set_exception(Throw::new(value));
        Ok(())
    }

    fn throw_kind(&self, kind: ErrorKind, code: Option<&str>, message: &str) -> Result<()> {
        self.ensure_open()?;
        let error = self.0.runtime.new_error(kind, message);
        if let Some(code) = code {
            error.define_own_property(PropertyKey::from("code"), Property::data(JsValue::from(code)));
        }
        self.set_exception(Throw::new(JsValue::Object(error)));
        Ok(())
    }

    pub fn throw_error(&self, code: Option<&str>, message: &str) -> Result<()> {
        self.throw_kind(ErrorKind::Error, code, message)
    }

    pub fn throw_type_error(&self, code: Option<&str>, message: &str) -> Result<()> {
        self.throw_kind(ErrorKind::TypeError, code, message)
    }

    pub fn throw_range_error(&self, code: Option<&str>, message: &str) -> Result<()> {
        self.throw_kind(ErrorKind::RangeError, code, message)
    }

    pub fn throw_syntax_error(&self, code: Option<&str>, message: &str) -> Result<()> {
        self.throw_kind(ErrorKind::SyntaxError, code, message)
    }

    pub fn is_exception_pending(&self) -> bool {
        self.0.exception.borrow().is_some()
    }

    /// Take the pending exception. Undefined when none is pending.
    pub fn get_and_clear_last_exception(&self) -> Result<Value> {
        self.ensure_open()?;
        let value = match self.take_exception() {
            Some(thrown) => thrown.value,
            None => JsValue::Undefined,
        };
        self.attach(value)
    }

    /// Report `error` as uncaught, as if it had escaped the outermost call.
    pub fn fatal_exception(&self, error: Value) -> Result<()> {
        self.ensure_open()?;
        let value = self.value(error)?;
        self.route_uncaught(Throw::new(value));
        Ok(())
    }

    /// Stop script execution for good. Every later evaluation fails with an
    /// uncatchable error.
    pub fn terminate_execution(&self) -> Result<()> {
        self.ensure_open()?;
        let rt = &self.0.runtime;
        rt.terminate();
        warn!("execution terminated");
        if self.0.depth.get() > 0 && !self.is_exception_pending() {
            self.set_exception(rt.terminated_error());
        }
        Ok(())
    }
}
