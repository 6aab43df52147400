//! Promises, deferreds, microtask draining and unhandled rejections.

use log::{debug, trace};

use crate::engine::{CheapClone, JsValue, Object, PromiseStatus};
use crate::error::{Error, Result};

use super::arena::Index;
use super::{Env, Value};

/// Resolver half of a promise created by [`Env::create_promise`]. Consumed
/// by resolving or rejecting it.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Deferred(Index);

impl Deferred {
    pub fn to_bits(&self) -> u64 {
        self.0.to_bits()
    }

    pub fn from_bits(bits: u64) -> Self {
        Deferred(Index::from_bits(bits))
    }
}

pub(super) struct DeferredRecord {
    resolve: Object,
    reject: Object,
}

impl Env {
    pub fn create_promise(&self) -> Result<(Deferred, Value)> {
        self.ensure_open()?;
        let (promise, resolve, reject) = self.0.runtime.new_promise_capability();
        let value = self.attach(JsValue::Object(promise))?;
        let index = self.0.deferreds.borrow_mut().insert(DeferredRecord { resolve, reject });
        Ok((Deferred(index), value))
    }

    pub fn resolve_deferred(&self, deferred: Deferred, resolution: Value) -> Result<()> {
        self.settle(deferred, resolution, false)
    }

    pub fn reject_deferred(&self, deferred: Deferred, rejection: Value) -> Result<()> {
        self.settle(deferred, rejection, true)
    }

    /// Call the stored resolving function. Outside any entry point the
    /// reactions run before this returns.
    fn settle(&self, deferred: Deferred, argument: Value, reject: bool) -> Result<()> {
        self.ensure_open()?;
        let argument = self.value(argument)?;
        let record = self
            .0
            .deferreds
            .borrow_mut()
            .remove(deferred.0)
            .ok_or(Error::InvalidHandle("deferred"))?;
        let function = if reject { &record.reject } else { &record.resolve };

        let result = self.0.runtime.call_object(function, JsValue::Undefined, vec![argument]);
        drop(record);
        if self.0.depth.get() == 0 {
            self.run_microtasks();
        }
        self.check(result).map(|_| ())
    }

    pub fn get_promise_state(&self, promise: Value) -> Result<PromiseStatus> {
        let promise = self.promise_of(promise)?;
        self.0
            .runtime
            .promise_state(&promise)
            .map(|(status, _)| status)
            .ok_or(Error::TypeMismatch { expected: "a promise" })
    }

    /// Fulfillment value or rejection reason. Undefined while pending.
    pub fn get_promise_result(&self, promise: Value) -> Result<Value> {
        let promise = self.promise_of(promise)?;
        let result = match self.0.runtime.promise_state(&promise) {
            Some((PromiseStatus::Pending, _)) => JsValue::Undefined,
            Some((_, value)) => value,
            None => return Err(Error::TypeMismatch { expected: "a promise" }),
        };
        self.attach(result)
    }

    fn promise_of(&self, promise: Value) -> Result<Object> {
        let value = self.value(promise)?;
        match value {
            JsValue::Object(obj) if self.0.runtime.is_promise(&JsValue::Object(obj.cheap_clone())) => Ok(obj),
            _ => Err(Error::TypeMismatch { expected: "a promise" }),
        }
    }

    /// Queue `function` as a microtask.
    pub fn queue_microtask(&self, function: Value) -> Result<()> {
        self.ensure_open()?;
        let function = self.function(function)?;
        self.0.runtime.enqueue_callback(move |rt| {
            rt.call_object(&function, JsValue::Undefined, Vec::new()).map(|_| ())
        });
        self.check_liveness();
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Draining
    // ═══════════════════════════════════════════════════════════════════════

    /// Run every queued job, then report rejections nobody handled.
    pub(super) fn run_microtasks(&self) {
        if self.is_destroyed() {
            return;
        }
        let mut jobs = 0usize;
        self.with_scope(|| {
            while let Some(result) = self.0.runtime.execute_pending_job() {
                jobs += 1;
                if let Err(thrown) = result {
                    if thrown.uncatchable {
                        self.set_exception(thrown);
                        break;
                    }
                    self.route_uncaught(thrown);
                }
            }
        });

        let rejections = std::mem::take(&mut *self.0.rejections.borrow_mut());
        let callback = self.0.callbacks.borrow().unhandled_rejection.clone();
        if let Some(callback) = callback {
            for (promise, reason) in rejections {
                self.with_scope(|| {
                    let reason = self.attach(reason);
                    let promise = self.attach(JsValue::Object(promise));
                    if let (Ok(reason), Ok(promise)) = (reason, promise) {
                        callback(self, reason, promise);
                    }
                });
            }
        }

        if jobs > 0 {
            debug!("drained {} microtasks", jobs);
        }
        self.check_liveness();
    }

    /// Rejection tracker: remember unhandled rejections until the next
    /// drain completes, forget them when a handler shows up.
    pub(super) fn on_promise_rejection(&self, promise: &Object, reason: &JsValue, handled: bool) {
        if self.0.callbacks.borrow().unhandled_rejection.is_none() {
            return;
        }
        let mut rejections = self.0.rejections.borrow_mut();
        if handled {
            rejections.retain(|(p, _)| !p.ptr_eq(promise));
            trace!("rejection of promise {} handled", promise.id());
        } else if !rejections.iter().any(|(p, _)| p.ptr_eq(promise)) {
            rejections.push((promise.cheap_clone(), reason.clone()));
            trace!("promise {} rejected without handler", promise.id());
        }
    }
}
