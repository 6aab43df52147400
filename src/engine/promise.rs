//! Promise state machine and the microtask job queue.

use std::cell::Cell;
use std::rc::Rc;

use log::trace;

use super::Throw;
use super::object::{ExoticObject, FunctionKind, Object, ObjectData};
use super::runtime::Runtime;
use super::value::{CheapClone, JsValue, PropertyKey};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromiseStatus {
    Pending,
    Fulfilled,
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReactionKind {
    Fulfill,
    Reject,
}

/// A pending `then` registration.
#[derive(Clone)]
pub(crate) struct Reaction {
    /// Promise settled with the handler's outcome.
    derived: Option<Object>,
    handler: Option<JsValue>,
    kind: ReactionKind,
}

pub struct PromiseState {
    pub status: PromiseStatus,
    pub result: JsValue,
    fulfill_reactions: Vec<Reaction>,
    reject_reactions: Vec<Reaction>,
    /// Whether a rejection handler has ever been attached.
    pub is_handled: bool,
}

impl PromiseState {
    pub fn new() -> Self {
        Self {
            status: PromiseStatus::Pending,
            result: JsValue::Undefined,
            fulfill_reactions: Vec::new(),
            reject_reactions: Vec::new(),
            is_handled: false,
        }
    }

    pub(crate) fn trace(&self, visit: &mut dyn FnMut(&Object)) {
        if let JsValue::Object(o) = &self.result {
            visit(o);
        }
        for reaction in self.fulfill_reactions.iter().chain(&self.reject_reactions) {
            if let Some(d) = &reaction.derived {
                visit(d);
            }
            if let Some(JsValue::Object(h)) = &reaction.handler {
                visit(h);
            }
        }
    }
}

impl Default for PromiseState {
    fn default() -> Self {
        Self::new()
    }
}

/// Called as `(promise, reason, handled)` when a promise is rejected without a
/// handler (`handled == false`) and when such a promise later gains one.
pub type RejectionTracker = Rc<dyn Fn(&Runtime, &Object, &JsValue, bool)>;

/// A queued microtask.
pub(crate) enum Job {
    Reaction {
        reaction: Reaction,
        argument: JsValue,
    },
    ResolveThenable {
        promise: Object,
        thenable: JsValue,
        then: JsValue,
    },
    Callback(Box<dyn FnOnce(&Runtime) -> Result<(), Throw>>),
}

impl Runtime {
    pub fn new_promise(&self) -> Object {
        self.alloc(ObjectData::new(
            Some(self.0.realm.promise_prototype.cheap_clone()),
            ExoticObject::Promise(PromiseState::new()),
        ))
    }

    /// A pending promise together with its resolve and reject functions.
    pub fn new_promise_capability(&self) -> (Object, Object, Object) {
        let promise = self.new_promise();
        let (resolve, reject) = self.create_resolving_functions(&promise);
        (promise, resolve, reject)
    }

    pub(crate) fn create_resolving_functions(&self, promise: &Object) -> (Object, Object) {
        let already_resolved = Rc::new(Cell::new(false));
        let resolve = self.new_function(
            "".into(),
            FunctionKind::Resolving {
                promise: promise.cheap_clone(),
                already_resolved: already_resolved.cheap_clone(),
                reject: false,
            },
            false,
        );
        let reject = self.new_function(
            "".into(),
            FunctionKind::Resolving {
                promise: promise.cheap_clone(),
                already_resolved,
                reject: true,
            },
            false,
        );
        (resolve, reject)
    }

    pub fn is_promise(&self, value: &JsValue) -> bool {
        matches!(value, JsValue::Object(o) if matches!(o.borrow().exotic, ExoticObject::Promise(_)))
    }

    pub fn promise_state(&self, promise: &Object) -> Option<(PromiseStatus, JsValue)> {
        match &promise.borrow().exotic {
            ExoticObject::Promise(state) => Some((state.status, state.result.clone())),
            _ => None,
        }
    }

    /// Resolve `promise` with `value`, adopting the state of thenables.
    pub fn resolve_promise(&self, promise: &Object, value: JsValue) {
        if !self.is_pending(promise) {
            return;
        }
        if let JsValue::Object(obj) = &value {
            if obj.ptr_eq(promise) {
                let err = self.type_error("Chaining cycle detected for promise");
                self.reject_promise(promise, err.value);
                return;
            }
            match self.get(obj, &PropertyKey::from("then")) {
                Err(err) => {
                    self.reject_promise(promise, err.value);
                    return;
                }
                Ok(then) if then.is_callable() => {
                    self.enqueue_job(Job::ResolveThenable {
                        promise: promise.cheap_clone(),
                        thenable: value.clone(),
                        then,
                    });
                    return;
                }
                Ok(_) => {}
            }
        }
        self.settle(promise, PromiseStatus::Fulfilled, value);
    }

    pub fn reject_promise(&self, promise: &Object, reason: JsValue) {
        if !self.is_pending(promise) {
            return;
        }
        self.settle(promise, PromiseStatus::Rejected, reason);
    }

    fn is_pending(&self, promise: &Object) -> bool {
        matches!(&promise.borrow().exotic, ExoticObject::Promise(s) if s.status == PromiseStatus::Pending)
    }

    fn settle(&self, promise: &Object, status: PromiseStatus, value: JsValue) {
        let (reactions, unhandled) = {
            let mut data = promise.borrow_mut();
            let ExoticObject::Promise(state) = &mut data.exotic else {
                return;
            };
            state.status = status;
            state.result = value.clone();
            let fulfill = std::mem::take(&mut state.fulfill_reactions);
            let reject = std::mem::take(&mut state.reject_reactions);
            let reactions = if status == PromiseStatus::Fulfilled { fulfill } else { reject };
            (reactions, status == PromiseStatus::Rejected && !state.is_handled)
        };
        trace!("promise {:?} settled as {:?}", promise, status);
        if unhandled {
            self.track_rejection(promise, &value, false);
        }
        for reaction in reactions {
            self.enqueue_job(Job::Reaction {
                reaction,
                argument: value.clone(),
            });
        }
    }

    fn track_rejection(&self, promise: &Object, reason: &JsValue, handled: bool) {
        let tracker = self.0.rejection_tracker.borrow().clone();
        if let Some(tracker) = tracker {
            tracker(self, promise, reason, handled);
        }
    }

    /// Attach reactions. The outcome of the handlers settles `derived`.
    pub fn perform_then(
        &self,
        promise: &Object,
        on_fulfilled: Option<JsValue>,
        on_rejected: Option<JsValue>,
        derived: Option<Object>,
    ) {
        let fulfill = Reaction {
            derived: derived.clone(),
            handler: on_fulfilled.filter(JsValue::is_callable),
            kind: ReactionKind::Fulfill,
        };
        let reject = Reaction {
            derived,
            handler: on_rejected.filter(JsValue::is_callable),
            kind: ReactionKind::Reject,
        };

        let (job, newly_handled) = {
            let mut data = promise.borrow_mut();
            let ExoticObject::Promise(state) = &mut data.exotic else {
                return;
            };
            let was_handled = state.is_handled;
            state.is_handled = true;
            match state.status {
                PromiseStatus::Pending => {
                    state.fulfill_reactions.push(fulfill);
                    state.reject_reactions.push(reject);
                    (None, None)
                }
                PromiseStatus::Fulfilled => (Some((fulfill, state.result.clone())), None),
                PromiseStatus::Rejected => {
                    let handled = (!was_handled).then(|| state.result.clone());
                    (Some((reject, state.result.clone())), handled)
                }
            }
        };
        if let Some(reason) = newly_handled {
            self.track_rejection(promise, &reason, true);
        }
        if let Some((reaction, argument)) = job {
            self.enqueue_job(Job::Reaction { reaction, argument });
        }
    }

    /// `promise.then(f, r)` returning the derived promise.
    pub fn promise_then(&self, promise: &Object, on_fulfilled: JsValue, on_rejected: JsValue) -> Object {
        let derived = self.new_promise();
        self.perform_then(
            promise,
            Some(on_fulfilled),
            Some(on_rejected),
            Some(derived.cheap_clone()),
        );
        derived
    }

    /// `Promise.resolve(value)`
    pub fn promise_resolve(&self, value: JsValue) -> Object {
        if let JsValue::Object(obj) = &value
            && matches!(obj.borrow().exotic, ExoticObject::Promise(_))
        {
            return obj.cheap_clone();
        }
        let promise = self.new_promise();
        self.resolve_promise(&promise, value);
        promise
    }

    /// `Promise.reject(reason)`
    pub fn promise_reject(&self, reason: JsValue) -> Object {
        let promise = self.new_promise();
        self.reject_promise(&promise, reason);
        promise
    }

    pub fn set_rejection_tracker(&self, tracker: Option<RejectionTracker>) {
        *self.0.rejection_tracker.borrow_mut() = tracker;
    }

    pub(crate) fn enqueue_job(&self, job: Job) {
        self.0.jobs.borrow_mut().push_back(job);
    }

    /// Queue a host microtask.
    pub fn enqueue_callback(&self, f: impl FnOnce(&Runtime) -> Result<(), Throw> + 'static) {
        self.enqueue_job(Job::Callback(Box::new(f)));
    }

    pub fn has_pending_jobs(&self) -> bool {
        !self.0.jobs.borrow().is_empty()
    }

    /// Run one queued job. `None` when the queue is empty.
    pub fn execute_pending_job(&self) -> Option<Result<(), Throw>> {
        let job = self.0.jobs.borrow_mut().pop_front()?;
        let result = self.run_job(job);
        self.maybe_gc();
        Some(result)
    }

    fn run_job(&self, job: Job) -> Result<(), Throw> {
        self.check_terminated()?;
        match job {
            Job::Reaction { reaction, argument } => {
                let outcome = match &reaction.handler {
                    None => match reaction.kind {
                        ReactionKind::Fulfill => Ok(argument),
                        ReactionKind::Reject => Err(Throw::new(argument)),
                    },
                    Some(handler) => self.call(handler, JsValue::Undefined, vec![argument]),
                };
                match (reaction.derived, outcome) {
                    (_, Err(err)) if err.uncatchable => Err(err),
                    (Some(derived), Ok(value)) => {
                        self.resolve_promise(&derived, value);
                        Ok(())
                    }
                    (Some(derived), Err(err)) => {
                        self.reject_promise(&derived, err.value);
                        Ok(())
                    }
                    (None, Ok(_)) => Ok(()),
                    (None, Err(err)) => Err(err),
                }
            }
            Job::ResolveThenable {
                promise,
                thenable,
                then,
            } => {
                let (resolve, reject) = self.create_resolving_functions(&promise);
                let result = self.call(
                    &then,
                    thenable,
                    vec![JsValue::Object(resolve), JsValue::Object(reject.cheap_clone())],
                );
                match result {
                    Err(err) if err.uncatchable => Err(err),
                    Err(err) => {
                        self.call_object(&reject, JsValue::Undefined, vec![err.value])?;
                        Ok(())
                    }
                    Ok(_) => Ok(()),
                }
            }
            Job::Callback(f) => f(self),
        }
    }
}
