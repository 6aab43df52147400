//! Environment teardown.
//!
//! `destroy` runs the registered teardown callbacks, newest first. Plain
//! callbacks finish when they return. Deferred callbacks hold the teardown
//! open until the host calls `finish_deferred_teardown_callback`; the last
//! finish wakes the loop, which then releases the runtime.

use log::{debug, trace};

use crate::error::{Error, Result};

use super::{Env, Lifecycle};

/// Identifies a plain teardown callback for removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TeardownId(u64);

/// Completion handle of a deferred teardown callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeferredTeardown(u64);

impl TeardownId {
    pub fn to_bits(self) -> u64 {
        self.0
    }

    pub fn from_bits(bits: u64) -> Self {
        TeardownId(bits)
    }
}

impl DeferredTeardown {
    pub fn to_bits(self) -> u64 {
        self.0
    }

    pub fn from_bits(bits: u64) -> Self {
        DeferredTeardown(bits)
    }
}

enum Task {
    Immediate(Box<dyn FnOnce(&Env)>),
    Deferred(Box<dyn FnOnce(&Env, DeferredTeardown)>),
}

#[derive(Default)]
pub(super) struct TeardownQueue {
    tasks: Vec<(u64, Task)>,
    /// Deferred callbacks started but not finished.
    pending: Vec<u64>,
    next_id: u64,
}

impl TeardownQueue {
    fn push(&mut self, task: Task) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.tasks.push((id, task));
        id
    }
}

impl Env {
    pub fn add_teardown_callback(&self, callback: impl FnOnce(&Env) + 'static) -> Result<TeardownId> {
        self.ensure_open()?;
        let id = self.0.teardown.borrow_mut().push(Task::Immediate(Box::new(callback)));
        Ok(TeardownId(id))
    }

    /// Unregister a plain callback. Unknown ids are ignored.
    pub fn remove_teardown_callback(&self, id: TeardownId) -> Result<()> {
        self.ensure_open()?;
        self.0
            .teardown
            .borrow_mut()
            .tasks
            .retain(|(task_id, task)| !(*task_id == id.0 && matches!(task, Task::Immediate(_))));
        Ok(())
    }

    /// Register a callback that must signal completion through
    /// `finish_deferred_teardown_callback` with the handle it receives.
    pub fn add_deferred_teardown_callback(
        &self,
        callback: impl FnOnce(&Env, DeferredTeardown) + 'static,
    ) -> Result<DeferredTeardown> {
        self.ensure_open()?;
        let id = self.0.teardown.borrow_mut().push(Task::Deferred(Box::new(callback)));
        Ok(DeferredTeardown(id))
    }

    pub fn finish_deferred_teardown_callback(&self, handle: DeferredTeardown) -> Result<()> {
        let remaining = {
            let mut queue = self.0.teardown.borrow_mut();
            let position = queue
                .pending
                .iter()
                .position(|&id| id == handle.0)
                .ok_or(Error::UnknownTeardown)?;
            queue.pending.remove(position);
            queue.pending.len()
        };
        trace!("deferred teardown {} finished ({} left)", handle.0, remaining);
        if remaining == 0 && self.0.lifecycle.get() == Lifecycle::Destroying {
            self.get_env_loop().send(self.0.hooks.teardown);
        }
        Ok(())
    }

    /// Run teardown callbacks and release the environment. Completes later,
    /// from the loop, while deferred callbacks are outstanding.
    pub fn destroy(&self) -> Result<()> {
        if self.0.lifecycle.get() != Lifecycle::Alive {
            return Err(Error::EnvDestroyed);
        }
        self.0.lifecycle.set(Lifecycle::Destroying);
        debug!("destroying env");

        loop {
            let next = self.0.teardown.borrow_mut().tasks.pop();
            let Some((id, task)) = next else { break };
            match task {
                Task::Immediate(callback) => callback(self),
                Task::Deferred(callback) => {
                    self.0.teardown.borrow_mut().pending.push(id);
                    callback(self, DeferredTeardown(id));
                }
            }
        }

        if self.0.teardown.borrow().pending.is_empty() {
            self.close_env();
        } else {
            let host_loop = self.get_env_loop();
            host_loop.set_ref(self.0.hooks.teardown, true);
            debug!("env teardown waiting on deferred callbacks");
        }
        Ok(())
    }

    pub(super) fn on_teardown_wake(&self) {
        if self.0.lifecycle.get() == Lifecycle::Destroying && self.0.teardown.borrow().pending.is_empty() {
            self.close_env();
        }
    }

    fn close_env(&self) {
        let rt = &self.0.runtime;
        self.close_all_scopes();
        let references = self.0.references.borrow_mut().drain();
        let deferreds = self.0.deferreds.borrow_mut().drain();
        let modules = self.0.modules.borrow_mut().drain();
        self.0.resolvers.borrow_mut().clear();
        self.0.evaluators.borrow_mut().clear();
        let rejections = std::mem::take(&mut *self.0.rejections.borrow_mut());
        let exception = self.take_exception();
        let bindings = self.0.bindings.borrow_mut().take();
        drop((references, deferreds, modules, rejections, exception, bindings));

        self.0.lifecycle.set(Lifecycle::Closed);
        rt.dispose();

        let host_loop = self.get_env_loop();
        host_loop.close(self.0.hooks.prepare);
        host_loop.close(self.0.hooks.check);
        host_loop.close(self.0.hooks.teardown);
        debug!("env closed");
    }
}
