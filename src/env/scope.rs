//! Handle scopes.
//!
//! Every value handed to the host lives in the value arena and is owned by
//! exactly one scope. Closing a scope removes its values from the arena,
//! which drops the engine values and frees whatever they kept alive.

use log::{trace, warn};

use crate::engine::JsValue;
use crate::error::{Error, Result};

use super::arena::Index;
use super::{Env, Value};

pub(super) struct ScopeRecord {
    id: u64,
    values: Vec<Index>,
    escapable: bool,
    escaped: bool,
}

/// A scope opened by the host. Must be closed in LIFO order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandleScope(u64);

/// A scope that may promote one value to its parent before closing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EscapableHandleScope(u64);

impl HandleScope {
    pub fn to_bits(self) -> u64 {
        self.0
    }

    pub fn from_bits(bits: u64) -> Self {
        HandleScope(bits)
    }
}

impl EscapableHandleScope {
    pub fn to_bits(self) -> u64 {
        self.0
    }

    pub fn from_bits(bits: u64) -> Self {
        EscapableHandleScope(bits)
    }
}

impl Env {
    pub(super) fn open_root_scope(&self) {
        self.push_scope(false);
    }

    fn push_scope(&self, escapable: bool) -> u64 {
        let id = self.0.next_scope.get();
        self.0.next_scope.set(id + 1);
        let mut scopes = self.0.scopes.borrow_mut();
        scopes.push(ScopeRecord {
            id,
            values: Vec::new(),
            escapable,
            escaped: false,
        });
        trace!("open scope {} (depth {})", id, scopes.len());
        id
    }

    /// Pop scope `id` if it is the current one.
    fn pop_scope(&self, id: u64) -> Result<()> {
        let record = {
            let mut scopes = self.0.scopes.borrow_mut();
            // The root scope belongs to the environment itself.
            if scopes.len() < 2 || scopes.last().map(|s| s.id) != Some(id) {
                return Err(Error::ScopeMismatch);
            }
            scopes.pop()
        };
        if let Some(record) = record {
            self.release(record);
        }
        self.run_finalizers();
        Ok(())
    }

    fn release(&self, record: ScopeRecord) {
        let released: Vec<JsValue> = {
            let mut values = self.0.values.borrow_mut();
            record.values.iter().filter_map(|&idx| values.remove(idx)).collect()
        };
        trace!("close scope {} ({} values)", record.id, released.len());
        drop(released);
    }

    pub fn open_handle_scope(&self) -> Result<HandleScope> {
        self.ensure_open()?;
        Ok(HandleScope(self.push_scope(false)))
    }

    /// Close `scope`, releasing every value created in it. Only the current
    /// scope can be closed; anything else fails and changes nothing.
    pub fn close_handle_scope(&self, scope: HandleScope) -> Result<()> {
        self.pop_scope(scope.0)
    }

    pub fn open_escapable_handle_scope(&self) -> Result<EscapableHandleScope> {
        self.ensure_open()?;
        Ok(EscapableHandleScope(self.push_scope(true)))
    }

    pub fn close_escapable_handle_scope(&self, scope: EscapableHandleScope) -> Result<()> {
        self.pop_scope(scope.0)
    }

    /// Promote `escapee` to the parent of `scope`. Allowed once per scope.
    pub fn escape_handle(&self, scope: EscapableHandleScope, escapee: Value) -> Result<Value> {
        let value = self.value(escapee)?;
        let idx = {
            let mut scopes = self.0.scopes.borrow_mut();
            let position = scopes
                .iter()
                .position(|s| s.id == scope.0 && s.escapable)
                .ok_or(Error::InvalidHandle("handle scope"))?;
            if position == 0 {
                return Err(Error::InvalidHandle("handle scope"));
            }
            if scopes.get(position).is_some_and(|s| s.escaped) {
                return Err(Error::AlreadyEscaped);
            }
            let idx = self.0.values.borrow_mut().insert(value);
            if let Some(record) = scopes.get_mut(position) {
                record.escaped = true;
            }
            if let Some(parent) = scopes.get_mut(position - 1) {
                parent.values.push(idx);
            }
            idx
        };
        Ok(Value(idx))
    }

    /// Attach `value` to the current scope.
    pub(super) fn attach(&self, value: JsValue) -> Result<Value> {
        self.ensure_open()?;
        let mut scopes = self.0.scopes.borrow_mut();
        let scope = scopes.last_mut().ok_or(Error::NoHandleScope)?;
        let idx = self.0.values.borrow_mut().insert(value);
        scope.values.push(idx);
        Ok(Value(idx))
    }

    /// The engine value behind a handle.
    pub(super) fn value(&self, handle: Value) -> Result<JsValue> {
        self.0
            .values
            .borrow()
            .get(handle.0)
            .cloned()
            .ok_or(Error::InvalidHandle("value"))
    }

    /// Run `f` inside an internal scope. Scopes `f` leaves open are closed
    /// along with it.
    pub(super) fn with_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        let id = self.push_scope(false);
        let result = f();
        self.unwind_to(id);
        result
    }

    fn unwind_to(&self, id: u64) {
        loop {
            let record = {
                let mut scopes = self.0.scopes.borrow_mut();
                if !scopes.iter().any(|s| s.id == id) {
                    return;
                }
                scopes.pop()
            };
            let Some(record) = record else { return };
            let done = record.id == id;
            if !done {
                warn!("scope {} left open by a callback; closing it", record.id);
            }
            self.release(record);
            if done {
                break;
            }
        }
        self.run_finalizers();
    }

    /// Release every scope, root included.
    pub(super) fn close_all_scopes(&self) {
        let records = std::mem::take(&mut *self.0.scopes.borrow_mut());
        for record in records.into_iter().rev() {
            self.release(record);
        }
    }

    /// Number of open scopes, the root scope included.
    pub fn handle_scope_depth(&self) -> usize {
        self.0.scopes.borrow().len()
    }

    /// Number of live value handles across all scopes.
    pub fn live_handles(&self) -> usize {
        self.0.values.borrow().len()
    }
}
