//! Single-threaded event loop with libuv's phase order:
//! timers, prepare, poll (async wake-ups), check, closing callbacks.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use log::{trace, warn};

use super::{HostLoop, LoopCallback, LoopHandle};

/// How far [`EventLoop::run`] goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    /// Until no referenced, active handle or timer remains.
    Default,
    /// One iteration, waiting for a timer if nothing else is ready.
    Once,
    /// One iteration without waiting.
    NoWait,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HandleKind {
    Prepare,
    Check,
    Async,
}

struct HandleEntry {
    kind: HandleKind,
    callback: LoopCallback,
    active: bool,
    referenced: bool,
    /// Async handle signalled since its last callback.
    pending: bool,
}

struct Timer {
    due: Instant,
    callback: Box<dyn FnOnce()>,
}

#[derive(Default)]
pub struct EventLoop {
    handles: RefCell<BTreeMap<LoopHandle, HandleEntry>>,
    timers: RefCell<BTreeMap<LoopHandle, Timer>>,
    closing: RefCell<Vec<LoopHandle>>,
    next_id: Cell<u64>,
    stop_requested: Cell<bool>,
}

impl EventLoop {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    fn allocate(&self) -> LoopHandle {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        LoopHandle(id)
    }

    fn register(&self, kind: HandleKind, callback: LoopCallback) -> LoopHandle {
        let handle = self.allocate();
        self.handles.borrow_mut().insert(
            handle,
            HandleEntry {
                kind,
                callback,
                active: kind == HandleKind::Async,
                referenced: true,
                pending: false,
            },
        );
        handle
    }

    /// Run `callback` once after `delay`.
    pub fn add_timer(&self, delay: Duration, callback: impl FnOnce() + 'static) -> LoopHandle {
        let handle = self.allocate();
        self.timers.borrow_mut().insert(
            handle,
            Timer {
                due: Instant::now() + delay,
                callback: Box::new(callback),
            },
        );
        handle
    }

    pub fn cancel_timer(&self, handle: LoopHandle) -> bool {
        self.timers.borrow_mut().remove(&handle).is_some()
    }

    /// Make the current `run` return after this iteration.
    pub fn request_stop(&self) {
        self.stop_requested.set(true);
    }

    /// Number of handles not yet closed.
    pub fn handle_count(&self) -> usize {
        self.handles.borrow().len()
    }

    /// Drive the loop. Returns whether it is still alive.
    pub fn run(&self, mode: RunMode) -> bool {
        self.stop_requested.set(false);
        let mut alive = self.is_alive();
        if !alive {
            // A dead loop still completes pending closes.
            self.run_closing();
        }
        while alive && !self.stop_requested.get() {
            self.run_timers();
            self.run_phase(HandleKind::Prepare);
            self.poll(mode);
            self.run_phase(HandleKind::Check);
            self.run_closing();

            alive = self.is_alive();
            if mode != RunMode::Default {
                break;
            }
        }
        alive
    }

    fn run_timers(&self) {
        let now = Instant::now();
        loop {
            let due = self
                .timers
                .borrow()
                .iter()
                .filter(|(_, t)| t.due <= now)
                .min_by_key(|(_, t)| t.due)
                .map(|(h, _)| *h);
            let Some(handle) = due else { break };
            let timer = self.timers.borrow_mut().remove(&handle);
            if let Some(timer) = timer {
                trace!("timer {:?} fired", handle);
                (timer.callback)();
            }
        }
    }

    fn poll(&self, mode: RunMode) {
        let has_pending = self.handles.borrow().values().any(|h| h.pending);
        let has_active_hooks = self
            .handles
            .borrow()
            .values()
            .any(|h| h.active && h.referenced && h.kind != HandleKind::Async);
        if !has_pending && !has_active_hooks && mode != RunMode::NoWait {
            let next_due = self.timers.borrow().values().map(|t| t.due).min();
            if let Some(due) = next_due {
                let wait = due.saturating_duration_since(Instant::now());
                if !wait.is_zero() {
                    std::thread::sleep(wait);
                }
            } else if self.handles.borrow().values().any(|h| h.kind == HandleKind::Async && h.referenced) {
                // Nothing on this thread can signal the handle while we block.
                warn!("event loop idle with only referenced async handles");
                self.stop_requested.set(true);
            }
        }

        let signalled: Vec<(LoopHandle, LoopCallback)> = self
            .handles
            .borrow_mut()
            .iter_mut()
            .filter(|(_, h)| h.pending)
            .map(|(id, h)| {
                h.pending = false;
                (*id, h.callback.clone())
            })
            .collect();
        for (handle, callback) in signalled {
            if self.handles.borrow().contains_key(&handle) {
                trace!("async {:?} woke the loop", handle);
                callback();
            }
        }
    }

    fn run_phase(&self, kind: HandleKind) {
        let callbacks: Vec<(LoopHandle, LoopCallback)> = self
            .handles
            .borrow()
            .iter()
            .filter(|(_, h)| h.kind == kind && h.active)
            .map(|(id, h)| (*id, h.callback.clone()))
            .collect();
        for (handle, callback) in callbacks {
            // Earlier callbacks of the phase may have stopped or closed it.
            let still_active = self.handles.borrow().get(&handle).is_some_and(|h| h.active);
            if still_active {
                callback();
            }
        }
    }

    fn run_closing(&self) {
        let closing = std::mem::take(&mut *self.closing.borrow_mut());
        let mut handles = self.handles.borrow_mut();
        for handle in closing {
            handles.remove(&handle);
        }
    }
}

impl HostLoop for EventLoop {
    fn prepare_init(&self, callback: LoopCallback) -> LoopHandle {
        self.register(HandleKind::Prepare, callback)
    }

    fn check_init(&self, callback: LoopCallback) -> LoopHandle {
        self.register(HandleKind::Check, callback)
    }

    fn async_init(&self, callback: LoopCallback) -> LoopHandle {
        self.register(HandleKind::Async, callback)
    }

    fn start(&self, handle: LoopHandle) {
        if let Some(h) = self.handles.borrow_mut().get_mut(&handle) {
            h.active = true;
        }
    }

    fn stop(&self, handle: LoopHandle) {
        if let Some(h) = self.handles.borrow_mut().get_mut(&handle)
            && h.kind != HandleKind::Async
        {
            h.active = false;
        }
    }

    fn set_ref(&self, handle: LoopHandle, referenced: bool) {
        if let Some(h) = self.handles.borrow_mut().get_mut(&handle) {
            h.referenced = referenced;
        }
    }

    fn send(&self, handle: LoopHandle) {
        if let Some(h) = self.handles.borrow_mut().get_mut(&handle)
            && h.kind == HandleKind::Async
        {
            h.pending = true;
        }
    }

    fn close(&self, handle: LoopHandle) {
        let mut handles = self.handles.borrow_mut();
        if let Some(h) = handles.get_mut(&handle) {
            h.active = false;
            h.pending = false;
            h.referenced = false;
            self.closing.borrow_mut().push(handle);
        }
    }

    fn is_alive(&self) -> bool {
        let handles = self.handles.borrow();
        let active = handles.values().any(|h| h.active && h.referenced);
        let pending = handles.values().any(|h| h.pending);
        active || pending || !self.timers.borrow().is_empty() || !self.closing.borrow().is_empty()
    }
}
