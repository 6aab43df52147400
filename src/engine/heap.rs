//! Object heap: allocation registry plus an on-demand cycle collector.
//!
//! Objects are reference counted and released eagerly. The registry only holds
//! weak handles, so it never extends a lifetime. `collect` finds groups of
//! objects that are kept alive solely by references from each other (cycles)
//! and breaks them by clearing their slots.
//!
//! Algorithm (trial deletion):
//! 1. Count, for every live object, the strong handles held by other objects.
//! 2. Objects with more strong handles than internal ones are referenced from
//!    outside the object graph (host handles, runtime roots). They are roots.
//! 3. Mark everything reachable from the roots; clear the rest.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use log::debug;

use crate::prelude::FxHashMap;

use super::object::{ClassId, Object, ObjectCell, ObjectData, Opaque};

/// Statistics about the heap state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Number of live objects
    pub live_objects: usize,
    /// Objects released by the last collection
    pub collected: usize,
}

pub struct Heap {
    objects: RefCell<Vec<Weak<ObjectCell>>>,
    pending_finalizers: RefCell<Vec<(ClassId, Rc<dyn Any>)>>,
    allocations_since_gc: Cell<usize>,
    /// Registry length at which dead weak entries are pruned.
    prune_at: Cell<usize>,
    gc_threshold: Cell<usize>,
    last_collected: Cell<usize>,
}

const MIN_PRUNE: usize = 256;

impl Heap {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            objects: RefCell::new(Vec::new()),
            pending_finalizers: RefCell::new(Vec::new()),
            allocations_since_gc: Cell::new(0),
            prune_at: Cell::new(MIN_PRUNE),
            gc_threshold: Cell::new(0),
            last_collected: Cell::new(0),
        })
    }

    /// Allocate an object.
    pub fn alloc(self: &Rc<Self>, data: ObjectData) -> Object {
        self.register(Object::from_parts(data, None))
    }

    /// Allocate a class instance carrying an opaque payload. The payload is
    /// handed to the class finalize hook when the object is released.
    pub fn alloc_with_opaque(self: &Rc<Self>, data: ObjectData, class: ClassId, opaque: Rc<dyn Any>) -> Object {
        let obj = Object::from_parts(
            data,
            Some(Opaque {
                class,
                data: opaque,
                sink: Rc::downgrade(self),
            }),
        );
        self.register(obj)
    }

    fn register(&self, obj: Object) -> Object {
        let len = {
            let mut objects = self.objects.borrow_mut();
            objects.push(obj.cell_weak());
            objects.len()
        };
        if len >= self.prune_at.get() {
            self.prune();
        }
        self.allocations_since_gc.set(self.allocations_since_gc.get() + 1);
        obj
    }

    fn prune(&self) {
        let mut objects = self.objects.borrow_mut();
        objects.retain(|w| w.strong_count() > 0);
        self.prune_at.set((objects.len() * 2).max(MIN_PRUNE));
    }

    /// Set the number of allocations between automatic collections.
    /// 0 disables automatic collection.
    pub fn set_gc_threshold(&self, threshold: usize) {
        self.gc_threshold.set(threshold);
    }

    pub fn gc_threshold(&self) -> usize {
        self.gc_threshold.get()
    }

    /// True when enough allocations happened to warrant an automatic pass.
    pub fn wants_collection(&self) -> bool {
        let threshold = self.gc_threshold.get();
        threshold > 0 && self.allocations_since_gc.get() >= threshold
    }

    pub(crate) fn queue_finalizer(&self, class: ClassId, data: Rc<dyn Any>) {
        self.pending_finalizers.borrow_mut().push((class, data));
    }

    pub(crate) fn take_pending_finalizers(&self) -> Vec<(ClassId, Rc<dyn Any>)> {
        std::mem::take(&mut *self.pending_finalizers.borrow_mut())
    }

    pub fn has_pending_finalizers(&self) -> bool {
        !self.pending_finalizers.borrow().is_empty()
    }

    pub fn stats(&self) -> GcStats {
        GcStats {
            live_objects: self
                .objects
                .borrow()
                .iter()
                .filter(|w| w.strong_count() > 0)
                .count(),
            collected: self.last_collected.get(),
        }
    }

    /// Run a cycle collection pass.
    pub fn collect(&self) -> GcStats {
        self.allocations_since_gc.set(0);

        let live: Vec<Object> = {
            let mut objects = self.objects.borrow_mut();
            objects.retain(|w| w.strong_count() > 0);
            objects
                .iter()
                .filter_map(|w| w.upgrade().map(Object::from_cell))
                .collect()
        };

        let index: FxHashMap<usize, usize> = live.iter().enumerate().map(|(i, o)| (o.id(), i)).collect();

        // Internal reference counts. Objects we cannot borrow right now are
        // treated as opaque roots: their children look externally referenced.
        let mut internal = vec![0usize; live.len()];
        let mut traceable = vec![true; live.len()];
        for (i, obj) in live.iter().enumerate() {
            match obj.try_borrow() {
                Some(data) => data.trace(&mut |child| {
                    if let Some(slot) = index.get(&child.id()).and_then(|&j| internal.get_mut(j)) {
                        *slot += 1;
                    }
                }),
                None => {
                    if let Some(t) = traceable.get_mut(i) {
                        *t = false;
                    }
                }
            }
        }

        let mut marked = vec![false; live.len()];
        let mut stack: Vec<usize> = Vec::new();
        for (i, obj) in live.iter().enumerate() {
            // One strong handle is ours (the `live` vector).
            let external = obj.strong_count().saturating_sub(1);
            let internal_refs = internal.get(i).copied().unwrap_or(0);
            let untraceable = !traceable.get(i).copied().unwrap_or(false);
            if external > internal_refs || untraceable {
                stack.push(i);
            }
        }

        while let Some(i) = stack.pop() {
            let Some(m) = marked.get_mut(i) else { continue };
            if *m {
                continue;
            }
            *m = true;
            let Some(obj) = live.get(i) else { continue };
            if let Some(data) = obj.try_borrow() {
                data.trace(&mut |child| {
                    if let Some(&j) = index.get(&child.id())
                        && !marked.get(j).copied().unwrap_or(true)
                    {
                        stack.push(j);
                    }
                });
            }
        }

        // Clear unreachable objects. Their slots are dropped after every
        // borrow is released; the objects themselves go when `live` does.
        let mut garbage: Vec<ObjectData> = Vec::new();
        for (i, obj) in live.iter().enumerate() {
            if marked.get(i).copied().unwrap_or(true) {
                continue;
            }
            if let Some(mut data) = obj.try_borrow_mut() {
                garbage.push(std::mem::take(&mut *data));
            }
        }
        let collected = garbage.len();
        drop(garbage);
        drop(live);

        self.last_collected.set(collected);
        let stats = self.stats();
        debug!("gc: collected {} objects, {} live", collected, stats.live_objects);
        stats
    }

    /// Clear the slots of every live object. Used at runtime teardown, where
    /// nothing is reachable any more regardless of outstanding handles.
    pub fn clear_all(&self) -> usize {
        let live: Vec<Object> = {
            let mut objects = self.objects.borrow_mut();
            objects.retain(|w| w.strong_count() > 0);
            objects
                .iter()
                .filter_map(|w| w.upgrade().map(Object::from_cell))
                .collect()
        };
        let mut garbage: Vec<ObjectData> = Vec::new();
        for obj in &live {
            if let Some(mut data) = obj.try_borrow_mut() {
                garbage.push(std::mem::take(&mut *data));
            }
        }
        let cleared = garbage.len();
        drop(garbage);
        drop(live);
        debug!("heap teardown: cleared {} objects", cleared);
        cleared
    }
}
