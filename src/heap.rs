//! # Object heap: reference counting + mark-and-sweep collector
//!
//! Every `Str`/`Struct`/`Fn` value holds a handle into this heap rather than
//! owning its payload directly, so that multiple registers/locals can share
//! one allocation. Reclamation runs on two tracks: eager reference counting
//! (`ObjBox::ref_inc`/`ref_dec`, driven by `Value::value_ref`/`value_deref`)
//! frees the common case the moment the last handle disappears, and an
//! optional mark-and-sweep pass (gated by [`VmConfig::gc_enabled`]) reclaims
//! reference cycles RC alone can never reach — a cycle's members keep each
//! other's `rc` above zero forever, so sweeping only needs "is this object
//! unreachable from any live frame", not "is its count zero".
//!
//! `Heap` keeps a flat registry of every collectible allocation
//! ([`GcEntry`]) alongside the byte-size accounting that decides when to
//! run a pass. A collection unmarks the whole registry, asks the caller to
//! mark every object reachable from the live frame chain, then sweeps:
//! anything still unmarked is unreachable, gets its own contained values
//! severed (breaking whatever cycle kept it alive), and is dropped from the
//! registry. Raw constant-pool byte buffers ([`DataBuf`]) are a second,
//! uncollected pool — tracked only for heap-size accounting, never swept.

use std::cell::RefCell;
use std::rc::Rc;

use crate::function::FnValue;
use crate::structs::StructObj;
use crate::value::Value;

/// Process-wide knobs for the heap, carried once by [`crate::vm::ThreadLocal`].
#[derive(Clone, Debug)]
pub struct VmConfig {
    /// When `false`, only eager refcount drops reclaim memory; cyclic
    /// garbage is never collected. When `true`, a mark-sweep pass also
    /// runs once `heap_size` exceeds `heap_threshold`.
    pub gc_enabled: bool,
    pub initial_heap_threshold: usize,
    pub heap_threshold_growth: f64,
    /// Stack-overflow guard budget, compared against the frame chain's
    /// address delta from `ThreadLocal::stack_start`.
    pub stack_max_bytes: usize,
    pub dispatch: DispatchStrategy,
}

/// Selects which dispatch-loop mechanism the VM uses. Both strategies
/// share the same per-opcode handler bodies; see `vm::mod`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchStrategy {
    Switch,
    Table,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            gc_enabled: true,
            initial_heap_threshold: 1_000_000,
            heap_threshold_growth: 1.5,
            stack_max_bytes: 8 * 1024 * 1024,
            dispatch: if cfg!(feature = "dispatch_table") {
                DispatchStrategy::Table
            } else {
                DispatchStrategy::Switch
            },
        }
    }
}

/// Header shared by every collectible heap object.
pub struct ObjHeader {
    pub rc: u32,
    pub marked: bool,
}

impl ObjHeader {
    fn new() -> Self {
        ObjHeader {
            rc: 1,
            marked: false,
        }
    }
}

/// A collectible allocation: header plus an `Rc<RefCell<T>>` payload so
/// callers can mutate through a shared handle, while still exposing the
/// raw header the collector needs to mark and sweep.
pub struct ObjBox<T> {
    pub header: RefCell<ObjHeader>,
    pub payload: RefCell<T>,
}

impl<T> ObjBox<T> {
    pub fn new(payload: T) -> Rc<Self> {
        Rc::new(ObjBox {
            header: RefCell::new(ObjHeader::new()),
            payload: RefCell::new(payload),
        })
    }

    pub fn ref_inc(&self) {
        let mut h = self.header.borrow_mut();
        if h.rc == u32::MAX {
            panic!("refcount overflow");
        }
        h.rc += 1;
    }

    /// Decrement the refcount. Returns `true` when it reached zero, meaning
    /// the caller may treat the payload as immediately reclaimable; with GC
    /// enabled, an object that never reaches zero (because it sits in a
    /// cycle) is still reclaimed once a collection pass finds it unmarked.
    pub fn ref_dec(&self) -> bool {
        let mut h = self.header.borrow_mut();
        if h.rc != 0 {
            h.rc -= 1;
        }
        h.rc == 0
    }

    pub fn rc(&self) -> u32 {
        self.header.borrow().rc
    }

    pub fn mark(&self) {
        self.header.borrow_mut().marked = true;
    }

    pub fn unmark(&self) {
        self.header.borrow_mut().marked = false;
    }

    pub fn is_marked(&self) -> bool {
        self.header.borrow().marked
    }
}

/// A registered collectible allocation: the `Rc` handle the collector needs
/// to mark/unmark/sever it, plus the byte size it was accounted under.
pub(crate) enum GcPayload {
    Str(Rc<ObjBox<String>>),
    Struct(Rc<ObjBox<StructObj>>),
    Fn(Rc<ObjBox<FnValue>>),
}

struct GcEntry {
    size: usize,
    payload: GcPayload,
}

impl GcEntry {
    fn is_marked(&self) -> bool {
        match &self.payload {
            GcPayload::Str(o) => o.is_marked(),
            GcPayload::Struct(o) => o.is_marked(),
            GcPayload::Fn(o) => o.is_marked(),
        }
    }

    fn unmark(&self) {
        match &self.payload {
            GcPayload::Str(o) => o.unmark(),
            GcPayload::Struct(o) => o.unmark(),
            GcPayload::Fn(o) => o.unmark(),
        }
    }

    /// Clear whatever `Value`s this object owns, dereferencing each one on
    /// the way out. Only called on an object the sweep just found
    /// unreachable: if it's part of a reference cycle, this is what
    /// actually breaks the cycle, since nothing else will ever drop these
    /// handles otherwise.
    fn sever(&self) {
        match &self.payload {
            GcPayload::Struct(o) => match &mut *o.payload.borrow_mut() {
                StructObj::Array(a) => {
                    for v in a.items.drain(..) {
                        v.value_deref();
                    }
                }
                StructObj::Tuple(t) => {
                    for v in t.items.drain(..) {
                        v.value_deref();
                    }
                }
                StructObj::Class(c) => {
                    for v in c.fields.drain(..) {
                        v.value_deref();
                    }
                }
            },
            GcPayload::Fn(o) => {
                for v in o.payload.borrow_mut().bound_args.drain(..) {
                    v.value_deref();
                }
            }
            GcPayload::Str(_) => {}
        }
    }
}

/// Mark `v`'s heap handle (if it has one) and recurse into whatever it
/// contains. Checks `is_marked` before recursing so a cycle terminates the
/// walk instead of looping forever.
pub(crate) fn mark_value(v: &Value) {
    match v {
        Value::Str(o) => o.mark(),
        Value::Struct(o) => mark_struct_obj(o),
        Value::Fn(o) => {
            if o.is_marked() {
                return;
            }
            o.mark();
            for a in &o.payload.borrow().bound_args {
                mark_value(a);
            }
        }
        _ => {}
    }
}

/// Like [`mark_value`], for a struct handle held outside a `Value` (a
/// frame's bound `self` receiver).
pub(crate) fn mark_struct_obj(o: &Rc<ObjBox<StructObj>>) {
    if o.is_marked() {
        return;
    }
    o.mark();
    match &*o.payload.borrow() {
        StructObj::Array(a) => {
            for it in &a.items {
                mark_value(it);
            }
        }
        StructObj::Tuple(t) => {
            for it in &t.items {
                mark_value(it);
            }
        }
        StructObj::Class(c) => {
            for it in &c.fields {
                mark_value(it);
            }
        }
    }
}

/// Per-thread heap bookkeeping: the object registry the collector sweeps,
/// plus the byte-size accounting that decides when to run it.
pub struct Heap {
    config: VmConfig,
    heap_size: usize,
    heap_threshold: usize,
    collections: u64,
    objects: Vec<GcEntry>,
}

impl Heap {
    pub fn new(config: VmConfig) -> Self {
        let heap_threshold = config.initial_heap_threshold;
        Heap {
            config,
            heap_size: 0,
            heap_threshold,
            collections: 0,
            objects: Vec::new(),
        }
    }

    pub fn heap_size(&self) -> usize {
        self.heap_size
    }

    pub fn collections(&self) -> u64 {
        self.collections
    }

    /// Number of collectible objects currently tracked by the registry.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Register a freshly-created collectible object and account its size,
    /// possibly triggering a collection pass.
    pub(crate) fn register_and_account(
        &mut self,
        payload: GcPayload,
        size: usize,
        mark_roots: impl FnOnce(),
    ) {
        self.objects.push(GcEntry { size, payload });
        self.account_alloc(size, mark_roots);
    }

    /// Record `size` additional bytes as allocated against an
    /// already-registered object (e.g. an array growing by one element)
    /// and run a collection pass through `mark_roots` if the new total
    /// crosses the threshold. `mark_roots` must mark every object
    /// reachable from the live frame chain; the sweep itself is internal.
    pub(crate) fn account_alloc(&mut self, size: usize, mark_roots: impl FnOnce()) {
        self.heap_size += size;
        if !self.config.gc_enabled {
            return;
        }
        if self.heap_size > self.heap_threshold {
            self.collect(mark_roots);
            if self.heap_size > self.heap_threshold {
                self.heap_threshold =
                    (self.heap_threshold as f64 * self.config.heap_threshold_growth) as usize;
            }
        }
    }

    pub fn account_free(&mut self, size: usize) {
        self.heap_size = self.heap_size.saturating_sub(size);
    }

    fn collect(&mut self, mark_roots: impl FnOnce()) {
        log::debug!(
            "gc: collecting, heap_size={} threshold={} objects={}",
            self.heap_size,
            self.heap_threshold,
            self.objects.len()
        );
        for e in &self.objects {
            e.unmark();
        }
        mark_roots();
        let freed = self.sweep();
        self.collections += 1;
        log::debug!(
            "gc: collection #{} swept {} objects, heap now {} bytes, {} objects live",
            self.collections,
            freed,
            self.heap_size,
            self.objects.len()
        );
    }

    /// Drop every unmarked entry, severing its contents first so a
    /// reference cycle can't keep it alive through Rust's own `Rc`. Returns
    /// how many objects were reclaimed.
    fn sweep(&mut self) -> usize {
        let before = self.objects.len();
        let mut freed_bytes = 0usize;
        self.objects.retain(|e| {
            if e.is_marked() {
                true
            } else {
                e.sever();
                freed_bytes += e.size;
                false
            }
        });
        self.heap_size = self.heap_size.saturating_sub(freed_bytes);
        before - self.objects.len()
    }
}

/// A data-pool allocation: an untyped byte buffer, not collectible,
/// tracked only for heap-size accounting. Used for the program's
/// constant-pool string bytes.
pub type DataBuf = Rc<Vec<u8>>;
