//! Typed arena: reusable backing buffers for one element type.
//!
//! Slots are handed out in acquisition order. The active-use counter says how
//! many are checked out; restoring it on rewind is all it takes to make the
//! same buffers available again. Buffers grow by replacement and are only
//! released by [`TypedArena::clear`].

use std::any::Any;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::Backend;
use crate::checkpoint::CheckpointStack;
use crate::element::Element;
use crate::error::PoolError;
use crate::escape::Region;
use crate::layout::{checked_len, ArrayLayout};
use crate::nd_cache::NdCacheSet;
use crate::stats::ArenaStats;

/// One backing buffer with its cached views.
#[derive(Debug)]
struct Slot<T> {
    buffer: Vec<T>,
    /// Length of the most recent 1-D view cut from `buffer`.
    view_len: usize,
    /// Shape of the most recent view too wide to store inline.
    view_shape: Option<Arc<ArrayLayout>>,
    cache: NdCacheSet,
}

/// Backing buffers, caches and checkpoint stack for element type `T`.
#[derive(Debug)]
pub struct TypedArena<T: Element> {
    slots: Vec<Slot<T>>,
    n_active: usize,
    checkpoints: CheckpointStack,
    ways: usize,
    growth_warn_slots: usize,
    stats: ArenaStats,
}

impl<T: Element> TypedArena<T> {
    /// Empty arena whose slots carry `ways`-way N-D caches.
    #[must_use]
    pub fn new(ways: usize, growth_warn_slots: usize) -> Self {
        Self {
            slots: Vec::new(),
            n_active: 0,
            checkpoints: CheckpointStack::new(),
            ways: ways.max(1),
            growth_warn_slots,
            stats: ArenaStats::default(),
        }
    }

    /// Check out the next slot with a view of `len` elements and return its
    /// zero-based index.
    ///
    /// A new slot is appended when every existing one is in use. An existing
    /// slot whose last view had the same length is a cache hit; otherwise the
    /// view is re-cut, replacing the buffer first if it is too short.
    pub(crate) fn claim<B: Backend>(&mut self, backend: &B, len: usize) -> usize {
        let idx = self.n_active;
        self.n_active += 1;

        if idx == self.slots.len() {
            self.slots.push(Slot {
                buffer: backend.allocate_buffer::<T>(len),
                view_len: len,
                view_shape: None,
                cache: NdCacheSet::new(self.ways),
            });
            self.stats.record_buffer();
            self.note_growth();
            return idx;
        }

        let slot = &mut self.slots[idx];
        if slot.view_len == len {
            self.stats.record_view(true);
            return idx;
        }
        if slot.buffer.len() < len {
            debug!(
                element = std::any::type_name::<T>(),
                slot = idx,
                from = slot.buffer.len(),
                to = len,
                "Growing slot buffer"
            );
            slot.buffer = backend.allocate_buffer::<T>(len);
            self.stats.record_grow();
        }
        slot.view_len = len;
        self.stats.record_view(false);
        idx
    }

    /// Check out the next slot as a flat view of `len` elements.
    pub fn acquire_view<B: Backend>(&mut self, backend: &B, len: usize) -> &mut [T] {
        let idx = self.claim(backend, len);
        &mut self.slots[idx].buffer[..len]
    }

    /// Check out the next slot as a view of shape `dims` whose rank is too
    /// high for an inline shape.
    ///
    /// The slot keeps the header of its last such view and hands it out again
    /// while the dims match, so a repeated request builds nothing.
    pub fn acquire_wide_view<B: Backend>(
        &mut self,
        backend: &B,
        dims: &[usize],
    ) -> Result<(&mut [T], Arc<ArrayLayout>), PoolError> {
        let len = checked_len::<T>(dims)?;
        let idx = self.claim(backend, len);
        let slot = &mut self.slots[idx];

        let cached = slot
            .view_shape
            .as_ref()
            .filter(|layout| layout.dims() == dims)
            .map(Arc::clone);
        let layout = if let Some(layout) = cached {
            self.stats.record_wrapper(true);
            layout
        } else {
            let layout = backend.wrap_as_ndarray(&slot.buffer[..len], dims);
            slot.view_shape = Some(Arc::clone(&layout));
            self.stats.record_wrapper(false);
            layout
        };
        Ok((&mut slot.buffer[..len], layout))
    }

    /// Check out the next slot as an N-D array of shape `dims`.
    ///
    /// The layout header comes from the slot's N-way cache when one was built
    /// for the same dims over the same buffer; otherwise the backend wraps a
    /// new one, which replaces the way under the slot's cursor.
    pub fn acquire_array<B: Backend>(
        &mut self,
        backend: &B,
        dims: &[usize],
    ) -> Result<(&mut [T], Arc<ArrayLayout>), PoolError> {
        let len = checked_len::<T>(dims)?;
        let idx = self.claim(backend, len);
        let slot = &mut self.slots[idx];
        let tag = slot.buffer.as_ptr() as usize;

        let layout = if let Some(layout) = slot.cache.lookup(dims, tag) {
            self.stats.record_wrapper(true);
            layout
        } else {
            let layout = backend.wrap_as_ndarray(&slot.buffer[..len], dims);
            slot.cache.insert(tag, Arc::clone(&layout));
            self.stats.record_wrapper(false);
            layout
        };
        Ok((&mut slot.buffer[..len], layout))
    }

    /// Make sure the next `count` slots exist with at least `len` elements,
    /// without checking any of them out.
    pub fn warm<B: Backend>(&mut self, backend: &B, count: usize, len: usize) {
        for idx in self.n_active..self.n_active + count {
            if let Some(slot) = self.slots.get_mut(idx) {
                if slot.buffer.len() < len {
                    slot.buffer = backend.allocate_buffer::<T>(len);
                    self.stats.record_grow();
                }
            } else {
                self.slots.push(Slot {
                    buffer: backend.allocate_buffer::<T>(len),
                    view_len: len,
                    view_shape: None,
                    cache: NdCacheSet::new(self.ways),
                });
                self.stats.record_buffer();
                self.note_growth();
            }
        }
    }

    /// Slots currently checked out.
    #[must_use]
    pub fn n_active(&self) -> usize {
        self.n_active
    }

    /// Slots ever created and not cleared.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Length of the buffer behind slot `idx`.
    #[must_use]
    pub fn buffer_len(&self, idx: usize) -> Option<usize> {
        self.slots.get(idx).map(|slot| slot.buffer.len())
    }

    /// Occupied N-D cache ways of slot `idx`.
    #[must_use]
    pub fn cached_layouts(&self, idx: usize) -> usize {
        self.slots.get(idx).map_or(0, |slot| slot.cache.occupied())
    }

    /// Saved counters, sentinel first.
    #[must_use]
    pub fn checkpoints(&self) -> &CheckpointStack {
        &self.checkpoints
    }

    /// Counters for this arena.
    #[must_use]
    pub fn stats(&self) -> ArenaStats {
        self.stats
    }

    /// Record the counter at `depth`.
    pub fn checkpoint(&mut self, depth: usize) {
        self.checkpoints.push(self.n_active, depth);
    }

    /// Record the counter at `depth` unless an entry for it already exists.
    pub fn ensure(&mut self, depth: usize) -> bool {
        self.checkpoints.ensure(self.n_active, depth)
    }

    /// Restore the counter saved for `depth`, or the nearest enclosing one.
    pub fn rewind(&mut self, depth: usize) {
        let restore = self.checkpoints.restore(depth);
        if restore.orphans > 0 {
            debug!(
                element = std::any::type_name::<T>(),
                depth,
                orphans = restore.orphans,
                "Discarded orphan checkpoints"
            );
        }
        debug_assert!(restore.active <= self.slots.len());
        self.n_active = restore.active;
    }

    /// Zero the counter and drop every checkpoint. Buffers are kept.
    pub fn reset(&mut self) {
        self.n_active = 0;
        self.checkpoints.reset();
    }

    /// Reset, then release every buffer and cached header.
    pub fn clear(&mut self) {
        self.reset();
        self.slots = Vec::new();
    }

    fn note_growth(&self) {
        let slots = self.slots.len();
        if !slots.is_power_of_two() {
            return;
        }
        if slots >= self.growth_warn_slots {
            warn!(
                element = std::any::type_name::<T>(),
                slots,
                "Arena keeps growing; a scope may be missing its rewind"
            );
        } else {
            debug!(element = std::any::type_name::<T>(), slots, "Arena grew");
        }
    }
}

/// Type-erased arena operations, for walking every arena of a registry.
pub trait ArenaOps: Send {
    /// Element type name.
    fn element_name(&self) -> &'static str;
    /// Slots currently checked out.
    fn n_active(&self) -> usize;
    /// Slots ever created and not cleared.
    fn slot_count(&self) -> usize;
    /// See [`TypedArena::checkpoint`].
    fn checkpoint(&mut self, depth: usize);
    /// See [`TypedArena::ensure`].
    fn ensure(&mut self, depth: usize) -> bool;
    /// See [`TypedArena::rewind`].
    fn rewind(&mut self, depth: usize);
    /// See [`TypedArena::reset`].
    fn reset(&mut self);
    /// See [`TypedArena::clear`].
    fn clear(&mut self);
    /// Saved counters.
    fn checkpoints(&self) -> &CheckpointStack;
    /// Counters for this arena.
    fn stats(&self) -> ArenaStats;
    /// Zero the counters.
    fn reset_stats(&mut self);
    /// Bytes held by backing buffers.
    fn memory_bytes(&self) -> usize;
    /// Index of the first slot whose buffer overlaps `region`.
    fn find_overlap(&self, region: Region) -> Option<usize>;
    /// Downcasting support.
    fn as_any(&self) -> &dyn Any;
    /// Downcasting support.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Element> ArenaOps for TypedArena<T> {
    fn element_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn n_active(&self) -> usize {
        self.n_active
    }

    fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn checkpoint(&mut self, depth: usize) {
        TypedArena::checkpoint(self, depth);
    }

    fn ensure(&mut self, depth: usize) -> bool {
        TypedArena::ensure(self, depth)
    }

    fn rewind(&mut self, depth: usize) {
        TypedArena::rewind(self, depth);
    }

    fn reset(&mut self) {
        TypedArena::reset(self);
    }

    fn clear(&mut self) {
        TypedArena::clear(self);
    }

    fn checkpoints(&self) -> &CheckpointStack {
        &self.checkpoints
    }

    fn stats(&self) -> ArenaStats {
        self.stats
    }

    fn reset_stats(&mut self) {
        self.stats = ArenaStats::default();
    }

    fn memory_bytes(&self) -> usize {
        self.slots
            .iter()
            .map(|slot| slot.buffer.capacity() * std::mem::size_of::<T>())
            .sum()
    }

    fn find_overlap(&self, region: Region) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| Region::of_slice(&slot.buffer).overlaps(region))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
