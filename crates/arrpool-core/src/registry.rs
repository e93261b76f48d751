//! Arena registry: per-type dispatch and the checkpoint/rewind state machine.
//!
//! A registry owns one [`TypedArena`] per fixed element type, a fallback map
//! for every other type, the global scope depth and one untracked-use flag
//! per open depth.
//!
//! # Depth and checkpoints
//!
//! Depth 1 is the root. [`ArenaRegistry::checkpoint`] opens depth `d + 1` and
//! records every arena's counter there; [`ArenaRegistry::checkpoint_types`]
//! records only the named arenas. [`ArenaRegistry::rewind`] closes the
//! innermost depth. For each arena it touches it drops orphan entries deeper
//! than the closing depth, then either pops the entry recorded at that depth
//! or, if the arena was not part of the checkpoint, restores the nearest
//! enclosing value without popping.
//!
//! Checkpoints and rewinds must pair up in LIFO order. A rewind at the root
//! degrades to a reset; any other mismatch is a caller bug and restores
//! whatever the stacks happen to hold. The closure helpers in
//! [`crate::scope`] pair them automatically.

use std::any::TypeId;
use std::collections::HashMap;

use tracing::{debug, trace, warn};

use crate::arena::{ArenaOps, TypedArena};
use crate::array::{ArrayViewMut, PooledArray, Shaped};
use crate::backend::{Backend, CpuBackend, DeviceId};
use crate::checkpoint::Checkpoint;
use crate::config::PoolConfig;
use crate::constants::ROOT_DEPTH;
use crate::element::{Element, FixedKind, TypeKey};
use crate::error::PoolError;
use crate::escape::MemoryRegions;
use crate::layout::{checked_len, INLINE_RANK};
use crate::stats::ArenaStats;

type DynArena = dyn ArenaOps;

/// The lookup-free arenas, one field per [`FixedKind`].
#[derive(Debug)]
pub struct FixedArenas {
    pub(crate) f64: TypedArena<f64>,
    pub(crate) f32: TypedArena<f32>,
    pub(crate) i64: TypedArena<i64>,
    pub(crate) i32: TypedArena<i32>,
    pub(crate) u8: TypedArena<u8>,
    pub(crate) bool: TypedArena<bool>,
}

impl FixedArenas {
    fn new(ways: usize, growth_warn_slots: usize) -> Self {
        Self {
            f64: TypedArena::new(ways, growth_warn_slots),
            f32: TypedArena::new(ways, growth_warn_slots),
            i64: TypedArena::new(ways, growth_warn_slots),
            i32: TypedArena::new(ways, growth_warn_slots),
            u8: TypedArena::new(ways, growth_warn_slots),
            bool: TypedArena::new(ways, growth_warn_slots),
        }
    }

    fn get(&self, kind: FixedKind) -> &DynArena {
        match kind {
            FixedKind::F64 => &self.f64,
            FixedKind::F32 => &self.f32,
            FixedKind::I64 => &self.i64,
            FixedKind::I32 => &self.i32,
            FixedKind::U8 => &self.u8,
            FixedKind::Bool => &self.bool,
        }
    }

    fn get_mut(&mut self, kind: FixedKind) -> &mut DynArena {
        match kind {
            FixedKind::F64 => &mut self.f64,
            FixedKind::F32 => &mut self.f32,
            FixedKind::I64 => &mut self.i64,
            FixedKind::I32 => &mut self.i32,
            FixedKind::U8 => &mut self.u8,
            FixedKind::Bool => &mut self.bool,
        }
    }

    fn iter(&self) -> impl Iterator<Item = &DynArena> {
        FixedKind::ALL.into_iter().map(|kind| self.get(kind))
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut DynArena> {
        let arenas: [&mut DynArena; 6] = [
            &mut self.f64,
            &mut self.f32,
            &mut self.i64,
            &mut self.i32,
            &mut self.u8,
            &mut self.bool,
        ];
        arenas.into_iter()
    }
}

/// Every arena of a registry: the fixed fields plus the fallback map.
pub struct ArenaSet {
    fixed: FixedArenas,
    fallback: HashMap<TypeId, Box<DynArena>>,
    ways: usize,
    growth_warn_slots: usize,
}

impl ArenaSet {
    pub(crate) fn new(config: &PoolConfig) -> Self {
        Self {
            fixed: FixedArenas::new(config.cache_ways, config.growth_warn_slots),
            fallback: HashMap::new(),
            ways: config.cache_ways,
            growth_warn_slots: config.growth_warn_slots,
        }
    }

    /// The arena for `T`.
    ///
    /// Types listed in `kinds` resolve to their fixed field. Any other type is
    /// looked up in the fallback map and created on first use; an arena
    /// created while `depth` is above the root is seeded with an entry at
    /// `depth` so the rewind closing that depth finds one.
    pub fn resolve<T: Element>(&mut self, kinds: &[FixedKind], depth: usize) -> &mut TypedArena<T> {
        if T::FIXED.is_some_and(|kind| kinds.contains(&kind)) {
            if let Some(arena) = T::fixed_arena(&mut self.fixed) {
                return arena;
            }
        }
        fallback_arena::<T>(
            &mut self.fallback,
            self.ways,
            self.growth_warn_slots,
            depth,
        )
    }

    fn get<T: Element>(&self, kinds: &[FixedKind]) -> Option<&TypedArena<T>> {
        if T::FIXED.is_some_and(|kind| kinds.contains(&kind)) {
            return T::fixed_arena_ref(&self.fixed);
        }
        self.fallback
            .get(&TypeId::of::<T>())
            .and_then(|arena| arena.as_any().downcast_ref())
    }

    fn get_key_mut(&mut self, key: TypeKey, kinds: &[FixedKind]) -> Option<&mut DynArena> {
        match FixedKind::from_type_id(key.id()).filter(|kind| kinds.contains(kind)) {
            Some(kind) => Some(self.fixed.get_mut(kind)),
            None => self.fallback.get_mut(&key.id()).map(|arena| &mut **arena),
        }
    }

    fn iter(&self) -> impl Iterator<Item = &DynArena> {
        self.fixed
            .iter()
            .chain(self.fallback.values().map(|arena| &**arena))
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut DynArena> {
        self.fixed
            .iter_mut()
            .chain(self.fallback.values_mut().map(|arena| &mut **arena))
    }
}

fn fallback_arena<T: Element>(
    map: &mut HashMap<TypeId, Box<DynArena>>,
    ways: usize,
    growth_warn_slots: usize,
    depth: usize,
) -> &mut TypedArena<T> {
    let arena = map.entry(TypeId::of::<T>()).or_insert_with(|| {
        let mut arena = TypedArena::<T>::new(ways, growth_warn_slots);
        if depth > ROOT_DEPTH {
            arena.checkpoint(depth);
            debug!(
                element = std::any::type_name::<T>(),
                depth, "Seeded new fallback arena inside an open scope"
            );
        }
        Box::new(arena) as Box<DynArena>
    });
    arena
        .as_any_mut()
        .downcast_mut()
        .expect("fallback arenas are keyed by their element TypeId")
}

/// The pool: arenas for every element type plus the scope state machine.
pub struct ArenaRegistry<B: Backend = CpuBackend> {
    backend: B,
    config: PoolConfig,
    device: DeviceId,
    arenas: ArenaSet,
    pub(crate) depth: usize,
    /// `untracked[d - 1]` is the flag for depth `d`.
    untracked: Vec<bool>,
    /// Types covered by the open typed scopes, innermost last. Each scope
    /// owns the tail starting at the offset it was opened with.
    scope_keys: Vec<TypeKey>,
}

impl ArenaRegistry<CpuBackend> {
    /// Host registry with default settings.
    #[must_use]
    pub fn new() -> Self {
        let config = PoolConfig::default();
        Self::build(CpuBackend, config)
    }

    /// Host registry with `config`.
    pub fn with_config(config: PoolConfig) -> Result<Self, PoolError> {
        Self::with_backend(CpuBackend, config)
    }
}

impl Default for ArenaRegistry<CpuBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> ArenaRegistry<B> {
    /// Registry for `backend`, tagged with the backend's current device.
    pub fn with_backend(backend: B, config: PoolConfig) -> Result<Self, PoolError> {
        let config = config.normalize().validate()?;
        Ok(Self::build(backend, config))
    }

    fn build(backend: B, config: PoolConfig) -> Self {
        let device = backend.device();
        debug!(
            backend = B::NAME,
            device = device.0,
            enabled = config.enabled,
            cache_ways = config.cache_ways,
            "Created arena registry"
        );
        Self {
            arenas: ArenaSet::new(&config),
            backend,
            config,
            device,
            depth: ROOT_DEPTH,
            untracked: vec![false],
            scope_keys: Vec::new(),
        }
    }

    // ── Acquisition ──

    /// A view of shape `dims`, marking the current depth as untracked.
    ///
    /// With pooling disabled this is an ordinary allocation.
    pub fn acquire_view<T: Element>(
        &mut self,
        dims: &[usize],
    ) -> Result<ArrayViewMut<'_, T>, PoolError> {
        self.mark_untracked();
        self.claim_view(dims)
    }

    /// An N-D array of shape `dims` with a cached layout header, marking the
    /// current depth as untracked.
    pub fn acquire_owned<T: Element>(
        &mut self,
        dims: &[usize],
    ) -> Result<PooledArray<'_, T>, PoolError> {
        self.mark_untracked();
        self.claim_array(dims)
    }

    /// A view filled with `T::default()`.
    pub fn zeros<T: Element>(&mut self, dims: &[usize]) -> Result<ArrayViewMut<'_, T>, PoolError> {
        self.filled(dims, T::default())
    }

    /// A view filled with `value`.
    pub fn filled<T: Element>(
        &mut self,
        dims: &[usize],
        value: T,
    ) -> Result<ArrayViewMut<'_, T>, PoolError> {
        let mut view = self.acquire_view(dims)?;
        view.fill(value);
        Ok(view)
    }

    /// A view with the element type and shape of `like`.
    pub fn similar<A: Shaped>(&mut self, like: &A) -> Result<ArrayViewMut<'_, A::Elem>, PoolError> {
        self.acquire_view(like.dims())
    }

    /// Unmarked view acquisition.
    pub(crate) fn claim_view<T: Element>(
        &mut self,
        dims: &[usize],
    ) -> Result<ArrayViewMut<'_, T>, PoolError> {
        if !self.config.enabled {
            return ArrayViewMut::direct(dims);
        }
        let len = checked_len::<T>(dims)?;
        let depth = self.depth;
        let arena = self.backend.typed_arena::<T>(&mut self.arenas, depth);
        if B::VIEWS_ALLOCATE {
            let (data, layout) = arena.acquire_array(&self.backend, dims)?;
            return Ok(ArrayViewMut::shared(data, layout));
        }
        if dims.len() > INLINE_RANK {
            let (data, layout) = arena.acquire_wide_view(&self.backend, dims)?;
            return Ok(ArrayViewMut::shared(data, layout));
        }
        let data = arena.acquire_view(&self.backend, len);
        Ok(ArrayViewMut::pooled(data, dims))
    }

    /// Unmarked array acquisition.
    pub(crate) fn claim_array<T: Element>(
        &mut self,
        dims: &[usize],
    ) -> Result<PooledArray<'_, T>, PoolError> {
        if !self.config.enabled {
            return PooledArray::direct(dims);
        }
        let depth = self.depth;
        let arena = self.backend.typed_arena::<T>(&mut self.arenas, depth);
        let (data, layout) = arena.acquire_array(&self.backend, dims)?;
        Ok(PooledArray::pooled(data, layout))
    }

    /// Pre-create the next `count` slots of `T` with at least `len` elements.
    pub fn warm<T: Element>(&mut self, count: usize, len: usize) {
        if !self.config.enabled {
            return;
        }
        let depth = self.depth;
        self.backend
            .typed_arena::<T>(&mut self.arenas, depth)
            .warm(&self.backend, count, len);
    }

    /// Record `T`'s counter at the current depth unless already recorded.
    pub(crate) fn enroll<T: Element>(&mut self) -> bool {
        let depth = self.depth;
        self.backend.typed_arena::<T>(&mut self.arenas, depth).ensure(depth)
    }

    pub(crate) fn mark_untracked(&mut self) {
        if let Some(flag) = self.untracked.last_mut() {
            *flag = true;
        }
    }

    // ── Scope state machine ──

    /// Open a depth covering every arena.
    pub fn checkpoint(&mut self) {
        self.open_depth();
        let depth = self.depth;
        for arena in self.arenas.iter_mut() {
            arena.checkpoint(depth);
        }
        trace!(depth, "Checkpoint");
    }

    /// Open a depth covering only the arenas of `types`.
    ///
    /// Fallback types without an arena yet are skipped; if one is created
    /// before the depth closes it is seeded at creation.
    pub fn checkpoint_types(&mut self, types: &[TypeKey]) {
        self.open_depth();
        let depth = self.depth;
        for key in types {
            if let Some(arena) = self.arenas.get_key_mut(*key, B::FIXED_KINDS) {
                arena.checkpoint(depth);
            }
        }
        trace!(depth, ?types, "Typed checkpoint");
    }

    /// Close the innermost depth for every arena.
    ///
    /// At the root there is nothing to close and the whole registry is reset.
    pub fn rewind(&mut self) {
        if self.depth == ROOT_DEPTH {
            warn!("Rewind at root depth; resetting every arena");
            self.reset();
            return;
        }
        let depth = self.depth;
        for arena in self.arenas.iter_mut() {
            arena.rewind(depth);
        }
        self.close_depth();
        trace!(depth, "Rewind");
    }

    /// Close the innermost depth for the arenas of `types` only.
    ///
    /// At the root the named arenas are reset instead.
    pub fn rewind_types(&mut self, types: &[TypeKey]) {
        if self.depth == ROOT_DEPTH {
            warn!(?types, "Typed rewind at root depth; resetting named arenas");
            for key in types {
                if let Some(arena) = self.arenas.get_key_mut(*key, B::FIXED_KINDS) {
                    arena.reset();
                }
            }
            return;
        }
        let depth = self.depth;
        for key in types {
            if let Some(arena) = self.arenas.get_key_mut(*key, B::FIXED_KINDS) {
                arena.rewind(depth);
            }
        }
        self.close_depth();
        trace!(depth, ?types, "Typed rewind");
    }

    fn open_depth(&mut self) {
        self.depth += 1;
        self.untracked.push(false);
    }

    fn close_depth(&mut self) {
        self.untracked.pop();
        self.depth -= 1;
    }

    /// Back to the root: counters zeroed, checkpoints dropped, buffers kept.
    pub fn reset(&mut self) {
        for arena in self.arenas.iter_mut() {
            arena.reset();
        }
        self.collapse();
        debug!("Reset arena registry");
    }

    /// Reset and release every buffer.
    ///
    /// Every view and array handed out earlier is invalid afterwards; the
    /// borrow checker already guarantees none is still alive.
    pub fn clear(&mut self) {
        for arena in self.arenas.iter_mut() {
            arena.clear();
        }
        self.collapse();
        debug!("Cleared arena registry");
    }

    fn collapse(&mut self) {
        self.depth = ROOT_DEPTH;
        self.untracked.clear();
        self.untracked.push(false);
        self.scope_keys.clear();
    }

    /// Open a typed depth and return the offset of its keys.
    pub(crate) fn open_typed_scope(&mut self, types: &[TypeKey]) -> usize {
        let start = self.scope_keys.len();
        self.scope_keys.extend_from_slice(types);
        self.checkpoint_types(types);
        start
    }

    /// Add `key` to the typed scope whose keys start at `start`. Returns
    /// whether it was missing.
    pub(crate) fn cover_type(&mut self, start: usize, key: TypeKey) -> bool {
        if self.scope_keys.get(start..).unwrap_or_default().contains(&key) {
            return false;
        }
        self.scope_keys.push(key);
        true
    }

    /// Rewind the typed scope whose keys start at `start` and drop its keys.
    pub(crate) fn close_typed_scope(&mut self, start: usize) {
        let mut keys = std::mem::take(&mut self.scope_keys);
        self.rewind_types(keys.get(start..).unwrap_or_default());
        keys.truncate(start);
        self.scope_keys = keys;
    }

    /// Reset the arena of `T` alone.
    pub fn reset_type<T: Element>(&mut self) {
        if let Some(arena) = self.arenas.get_key_mut(TypeKey::of::<T>(), B::FIXED_KINDS) {
            arena.reset();
        }
    }

    /// Clear the arena of `T` alone.
    pub fn clear_type<T: Element>(&mut self) {
        if let Some(arena) = self.arenas.get_key_mut(TypeKey::of::<T>(), B::FIXED_KINDS) {
            arena.clear();
        }
    }

    // ── Introspection ──

    /// Current depth; 1 is the root.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether the current depth served a request through a marking entry
    /// point.
    #[must_use]
    pub fn has_untracked_use(&self) -> bool {
        self.untracked.last().copied().unwrap_or(false)
    }

    /// Slots of `T` currently checked out.
    #[must_use]
    pub fn n_active<T: Element>(&self) -> usize {
        self.arenas
            .get::<T>(B::FIXED_KINDS)
            .map_or(0, TypedArena::n_active)
    }

    /// Slots of `T` ever created and not cleared.
    #[must_use]
    pub fn slot_count<T: Element>(&self) -> usize {
        self.arenas
            .get::<T>(B::FIXED_KINDS)
            .map_or(0, TypedArena::slot_count)
    }

    /// Checkpoint entries of `T`'s arena, sentinel first; `None` if the
    /// arena does not exist yet.
    #[must_use]
    pub fn checkpoint_stack<T: Element>(&self) -> Option<&[Checkpoint]> {
        self.arenas
            .get::<T>(B::FIXED_KINDS)
            .map(|arena| arena.checkpoints().entries())
    }

    /// The arena of `T`, if it exists.
    #[must_use]
    pub fn arena<T: Element>(&self) -> Option<&TypedArena<T>> {
        self.arenas.get::<T>(B::FIXED_KINDS)
    }

    /// Counters summed over every arena.
    #[must_use]
    pub fn stats(&self) -> ArenaStats {
        self.arenas
            .iter()
            .map(|arena| arena.stats())
            .fold(ArenaStats::default(), |total, stats| total + stats)
    }

    /// Counters of `T`'s arena.
    #[must_use]
    pub fn stats_for<T: Element>(&self) -> ArenaStats {
        self.arenas
            .get::<T>(B::FIXED_KINDS)
            .map(TypedArena::stats)
            .unwrap_or_default()
    }

    /// Zero every arena's counters.
    pub fn reset_stats(&mut self) {
        for arena in self.arenas.iter_mut() {
            arena.reset_stats();
        }
    }

    /// Bytes held by backing buffers across every arena.
    #[must_use]
    pub fn memory_bytes(&self) -> usize {
        self.arenas.iter().map(|arena| arena.memory_bytes()).sum()
    }

    /// Device the registry was created on.
    #[must_use]
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Settings the registry was built with.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// The backend serving this registry.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    // ── Escape validation ──

    /// Fail if any memory reachable from `value` overlaps a backing buffer.
    ///
    /// Only the regions `value` reports are checked. Memory smuggled out
    /// through a closure or side channel goes unnoticed.
    pub fn validate_escape<V: MemoryRegions + ?Sized>(&self, value: &V) -> Result<(), PoolError> {
        let mut regions = Vec::new();
        value.collect_regions(&mut regions);
        for region in regions {
            for arena in self.arenas.iter() {
                if let Some(slot) = arena.find_overlap(region) {
                    return Err(PoolError::EscapeViolation {
                        type_name: arena.element_name(),
                        slot,
                        depth: self.depth,
                    });
                }
            }
        }
        Ok(())
    }
}

impl<B: Backend> std::fmt::Debug for ArenaRegistry<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArenaRegistry")
            .field("backend", &B::NAME)
            .field("device", &self.device)
            .field("depth", &self.depth)
            .field("arenas", &self.arenas.iter().count())
            .finish_non_exhaustive()
    }
}
