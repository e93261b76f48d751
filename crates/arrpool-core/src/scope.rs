//! Closure-scoped acquisition.
//!
//! [`ArenaRegistry::scope`] checkpoints, runs a closure with a [`Scope`]
//! handle and rewinds when the closure returns or unwinds. Views borrow the
//! handle, so the compiler rejects any attempt to keep one past the rewind:
//!
//! ```compile_fail
//! use arrpool_core::ArenaRegistry;
//!
//! let mut registry = ArenaRegistry::new();
//! let leaked = registry.scope(|s| s.acquire_view::<f64>(&[4]).unwrap());
//! ```
//!
//! Scopes nest through the handle. A handle whose nested scope is still open
//! refuses to serve requests, which keeps opens and closes in LIFO order.

use std::cell::{RefCell, RefMut};

use tracing::{debug, warn};

use crate::array::{ArrayViewMut, PooledArray, Shaped};
use crate::backend::{Backend, CpuBackend};
use crate::element::{Element, TypeKey};
use crate::error::PoolError;
use crate::escape::MemoryRegions;
use crate::registry::ArenaRegistry;

/// Arenas a scope rewinds on exit.
enum Coverage {
    /// Every arena.
    Full,
    /// The listed types, plus any type first acquired inside the scope.
    /// They live in the registry's key stack from `start` on.
    Types { start: usize },
}

/// Handle to one open depth of a registry.
pub struct Scope<'r, B: Backend = CpuBackend> {
    registry: &'r RefCell<&'r mut ArenaRegistry<B>>,
    depth: usize,
    coverage: Coverage,
}

/// Closes its scope on drop, including during a panic.
struct RewindGuard<'s, 'r, B: Backend>(&'s Scope<'r, B>);

impl<B: Backend> Drop for RewindGuard<'_, '_, B> {
    fn drop(&mut self) {
        self.0.close();
    }
}

impl<B: Backend> ArenaRegistry<B> {
    /// Run `f` inside a scope covering every arena.
    pub fn scope<R>(&mut self, f: impl FnOnce(&Scope<'_, B>) -> R) -> R {
        self.checkpoint();
        let depth = self.depth;
        let cell = RefCell::new(&mut *self);
        let scope = Scope {
            registry: &cell,
            depth,
            coverage: Coverage::Full,
        };
        let _guard = RewindGuard(&scope);
        f(&scope)
    }

    /// Run `f` inside a scope covering the arenas of `types`.
    ///
    /// Requests for other types are still served; their arenas join the
    /// scope at first use and the depth is marked untracked.
    pub fn scope_for<R>(&mut self, types: &[TypeKey], f: impl FnOnce(&Scope<'_, B>) -> R) -> R {
        let start = self.open_typed_scope(types);
        let depth = self.depth;
        let cell = RefCell::new(&mut *self);
        let scope = Scope {
            registry: &cell,
            depth,
            coverage: Coverage::Types { start },
        };
        let _guard = RewindGuard(&scope);
        f(&scope)
    }

    /// Like [`scope`](Self::scope), but with `debug` set in the config the
    /// result is run through the escape validator before the rewind.
    pub fn scope_checked<R: MemoryRegions>(
        &mut self,
        f: impl FnOnce(&Scope<'_, B>) -> R,
    ) -> Result<R, PoolError> {
        let debug = self.config().debug;
        self.scope(|s| {
            let out = f(s);
            if debug {
                s.validate_escape(&out)?;
            }
            Ok(out)
        })
    }
}

impl<'r, B: Backend> Scope<'r, B> {
    /// Depth this scope opened.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether this is the innermost open scope.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.registry.borrow().depth == self.depth
    }

    /// A view of shape `dims`, valid until this scope closes.
    pub fn acquire_view<T: Element>(
        &self,
        dims: &[usize],
    ) -> Result<ArrayViewMut<'_, T>, PoolError> {
        let mut registry = self.enter::<T>()?;
        let view = registry.claim_view::<T>(dims)?;
        Ok(view.rebind())
    }

    /// An N-D array with a cached layout header, valid until this scope
    /// closes.
    pub fn acquire_owned<T: Element>(
        &self,
        dims: &[usize],
    ) -> Result<PooledArray<'_, T>, PoolError> {
        let mut registry = self.enter::<T>()?;
        let array = registry.claim_array::<T>(dims)?;
        Ok(array.rebind())
    }

    /// A view filled with `T::default()`.
    pub fn zeros<T: Element>(&self, dims: &[usize]) -> Result<ArrayViewMut<'_, T>, PoolError> {
        self.filled(dims, T::default())
    }

    /// A view filled with `value`.
    pub fn filled<T: Element>(
        &self,
        dims: &[usize],
        value: T,
    ) -> Result<ArrayViewMut<'_, T>, PoolError> {
        let mut view = self.acquire_view(dims)?;
        view.fill(value);
        Ok(view)
    }

    /// A view with the element type and shape of `like`.
    pub fn similar<A: Shaped>(&self, like: &A) -> Result<ArrayViewMut<'_, A::Elem>, PoolError> {
        self.acquire_view(like.dims())
    }

    /// Run `f` in a nested scope covering every arena.
    pub fn scope<R>(&self, f: impl FnOnce(&Scope<'_, B>) -> R) -> Result<R, PoolError> {
        self.nest(None, f)
    }

    /// Run `f` in a nested scope covering the arenas of `types`.
    pub fn scope_for<R>(
        &self,
        types: &[TypeKey],
        f: impl FnOnce(&Scope<'_, B>) -> R,
    ) -> Result<R, PoolError> {
        self.nest(Some(types), f)
    }

    /// Nested [`ArenaRegistry::scope_checked`].
    pub fn scope_checked<R: MemoryRegions>(
        &self,
        f: impl FnOnce(&Scope<'_, B>) -> R,
    ) -> Result<R, PoolError> {
        let debug = self.registry.borrow().config().debug;
        self.scope(|s| {
            let out = f(s);
            if debug {
                s.validate_escape(&out)?;
            }
            Ok(out)
        })?
    }

    /// Fail if `value` reports memory that overlaps a backing buffer.
    pub fn validate_escape<V: MemoryRegions + ?Sized>(&self, value: &V) -> Result<(), PoolError> {
        self.registry.borrow().validate_escape(value)
    }

    /// Slots of `T` currently checked out.
    #[must_use]
    pub fn n_active<T: Element>(&self) -> usize {
        self.registry.borrow().n_active::<T>()
    }

    /// Whether this depth served a request outside its listed types.
    #[must_use]
    pub fn has_untracked_use(&self) -> bool {
        let registry = self.registry.borrow();
        registry.depth == self.depth && registry.has_untracked_use()
    }

    fn nest<R>(
        &self,
        types: Option<&[TypeKey]>,
        f: impl FnOnce(&Scope<'_, B>) -> R,
    ) -> Result<R, PoolError> {
        let (depth, coverage) = {
            let mut registry = self.active()?;
            let coverage = match types {
                None => {
                    registry.checkpoint();
                    Coverage::Full
                }
                Some(types) => Coverage::Types {
                    start: registry.open_typed_scope(types),
                },
            };
            (registry.depth, coverage)
        };
        let inner = Scope {
            registry: self.registry,
            depth,
            coverage,
        };
        let _guard = RewindGuard(&inner);
        Ok(f(&inner))
    }

    fn active(&self) -> Result<RefMut<'_, &'r mut ArenaRegistry<B>>, PoolError> {
        let registry = self.registry.borrow_mut();
        if registry.depth != self.depth {
            return Err(PoolError::InactiveScope {
                scope_depth: self.depth,
                current_depth: registry.depth,
            });
        }
        Ok(registry)
    }

    /// Borrow the registry for a request of `T`, enrolling `T`'s arena in
    /// this scope if it is not covered yet.
    fn enter<T: Element>(&self) -> Result<RefMut<'_, &'r mut ArenaRegistry<B>>, PoolError> {
        let mut registry = self.active()?;
        if !registry.config().enabled {
            return Ok(registry);
        }
        registry.enroll::<T>();
        match &self.coverage {
            Coverage::Full => registry.mark_untracked(),
            Coverage::Types { start } => {
                let key = TypeKey::of::<T>();
                if registry.cover_type(*start, key) {
                    debug!(
                        element = key.name(),
                        depth = self.depth,
                        "Type outside a typed scope; enrolling its arena"
                    );
                    registry.mark_untracked();
                }
            }
        }
        Ok(registry)
    }

    fn close(&self) {
        let Ok(mut registry) = self.registry.try_borrow_mut() else {
            warn!(depth = self.depth, "Registry borrowed at scope exit; rewind skipped");
            return;
        };
        match self.coverage {
            Coverage::Full => registry.rewind(),
            Coverage::Types { start } => registry.close_typed_scope(start),
        }
    }
}
