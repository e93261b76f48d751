//! Backend dispatch: where buffers come from and how N-D headers are built.
//!
//! Every arena, cache and checkpoint rule is shared across backends. A backend
//! only decides how a buffer is allocated, how a flat region is wrapped into
//! an N-D header, and which element types get a fixed arena.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::arena::TypedArena;
use crate::element::{Element, FixedKind};
use crate::error::PoolError;
use crate::layout::ArrayLayout;
use crate::registry::ArenaSet;

/// Device a registry was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u32);

impl DeviceId {
    /// Host memory.
    pub const HOST: Self = Self(0);
}

/// The three dispatch points a memory backend provides.
///
/// Registries are generic over their backend, so every call is statically
/// dispatched.
pub trait Backend: Send + 'static {
    /// Name used for registration lookups and diagnostics.
    const NAME: &'static str;

    /// Element types served by a fixed, lookup-free arena.
    const FIXED_KINDS: &'static [FixedKind] = &FixedKind::ALL;

    /// Whether cutting a view allocates a header object on this backend.
    /// When set, view requests go through the N-way layout cache too.
    const VIEWS_ALLOCATE: bool = false;

    /// Device the backend allocates on.
    fn device(&self) -> DeviceId {
        DeviceId::HOST
    }

    /// A new buffer of `len` default values.
    fn allocate_buffer<T: Element>(&self, len: usize) -> Vec<T> {
        vec![T::default(); len]
    }

    /// Header describing `flat` as a row-major array of shape `dims`.
    fn wrap_as_ndarray<T: Element>(&self, flat: &[T], dims: &[usize]) -> Arc<ArrayLayout> {
        debug_assert_eq!(flat.len(), dims.iter().product::<usize>());
        Arc::new(ArrayLayout::new(dims))
    }

    /// The arena serving `T`, created on demand at `depth`.
    fn typed_arena<'a, T: Element>(
        &self,
        arenas: &'a mut ArenaSet,
        depth: usize,
    ) -> &'a mut TypedArena<T> {
        arenas.resolve::<T>(Self::FIXED_KINDS, depth)
    }
}

/// Host memory backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuBackend;

impl Backend for CpuBackend {
    const NAME: &'static str = "cpu";
}

static REGISTERED: RwLock<Vec<&'static str>> = parking_lot::const_rwlock(Vec::new());

/// Make backend `B` available to context-local registry lookups.
pub fn register_backend<B: Backend>() {
    let mut table = REGISTERED.write();
    if !table.contains(&B::NAME) {
        table.push(B::NAME);
        info!(backend = B::NAME, "Registered arena backend");
    }
}

/// Whether a backend named `name` is available. The CPU backend always is.
#[must_use]
pub fn is_registered(name: &str) -> bool {
    name == CpuBackend::NAME || REGISTERED.read().iter().any(|n| *n == name)
}

/// Fail with [`PoolError::BackendUnavailable`] unless `name` is registered.
pub fn require_backend(name: &str) -> Result<(), PoolError> {
    if is_registered(name) {
        Ok(())
    } else {
        Err(PoolError::BackendUnavailable(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unregistered;

    impl Backend for Unregistered {
        const NAME: &'static str = "backend-tests-unregistered";
    }

    struct Late;

    impl Backend for Late {
        const NAME: &'static str = "backend-tests-late";
    }

    #[test]
    fn cpu_is_always_available() {
        assert!(is_registered("cpu"));
        assert!(require_backend(CpuBackend::NAME).is_ok());
        assert_eq!(CpuBackend.device(), DeviceId::HOST);
    }

    #[test]
    fn unknown_backend_is_named_in_error() {
        assert_eq!(
            require_backend(Unregistered::NAME),
            Err(PoolError::BackendUnavailable(Unregistered::NAME.into()))
        );
    }

    #[test]
    fn registration_is_idempotent() {
        assert!(!is_registered(Late::NAME));
        register_backend::<Late>();
        register_backend::<Late>();
        assert!(is_registered(Late::NAME));
        let count = REGISTERED.read().iter().filter(|n| **n == Late::NAME).count();
        assert_eq!(count, 1);
    }

    #[test]
    fn default_dispatch_points() {
        let buffer: Vec<u16> = CpuBackend.allocate_buffer(5);
        assert_eq!(buffer, vec![0; 5]);
        let layout = CpuBackend.wrap_as_ndarray(&[0.0f32; 6], &[3, 2]);
        assert_eq!(layout.dims(), &[3, 2]);
        assert_eq!(layout.strides(), &[2, 1]);
    }
}
