//! Acquisition that works with or without a registry.
//!
//! Code paths that may run with pooling switched off upstream take an
//! `Option<&mut ArenaRegistry>`; `None` yields an ordinary allocation of the
//! same type and shape.

use crate::array::{ArrayViewMut, PooledArray};
use crate::element::Element;
use crate::error::PoolError;
use crate::registry::ArenaRegistry;

/// A view of shape `dims`, pooled when a registry is given.
pub fn acquire_view<'r, T: Element>(
    registry: Option<&'r mut ArenaRegistry>,
    dims: &[usize],
) -> Result<ArrayViewMut<'r, T>, PoolError> {
    match registry {
        Some(registry) => registry.acquire_view(dims),
        None => ArrayViewMut::direct(dims),
    }
}

/// An N-D array of shape `dims`, pooled when a registry is given.
pub fn acquire_owned<'r, T: Element>(
    registry: Option<&'r mut ArenaRegistry>,
    dims: &[usize],
) -> Result<PooledArray<'r, T>, PoolError> {
    match registry {
        Some(registry) => registry.acquire_owned(dims),
        None => PooledArray::direct(dims),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_allocates_directly() {
        let view = acquire_view::<f64>(None, &[3, 2]).unwrap();
        assert_eq!(view.dims(), &[3, 2]);
        assert_eq!(view.len(), 6);
        assert!(!view.is_pooled());

        let array = acquire_owned::<u8>(None, &[4]).unwrap();
        assert_eq!(array.dims(), &[4]);
        assert!(array.iter().all(|&x| x == 0));
        assert!(!array.is_pooled());
    }

    #[test]
    fn some_uses_the_registry() {
        let mut registry = ArenaRegistry::new();
        assert!(acquire_view::<f64>(Some(&mut registry), &[3]).unwrap().is_pooled());
        assert!(acquire_owned::<f64>(Some(&mut registry), &[3]).unwrap().is_pooled());
        assert_eq!(registry.n_active::<f64>(), 2);
    }

    #[test]
    fn none_still_checks_overflow() {
        assert!(acquire_view::<f64>(None, &[usize::MAX, 2]).is_err());
        assert!(acquire_owned::<f64>(None, &[usize::MAX, 2]).is_err());
    }
}
