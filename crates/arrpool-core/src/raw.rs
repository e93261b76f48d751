//! Lifetime rebinding for slices handed out through a [`Scope`](crate::Scope).
//!
//! A scope reaches its registry through a `RefCell`, so a slot slice first
//! borrows the short-lived `RefMut` guard. This module re-attaches that slice
//! to the scope handle instead. It is the only place in the crate that uses
//! `unsafe`.

#![allow(unsafe_code)]

/// Re-borrow `slice` for an arbitrary lifetime.
///
/// Callers must only pass slices of an arena slot that is checked out
/// (below the arena's active counter) for at least `'b`. Such a slot is never
/// regrown or re-claimed until a rewind at or below its depth, and the scope
/// API only rewinds after every borrow of the closing scope handle has ended.
/// Releasing buffers needs `&mut` access to the registry, which a scope holds
/// for its whole lifetime.
pub(crate) fn rebind_slice<'b, T>(slice: &mut [T]) -> &'b mut [T] {
    let len = slice.len();
    let ptr = slice.as_mut_ptr();
    // SAFETY: `ptr` and `len` come from a live, exclusive slice into a `Vec`
    // buffer owned by a checked-out slot. The buffer is not moved or freed
    // while the slot stays checked out (see above), and no other slice of the
    // same slot is created until it is returned by a rewind.
    unsafe { std::slice::from_raw_parts_mut(ptr, len) }
}
