//! Views and N-D arrays handed out by a registry.
//!
//! Both types deref to the flat row-major element slice. Pooled storage
//! borrows a slot of an arena; direct storage owns an ordinary `Vec` and is
//! what a disabled pool hands out.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::element::Element;
use crate::error::PoolError;
use crate::layout::{checked_len, row_major_offset, row_major_strides, ArrayLayout, Dims};
use crate::raw;

pub(crate) enum Storage<'a, T> {
    Pooled(&'a mut [T]),
    Owned(Vec<T>),
}

impl<T> Storage<'_, T> {
    fn as_slice(&self) -> &[T] {
        match self {
            Self::Pooled(data) => data,
            Self::Owned(data) => data,
        }
    }

    fn as_mut_slice(&mut self) -> &mut [T] {
        match self {
            Self::Pooled(data) => data,
            Self::Owned(data) => data,
        }
    }

    fn is_pooled(&self) -> bool {
        matches!(self, Self::Pooled(_))
    }

    fn rebind<'b>(self) -> Storage<'b, T> {
        match self {
            Self::Pooled(data) => Storage::Pooled(raw::rebind_slice(data)),
            Self::Owned(data) => Storage::Owned(data),
        }
    }
}

fn direct_storage<T: Element>(dims: &[usize]) -> Result<Storage<'static, T>, PoolError> {
    let len = checked_len::<T>(dims)?;
    Ok(Storage::Owned(vec![T::default(); len]))
}

#[derive(Debug, Clone)]
enum Shape {
    Inline(Dims),
    Shared(Arc<ArrayLayout>),
}

impl Shape {
    fn dims(&self) -> &[usize] {
        match self {
            Self::Inline(dims) => dims,
            Self::Shared(layout) => layout.dims(),
        }
    }
}

/// Anything with an element type and a shape.
pub trait Shaped {
    /// Element type.
    type Elem: Element;

    /// Extent of each axis.
    fn dims(&self) -> &[usize];
}

/// Mutable N-D view over a row-major element slice.
///
/// The shape is stored inline, so cutting a view costs no allocation. On
/// backends whose views need a header object the shape is a cached
/// [`ArrayLayout`] instead.
pub struct ArrayViewMut<'a, T> {
    data: Storage<'a, T>,
    shape: Shape,
}

impl<'a, T: Element> ArrayViewMut<'a, T> {
    pub(crate) fn pooled(data: &'a mut [T], dims: &[usize]) -> Self {
        Self {
            data: Storage::Pooled(data),
            shape: Shape::Inline(Dims::from_slice(dims)),
        }
    }

    pub(crate) fn shared(data: &'a mut [T], layout: Arc<ArrayLayout>) -> Self {
        Self {
            data: Storage::Pooled(data),
            shape: Shape::Shared(layout),
        }
    }

    /// Freshly allocated, default-filled view that borrows no arena.
    pub fn direct(dims: &[usize]) -> Result<Self, PoolError> {
        Ok(Self {
            data: direct_storage(dims)?,
            shape: Shape::Inline(Dims::from_slice(dims)),
        })
    }

    pub(crate) fn rebind<'b>(self) -> ArrayViewMut<'b, T> {
        ArrayViewMut {
            data: self.data.rebind(),
            shape: self.shape,
        }
    }

    /// Extent of each axis.
    #[must_use]
    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    /// Number of axes.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.dims().len()
    }

    /// Row-major element strides.
    #[must_use]
    pub fn strides(&self) -> Dims {
        row_major_strides(self.dims())
    }

    /// Whether the data lives in an arena slot.
    #[must_use]
    pub fn is_pooled(&self) -> bool {
        self.data.is_pooled()
    }

    /// Element at a multi-index.
    #[must_use]
    pub fn get(&self, index: &[usize]) -> Option<&T> {
        row_major_offset(self.dims(), index).map(|offset| &self.data.as_slice()[offset])
    }

    /// Mutable element at a multi-index.
    pub fn get_mut(&mut self, index: &[usize]) -> Option<&mut T> {
        let offset = row_major_offset(self.shape.dims(), index)?;
        Some(&mut self.data.as_mut_slice()[offset])
    }

    /// Flat elements in row-major order.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        self.data.as_slice()
    }

    /// Mutable flat elements in row-major order.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.data.as_mut_slice()
    }
}

impl<T> Deref for ArrayViewMut<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.data.as_slice()
    }
}

impl<T> DerefMut for ArrayViewMut<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.data.as_mut_slice()
    }
}

impl<T: Element> Shaped for ArrayViewMut<'_, T> {
    type Elem = T;

    fn dims(&self) -> &[usize] {
        self.shape.dims()
    }
}

impl<T: fmt::Debug> fmt::Debug for ArrayViewMut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayViewMut")
            .field("dims", &self.shape.dims())
            .field("pooled", &self.data.is_pooled())
            .field("data", &self.data.as_slice())
            .finish()
    }
}

/// N-D array whose layout header is a shared, cached [`ArrayLayout`].
///
/// This is what an "owned array" request returns: the header is built once
/// per slot and shape, then shared by every later request that hits the
/// slot's cache.
pub struct PooledArray<'a, T> {
    data: Storage<'a, T>,
    layout: Arc<ArrayLayout>,
}

impl<'a, T: Element> PooledArray<'a, T> {
    pub(crate) fn pooled(data: &'a mut [T], layout: Arc<ArrayLayout>) -> Self {
        Self {
            data: Storage::Pooled(data),
            layout,
        }
    }

    /// Freshly allocated, default-filled array that borrows no arena.
    pub fn direct(dims: &[usize]) -> Result<Self, PoolError> {
        Ok(Self {
            data: direct_storage(dims)?,
            layout: Arc::new(ArrayLayout::new(dims)),
        })
    }

    pub(crate) fn rebind<'b>(self) -> PooledArray<'b, T> {
        PooledArray {
            data: self.data.rebind(),
            layout: self.layout,
        }
    }

    /// The shared layout header.
    #[must_use]
    pub fn layout(&self) -> &Arc<ArrayLayout> {
        &self.layout
    }

    /// Extent of each axis.
    #[must_use]
    pub fn dims(&self) -> &[usize] {
        self.layout.dims()
    }

    /// Number of axes.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.layout.ndim()
    }

    /// Whether the data lives in an arena slot.
    #[must_use]
    pub fn is_pooled(&self) -> bool {
        self.data.is_pooled()
    }

    /// Element at a multi-index.
    #[must_use]
    pub fn get(&self, index: &[usize]) -> Option<&T> {
        self.layout
            .offset(index)
            .map(|offset| &self.data.as_slice()[offset])
    }

    /// Mutable element at a multi-index.
    pub fn get_mut(&mut self, index: &[usize]) -> Option<&mut T> {
        let offset = self.layout.offset(index)?;
        Some(&mut self.data.as_mut_slice()[offset])
    }

    /// Flat elements in row-major order.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        self.data.as_slice()
    }

    /// Mutable flat elements in row-major order.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.data.as_mut_slice()
    }
}

impl<T> Deref for PooledArray<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.data.as_slice()
    }
}

impl<T> DerefMut for PooledArray<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.data.as_mut_slice()
    }
}

impl<T: Element> Shaped for PooledArray<'_, T> {
    type Elem = T;

    fn dims(&self) -> &[usize] {
        self.layout.dims()
    }
}

impl<T: fmt::Debug> fmt::Debug for PooledArray<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledArray")
            .field("dims", &self.layout.dims())
            .field("pooled", &self.data.is_pooled())
            .field("data", &self.data.as_slice())
            .finish()
    }
}
