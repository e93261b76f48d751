//! Shapes, strides and overflow-checked sizes.

use smallvec::SmallVec;

use crate::error::PoolError;

/// Highest rank a [`Dims`] holds without touching the heap.
pub const INLINE_RANK: usize = 4;

/// Inline dimension list; shapes up to [`INLINE_RANK`] never touch the heap.
pub type Dims = SmallVec<[usize; INLINE_RANK]>;

/// Heap-allocated N-D header: dimensions plus row-major strides.
///
/// This is the "wrapper" the N-way cache stores per slot. Building one costs a
/// small allocation; a cache hit hands out another reference to the same one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayLayout {
    dims: Box<[usize]>,
    strides: Box<[usize]>,
}

impl ArrayLayout {
    /// Row-major layout for `dims`.
    #[must_use]
    pub fn new(dims: &[usize]) -> Self {
        Self {
            dims: dims.into(),
            strides: row_major_strides(dims).into_vec().into_boxed_slice(),
        }
    }

    /// Extent of each axis.
    #[must_use]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Element step of each axis.
    #[must_use]
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Number of axes.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Flat offset of a multi-index, or `None` when out of bounds.
    #[must_use]
    pub fn offset(&self, index: &[usize]) -> Option<usize> {
        if index.len() != self.dims.len() {
            return None;
        }
        index
            .iter()
            .zip(self.dims.iter().zip(self.strides.iter()))
            .try_fold(0, |acc, (&i, (&d, &s))| (i < d).then_some(acc + i * s))
    }
}

/// Row-major strides: the last axis is contiguous.
#[must_use]
pub fn row_major_strides(dims: &[usize]) -> Dims {
    let mut strides: Dims = SmallVec::from_elem(1, dims.len());
    for axis in (0..dims.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * dims[axis + 1];
    }
    strides
}

/// Flat offset of `index` in a row-major array of shape `dims`.
#[must_use]
pub fn row_major_offset(dims: &[usize], index: &[usize]) -> Option<usize> {
    if index.len() != dims.len() {
        return None;
    }
    index
        .iter()
        .zip(dims)
        .try_fold(0, |acc, (&i, &d)| (i < d).then_some(acc * d + i))
}

/// Element count of `dims`, failing when it or its byte size for `T`
/// cannot be represented.
///
/// A wrapped product would cut an undersized view over the buffer, so
/// overflow is always an error.
pub fn checked_len<T>(dims: &[usize]) -> Result<usize, PoolError> {
    let overflow = || PoolError::DimensionOverflow {
        dims: dims.to_vec(),
        type_name: std::any::type_name::<T>(),
    };
    let total = dims
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(overflow)?;
    let bytes = total
        .checked_mul(std::mem::size_of::<T>())
        .ok_or_else(overflow)?;
    if isize::try_from(bytes).is_err() {
        return Err(overflow());
    }
    Ok(total)
}
