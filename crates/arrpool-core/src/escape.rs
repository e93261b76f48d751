//! Memory regions reachable from a value, for the escape validator.

use std::mem::size_of_val;

use crate::array::{ArrayViewMut, PooledArray};
use crate::element::Element;

/// A byte interval `[start, start + len)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// First byte address.
    pub start: usize,
    /// Length in bytes.
    pub len: usize,
}

impl Region {
    /// The bytes spanned by `slice`.
    #[must_use]
    pub fn of_slice<T>(slice: &[T]) -> Self {
        Self {
            start: slice.as_ptr() as usize,
            len: size_of_val(slice),
        }
    }

    /// Whether both regions share at least one byte. Empty regions never
    /// overlap anything.
    #[must_use]
    pub fn overlaps(self, other: Region) -> bool {
        self.len > 0
            && other.len > 0
            && self.start < other.start.saturating_add(other.len)
            && other.start < self.start.saturating_add(self.len)
    }
}

/// Reports the memory a value refers to.
///
/// The validator only sees what this reports: a value holding pooled memory
/// behind a type without an impl passes unnoticed.
pub trait MemoryRegions {
    /// Append every region reachable from `self`.
    fn collect_regions(&self, out: &mut Vec<Region>);
}

impl MemoryRegions for Region {
    fn collect_regions(&self, out: &mut Vec<Region>) {
        out.push(*self);
    }
}

impl<T: Element> MemoryRegions for [T] {
    fn collect_regions(&self, out: &mut Vec<Region>) {
        out.push(Region::of_slice(self));
    }
}

impl<T: Element> MemoryRegions for Vec<T> {
    fn collect_regions(&self, out: &mut Vec<Region>) {
        out.push(Region::of_slice(self));
    }
}

impl<T: Element> MemoryRegions for Box<[T]> {
    fn collect_regions(&self, out: &mut Vec<Region>) {
        out.push(Region::of_slice(self));
    }
}

impl<T: Element> MemoryRegions for ArrayViewMut<'_, T> {
    fn collect_regions(&self, out: &mut Vec<Region>) {
        out.push(Region::of_slice(self));
    }
}

impl<T: Element> MemoryRegions for PooledArray<'_, T> {
    fn collect_regions(&self, out: &mut Vec<Region>) {
        out.push(Region::of_slice(self));
    }
}

impl<V: MemoryRegions + ?Sized> MemoryRegions for &V {
    fn collect_regions(&self, out: &mut Vec<Region>) {
        (**self).collect_regions(out);
    }
}

impl<V: MemoryRegions + ?Sized> MemoryRegions for &mut V {
    fn collect_regions(&self, out: &mut Vec<Region>) {
        (**self).collect_regions(out);
    }
}

impl<V: MemoryRegions> MemoryRegions for Option<V> {
    fn collect_regions(&self, out: &mut Vec<Region>) {
        if let Some(value) = self {
            value.collect_regions(out);
        }
    }
}

impl<V: MemoryRegions, E> MemoryRegions for Result<V, E> {
    fn collect_regions(&self, out: &mut Vec<Region>) {
        if let Ok(value) = self {
            value.collect_regions(out);
        }
    }
}

macro_rules! tuple_regions {
    ($($name:ident)+) => {
        impl<$($name: MemoryRegions),+> MemoryRegions for ($($name,)+) {
            #[allow(non_snake_case)]
            fn collect_regions(&self, out: &mut Vec<Region>) {
                let ($($name,)+) = self;
                $($name.collect_regions(out);)+
            }
        }
    };
}

tuple_regions!(A);
tuple_regions!(A B);
tuple_regions!(A B C);
tuple_regions!(A B C D);

macro_rules! no_regions {
    ($($ty:ty),* $(,)?) => {$(
        impl MemoryRegions for $ty {
            fn collect_regions(&self, _out: &mut Vec<Region>) {}
        }
    )*};
}

no_regions!(
    (),
    f64,
    f32,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    bool,
    char,
    String,
    str,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_is_half_open() {
        let a = Region { start: 100, len: 10 };
        assert!(a.overlaps(Region { start: 105, len: 10 }));
        assert!(a.overlaps(Region { start: 90, len: 11 }));
        assert!(!a.overlaps(Region { start: 110, len: 4 }));
        assert!(!a.overlaps(Region { start: 90, len: 10 }));
    }

    #[test]
    fn regions_at_the_top_of_the_address_space() {
        let top = Region {
            start: usize::MAX - 1,
            len: 8,
        };
        assert!(top.overlaps(Region {
            start: usize::MAX - 4,
            len: 4,
        }));
        assert!(!top.overlaps(Region { start: 100, len: 10 }));
        assert!(!Region { start: 100, len: 10 }.overlaps(top));

        let registry = crate::registry::ArenaRegistry::new();
        assert_eq!(registry.validate_escape(&top), Ok(()));
    }

    #[test]
    fn empty_regions_never_overlap() {
        let a = Region { start: 100, len: 10 };
        assert!(!a.overlaps(Region { start: 105, len: 0 }));
        assert!(!Region { start: 105, len: 0 }.overlaps(a));
    }

    #[test]
    fn slice_region_counts_bytes() {
        let data = [0u32; 8];
        let region = Region::of_slice(&data);
        assert_eq!(region.len, 32);
        assert_eq!(region.start, data.as_ptr() as usize);
    }

    #[test]
    fn composite_values_report_every_part() {
        let a = vec![1.0f64; 3];
        let b = vec![2u8; 5];
        let mut out = Vec::new();
        (&a, Some(&b), 7usize).collect_regions(&mut out);
        assert_eq!(out, vec![Region::of_slice(&a), Region::of_slice(&b)]);

        out.clear();
        (None::<Vec<f64>>, "label").collect_regions(&mut out);
        assert!(out.is_empty());
    }
}
