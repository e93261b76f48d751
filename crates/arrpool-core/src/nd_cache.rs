//! Per-slot N-way set-associative cache of N-D layout headers.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::layout::ArrayLayout;

#[derive(Debug, Clone)]
struct Way {
    /// Address of the backing buffer the header was built for.
    tag: usize,
    layout: Arc<ArrayLayout>,
}

/// `K` ways replaced round-robin on miss.
///
/// An entry is valid only while both its dims and its buffer tag match the
/// request. A slot whose buffer was replaced gets a new address, so every way
/// built for the old buffer misses from then on.
#[derive(Debug, Clone)]
pub(crate) struct NdCacheSet {
    ways: SmallVec<[Option<Way>; 4]>,
    cursor: usize,
}

impl NdCacheSet {
    pub(crate) fn new(ways: usize) -> Self {
        debug_assert!(ways >= 1);
        Self {
            ways: SmallVec::from_elem(None, ways),
            cursor: 0,
        }
    }

    pub(crate) fn lookup(&self, dims: &[usize], tag: usize) -> Option<Arc<ArrayLayout>> {
        self.ways.iter().flatten().find_map(|way| {
            (way.tag == tag && way.layout.dims() == dims).then(|| Arc::clone(&way.layout))
        })
    }

    /// Store `layout` in the way under the cursor and advance it.
    pub(crate) fn insert(&mut self, tag: usize, layout: Arc<ArrayLayout>) {
        self.ways[self.cursor] = Some(Way { tag, layout });
        self.cursor = (self.cursor + 1) % self.ways.len();
    }

    /// Number of occupied ways.
    pub(crate) fn occupied(&self) -> usize {
        self.ways.iter().flatten().count()
    }
}
