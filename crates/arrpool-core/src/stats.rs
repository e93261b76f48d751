//! Allocation and cache statistics for arenas.

use std::ops::{Add, AddAssign};

use serde::Serialize;

/// Counters for one arena, or the sum over a registry.
///
/// Only `buffers_allocated`, `buffer_grows` and `wrapper_misses` correspond to
/// real heap allocations; the hit counters record work that was skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArenaStats {
    /// Backing buffers created for new slots.
    pub buffers_allocated: u64,
    /// Backing buffers replaced by a larger one.
    pub buffer_grows: u64,
    /// 1-D requests served from the view cache unchanged.
    pub view_hits: u64,
    /// 1-D requests that re-cut an existing buffer.
    pub view_refreshes: u64,
    /// N-D wrapper requests served from the N-way cache.
    pub wrapper_hits: u64,
    /// N-D wrapper requests that built a new header.
    pub wrapper_misses: u64,
}

impl ArenaStats {
    /// Heap allocations performed: new buffers, grows and wrapper headers.
    #[must_use]
    pub fn allocations(&self) -> u64 {
        self.buffers_allocated + self.buffer_grows + self.wrapper_misses
    }

    pub(crate) fn record_buffer(&mut self) {
        self.buffers_allocated += 1;
    }

    pub(crate) fn record_grow(&mut self) {
        self.buffer_grows += 1;
    }

    pub(crate) fn record_view(&mut self, hit: bool) {
        if hit {
            self.view_hits += 1;
        } else {
            self.view_refreshes += 1;
        }
    }

    pub(crate) fn record_wrapper(&mut self, hit: bool) {
        if hit {
            self.wrapper_hits += 1;
        } else {
            self.wrapper_misses += 1;
        }
    }
}

impl Add for ArenaStats {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl AddAssign for ArenaStats {
    fn add_assign(&mut self, rhs: Self) {
        self.buffers_allocated += rhs.buffers_allocated;
        self.buffer_grows += rhs.buffer_grows;
        self.view_hits += rhs.view_hits;
        self.view_refreshes += rhs.view_refreshes;
        self.wrapper_hits += rhs.wrapper_hits;
        self.wrapper_misses += rhs.wrapper_misses;
    }
}
