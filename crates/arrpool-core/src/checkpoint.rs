//! Per-arena checkpoint stack.
//!
//! Each entry records an arena's active-use counter at the global depth of
//! the checkpoint that pushed it. Entries are sparse: a type-specific
//! checkpoint only pushes onto the arenas it names, so a later rewind may
//! find the top entry deeper than the current depth (an orphan left by a
//! narrower scope) or shallower (this arena was not part of the checkpoint).

use crate::constants::SENTINEL_DEPTH;

/// One saved counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    /// Saved active-use counter.
    pub active: usize,
    /// Global depth the entry was recorded at.
    pub depth: usize,
}

impl Checkpoint {
    /// The baseline entry at the bottom of every stack.
    pub const SENTINEL: Self = Self {
        active: 0,
        depth: SENTINEL_DEPTH,
    };
}

/// What a rewind found on the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Restore {
    /// Counter value to restore.
    pub active: usize,
    /// Whether an entry recorded at the rewound depth was popped.
    pub matched: bool,
    /// Deeper entries discarded before the decision.
    pub orphans: usize,
}

/// Stack of saved counters. Never empty: the sentinel is always at the bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointStack {
    entries: Vec<Checkpoint>,
}

impl CheckpointStack {
    /// Sentinel-only stack.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: vec![Checkpoint::SENTINEL],
        }
    }

    /// Record `active` at `depth`.
    pub fn push(&mut self, active: usize, depth: usize) {
        debug_assert!(depth > SENTINEL_DEPTH);
        self.entries.push(Checkpoint { active, depth });
    }

    /// Make sure an entry exists at `depth`, recording `active` if not.
    ///
    /// Returns whether an entry was pushed.
    pub fn ensure(&mut self, active: usize, depth: usize) -> bool {
        self.discard_deeper_than(depth);
        if self.top().depth == depth {
            return false;
        }
        self.push(active, depth);
        true
    }

    /// Resolve the counter for a rewind closing `depth`.
    ///
    /// Entries deeper than `depth` are dropped first. An entry at exactly
    /// `depth` is popped and its value restored. Otherwise the top entry (the
    /// nearest enclosing record, or the sentinel) supplies the value and stays
    /// on the stack.
    pub fn restore(&mut self, depth: usize) -> Restore {
        let orphans = self.discard_deeper_than(depth);
        let top = self.top();
        let matched = top.depth == depth && self.entries.len() > 1;
        if matched {
            self.entries.pop();
        }
        Restore {
            active: top.active,
            matched,
            orphans,
        }
    }

    /// Drop everything but the sentinel.
    pub fn reset(&mut self) {
        self.entries.truncate(1);
    }

    /// Topmost entry.
    #[must_use]
    pub fn top(&self) -> Checkpoint {
        self.entries
            .last()
            .copied()
            .unwrap_or(Checkpoint::SENTINEL)
    }

    /// All entries, sentinel first.
    #[must_use]
    pub fn entries(&self) -> &[Checkpoint] {
        &self.entries
    }

    /// Whether only the sentinel remains.
    #[must_use]
    pub fn is_sentinel_only(&self) -> bool {
        self.entries.len() == 1
    }

    fn discard_deeper_than(&mut self, depth: usize) -> usize {
        let mut discarded = 0;
        while self.entries.len() > 1 && self.top().depth > depth {
            self.entries.pop();
            discarded += 1;
        }
        discarded
    }
}

impl Default for CheckpointStack {
    fn default() -> Self {
        Self::new()
    }
}
