//! Defaults and limits for arena pooling.

/// Default associativity of the per-slot N-D wrapper cache.
pub const DEFAULT_CACHE_WAYS: usize = 4;

/// Largest supported per-slot cache width.
pub const MAX_CACHE_WAYS: usize = 16;

/// Slot count from which capacity growth is logged at warning level.
///
/// A scope that keeps adding slots across iterations is almost always
/// missing a rewind.
pub const DEFAULT_GROWTH_WARN_SLOTS: usize = 512;

/// Depth of the root (unscoped) state.
pub const ROOT_DEPTH: usize = 1;

/// Depth recorded on the sentinel checkpoint entry.
pub const SENTINEL_DEPTH: usize = 0;

/// Environment variables read by [`PoolConfig::from_env`](crate::PoolConfig::from_env).
pub mod env {
    /// Turns pooling on or off (`1`/`0`, `true`/`false`, `on`/`off`).
    pub const ENABLED: &str = "ARRPOOL_ENABLED";
    /// Runs the escape validator at checked scope exits.
    pub const DEBUG: &str = "ARRPOOL_DEBUG";
    /// Per-slot N-D cache width, `1..=16`.
    pub const CACHE_WAYS: &str = "ARRPOOL_CACHE_WAYS";
    /// Slot count from which growth is logged as a warning.
    pub const GROWTH_WARN_SLOTS: &str = "ARRPOOL_GROWTH_WARN_SLOTS";
}
