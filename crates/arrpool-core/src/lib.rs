//! # arrpool-core
//!
//! Reusable scratch memory for numeric array hot loops.
//!
//! Each element type gets a [`TypedArena`]: an ordered list
//! of backing buffers (slots), a 1-D view cache per slot, an N-way cache of
//! N-D layout headers per slot and an active-use counter. An
//! [`ArenaRegistry`] owns one arena per fixed element type plus a fallback map
//! for everything else, and runs the checkpoint/rewind state machine that
//! restores counters when a scope closes. Buffers are only ever released by
//! `clear`; a rewind just hands the same slots out again.
//!
//! ```
//! use arrpool_core::ArenaRegistry;
//!
//! let mut registry = ArenaRegistry::new();
//! for _ in 0..3 {
//!     let total = registry.scope(|s| {
//!         let mut a = s.zeros::<f64>(&[4, 4]).unwrap();
//!         a.fill(1.5);
//!         a.iter().sum::<f64>()
//!     });
//!     assert_eq!(total, 24.0);
//! }
//! // One buffer, allocated on the first pass only.
//! assert_eq!(registry.stats().buffers_allocated, 1);
//! ```
#![warn(missing_docs)]

pub mod arena;
pub mod array;
pub mod backend;
pub mod checkpoint;
pub mod config;
pub mod constants;
pub mod context;
pub mod direct;
pub mod element;
pub mod error;
pub mod escape;
pub mod layout;
pub(crate) mod nd_cache;
mod raw;
pub mod registry;
pub mod scope;
pub mod stats;

// Re-exports
pub use array::{ArrayViewMut, PooledArray, Shaped};
pub use arena::TypedArena;
pub use backend::{is_registered, register_backend, require_backend, Backend, CpuBackend, DeviceId};
pub use checkpoint::{Checkpoint, CheckpointStack};
pub use config::PoolConfig;
pub use context::{with_backend_registry, with_registry, UnitGuard, UnitId, UnitRegistries};
pub use element::{Element, FixedKind, TypeKey};
pub use error::PoolError;
pub use escape::{MemoryRegions, Region};
pub use layout::ArrayLayout;
pub use registry::ArenaRegistry;
pub use scope::Scope;
pub use stats::ArenaStats;
