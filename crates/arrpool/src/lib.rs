//! arrpool: reusable scratch arrays for hot loops.
//!
//! Re-exports the arena machinery of `arrpool-core` and hosts the workload
//! replay driver behind the `arrpool` binary.

pub mod app;
pub mod config;
pub mod errors;

pub use arrpool_core::{
    register_backend, with_backend_registry, with_registry, ArenaRegistry, ArenaStats,
    ArrayLayout, ArrayViewMut, Backend, Checkpoint, CpuBackend, DeviceId, Element, FixedKind,
    MemoryRegions, PoolConfig, PoolError, PooledArray, Region, Scope, Shaped, TypeKey, UnitGuard,
    UnitId, UnitRegistries,
};
