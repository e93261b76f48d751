//! Workload replay and reporting.

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use arrpool_core::{ArenaRegistry, ArenaStats, PoolError, Scope};

use crate::config::AppConfig;

/// What one replay iteration does.
#[derive(Debug, Clone)]
pub struct Workload {
    /// Shapes acquired at every level.
    pub shapes: Vec<Vec<usize>>,
    /// Arrays acquired per shape at every level.
    pub arrays: usize,
    /// Number of nested scopes.
    pub depth: usize,
    /// Number of iterations.
    pub iterations: u64,
}

impl Workload {
    /// The workload described by the command line.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            shapes: config.shapes.iter().map(|s| s.0.clone()).collect(),
            arrays: config.arrays,
            depth: usize::try_from(config.depth).unwrap_or(usize::MAX),
            iterations: config.iterations,
        }
    }

    /// Slots of `f64` one iteration checks out: the arrays plus one scratch
    /// view per shape, at every level.
    #[must_use]
    pub fn slots_per_iteration(&self) -> usize {
        self.shapes.len() * (self.arrays + 1) * self.depth
    }
}

/// Outcome of a replay.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub iterations: u64,
    pub pooled: bool,
    pub checksum: f64,
    pub slots: usize,
    pub memory_bytes: usize,
    pub warmup_allocations: u64,
    pub steady_allocations: u64,
    pub stats: ArenaStats,
}

/// Run the application.
pub fn run(config: &AppConfig) -> Result<()> {
    let mut registry = ArenaRegistry::with_config(config.pool_config())?;
    let workload = Workload::from_config(config);

    if config.warm {
        let len = workload
            .shapes
            .iter()
            .map(|dims| dims.iter().product::<usize>())
            .max()
            .unwrap_or(0);
        registry.warm::<f64>(workload.slots_per_iteration(), len);
    }

    let report = replay(&mut registry, &workload)?;
    info!(
        iterations = report.iterations,
        steady_allocations = report.steady_allocations,
        "Replay finished"
    );

    if config.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        present(&report);
    }
    Ok(())
}

/// Replay `workload` through `registry`, one scope per iteration.
///
/// Allocations made during the first iteration are reported as warm-up; a
/// correctly scoped workload allocates nothing afterwards.
pub fn replay(
    registry: &mut ArenaRegistry,
    workload: &Workload,
) -> Result<ReplayReport, PoolError> {
    let before = registry.stats().allocations();
    let mut warmed = before;
    let mut checksum = 0.0;
    for i in 0..workload.iterations {
        checksum = registry.scope_checked(|s| replay_level(s, workload, 1))??;
        if i == 0 {
            warmed = registry.stats().allocations();
        }
        debug!(iteration = i, checksum, "Replayed workload");
    }
    let stats = registry.stats();
    Ok(ReplayReport {
        iterations: workload.iterations,
        pooled: registry.config().enabled,
        checksum,
        slots: registry.slot_count::<f64>(),
        memory_bytes: registry.memory_bytes(),
        warmup_allocations: warmed - before,
        steady_allocations: stats.allocations() - warmed,
        stats,
    })
}

/// Fill `arrays` arrays per shape, sum them into a scratch view and recurse
/// into the next level.
#[allow(clippy::cast_precision_loss)]
fn replay_level(s: &Scope<'_>, workload: &Workload, level: usize) -> Result<f64, PoolError> {
    let mut checksum = 0.0;
    for dims in &workload.shapes {
        let mut arrays = Vec::with_capacity(workload.arrays);
        for k in 0..workload.arrays {
            let mut array = s.acquire_owned::<f64>(dims)?;
            for (i, x) in array.iter_mut().enumerate() {
                *x = (i + k + level) as f64;
            }
            arrays.push(array);
        }
        let mut total = s.zeros::<f64>(dims)?;
        for array in &arrays {
            for (t, x) in total.iter_mut().zip(array.iter()) {
                *t += x;
            }
        }
        checksum += total.iter().sum::<f64>();
    }
    if level < workload.depth {
        checksum += s.scope(|inner| replay_level(inner, workload, level + 1))??;
    }
    Ok(checksum)
}

fn present(report: &ReplayReport) {
    let mode = if report.pooled { "pooled" } else { "unpooled" };
    println!("Replayed {} iterations ({mode})", report.iterations);
    println!("  checksum:                 {}", report.checksum);
    println!("  slots:                    {}", report.slots);
    println!("  pooled memory:            {} bytes", report.memory_bytes);
    println!("  warm-up allocations:      {}", report.warmup_allocations);
    println!("  steady-state allocations: {}", report.steady_allocations);
    println!(
        "  wrapper cache:            {} hits, {} misses",
        report.stats.wrapper_hits, report.stats.wrapper_misses
    );
}
