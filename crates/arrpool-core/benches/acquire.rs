//! Criterion benchmarks for steady-state acquisition.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use arrpool_core::ArenaRegistry;

fn bench_views(c: &mut Criterion) {
    let sizes: Vec<usize> = vec![16, 256, 4_096, 65_536];

    let mut group = c.benchmark_group("ScopedView");
    for &n in &sizes {
        let mut registry = ArenaRegistry::new();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                registry.scope(|s| {
                    let mut a = s.acquire_view::<f64>(&[n]).unwrap();
                    let src = s.acquire_view::<f64>(&[n]).unwrap();
                    a.copy_from_slice(&src);
                    black_box(a[0])
                })
            });
        });
    }
    group.finish();

    let mut group = c.benchmark_group("DirectVec");
    for &n in &sizes {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let mut a = vec![0.0f64; n];
                let src = vec![0.0f64; n];
                a.copy_from_slice(&src);
                black_box(a[0])
            });
        });
    }
    group.finish();
}

fn bench_arrays(c: &mut Criterion) {
    let shapes: Vec<[usize; 2]> = vec![[8, 8], [64, 64], [256, 256]];

    let mut group = c.benchmark_group("ScopedArrayCached");
    for dims in &shapes {
        let mut registry = ArenaRegistry::new();
        let id = format!("{}x{}", dims[0], dims[1]);
        group.bench_with_input(BenchmarkId::from_parameter(id), dims, |b, dims| {
            b.iter(|| {
                registry.scope(|s| {
                    let array = s.acquire_owned::<f32>(dims).unwrap();
                    black_box(array.len())
                })
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_views, bench_arrays);
criterion_main!(benches);
