//! Cross-crate scenarios: nested scope combinations, per-unit registries and
//! custom backends, driven through the `arrpool` facade.

use arrpool::{
    register_backend, with_backend_registry, with_registry, ArenaRegistry, Backend, DeviceId,
    Element, FixedKind, PoolConfig, PoolError, Region, Scope, TypeKey, UnitRegistries,
};

// ── Raw checkpoint/rewind combinations ──

#[derive(Clone, Copy, Debug, PartialEq)]
enum Cover {
    All,
    F32Only,
}

const COVERS: [Cover; 2] = [Cover::All, Cover::F32Only];

fn triples() -> Vec<[Cover; 3]> {
    let mut out = Vec::new();
    for a in COVERS {
        for b in COVERS {
            for c in COVERS {
                out.push([a, b, c]);
            }
        }
    }
    out
}

/// An open depth in the reference model: what it covered and the counters
/// it saw when it opened.
struct Opened {
    cover: Cover,
    f64s: usize,
    f32s: usize,
}

fn open(registry: &mut ArenaRegistry, cover: Cover) {
    match cover {
        Cover::All => registry.checkpoint(),
        Cover::F32Only => registry.checkpoint_types(&[TypeKey::of::<f32>()]),
    }
}

fn close(registry: &mut ArenaRegistry, cover: Cover) {
    match cover {
        Cover::All => registry.rewind(),
        Cover::F32Only => registry.rewind_types(&[TypeKey::of::<f32>()]),
    }
}

/// Counters after closing the top of `stack` with a rewind covering `close`.
///
/// `f32` always has an entry at the closing depth. `f64` has one only if
/// the depth was opened with a full checkpoint; otherwise a full rewind falls
/// back to the nearest enclosing full checkpoint, or zero.
fn expected_after_close(stack: &[Opened], close: Cover, f64s: usize) -> (usize, usize) {
    let top = stack.last().expect("closing an open depth");
    let f64s = match (close, top.cover) {
        (Cover::F32Only, _) => f64s,
        (Cover::All, Cover::All) => top.f64s,
        (Cover::All, Cover::F32Only) => stack[..stack.len() - 1]
            .iter()
            .rev()
            .find(|o| o.cover == Cover::All)
            .map_or(0, |o| o.f64s),
    };
    (f64s, top.f32s)
}

#[test]
fn every_three_level_open_close_combination() {
    let mut combos = 0;
    for opens in triples() {
        for closes in triples() {
            combos += 1;
            let mut registry = ArenaRegistry::new();
            let mut stack: Vec<Opened> = Vec::new();
            for cover in opens {
                stack.push(Opened {
                    cover,
                    f64s: registry.n_active::<f64>(),
                    f32s: registry.n_active::<f32>(),
                });
                open(&mut registry, cover);
                registry.acquire_view::<f64>(&[4]).unwrap();
                registry.acquire_view::<f32>(&[4]).unwrap();
                registry.acquire_view::<f32>(&[2, 2]).unwrap();
            }
            for cover in closes {
                let expected = expected_after_close(&stack, cover, registry.n_active::<f64>());
                close(&mut registry, cover);
                stack.pop();
                assert_eq!(
                    (registry.n_active::<f64>(), registry.n_active::<f32>()),
                    expected,
                    "opens {opens:?}, closes {closes:?}, depth {}",
                    registry.depth()
                );
                assert_eq!(registry.depth(), stack.len() + 1);
            }
            assert_eq!(registry.n_active::<f32>(), 0);
            registry.reset();
            assert_eq!(registry.checkpoint_stack::<f64>().unwrap().len(), 1);
            assert_eq!(registry.checkpoint_stack::<f32>().unwrap().len(), 1);
        }
    }
    assert_eq!(combos, 64);
}

// ── Scoped combinations ──

/// Open one nested scope per entry of `covers`, acquiring `f64` and `f32`
/// at every level, and check each close restores what its open saw.
fn nest(s: &Scope<'_>, covers: &[Cover]) {
    let Some((&cover, rest)) = covers.split_first() else {
        return;
    };
    let before = (s.n_active::<f64>(), s.n_active::<f32>());
    match cover {
        Cover::All => s.scope(|inner| level(inner, rest)).unwrap(),
        Cover::F32Only => s
            .scope_for(&[TypeKey::of::<f32>()], |inner| level(inner, rest))
            .unwrap(),
    }
    assert_eq!((s.n_active::<f64>(), s.n_active::<f32>()), before);
}

fn level(s: &Scope<'_>, rest: &[Cover]) {
    s.acquire_view::<f64>(&[3]).unwrap();
    s.acquire_owned::<f32>(&[3, 3]).unwrap();
    nest(s, rest);
    s.acquire_view::<f32>(&[1]).unwrap();
}

#[test]
fn scoped_combinations_always_restore() {
    for covers in triples() {
        let mut registry = ArenaRegistry::new();
        registry.scope(|s| nest(s, &covers));
        assert_eq!(registry.depth(), 1);
        assert_eq!(registry.n_active::<f64>(), 0);
        assert_eq!(registry.n_active::<f32>(), 0);
        assert_eq!(registry.checkpoint_stack::<f64>().unwrap().len(), 1);
        assert_eq!(registry.checkpoint_stack::<f32>().unwrap().len(), 1);
    }
}

// ── Escape validation ──

#[test]
fn checked_scope_reports_escaping_region() {
    let config = PoolConfig {
        debug: true,
        ..PoolConfig::default()
    };
    let mut registry = ArenaRegistry::with_config(config).unwrap();
    let err = registry
        .scope_checked(|s| {
            let view = s.acquire_view::<i32>(&[16]).unwrap();
            Region::of_slice(&view)
        })
        .unwrap_err();
    assert_eq!(
        err,
        PoolError::EscapeViolation {
            type_name: "i32",
            slot: 0,
            depth: 2,
        }
    );
    assert_eq!(registry.depth(), 1);

    let copied = registry
        .scope_checked(|s| s.filled::<i32>(&[4], 7).unwrap().to_vec())
        .unwrap();
    assert_eq!(copied, vec![7; 4]);
}

// ── Execution units ──

#[test]
fn each_thread_replays_on_its_own_registry() {
    let handles: Vec<_> = (0..4u32)
        .map(|t| {
            std::thread::spawn(move || {
                for _ in 0..3 {
                    with_registry(|registry| {
                        registry.scope(|s| {
                            for k in 0..=t {
                                s.filled::<f64>(&[8], f64::from(k)).unwrap();
                            }
                        });
                    })
                    .unwrap();
                }
                with_registry(|registry| registry.slot_count::<f64>()).unwrap()
            })
        })
        .collect();
    for (t, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join().unwrap(), t + 1);
    }
}

#[test]
fn units_migrate_between_threads() {
    let units = UnitRegistries::new();
    for round in 0..3 {
        std::thread::scope(|scope| {
            for unit in 0..4u64 {
                let units = &units;
                scope.spawn(move || {
                    let mut guard = units.checkout(unit).unwrap();
                    guard.scope(|s| {
                        s.zeros::<u8>(&[64]).unwrap();
                        s.zeros::<u8>(&[64]).unwrap();
                    });
                    assert_eq!(guard.depth(), 1);
                    if round > 0 {
                        assert_eq!(guard.stats().buffers_allocated, 2);
                    }
                });
            }
        });
    }
    assert_eq!(units.len(), 4);
}

// ── Custom backends ──

#[derive(Clone)]
struct PinnedHost;

impl Backend for PinnedHost {
    const NAME: &'static str = "scenario-pinned-host";
    const FIXED_KINDS: &'static [FixedKind] = &[FixedKind::F64];

    fn device(&self) -> DeviceId {
        DeviceId(2)
    }
}

#[derive(Clone, Copy, Default)]
struct Complex {
    re: f64,
    im: f64,
}

impl Element for Complex {}

#[test]
fn registered_backend_gets_a_thread_local_registry() {
    std::thread::spawn(|| {
        assert_eq!(
            with_backend_registry(PinnedHost, |_| ()).unwrap_err(),
            PoolError::BackendUnavailable("scenario-pinned-host".into())
        );
        register_backend::<PinnedHost>();
        with_backend_registry(PinnedHost, |registry| {
            assert_eq!(registry.device(), DeviceId(2));
            registry.scope(|s| {
                s.acquire_view::<f64>(&[4]).unwrap();
                s.scope(|inner| {
                    // f32 and Complex arenas are created lazily at depth 3.
                    inner.acquire_view::<f32>(&[4]).unwrap();
                    let mut c = inner.acquire_view::<Complex>(&[2]).unwrap();
                    c[0] = Complex { re: 1.0, im: -1.0 };
                    assert!((c[0].re + c[0].im).abs() < f64::EPSILON);
                })
                .unwrap();
                assert_eq!(s.n_active::<f32>(), 0);
                assert_eq!(s.n_active::<Complex>(), 0);
            });
            assert_eq!(registry.n_active::<f64>(), 0);
            assert_eq!(registry.slot_count::<Complex>(), 1);
        })
        .unwrap();
    })
    .join()
    .unwrap();
}
