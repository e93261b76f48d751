#![no_main]

use libfuzzer_sys::fuzz_target;

use arrpool_core::{ArenaRegistry, TypeKey};

/// Counters the registry must report, tracked independently.
#[derive(Clone, Copy, Default)]
struct Model {
    f64s: usize,
    u8s: usize,
    f32s: usize,
}

enum Open {
    Full(Model),
    F64Only(usize),
}

fuzz_target!(|data: &[u8]| {
    let mut registry = ArenaRegistry::new();
    let mut model = Model::default();
    let mut opened: Vec<Open> = Vec::new();

    for pair in data.chunks(2) {
        let op = pair[0] % 7;
        let arg = usize::from(pair.get(1).copied().unwrap_or(1)) % 32;
        let f64_only = matches!(opened.last(), Some(Open::F64Only(_)));
        match op {
            0 => {
                registry.checkpoint();
                opened.push(Open::Full(model));
            }
            1 => {
                registry.checkpoint_types(&[TypeKey::of::<f64>()]);
                opened.push(Open::F64Only(model.f64s));
            }
            2 => {
                registry.acquire_view::<f64>(&[arg]).unwrap();
                model.f64s += 1;
            }
            3 if !f64_only => {
                registry.acquire_view::<u8>(&[arg, 2]).unwrap();
                model.u8s += 1;
            }
            4 if !f64_only => {
                registry.acquire_owned::<f32>(&[arg % 4 + 1, arg]).unwrap();
                model.f32s += 1;
            }
            5 => match opened.pop() {
                Some(Open::Full(saved)) => {
                    registry.rewind();
                    model = saved;
                }
                Some(Open::F64Only(saved)) => {
                    registry.rewind_types(&[TypeKey::of::<f64>()]);
                    model.f64s = saved;
                }
                None => {}
            },
            6 if opened.is_empty() => {
                registry.reset();
                model = Model::default();
            }
            _ => {}
        }

        assert_eq!(registry.depth(), opened.len() + 1);
        assert_eq!(registry.n_active::<f64>(), model.f64s);
        assert_eq!(registry.n_active::<u8>(), model.u8s);
        assert_eq!(registry.n_active::<f32>(), model.f32s);
    }

    // A scoped replay on whatever state is left must leave it unchanged.
    let before = (registry.n_active::<f64>(), registry.depth());
    registry.scope(|s| {
        for len in data.iter().take(8) {
            s.acquire_view::<f64>(&[usize::from(*len)]).unwrap();
        }
    });
    assert_eq!((registry.n_active::<f64>(), registry.depth()), before);
});
