//! One registry per execution unit.
//!
//! Checkpoint stacks are only correct when scopes open and close in LIFO
//! order, so two interleaved units must never share a registry. Plain threads
//! get a thread-local registry per backend and device through
//! [`with_registry`] and [`with_backend_registry`]. Tasks that migrate between
//! threads check a registry out of a [`UnitRegistries`] table keyed by their
//! own unit id instead.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::ops::{Deref, DerefMut};

use parking_lot::Mutex;
use tracing::debug;

use crate::backend::{require_backend, Backend, CpuBackend, DeviceId};
use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::registry::ArenaRegistry;

type LocalKey = (TypeId, DeviceId);

thread_local! {
    /// `None` marks a registry that is currently checked out.
    static LOCAL_REGISTRIES: RefCell<HashMap<LocalKey, Option<Box<dyn Any>>>> =
        RefCell::new(HashMap::new());
}

/// Take this thread's registry for `key` out of the table.
///
/// `Ok(None)` means none exists yet; its entry is reserved so a re-entrant
/// lookup fails instead of creating a second registry.
fn local_checkout(key: LocalKey) -> Result<Option<Box<dyn Any>>, PoolError> {
    LOCAL_REGISTRIES.with(|table| {
        let mut table = table.borrow_mut();
        match table.get_mut(&key) {
            Some(slot) => slot.take().map(Some).ok_or(PoolError::RegistryInUse),
            None => {
                table.insert(key, None);
                Ok(None)
            }
        }
    })
}

fn local_checkin(key: LocalKey, registry: Option<Box<dyn Any>>) {
    // The table is gone during thread teardown; the registry is dropped then.
    let _ = LOCAL_REGISTRIES.try_with(|table| match registry {
        Some(registry) => {
            table.borrow_mut().insert(key, Some(registry));
        }
        None => {
            table.borrow_mut().remove(&key);
        }
    });
}

/// Puts a thread-local registry back when dropped, including during a panic.
struct LocalLease<B: Backend> {
    key: LocalKey,
    registry: Option<Box<ArenaRegistry<B>>>,
}

impl<B: Backend> Drop for LocalLease<B> {
    fn drop(&mut self) {
        let registry = self.registry.take().map(|r| r as Box<dyn Any>);
        local_checkin(self.key, registry);
    }
}

/// Run `f` with this thread's registry for `backend` on its current device,
/// creating it from [`PoolConfig::from_env`] on first use.
///
/// Fails with [`PoolError::BackendUnavailable`] when `B` was never
/// registered and with [`PoolError::RegistryInUse`] when called re-entrantly
/// from inside `f`.
pub fn with_backend_registry<B: Backend, R>(
    backend: B,
    f: impl FnOnce(&mut ArenaRegistry<B>) -> R,
) -> Result<R, PoolError> {
    require_backend(B::NAME)?;
    let device = backend.device();
    let key = (TypeId::of::<B>(), device);
    let registry = match local_checkout(key)? {
        Some(existing) => existing
            .downcast::<ArenaRegistry<B>>()
            .expect("thread-local registries are keyed by backend type"),
        None => match ArenaRegistry::with_backend(backend, PoolConfig::from_env()) {
            Ok(registry) => {
                debug!(backend = B::NAME, device = device.0, "Created thread-local registry");
                Box::new(registry)
            }
            Err(err) => {
                local_checkin(key, None);
                return Err(err);
            }
        },
    };
    let mut lease = LocalLease {
        key,
        registry: Some(registry),
    };
    let registry = lease
        .registry
        .as_deref_mut()
        .expect("lease holds its registry until dropped");
    Ok(f(registry))
}

/// [`with_backend_registry`] for the host backend.
pub fn with_registry<R>(f: impl FnOnce(&mut ArenaRegistry) -> R) -> Result<R, PoolError> {
    with_backend_registry(CpuBackend, f)
}

/// Identifier of a logical execution unit, e.g. an async task.
pub type UnitId = u64;

struct UnitTable<B: Backend> {
    idle: HashMap<UnitId, ArenaRegistry<B>>,
    busy: HashSet<UnitId>,
}

/// Registries keyed by execution unit, for units that may move between
/// threads.
///
/// A unit checks its registry out for as long as it runs; the guard can be
/// held across suspension points and returns the registry when dropped.
pub struct UnitRegistries<B: Backend + Clone = CpuBackend> {
    backend: B,
    config: PoolConfig,
    table: Mutex<UnitTable<B>>,
}

impl UnitRegistries<CpuBackend> {
    /// Host registries with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            backend: CpuBackend,
            config: PoolConfig::default(),
            table: Mutex::new(UnitTable {
                idle: HashMap::new(),
                busy: HashSet::new(),
            }),
        }
    }
}

impl Default for UnitRegistries<CpuBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend + Clone> UnitRegistries<B> {
    /// Registries for `backend`, each built with `config`.
    pub fn with_backend(backend: B, config: PoolConfig) -> Result<Self, PoolError> {
        Ok(Self {
            backend,
            config: config.normalize().validate()?,
            table: Mutex::new(UnitTable {
                idle: HashMap::new(),
                busy: HashSet::new(),
            }),
        })
    }

    /// Check out the registry of `unit`, creating it on first use.
    pub fn checkout(&self, unit: UnitId) -> Result<UnitGuard<'_, B>, PoolError> {
        let mut table = self.table.lock();
        if table.busy.contains(&unit) {
            return Err(PoolError::RegistryInUse);
        }
        let registry = match table.idle.remove(&unit) {
            Some(registry) => registry,
            None => {
                debug!(unit, backend = B::NAME, "Created registry for execution unit");
                ArenaRegistry::with_backend(self.backend.clone(), self.config.clone())?
            }
        };
        table.busy.insert(unit);
        Ok(UnitGuard {
            owner: self,
            unit,
            registry: Some(registry),
        })
    }

    /// Run `f` with the registry of `unit`.
    pub fn with_unit<R>(
        &self,
        unit: UnitId,
        f: impl FnOnce(&mut ArenaRegistry<B>) -> R,
    ) -> Result<R, PoolError> {
        let mut guard = self.checkout(unit)?;
        Ok(f(&mut guard))
    }

    /// Drop the registry of a finished unit. Returns it if it was idle.
    pub fn remove(&self, unit: UnitId) -> Option<ArenaRegistry<B>> {
        self.table.lock().idle.remove(&unit)
    }

    /// Units with a registry, checked out or not.
    #[must_use]
    pub fn len(&self) -> usize {
        let table = self.table.lock();
        table.idle.len() + table.busy.len()
    }

    /// Whether no unit has a registry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A unit's checked-out registry.
pub struct UnitGuard<'a, B: Backend + Clone> {
    owner: &'a UnitRegistries<B>,
    unit: UnitId,
    registry: Option<ArenaRegistry<B>>,
}

impl<B: Backend + Clone> UnitGuard<'_, B> {
    /// The unit this registry belongs to.
    #[must_use]
    pub fn unit(&self) -> UnitId {
        self.unit
    }
}

impl<B: Backend + Clone> Deref for UnitGuard<'_, B> {
    type Target = ArenaRegistry<B>;

    fn deref(&self) -> &ArenaRegistry<B> {
        self.registry
            .as_ref()
            .expect("guard holds its registry until dropped")
    }
}

impl<B: Backend + Clone> DerefMut for UnitGuard<'_, B> {
    fn deref_mut(&mut self) -> &mut ArenaRegistry<B> {
        self.registry
            .as_mut()
            .expect("guard holds its registry until dropped")
    }
}

impl<B: Backend + Clone> Drop for UnitGuard<'_, B> {
    fn drop(&mut self) {
        let mut table = self.owner.table.lock();
        table.busy.remove(&self.unit);
        if let Some(registry) = self.registry.take() {
            table.idle.insert(self.unit, registry);
        }
    }
}
