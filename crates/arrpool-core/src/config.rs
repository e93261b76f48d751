//! Pool configuration and its environment layer.

use tracing::warn;

use crate::constants::{env, DEFAULT_CACHE_WAYS, DEFAULT_GROWTH_WARN_SLOTS, MAX_CACHE_WAYS};
use crate::error::PoolError;

/// Options fixed for the lifetime of a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// When `false`, every acquisition falls back to an ordinary allocation.
    pub enabled: bool,
    /// Run the escape validator when a checked scope closes.
    pub debug: bool,
    /// Associativity of the per-slot N-D wrapper cache, `1..=16`.
    pub cache_ways: usize,
    /// Slot count from which capacity growth is logged as a warning.
    pub growth_warn_slots: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debug: false,
            cache_ways: DEFAULT_CACHE_WAYS,
            growth_warn_slots: DEFAULT_GROWTH_WARN_SLOTS,
        }
    }
}

impl PoolConfig {
    /// Defaults overridden by the `ARRPOOL_*` environment variables.
    ///
    /// Unparseable values are ignored with a warning.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable name.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(raw) = lookup(env::ENABLED) {
            match parse_flag(&raw) {
                Some(v) => config.enabled = v,
                None => warn!(var = env::ENABLED, value = %raw, "Ignoring unparseable flag"),
            }
        }
        if let Some(raw) = lookup(env::DEBUG) {
            match parse_flag(&raw) {
                Some(v) => config.debug = v,
                None => warn!(var = env::DEBUG, value = %raw, "Ignoring unparseable flag"),
            }
        }
        if let Some(raw) = lookup(env::CACHE_WAYS) {
            match raw.trim().parse() {
                Ok(v) => config.cache_ways = v,
                Err(_) => warn!(var = env::CACHE_WAYS, value = %raw, "Ignoring unparseable count"),
            }
        }
        if let Some(raw) = lookup(env::GROWTH_WARN_SLOTS) {
            match raw.trim().parse() {
                Ok(v) => config.growth_warn_slots = v,
                Err(_) => {
                    warn!(var = env::GROWTH_WARN_SLOTS, value = %raw, "Ignoring unparseable count");
                }
            }
        }
        config.normalize()
    }

    /// Replace zero-valued fields with their defaults.
    #[must_use]
    pub fn normalize(mut self) -> Self {
        if self.cache_ways == 0 {
            self.cache_ways = DEFAULT_CACHE_WAYS;
        }
        if self.growth_warn_slots == 0 {
            self.growth_warn_slots = DEFAULT_GROWTH_WARN_SLOTS;
        }
        self
    }

    /// Reject settings no registry can be built with.
    pub fn validate(self) -> Result<Self, PoolError> {
        if !(1..=MAX_CACHE_WAYS).contains(&self.cache_ways) {
            return Err(PoolError::InvalidCacheWays(self.cache_ways));
        }
        Ok(self)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
