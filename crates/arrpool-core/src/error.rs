//! Error type shared by every pool operation.

use thiserror::Error;

use crate::constants::MAX_CACHE_WAYS;

/// Errors raised by arena registries and scopes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The element count or byte size of a shape is not representable.
    #[error("dimensions {dims:?} overflow the addressable size for `{type_name}`")]
    DimensionOverflow {
        /// Requested shape.
        dims: Vec<usize>,
        /// Element type of the request.
        type_name: &'static str,
    },

    /// A value leaving a checked scope aliases a pooled buffer.
    #[error("value leaving depth {depth} aliases slot {slot} of the `{type_name}` arena")]
    EscapeViolation {
        /// Element type of the aliased arena.
        type_name: &'static str,
        /// Zero-based slot index of the aliased buffer.
        slot: usize,
        /// Depth of the scope being closed.
        depth: usize,
    },

    /// A backend-specific call was made for a backend nobody registered.
    #[error("backend `{0}` is not registered")]
    BackendUnavailable(String),

    /// A scope handle was used while a nested scope was still open.
    #[error("scope opened at depth {scope_depth} used while depth {current_depth} is innermost")]
    InactiveScope {
        /// Depth the handle was opened at.
        scope_depth: usize,
        /// Depth of the innermost open scope.
        current_depth: usize,
    },

    /// Cache width outside the supported range.
    #[error("cache width {0} is outside 1..={max}", max = MAX_CACHE_WAYS)]
    InvalidCacheWays(usize),

    /// The execution unit's registry is already checked out.
    #[error("arena registry for this execution unit is already in use")]
    RegistryInUse,
}
