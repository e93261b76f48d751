//! Element types an arena can hold, and their identities.

use std::any::TypeId;
use std::fmt;

use crate::arena::TypedArena;
use crate::registry::FixedArenas;

/// A plain-data type that can live in a pooled buffer.
///
/// Fixed element types resolve to a dedicated registry field at compile time;
/// every other implementor goes through the registry's fallback map. A user
/// type only needs the marker impl:
///
/// ```
/// use arrpool_core::Element;
///
/// #[derive(Clone, Copy, Default)]
/// struct Complex {
///     re: f64,
///     im: f64,
/// }
///
/// impl Element for Complex {}
/// ```
pub trait Element: Copy + Default + Send + 'static {
    /// Fixed arena serving this type, if any.
    const FIXED: Option<FixedKind> = None;

    #[doc(hidden)]
    fn fixed_arena(_arenas: &mut FixedArenas) -> Option<&mut TypedArena<Self>> {
        None
    }

    #[doc(hidden)]
    fn fixed_arena_ref(_arenas: &FixedArenas) -> Option<&TypedArena<Self>> {
        None
    }
}

/// The element types with a dedicated, lookup-free arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FixedKind {
    /// `f64`
    F64,
    /// `f32`
    F32,
    /// `i64`
    I64,
    /// `i32`
    I32,
    /// `u8`
    U8,
    /// `bool`
    Bool,
}

impl FixedKind {
    /// Every fixed kind, in registry field order.
    pub const ALL: [FixedKind; 6] = [
        FixedKind::F64,
        FixedKind::F32,
        FixedKind::I64,
        FixedKind::I32,
        FixedKind::U8,
        FixedKind::Bool,
    ];

    /// Type identity of the element type behind this kind.
    #[must_use]
    pub fn type_id(self) -> TypeId {
        match self {
            Self::F64 => TypeId::of::<f64>(),
            Self::F32 => TypeId::of::<f32>(),
            Self::I64 => TypeId::of::<i64>(),
            Self::I32 => TypeId::of::<i32>(),
            Self::U8 => TypeId::of::<u8>(),
            Self::Bool => TypeId::of::<bool>(),
        }
    }

    /// Kind whose element type has identity `id`.
    #[must_use]
    pub fn from_type_id(id: TypeId) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.type_id() == id)
    }
}

macro_rules! fixed_element {
    ($($ty:ty => $kind:ident, $field:ident;)*) => {$(
        impl Element for $ty {
            const FIXED: Option<FixedKind> = Some(FixedKind::$kind);

            fn fixed_arena(arenas: &mut FixedArenas) -> Option<&mut TypedArena<Self>> {
                Some(&mut arenas.$field)
            }

            fn fixed_arena_ref(arenas: &FixedArenas) -> Option<&TypedArena<Self>> {
                Some(&arenas.$field)
            }
        }
    )*};
}

fixed_element! {
    f64 => F64, f64;
    f32 => F32, f32;
    i64 => I64, i64;
    i32 => I32, i32;
    u8 => U8, u8;
    bool => Bool, bool;
}

macro_rules! fallback_element {
    ($($ty:ty),* $(,)?) => {$(
        impl Element for $ty {}
    )*};
}

fallback_element!(i8, i16, u16, u32, u64, i128, u128, isize, usize, char);

/// Identity of an element type, used to name the arenas a type-specific
/// checkpoint or rewind applies to.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Key for element type `T`.
    #[must_use]
    pub fn of<T: Element>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Type identity.
    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Type name, for diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.name)
    }
}
