//! Core ID types for the typed AST and trace analysis
//!
//! Each ID type is a lightweight wrapper around u32 that prevents mixing
//! up different kinds of identifiers.

use std::fmt;

/// Trait for ID types that can be created and validated
pub trait IdType: Copy + Clone + PartialEq + Eq + std::hash::Hash + fmt::Debug {
    /// Create a new ID from a raw u32 value
    fn from_raw(raw: u32) -> Self;

    /// Get the raw u32 value of this ID
    fn as_raw(self) -> u32;

    /// Check if this ID is valid (not a sentinel value)
    fn is_valid(self) -> bool;

    /// Get an invalid/null sentinel value
    fn invalid() -> Self;

    /// Create the first valid ID (typically used for ID generators)
    fn first() -> Self {
        Self::from_raw(0)
    }

    /// Get the next ID in sequence
    fn next(self) -> Self {
        Self::from_raw(self.as_raw().wrapping_add(1))
    }
}

/// Macro to define ID types with consistent behavior
macro_rules! define_id_type {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            /// Create a new ID from a raw u32 value
            pub const fn from_raw(raw: u32) -> Self {
                Self(raw)
            }

            /// Get the raw u32 value of this ID
            pub const fn as_raw(self) -> u32 {
                self.0
            }

            /// Check if this ID is valid (not the sentinel value)
            pub const fn is_valid(self) -> bool {
                self.0 != u32::MAX
            }

            /// Get an invalid/null sentinel value
            pub const fn invalid() -> Self {
                Self(u32::MAX)
            }

            /// Create the first valid ID
            pub const fn first() -> Self {
                Self(0)
            }

            /// Get the next ID in sequence
            pub const fn next(self) -> Self {
                Self(self.0.wrapping_add(1))
            }
        }

        impl IdType for $name {
            fn from_raw(raw: u32) -> Self {
                Self::from_raw(raw)
            }

            fn as_raw(self) -> u32 {
                self.as_raw()
            }

            fn is_valid(self) -> bool {
                self.is_valid()
            }

            fn invalid() -> Self {
                Self::invalid()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::invalid()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, "{}({})", stringify!($name), self.0)
                } else {
                    write!(f, "{}(<invalid>)", stringify!($name))
                }
            }
        }

        impl From<u32> for $name {
            fn from(raw: u32) -> Self {
                Self::from_raw(raw)
            }
        }

        impl From<$name> for u32 {
            fn from(id: $name) -> u32 {
                id.as_raw()
            }
        }
    };
}

define_id_type! {
    /// Unique identifier for types in the type table
    TypeId
}

define_id_type! {
    /// Unique identifier for function definitions
    FunctionId
}

define_id_type! {
    /// Unique identifier for allocation entities tracked by the trace
    /// analysis
    ///
    /// Every named allocation, parameter slot, return slot, and angel gets
    /// exactly one entity ID for its whole lifetime, so aliasing sets can
    /// be compared by ID.
    EntityId
}

define_id_type! {
    /// Unique identifier for a scope frame in the context arena
    ContextId
}

define_id_type! {
    /// Unique identifier for a conditional reality
    ///
    /// Impressions formed in divergent branches of the same conditional are
    /// tagged with distinct entanglement IDs so they are never combined as
    /// if they could coexist.
    EntanglementId
}

/// Generator for creating unique IDs of a specific type
///
/// Provides thread-safe ID generation with overflow protection.
#[derive(Debug)]
pub struct IdGenerator<T: IdType> {
    next_id: std::sync::atomic::AtomicU32,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: IdType> IdGenerator<T> {
    /// Create a new ID generator starting from the first valid ID
    pub const fn new() -> Self {
        Self {
            next_id: std::sync::atomic::AtomicU32::new(0),
            _phantom: std::marker::PhantomData,
        }
    }

    /// Generate the next unique ID
    ///
    /// Panics if we run out of valid IDs (after 2^32 - 2 allocations).
    pub fn next(&self) -> T {
        let raw_id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        // u32::MAX is reserved as the invalid sentinel
        if raw_id == u32::MAX {
            panic!(
                "ID generator overflow: exhausted all valid IDs for {}",
                std::any::type_name::<T>()
            );
        }

        T::from_raw(raw_id)
    }

    /// Peek at the next ID that would be generated without consuming it
    pub fn peek_next(&self) -> T {
        let raw_id = self.next_id.load(std::sync::atomic::Ordering::Relaxed);
        T::from_raw(raw_id)
    }

    /// Get the number of IDs generated so far
    pub fn count(&self) -> u32 {
        self.next_id.load(std::sync::atomic::Ordering::Relaxed)
    }
}

impl<T: IdType> Default for IdGenerator<T> {
    fn default() -> Self {
        Self::new()
    }
}
