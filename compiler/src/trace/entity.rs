//! Entities and traits
//!
//! An [`Entity`] is one tracked allocation: a declared object, a parameter
//! or return slot, or an angel standing in for storage owned outside the
//! current function. Entities are immutable; everything that changes over
//! time (attribute aliasing, moved state) lives elsewhere and refers back
//! to the entity by ID.
//!
//! A [`Trait`] is a dotted attribute path such as `a.b.c`, relative to some
//! entity. The empty trait denotes the entity itself.

use crate::tast::{EntityId, TypeId};
use std::fmt;
use std::sync::Arc;

/// Dotted attribute path relative to an entity; empty means the entity
/// itself
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Trait(Arc<str>);

impl Trait {
    pub fn empty() -> Self {
        Trait(Arc::from(""))
    }

    pub fn new(path: &str) -> Self {
        Trait(Arc::from(path))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Append another path segment, inserting a dot between non-empty
    /// parts.
    pub fn join(&self, other: &Trait) -> Trait {
        if self.is_empty() {
            other.clone()
        } else if other.is_empty() {
            self.clone()
        } else {
            Trait(Arc::from(format!("{}.{}", self.0, other.0)))
        }
    }

    pub fn join_str(&self, segment: &str) -> Trait {
        self.join(&Trait::new(segment))
    }
}

impl Default for Trait {
    fn default() -> Self {
        Trait::empty()
    }
}

impl fmt::Display for Trait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of storage an entity stands for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// Allocation declared in a function body
    Local,
    /// Parameter slot of the function under analysis
    Parameter,
    /// Named return slot of the function under analysis
    Return,
    /// Placeholder for storage reachable through an attribute of an
    /// externally owned entity
    Angel { owner: EntityId, guarded: Trait },
    /// The synthetic source of values with no tracked dependencies
    /// (literals, pure computation)
    Origin,
}

/// One tracked allocation
///
/// `depth` is the lexical nesting depth of the declaration and never
/// changes; lifetime violations are detected by comparing depths.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entity {
    pub id: EntityId,
    pub name: Arc<str>,
    pub depth: u32,
    pub ty: TypeId,
    pub kind: EntityKind,
}

impl Entity {
    pub fn new(id: EntityId, name: &str, depth: u32, ty: TypeId, kind: EntityKind) -> Self {
        Self {
            id,
            name: Arc::from(name),
            depth,
            ty,
            kind,
        }
    }

    pub fn is_angel(&self) -> bool {
        matches!(self.kind, EntityKind::Angel { .. })
    }

    pub fn is_origin(&self) -> bool {
        matches!(self.kind, EntityKind::Origin)
    }

    /// For an angel, the entity whose attribute it guards.
    pub fn guardian(&self) -> Option<EntityId> {
        match &self.kind {
            EntityKind::Angel { owner, .. } => Some(*owner),
            _ => None,
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_angel() {
            write!(f, "({})", self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}
