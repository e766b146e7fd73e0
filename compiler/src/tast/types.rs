//! Type table and binding annotations for the typed AST
//!
//! The trace analysis runs after type checking, so every expression node
//! already carries a [`TypeId`] into this table. The analysis only needs a
//! coarse view of types: whether a value is novel (no aliasing to track),
//! what attributes a struct has and with which bindings they were declared,
//! and whether a parameter type carries function identity that must be made
//! concrete before a call can be summarized.

use crate::tast::id_types::TypeId;
use std::fmt;

/// Declaration binding for variables, attributes, parameters, and returns
///
/// Bindings drive the ownership rules: `new`/`mut_new` own their allocation,
/// `var`/`mut_var` are rebindable references, `fixed`/`mut` are borrowed
/// views, `move` consumes the argument, and `ret_new`/`data` mark returns
/// whose allocation is created by the callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binding {
    /// Return slot owning a fresh allocation made inside the callee
    RetNew,
    /// Owned allocation
    New,
    /// Owned, mutable allocation
    MutNew,
    /// Immutable borrowed view
    Fixed,
    /// Mutable borrowed view
    Mut,
    /// Rebindable reference
    Var,
    /// Rebindable, mutable reference
    MutVar,
    /// Parameter that consumes its argument
    Move,
    /// Plain data returned by value
    Data,
}

impl Binding {
    /// True for attribute bindings that keep ownership with the outer
    /// struct. Any other binding means the attribute aliases storage owned
    /// elsewhere, so attribute resolution must switch to the current owner.
    pub fn owns_attribute(self) -> bool {
        matches!(self, Binding::New | Binding::MutNew)
    }

    /// True for return bindings whose value is a fresh allocation that the
    /// caller receives as a shadow rather than a memory.
    pub fn returns_allocation(self) -> bool {
        matches!(self, Binding::RetNew | Binding::Data)
    }

    /// True when a parameter with this binding consumes its argument.
    pub fn consumes(self) -> bool {
        matches!(self, Binding::Move)
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Binding::RetNew => "ret_new",
            Binding::New => "new",
            Binding::MutNew => "mut_new",
            Binding::Fixed => "fixed",
            Binding::Mut => "mut",
            Binding::Var => "var",
            Binding::MutVar => "mut_var",
            Binding::Move => "move",
            Binding::Data => "data",
        };
        write!(f, "{}", s)
    }
}

/// One declared attribute of a struct type
#[derive(Debug, Clone)]
pub struct StructAttribute {
    pub name: String,
    pub ty: TypeId,
    pub binding: Binding,
}

/// The shape of a type, as far as the trace analysis needs to see it
#[derive(Debug, Clone)]
pub enum TypeKind {
    /// The unit/void type
    Void,
    /// Novel value type with no attributes (int, bool, str, ...)
    Primitive { name: String },
    /// Struct with declared attributes
    Struct {
        name: String,
        attributes: Vec<StructAttribute>,
    },
    /// Function type
    Function {
        parameters: Vec<TypeId>,
        returns: Vec<TypeId>,
    },
    /// Trait (interface) type; concrete implementation unknown until a
    /// call site binds one
    Trait { name: String },
}

/// Table of all types in a compilation unit, indexed by [`TypeId`]
///
/// Slot 0 always holds [`TypeKind::Void`].
#[derive(Debug, Clone)]
pub struct TypeTable {
    types: Vec<TypeKind>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self {
            types: vec![TypeKind::Void],
        }
    }

    pub fn void(&self) -> TypeId {
        TypeId::from_raw(0)
    }

    pub fn add(&mut self, kind: TypeKind) -> TypeId {
        let id = TypeId::from_raw(self.types.len() as u32);
        self.types.push(kind);
        id
    }

    pub fn get(&self, id: TypeId) -> &TypeKind {
        &self.types[id.as_raw() as usize]
    }

    /// Novel types carry their value with them; there is no aliasing to
    /// track for them.
    pub fn is_novel(&self, id: TypeId) -> bool {
        matches!(self.get(id), TypeKind::Void | TypeKind::Primitive { .. })
    }

    /// Look up a declared attribute of a struct type.
    pub fn attribute(&self, id: TypeId, name: &str) -> Option<&StructAttribute> {
        match self.get(id) {
            TypeKind::Struct { attributes, .. } => attributes.iter().find(|a| a.name == name),
            _ => None,
        }
    }

    /// True when values of this type carry function identity that a call
    /// site must pin down before the callee can be summarized: functions,
    /// traits, and structs with a function- or trait-typed attribute.
    pub fn requires_blessing(&self, id: TypeId) -> bool {
        match self.get(id) {
            TypeKind::Function { .. } | TypeKind::Trait { .. } => true,
            TypeKind::Struct { attributes, .. } => attributes.iter().any(|a| {
                matches!(
                    self.get(a.ty),
                    TypeKind::Function { .. } | TypeKind::Trait { .. }
                )
            }),
            _ => false,
        }
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}
