//! Typed AST: the input representation of the trace analysis
//!
//! A Quill module arrives here fully type-checked. This module defines the
//! ID types, the type table, and the statement/expression nodes the
//! analysis walks.

pub mod id_types;
pub mod node;
pub mod types;

pub use id_types::{ContextId, EntanglementId, EntityId, FunctionId, IdGenerator, IdType, TypeId};
pub use node::{
    block_returns, BinaryOperator, Callee, CondArm, DeclaredTarget, FunctionTable, LiteralValue,
    TypedExpression, TypedExpressionKind, TypedFunction, TypedModule, TypedParameter,
    TypedStatement,
};
pub use types::{Binding, StructAttribute, TypeKind, TypeTable};
