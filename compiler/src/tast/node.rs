//! Typed AST nodes consumed by the trace analysis
//!
//! These nodes represent the fully type-resolved form of a Quill module:
//! every expression carries its [`TypeId`], every name is unique within its
//! scope, and declaration bindings have already been checked. The trace
//! analysis never resolves names against a symbol table; it only follows
//! the structure recorded here.

use crate::tast::id_types::{FunctionId, TypeId};
use crate::tast::types::Binding;

/// A fully typed module: the unit the trace analysis runs over
#[derive(Debug, Clone)]
pub struct TypedModule {
    pub types: crate::tast::TypeTable,
    pub functions: FunctionTable,
}

/// Table of all function definitions, indexed by [`FunctionId`]
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    functions: Vec<TypedFunction>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, mut function: TypedFunction) -> FunctionId {
        let id = FunctionId::from_raw(self.functions.len() as u32);
        function.id = id;
        self.functions.push(function);
        id
    }

    pub fn get(&self, id: FunctionId) -> &TypedFunction {
        &self.functions[id.as_raw() as usize]
    }

    pub fn by_qualified_name(&self, name: &str) -> Option<&TypedFunction> {
        self.functions.iter().find(|f| f.qualified_name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypedFunction> {
        self.functions.iter()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// One parameter or return slot of a function
#[derive(Debug, Clone)]
pub struct TypedParameter {
    pub name: String,
    pub ty: TypeId,
    pub binding: Binding,
}

/// A fully typed function definition
///
/// Return slots are named; a `return` statement with values assigns into
/// them positionally, and a constructor-style function may build its result
/// by writing attributes of the return slot directly.
#[derive(Debug, Clone)]
pub struct TypedFunction {
    pub id: FunctionId,
    pub name: String,
    /// Name including the defining struct, e.g. `obj::create`
    pub qualified_name: String,
    pub parameters: Vec<TypedParameter>,
    pub returns: Vec<TypedParameter>,
    pub body: Vec<TypedStatement>,
    pub line: usize,
}

/// One arm of a conditional: `if`/`elif` arms carry a condition, a trailing
/// `else` arm does not
#[derive(Debug, Clone)]
pub struct CondArm {
    pub condition: Option<TypedExpression>,
    pub body: Vec<TypedStatement>,
}

#[derive(Debug, Clone)]
pub enum TypedStatement {
    /// `let x: T` / `var x: T` without an initializer
    Declare {
        name: String,
        ty: TypeId,
        binding: Binding,
        line: usize,
    },
    /// `let x = e` / `var x, y = e`
    DeclareAssign {
        targets: Vec<DeclaredTarget>,
        value: TypedExpression,
        line: usize,
    },
    /// `x = e`, `x.a = e`, `x, y = e`
    Assign {
        targets: Vec<TypedExpression>,
        value: TypedExpression,
        line: usize,
    },
    If {
        arms: Vec<CondArm>,
        line: usize,
    },
    While {
        condition: TypedExpression,
        body: Vec<TypedStatement>,
        line: usize,
    },
    Return {
        values: Vec<TypedExpression>,
        line: usize,
    },
    Expression(TypedExpression),
}

impl TypedStatement {
    pub fn line(&self) -> usize {
        match self {
            TypedStatement::Declare { line, .. }
            | TypedStatement::DeclareAssign { line, .. }
            | TypedStatement::Assign { line, .. }
            | TypedStatement::If { line, .. }
            | TypedStatement::While { line, .. }
            | TypedStatement::Return { line, .. } => *line,
            TypedStatement::Expression(e) => e.line,
        }
    }
}

/// One target of a declare-and-assign statement
#[derive(Debug, Clone)]
pub struct DeclaredTarget {
    pub name: String,
    pub ty: TypeId,
    pub binding: Binding,
}

#[derive(Debug, Clone)]
pub struct TypedExpression {
    pub kind: TypedExpressionKind,
    pub ty: TypeId,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub enum Callee {
    /// Callee resolved at type-check time
    Direct { function: FunctionId },
    /// Callee is a first-class function value; its concrete identity is
    /// recovered from the aliasing state at the call site
    Dynamic { expr: Box<TypedExpression> },
}

#[derive(Debug, Clone)]
pub enum LiteralValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Nil,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone)]
pub enum TypedExpressionKind {
    /// Reference to a declared name
    Ref { name: String },
    /// `object.attribute`
    Attribute {
        object: Box<TypedExpression>,
        attribute: String,
    },
    Call {
        callee: Callee,
        arguments: Vec<TypedExpression>,
    },
    /// A function used as a first-class value
    FunctionLiteral { function: FunctionId },
    Literal(LiteralValue),
    Binary {
        op: BinaryOperator,
        lhs: Box<TypedExpression>,
        rhs: Box<TypedExpression>,
    },
    Cast { inner: Box<TypedExpression> },
    /// Multiple values in one expression position (multi-assignment RHS)
    Tuple { elements: Vec<TypedExpression> },
}

/// Whether a statement block unconditionally returns at its top level.
///
/// Used to decide which branches of a conditional still contribute state
/// when the branches are fused back together.
pub fn block_returns(statements: &[TypedStatement]) -> bool {
    statements
        .iter()
        .any(|s| matches!(s, TypedStatement::Return { .. }))
}
