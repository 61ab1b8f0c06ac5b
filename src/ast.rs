//! Abstract Syntax Tree definitions for MiniAPL programs

use serde::{Deserialize, Serialize};

/// A complete program consisting of statements
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Statement>,
}

/// A statement in the program
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Variable assignment: `assign x = expr`
    Assign { name: String, value: Expr },
    /// Expression evaluated for effect: `print(x)`
    Expr(Expr),
}

impl Statement {
    /// The expression on the right-hand side (or the whole statement)
    pub fn value(&self) -> &Expr {
        match self {
            Statement::Assign { value, .. } | Statement::Expr(value) => value,
        }
    }
}

/// Identity of an expression node within one program.
///
/// Ids are handed out in parse order, so two parses of the same text
/// assign the same ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// An expression node
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
}

/// Expression types
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Scalar literal
    Number(i32),

    /// Reference to a previously assigned name
    Variable(String),

    /// Function call: `mkArray(2, 3, 4)`, `print(x)`, etc.
    Call { callee: String, args: Vec<Expr> },
}

impl Expr {
    pub fn new(id: NodeId, kind: ExprKind) -> Self {
        Self { id, kind }
    }

    /// The integer value if this is a literal
    pub fn as_number(&self) -> Option<i32> {
        match self.kind {
            ExprKind::Number(n) => Some(n),
            _ => None,
        }
    }
}

/// Callees with dedicated shape and codegen rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    MkArray,
    Reduce,
    Add,
    Sub,
}

impl Builtin {
    /// Every other callee is a generic pass-through (e.g. `print`)
    pub fn from_callee(callee: &str) -> Option<Self> {
        match callee {
            "mkArray" => Some(Builtin::MkArray),
            "reduce" => Some(Builtin::Reduce),
            "add" => Some(Builtin::Add),
            "sub" => Some(Builtin::Sub),
            _ => None,
        }
    }
}

/// Shape of an array value: dimension lengths, outermost first
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<usize>,
}

/// Largest number of `i32` elements one array may hold
pub const MAX_ELEMENTS: usize = isize::MAX as usize / std::mem::size_of::<i32>();

/// Product of `dims`, or `None` if it exceeds [`MAX_ELEMENTS`]
pub fn element_count(dims: &[usize]) -> Option<usize> {
    dims.iter()
        .try_fold(1usize, |acc, &len| acc.checked_mul(len))
        .filter(|&count| count <= MAX_ELEMENTS)
}

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    /// Shape of a scalar literal: a 1-D array of length 1
    pub fn scalar() -> Self {
        Self::new(vec![1])
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Total element count (1 for the 0-D shape), `None` past [`MAX_ELEMENTS`]
    pub fn cardinality(&self) -> Option<usize> {
        element_count(&self.dims)
    }

    /// Number of dimensions
    pub fn dimensionality(&self) -> usize {
        self.dims.len()
    }

    pub fn length(&self, dim: usize) -> Option<usize> {
        self.dims.get(dim).copied()
    }

    /// Split into the shape without its last dimension and that dimension's length
    pub fn split_last(&self) -> Option<(Shape, usize)> {
        let (last, rest) = self.dims.split_last()?;
        Some((Shape::new(rest.to_vec()), *last))
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ExprKind::Number(n) => write!(f, "{}", n),
            ExprKind::Variable(name) => write!(f, "{}", name),
            ExprKind::Call { callee, args } => {
                write!(f, "{}(", callee)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl std::fmt::Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Statement::Assign { name, value } => write!(f, "assign {} = {}", name, value),
            Statement::Expr(value) => write!(f, "{}", value),
        }
    }
}

impl std::fmt::Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for stmt in &self.statements {
            writeln!(f, "{};", stmt)?;
        }
        Ok(())
    }
}
