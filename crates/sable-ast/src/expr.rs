//! Expression nodes.

use sable_common::{Span, SymbolId};
use serde::{Deserialize, Serialize};

use crate::item::{Param, Stmt};
use crate::pat::Pattern;
use crate::ty::TypeExpr;

/// A literal value token, already decoded by the front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Unit,
}

/// A reference to a bound name. The front end assigns `symbol` during its
/// binding pass; id 0 marks an error-recovery placeholder that lowering
/// must treat as unresolvable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameRef {
    pub name: String,
    pub symbol: SymbolId,
    pub span: Span,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
}

/// A brace block: statements plus an optional tail expression that gives
/// the block its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub tail: Option<Box<Expr>>,
    pub span: Span,
}

impl Block {
    /// An empty block with a synthetic span.
    pub fn empty() -> Self {
        Block {
            stmts: Vec::new(),
            tail: None,
            span: Span::synthetic(),
        }
    }
}

/// One arm of a `match`: alternative patterns, an optional guard, a body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchArm {
    pub patterns: Vec<Pattern>,
    pub guard: Option<Expr>,
    pub body: Block,
    pub span: Span,
}

/// Expression nodes. The language is expression-oriented: blocks, `if`,
/// and `match` all produce values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Literal, Span),
    Name(NameRef),
    /// Member access `base.field`. Member resolution happens during
    /// lowering against the base's resolved type, so there is no id here.
    Field {
        base: Box<Expr>,
        field: String,
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
        span: Span,
    },
    Tuple {
        items: Vec<Expr>,
        span: Span,
    },
    /// A sequence literal `[a, b, c]`.
    Seq {
        items: Vec<Expr>,
        span: Span,
    },
    /// An inclusive-start, exclusive-end integer range `lo .. hi`.
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
        span: Span,
    },
    If {
        cond: Box<Expr>,
        then_block: Block,
        else_block: Option<Block>,
        span: Span,
    },
    Match {
        scrutinee: Box<Expr>,
        arms: Vec<MatchArm>,
        span: Span,
    },
    /// A function literal. Captures are not recorded here; the closure
    /// converter discovers them structurally during lowering.
    Closure {
        params: Vec<Param>,
        ret: Option<TypeExpr>,
        body: Block,
        span: Span,
    },
    Block(Block),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Literal(_, span) => *span,
            Expr::Name(n) => n.span,
            Expr::Field { span, .. }
            | Expr::Call { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Tuple { span, .. }
            | Expr::Seq { span, .. }
            | Expr::Range { span, .. }
            | Expr::If { span, .. }
            | Expr::Match { span, .. }
            | Expr::Closure { span, .. } => *span,
            Expr::Block(b) => b.span,
        }
    }
}
