use std::sync::Arc;

use crate::{
    ast::{BinOp, Block, LexicalScope, UnaryOp},
    error::Position,
};

/// Expression node with the position of its first token.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Position,
}

impl Expr {
    pub fn new(kind: ExprKind, pos: Position) -> Self {
        Expr { kind, pos }
    }

    /// Whether the expression can stand on the left of `=`.
    pub fn is_assignable(&self) -> bool {
        match &self.kind {
            ExprKind::Ident(_) | ExprKind::Index { .. } => true,
            ExprKind::Path(path) => path.args.is_none() && matches!(path.segment, Segment::Name(_)),
            _ => false,
        }
    }
}

/// The shapes an expression can take.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Identifier resolved against the scope chain
    ///
    /// # Example
    /// ```text
    /// echo
    /// ```
    Ident(String),

    /// Number or string literal
    Literal(Literal),

    /// Binary operation; precedence follows [`BinOp::precedence`]
    ///
    /// # Example
    /// ```text
    /// a + b * 2
    /// ```
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Prefix operation
    ///
    /// # Example
    /// ```text
    /// !done
    /// -x
    /// ```
    Unary { op: UnaryOp, operand: Box<Expr> },

    /// Invocation of a step or closure
    ///
    /// # Examples
    /// ```text
    /// echo "hello"
    /// delay(duration: "1s")
    /// ```
    Call { func: Box<Expr>, args: Vec<Argument> },

    /// Bracket index
    ///
    /// # Examples
    /// ```text
    /// items[0]
    /// headers["Content-Type"]
    /// ```
    Index { object: Box<Expr>, index: Box<Expr> },

    /// Member access, member call, or wildcard traversal
    ///
    /// # Examples
    /// ```text
    /// user.name
    /// items.findAll {x => x > 2}
    /// data.*.id
    /// ```
    Path(PathExpr),

    /// Parenthesized expression
    Paren(Box<Expr>),

    /// Anonymous function literal
    ///
    /// # Example
    /// ```text
    /// {x, y => x + y}
    /// ```
    Closure(Arc<ClosureExpr>),

    /// Array or map literal
    ///
    /// # Examples
    /// ```text
    /// [1, 2, 3]
    /// [a: 1, b: 2]
    /// ```
    Sequence { values: Vec<Expr>, is_map: bool },

    /// Entry of a map literal
    KeyValue { key: String, value: Box<Expr> },

    /// Inclusive numeric range
    ///
    /// # Example
    /// ```text
    /// 1..10
    /// ```
    Range { start: Box<Expr>, end: Box<Expr> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    /// Body of a double-quoted string with escapes still in place;
    /// interpolation and unescaping happen at evaluation time.
    String(String),
    /// Body of a single-quoted string, already unescaped.
    RawString(String),
}

/// Call argument. Positional when `name` is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: Option<String>,
    pub value: Expr,
}

/// `object.segment` with optional call arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    pub object: Box<Expr>,
    pub segment: Segment,
    /// Present when the member is invoked, even with zero arguments.
    pub args: Option<Vec<Argument>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Named member or string key
    Name(String),
    /// `*`: every child of the current collection
    Wildcard,
    /// `**`: every descendant, depth first
    DeepWildcard,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosureExpr {
    pub params: Vec<String>,
    pub body: Block,
    pub scope: LexicalScope,
}
