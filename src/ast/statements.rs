use crate::{
    ast::{AssignOp, Expr},
    error::Position,
};

/// Statement inside a `steps`, `vars` or closure body.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Declaration or assignment
    ///
    /// # Examples
    /// ```text
    /// x := 12
    /// x = x + 1
    /// user.name = "alice"
    /// count += 2
    /// ```
    Assign(Assignment),

    /// Expression evaluated for its value or side effect
    ///
    /// # Example
    /// ```text
    /// echo x
    /// ```
    Expr(Expr),

    /// Variable declared in a `vars` block
    ///
    /// # Examples
    /// ```text
    /// vars {
    ///     retries = 3
    ///     token
    /// }
    /// ```
    Decl(DeclStmt),
}

impl Stmt {
    pub fn pos(&self) -> Position {
        match self {
            Stmt::Assign(a) => a.pos,
            Stmt::Expr(e) => e.pos,
            Stmt::Decl(d) => d.pos,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub lhs: Expr,
    pub op: AssignOp,
    pub rhs: Expr,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeclStmt {
    pub name: String,
    /// `None` declares the name bound to `nil`.
    pub value: Option<Expr>,
    pub pos: Position,
}

/// Sequence of statements executed in source order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

/// Contents of a pipeline's `vars { ... }` block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VarsBlock {
    pub specs: Vec<Stmt>,
}
