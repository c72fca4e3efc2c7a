use std::fmt;

use crate::ast::Token;

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    // Logical
    /// Logical OR (`||`)
    Or,
    /// Logical AND (`&&`)
    And,

    // Comparison
    /// Equal (`==`)
    Equal,
    /// Not equal (`!=`)
    NotEqual,
    /// Less than (`<`)
    LessThan,
    /// Less than or equal (`<=`)
    LessEqual,
    /// Greater than (`>`)
    GreaterThan,
    /// Greater than or equal (`>=`)
    GreaterEqual,

    // Arithmetic
    /// Addition or concatenation (`+`)
    Add,
    /// Subtraction (`-`)
    Subtract,
    /// Multiplication (`*`)
    Multiply,
    /// Division (`/`)
    Divide,
    /// Remainder (`%`)
    Modulo,
}

impl BinOp {
    pub fn from_token(token: Token) -> Option<BinOp> {
        Some(match token {
            Token::LOr => BinOp::Or,
            Token::LAnd => BinOp::And,
            Token::Eql => BinOp::Equal,
            Token::Neq => BinOp::NotEqual,
            Token::Lss => BinOp::LessThan,
            Token::Leq => BinOp::LessEqual,
            Token::Gtr => BinOp::GreaterThan,
            Token::Geq => BinOp::GreaterEqual,
            Token::Add => BinOp::Add,
            Token::Sub => BinOp::Subtract,
            Token::Mul => BinOp::Multiply,
            Token::Quo => BinOp::Divide,
            Token::Rem => BinOp::Modulo,
            _ => return None,
        })
    }

    pub fn token(self) -> Token {
        match self {
            BinOp::Or => Token::LOr,
            BinOp::And => Token::LAnd,
            BinOp::Equal => Token::Eql,
            BinOp::NotEqual => Token::Neq,
            BinOp::LessThan => Token::Lss,
            BinOp::LessEqual => Token::Leq,
            BinOp::GreaterThan => Token::Gtr,
            BinOp::GreaterEqual => Token::Geq,
            BinOp::Add => Token::Add,
            BinOp::Subtract => Token::Sub,
            BinOp::Multiply => Token::Mul,
            BinOp::Divide => Token::Quo,
            BinOp::Modulo => Token::Rem,
        }
    }

    pub fn precedence(self) -> u8 {
        self.token().precedence()
    }

    pub fn is_comparison(self) -> bool {
        self.precedence() == Token::Eql.precedence()
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token().as_str())
    }
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Logical negation (`!`)
    Not,
    /// Arithmetic negation (`-`)
    Negate,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Not => f.write_str("!"),
            UnaryOp::Negate => f.write_str("-"),
        }
    }
}

/// Assignment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// Declaration in the innermost scope (`:=`)
    Define,
    /// Update of an existing binding (`=`)
    Assign,
    /// Compound assignment (`+=`, `-=`, `*=`, `/=`, `%=`)
    Compound(BinOp),
}

impl AssignOp {
    pub fn from_token(token: Token) -> Option<AssignOp> {
        Some(match token {
            Token::Define => AssignOp::Define,
            Token::Assign => AssignOp::Assign,
            Token::AddAssign => AssignOp::Compound(BinOp::Add),
            Token::SubAssign => AssignOp::Compound(BinOp::Subtract),
            Token::MulAssign => AssignOp::Compound(BinOp::Multiply),
            Token::QuoAssign => AssignOp::Compound(BinOp::Divide),
            Token::RemAssign => AssignOp::Compound(BinOp::Modulo),
            _ => return None,
        })
    }
}

impl fmt::Display for AssignOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignOp::Define => f.write_str(":="),
            AssignOp::Assign => f.write_str("="),
            AssignOp::Compound(op) => write!(f, "{}=", op),
        }
    }
}
