use std::fmt;

/// Lexical token kinds produced by the scanner.
///
/// The token carries no payload; the scanner hands out the literal text next
/// to it (identifier name, number digits, string body).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    /// Character the scanner could not make sense of
    Illegal,
    /// End of input
    Eof,

    // Literals
    /// Identifier: a letter followed by letters, digits or underscores
    ///
    /// # Examples
    /// ```text
    /// echo
    /// item_count
    /// ```
    Ident,

    /// Decimal number with an optional fractional part
    ///
    /// # Examples
    /// ```text
    /// 42
    /// 3.14
    /// ```
    Number,

    /// Double-quoted string, interpolated at run time
    ///
    /// # Examples
    /// ```text
    /// "hello ${name}"
    /// ```
    String,

    /// Single-quoted string, never interpolated
    ///
    /// # Examples
    /// ```text
    /// 'costs $5'
    /// ```
    RawString,

    // Arithmetic
    /// Addition or concatenation (`+`)
    Add,
    /// Subtraction or negation (`-`)
    Sub,
    /// Multiplication or path wildcard (`*`)
    Mul,
    /// Division (`/`)
    Quo,
    /// Remainder (`%`)
    Rem,

    // Comparison
    /// `==`
    Eql,
    /// `!=`
    Neq,
    /// `<`
    Lss,
    /// `>`
    Gtr,
    /// `<=`
    Leq,
    /// `>=`
    Geq,

    // Logical
    /// `&&`
    LAnd,
    /// `||`
    LOr,
    /// `!`
    Not,

    // Increment and decrement
    /// `++`
    Inc,
    /// `--`
    Dec,

    // Assignment
    /// `=`
    Assign,
    /// `:=`
    Define,
    /// `+=`
    AddAssign,
    /// `-=`
    SubAssign,
    /// `*=`
    MulAssign,
    /// `/=`
    QuoAssign,
    /// `%=`
    RemAssign,
    /// Closure parameter arrow (`=>`)
    Arrow,

    // Paths and ranges
    /// Deep wildcard (`**`)
    DoubleStar,
    /// Range (`..`)
    Range,

    // Delimiters
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Period,
    /// Statement terminator, either `;` or a newline in line-terminator mode
    Semicolon,
    Colon,

    // Keywords
    Pipeline,
    Stages,
    Stage,
    Steps,
    When,
    Vars,
}

/// Precedence of tokens that are not binary operators.
pub const LOWEST_PREC: u8 = 0;

impl Token {
    /// Maps an identifier to its keyword token, or [`Token::Ident`].
    pub fn lookup(ident: &str) -> Token {
        match ident {
            "pipeline" => Token::Pipeline,
            "stages" => Token::Stages,
            "stage" => Token::Stage,
            "steps" => Token::Steps,
            "when" => Token::When,
            "vars" => Token::Vars,
            _ => Token::Ident,
        }
    }

    /// Binary operator precedence, lowest to highest:
    /// `||`, `&&`, comparisons, additive, multiplicative.
    pub fn precedence(self) -> u8 {
        use Token::*;
        match self {
            LOr => 1,
            LAnd => 2,
            Eql | Neq | Lss | Leq | Gtr | Geq => 3,
            Add | Sub => 4,
            Mul | Quo | Rem => 5,
            _ => LOWEST_PREC,
        }
    }

    pub fn is_literal(self) -> bool {
        matches!(
            self,
            Token::Ident | Token::Number | Token::String | Token::RawString
        )
    }

    pub fn is_operator(self) -> bool {
        use Token::*;
        matches!(
            self,
            Add | Sub
                | Mul
                | Quo
                | Rem
                | Eql
                | Neq
                | Lss
                | Gtr
                | Leq
                | Geq
                | LAnd
                | LOr
                | Not
                | Inc
                | Dec
                | Assign
                | Define
                | AddAssign
                | SubAssign
                | MulAssign
                | QuoAssign
                | RemAssign
                | Arrow
                | DoubleStar
                | Range
        )
    }

    pub fn is_keyword(self) -> bool {
        use Token::*;
        matches!(self, Pipeline | Stages | Stage | Steps | When | Vars)
    }

    /// Whether the token starts a new top-level construct; the parser
    /// resynchronizes on these after an error.
    pub fn is_sync_point(self) -> bool {
        matches!(
            self,
            Token::Pipeline | Token::Stage | Token::Steps | Token::When | Token::Eof
        )
    }

    /// Canonical source text for fixed tokens.
    pub fn as_str(self) -> &'static str {
        use Token::*;
        match self {
            Illegal => "ILLEGAL",
            Eof => "EOF",
            Ident => "IDENT",
            Number => "NUMBER",
            String => "STRING",
            RawString => "RAWSTRING",
            Add => "+",
            Sub => "-",
            Mul => "*",
            Quo => "/",
            Rem => "%",
            Eql => "==",
            Neq => "!=",
            Lss => "<",
            Gtr => ">",
            Leq => "<=",
            Geq => ">=",
            LAnd => "&&",
            LOr => "||",
            Not => "!",
            Inc => "++",
            Dec => "--",
            Assign => "=",
            Define => ":=",
            AddAssign => "+=",
            SubAssign => "-=",
            MulAssign => "*=",
            QuoAssign => "/=",
            RemAssign => "%=",
            Arrow => "=>",
            DoubleStar => "**",
            Range => "..",
            LParen => "(",
            RParen => ")",
            LBrace => "{",
            RBrace => "}",
            LBracket => "[",
            RBracket => "]",
            Comma => ",",
            Period => ".",
            Semicolon => ";",
            Colon => ":",
            Pipeline => "pipeline",
            Stages => "stages",
            Stage => "stage",
            Steps => "steps",
            When => "when",
            Vars => "vars",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
