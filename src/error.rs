//! Positional diagnostics shared by the scanner, parser and evaluator.

use std::fmt;

/// A location in script source. Lines and columns start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Position { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A single diagnostic: where it happened and what went wrong.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{pos}: {message}")]
pub struct Error {
    pub pos: Position,
    pub message: String,
}

impl Error {
    pub fn new(pos: Position, message: impl fmt::Display) -> Self {
        Error {
            pos,
            message: message.to_string(),
        }
    }
}

/// An ordered collection of diagnostics.
///
/// Parsing and evaluation keep going after most failures, so a single run can
/// surface several problems. The list keeps them in the order they were
/// reported until [`ErrorList::sort`] orders them by position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorList(Vec<Error>);

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pos: Position, message: impl fmt::Display) {
        self.0.push(Error::new(pos, message));
    }

    pub fn push(&mut self, error: Error) {
        self.0.push(error);
    }

    pub fn extend(&mut self, other: ErrorList) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Error> {
        self.0.iter()
    }

    /// Orders entries by position; entries at the same position keep their
    /// reporting order.
    pub fn sort(&mut self) {
        self.0.sort_by_key(|e| e.pos);
    }

    /// `Ok(())` when nothing was reported, otherwise the list itself.
    pub fn err(self) -> Result<(), ErrorList> {
        if self.0.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl From<Error> for ErrorList {
    fn from(error: Error) -> Self {
        ErrorList(vec![error])
    }
}

impl IntoIterator for ErrorList {
    type Item = Error;
    type IntoIter = std::vec::IntoIter<Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", e)?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorList {}
