use crate::{
    ast::{Block, Expr, VarsBlock},
    error::Position,
};

/// Names declared directly in one lexical scope, in declaration order.
///
/// The parser records these while it resolves identifiers; the evaluator
/// creates a fresh runtime scope for every node that owns one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LexicalScope {
    pub names: Vec<String>,
}

impl LexicalScope {
    pub fn declares(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}

/// A parsed script.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct File {
    pub pipelines: Vec<Pipeline>,
    pub scope: LexicalScope,
}

impl File {
    /// Finds a pipeline by name. A file holding a single pipeline answers
    /// to any name, so unnamed `pipeline() { ... }` scripts stay runnable.
    pub fn pipeline(&self, name: &str) -> Option<&Pipeline> {
        self.pipelines
            .iter()
            .find(|p| p.name == name)
            .or(match self.pipelines.as_slice() {
                [only] if name.is_empty() || only.name.is_empty() => Some(only),
                _ => None,
            })
    }
}

/// `pipeline("name") { vars { ... } stages { ... } }`
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub name: String,
    pub vars: Option<VarsBlock>,
    pub stages: Vec<Stage>,
    pub scope: LexicalScope,
    pub pos: Position,
}

/// `stage("name") { when { ... } steps { ... } }`
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub name: String,
    pub when: Option<Expr>,
    pub steps: Block,
    pub scope: LexicalScope,
    pub pos: Position,
}
