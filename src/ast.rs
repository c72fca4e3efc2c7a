//! # Pipeline Language - Abstract Syntax Tree
//!
//! This module defines the tree the parser builds from pipeline scripts and
//! the evaluator walks.
//!
//! ## Architecture Overview
//!
//! - **[tokens]** - Lexical tokens produced by the scanner
//! - **[operators]** - Binary, unary and assignment operators
//! - **[expressions]** - Expression nodes (identifiers, literals, paths, closures)
//! - **[statements]** - Statements inside `steps`, `vars` and closure bodies
//! - **[pipeline]** - Files, pipelines, stages and their lexical scopes
//! - **[visit]** - Pre-order walker with a post-visit callback
//!
//! ## Quick Start
//!
//! ```text
//! pipeline("nightly") {
//!     vars {
//!         limit = 2
//!     }
//!     stages {
//!         stage("report") {
//!             when { limit > 0 }
//!             steps {
//!                 ids := [1, 2, 3]
//!                 big := ids.findAll {x => x > limit}
//!                 echo "found ${big.size} ids"
//!             }
//!         }
//!     }
//! }
//! ```
//!
//! ## Core Concepts
//!
//! ### Statements and terminators
//!
//! Inside `steps { }` and `when { }` a newline ends a statement; everywhere
//! else statements are separated with `;`.
//!
//! ### Scopes
//!
//! Every pipeline, stage and closure owns a lexical scope. `x := v` declares
//! in the innermost one, `x = v` updates the nearest existing binding, and
//! every identifier must be declared before it is used.
//!
//! ### Paths
//!
//! `.name` reads a member, `.name args` calls one, `.*` fans out over the
//! children of a collection and `.**` over all of its descendants:
//!
//! ```text
//! orders.*.total
//! catalog.**.id
//! ```
pub mod expressions;
pub mod operators;
pub mod pipeline;
pub mod statements;
pub mod tokens;
pub mod visit;

pub use expressions::{Argument, ClosureExpr, Expr, ExprKind, Literal, PathExpr, Segment};
pub use operators::{AssignOp, BinOp, UnaryOp};
pub use pipeline::{File, LexicalScope, Pipeline, Stage};
pub use statements::{Assignment, Block, DeclStmt, Stmt, VarsBlock};
pub use tokens::Token;
pub use visit::{Node, Visitor, walk};
