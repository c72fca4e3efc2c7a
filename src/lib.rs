pub mod ast;
pub mod builtins;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod duration;
pub mod error;
pub mod evaluator;
pub mod host;
pub mod lexer;
pub mod parser;
pub mod scheduler;
pub mod scope;
pub mod step;
pub mod value;

pub use ast::{Expr, File, Pipeline, Stage, Token};
pub use config::{Config, ConfigError};
pub use error::{Error, ErrorList, Position};
pub use evaluator::Evaluator;
pub use host::{ScopeOption, run_scope, with_context, with_global_vars, with_params, with_steps};
pub use lexer::Lexer;
pub use parser::{Parser, parse_expression, parse_file};
pub use scheduler::{Scheduler, SchedulerError};
pub use scope::{Scope, ScopeError};
pub use step::{Context, Execution, Parameter, Step, StepError};
pub use value::{Arguments, HostObject, Reference, Value, ValueError};
