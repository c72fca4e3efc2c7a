//! The contract between scripts and host-provided steps.
//!
//! A [`Step`] is a stateless factory. Every call site creates a fresh
//! [`Execution`] with [`Step::start`], binds the call's arguments into it
//! according to the [`Parameter`]s it declares, then runs it:
//!
//! ```text
//! delay "250ms"              // positional, bound through position=0
//! readFile(path: "a.txt")    // named
//! ```

use std::{any::Any, sync::Arc};

use tracing::warn;

use crate::{
    scope::Scope,
    value::{Arguments, FromValue, Value, ValueError},
};

pub trait Step: Send + Sync {
    fn start(&self) -> Box<dyn Execution>;
}

/// One invocation of a step, holding its bound arguments.
pub trait Execution: Send {
    /// Parameters the execution accepts, in declaration order.
    fn parameters(&self) -> Vec<Parameter>;

    /// Stores `value` in the parameter declared for `field`.
    fn bind(&mut self, field: &str, value: Value) -> Result<(), StepError>;

    fn run(&mut self, ctx: &Context<'_>) -> Result<Value, StepError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("{step}: missing required argument {name}")]
    MissingArgument { step: String, name: String },

    #[error("{step}: unknown argument {name}")]
    UnknownArgument { step: String, name: String },

    #[error("{step}: argument {name} given more than once")]
    DuplicateArgument { step: String, name: String },

    #[error("{step}: too many positional arguments ({got})")]
    TooManyArguments { step: String, got: usize },

    #[error("invalid argument {name}: {source}")]
    InvalidArgument {
        name: String,
        #[source]
        source: ValueError,
    },

    #[error("no parameter for field {0}")]
    UnknownField(String),

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Failed(String),
}

/// A declared step parameter.
///
/// `field` names the slot in the execution; `name` is what scripts write.
/// Parameters are built from a field name and a tag string:
///
/// | tag          | meaning                                      |
/// |--------------|----------------------------------------------|
/// | `name=x`     | scripts use `x` instead of the default name  |
/// | `position=N` | the N-th positional argument binds here      |
/// | `required`   | calling without it is an error               |
/// | `-`          | not settable from scripts                    |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub field: String,
    pub name: String,
    pub position: Option<usize>,
    pub required: bool,
    pub skip: bool,
}

impl Parameter {
    /// A parameter named after its field in lower camel case.
    pub fn new(field: &str) -> Self {
        Parameter {
            field: field.to_string(),
            name: lower_camel(field),
            position: None,
            required: false,
            skip: false,
        }
    }

    /// Parses a tag string such as `"name=msg,position=0,required"`.
    /// Unrecognised entries are logged and ignored.
    pub fn tagged(field: &str, tag: &str) -> Self {
        let mut param = Parameter::new(field);
        for entry in tag.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            match entry.split_once('=') {
                None if entry == "-" => param.skip = true,
                None if entry == "required" => param.required = true,
                Some(("name", name)) if !name.is_empty() => param.name = name.to_string(),
                Some(("position", n)) => match n.parse() {
                    Ok(n) => param.position = Some(n),
                    Err(_) => warn!(field, tag, "ignoring invalid parameter position"),
                },
                _ => warn!(field, entry, "ignoring unknown parameter tag"),
            }
        }
        param
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn position(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// `max_value` and `MaxValue` both become `maxValue`.
fn lower_camel(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper_next = false;
    for (i, ch) in field.chars().enumerate() {
        if ch == '_' {
            upper_next = !out.is_empty();
        } else if i == 0 {
            out.extend(ch.to_lowercase());
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Converts an argument for a parameter, naming the parameter on failure.
pub fn convert<T: FromValue>(field: &str, value: Value) -> Result<T, StepError> {
    T::from_value(value).map_err(|source| StepError::InvalidArgument {
        name: field.to_string(),
        source,
    })
}

/// Binds call arguments into `execution`. Named arguments match a
/// parameter's script name; positional ones match its declared position.
/// Parameters left unbound keep the execution's defaults.
pub fn bind_arguments(
    step: &str,
    execution: &mut dyn Execution,
    args: &Arguments,
) -> Result<(), StepError> {
    let params: Vec<Parameter> = execution
        .parameters()
        .into_iter()
        .filter(|p| !p.skip)
        .collect();
    let mut bound = vec![false; params.len()];
    let mut position = 0;

    for arg in args.iter() {
        let index = if arg.key.is_empty() {
            let index = params
                .iter()
                .position(|p| p.position == Some(position))
                .ok_or_else(|| StepError::TooManyArguments {
                    step: step.to_string(),
                    got: position + 1,
                })?;
            position += 1;
            index
        } else {
            params
                .iter()
                .position(|p| p.name == arg.key)
                .ok_or_else(|| StepError::UnknownArgument {
                    step: step.to_string(),
                    name: arg.key.clone(),
                })?
        };

        if bound[index] {
            return Err(StepError::DuplicateArgument {
                step: step.to_string(),
                name: params[index].name.clone(),
            });
        }
        execution.bind(&params[index].field, arg.value.clone().materialize())?;
        bound[index] = true;
    }

    if let Some(missing) = params.iter().zip(&bound).find(|(p, b)| p.required && !**b) {
        return Err(StepError::MissingArgument {
            step: step.to_string(),
            name: missing.0.name.clone(),
        });
    }
    Ok(())
}

/// What a running step can see of its caller.
pub struct Context<'a> {
    scope: &'a Scope,
    step: &'a str,
}

impl<'a> Context<'a> {
    pub fn new(scope: &'a Scope, step: &'a str) -> Self {
        Context { scope, step }
    }

    /// Host object of type `T` registered on the calling scope chain.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.scope.extension::<T>()
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.scope.lookup(name)
    }

    pub fn scope(&self) -> &Scope {
        self.scope
    }

    /// Name the step was called by.
    pub fn step_name(&self) -> &str {
        self.step
    }
}
