//! Dynamic values manipulated by pipeline scripts.
//!
//! Every variant answers the same small set of operations: rendering
//! ([`fmt::Display`]), member access ([`Value::get_field`],
//! [`Value::set_field`]), member calls ([`Value::invoke_func`]) and operators
//! ([`Value::invoke_op`]). Collections are shared handles: copying an Array
//! or Expando value copies the handle, and mutation through one copy is
//! visible through all of them.

mod convert;
mod path;
mod reflect;

use std::{cell::RefCell, fmt, sync::Arc};

use indexmap::IndexMap;
use parking_lot::RwLock;
use rust_decimal::{Decimal, prelude::FromPrimitive, prelude::ToPrimitive};

use crate::{
    ast::{BinOp, ClosureExpr, UnaryOp},
    error::ErrorList,
    evaluator::Evaluator,
    scope::Scope,
    step::Step,
};

pub use convert::{from_json, from_yaml, to_json};
pub use path::PathValue;
pub use reflect::{Data, FromValue, Function, HostObject, Reference, host_names};

/// Errors raised by value operations. The evaluator attaches positions.
#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    #[error("operator {op} is not defined for {left} and {right}")]
    TypeMismatch {
        op: String,
        left: &'static str,
        right: &'static str,
    },

    #[error("operator {op} is not defined for {operand}")]
    UnaryMismatch { op: String, operand: &'static str },

    #[error("division by zero")]
    DivisionByZero,

    #[error("operator % requires integral operands, got {0} and {1}")]
    NonIntegral(String, String),

    #[error("index {index} out of range [0, {len})")]
    IndexOutOfRange { index: String, len: usize },

    #[error("cannot access {0} on nil")]
    NilAccess(String),

    #[error("{type_name} has no member {name}")]
    UnknownMember { type_name: String, name: String },

    #[error("{type_name} has no method {name}")]
    UnknownMethod { type_name: String, name: String },

    #[error("{0} cannot be traversed")]
    NotTraversable(String),

    #[error("expected {expected} arguments, got {got}")]
    Arity { expected: usize, got: usize },

    #[error("range bounds must be integers of the same type, got {0} and {1}")]
    RangeMismatch(&'static str, &'static str),

    #[error("range of {len} items exceeds the limit of {max}")]
    RangeTooLarge { len: u64, max: u64 },

    #[error("expected {expected}, got {got}")]
    Conversion {
        expected: &'static str,
        got: &'static str,
    },

    #[error("predicate must return a bool, got {0}")]
    NotAPredicate(&'static str),

    #[error("{0} is not callable")]
    NotCallable(&'static str),

    #[error("invalid regular expression: {0}")]
    Regex(#[from] regex::Error),

    #[error("{0}")]
    Host(String),

    #[error("{0}")]
    Eval(ErrorList),
}

/// A dynamically typed script value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Number(f64),
    String(String),
    Bool(bool),
    Array(Array),
    Expando(Expando),
    KeyValue(Box<KeyValuePair>),
    Closure(Closure),
    Reference(Reference),
    Path(PathValue),
    Step(StepValue),
}

/// Growable, shared sequence of values.
#[derive(Clone, Default)]
pub struct Array(Arc<RwLock<Vec<Value>>>);

/// Shared string-keyed map that remembers insertion order.
#[derive(Clone, Default)]
pub struct Expando(Arc<RwLock<IndexMap<String, Value>>>);

#[derive(Debug, Clone, PartialEq)]
pub struct KeyValuePair {
    pub key: String,
    pub value: Value,
}

/// A closure literal bound to the scope it was created in.
#[derive(Clone)]
pub struct Closure {
    expr: Arc<ClosureExpr>,
    scope: Scope,
}

/// A host step as seen by scripts.
#[derive(Clone)]
pub struct StepValue {
    pub name: String,
    pub step: Arc<dyn Step>,
}

/// Call arguments in source order. Positional entries have an empty key.
#[derive(Debug, Clone, Default)]
pub struct Arguments(Vec<KeyValuePair>);

impl Value {
    /// Short type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Bool(_) => "bool",
            Value::Array(_) => "array",
            Value::Expando(_) => "expando",
            Value::KeyValue(_) => "keyValue",
            Value::Closure(_) => "closure",
            Value::Reference(_) => "reference",
            Value::Path(_) => "path",
            Value::Step(_) => "step",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_closure(&self) -> Option<&Closure> {
        match self {
            Value::Closure(c) => Some(c),
            _ => None,
        }
    }

    pub fn array(values: Vec<Value>) -> Value {
        Value::Array(Array::new(values))
    }

    pub fn expando<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Value {
        Value::Expando(Expando::from_entries(entries))
    }

    /// Path cursors are transient; anything that outlives an expression sees
    /// them as plain arrays.
    pub fn materialize(self) -> Value {
        match self {
            Value::Path(path) => Value::array(path.into_items()),
            other => other,
        }
    }

    /// Copy with fresh collection handles all the way down.
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::Array(a) => Value::array(a.to_vec().iter().map(Value::deep_copy).collect()),
            Value::Expando(e) => Value::expando(
                e.entries()
                    .into_iter()
                    .map(|(k, v)| (k, v.deep_copy())),
            ),
            Value::KeyValue(kv) => Value::KeyValue(Box::new(KeyValuePair {
                key: kv.key.clone(),
                value: kv.value.deep_copy(),
            })),
            other => other.clone(),
        }
    }

    /// Attribute access: `value.name`.
    pub fn get_field(&self, name: &str) -> Result<Value, ValueError> {
        match self {
            Value::Nil => Err(ValueError::NilAccess(name.to_string())),
            Value::Expando(e) => Ok(e.get(name).unwrap_or(Value::Nil)),
            Value::Array(a) => match name {
                "size" | "length" => Ok(Value::from(a.len())),
                _ => match name.parse::<i64>() {
                    Ok(index) => a.get(index),
                    Err(_) => Err(self.unknown_member(name)),
                },
            },
            Value::String(s) => match name {
                "size" | "length" => Ok(Value::from(s.chars().count())),
                _ => Err(self.unknown_member(name)),
            },
            Value::KeyValue(kv) => match name {
                "key" => Ok(Value::String(kv.key.clone())),
                "value" => Ok(kv.value.clone()),
                _ => Err(self.unknown_member(name)),
            },
            Value::Reference(r) => r.get_field(name),
            Value::Path(p) => p.get_field(name),
            _ => Err(self.unknown_member(name)),
        }
    }

    /// Attribute assignment: `value.name = new`.
    pub fn set_field(&self, name: &str, value: Value) -> Result<(), ValueError> {
        match self {
            Value::Nil => Err(ValueError::NilAccess(name.to_string())),
            Value::Expando(e) => {
                e.insert(name, value);
                Ok(())
            }
            Value::Array(a) => match name.parse::<i64>() {
                Ok(index) => a.set(index, value),
                Err(_) => Err(self.unknown_member(name)),
            },
            Value::Reference(r) => r.set_field(name, value),
            Value::Path(p) => {
                for item in p.items() {
                    item.set_field(name, value.clone())?;
                }
                Ok(())
            }
            _ => Err(self.unknown_member(name)),
        }
    }

    /// Bracket access: `value[index]`.
    pub fn index(&self, index: &Value) -> Result<Value, ValueError> {
        match (self, index) {
            (Value::Nil, _) => Err(ValueError::NilAccess(format!("index {}", index))),
            (Value::Array(a), Value::Number(n)) => a.get(integral(*n, index)?),
            (Value::Path(p), Value::Number(n)) => {
                Array::new(p.items().to_vec()).get(integral(*n, index)?)
            }
            (Value::String(s), Value::Number(n)) => {
                let i = integral(*n, index)?;
                let len = s.chars().count();
                usize::try_from(i)
                    .ok()
                    .and_then(|i| s.chars().nth(i))
                    .map(|c| Value::String(c.to_string()))
                    .ok_or_else(|| ValueError::IndexOutOfRange {
                        index: index.to_string(),
                        len,
                    })
            }
            (Value::Expando(_) | Value::Reference(_) | Value::KeyValue(_), _) => {
                self.get_field(&index.to_string())
            }
            _ => Err(ValueError::TypeMismatch {
                op: "[]".to_string(),
                left: self.type_name(),
                right: index.type_name(),
            }),
        }
    }

    /// Bracket assignment: `value[index] = new`.
    pub fn set_index(&self, index: &Value, value: Value) -> Result<(), ValueError> {
        match (self, index) {
            (Value::Array(a), Value::Number(n)) => a.set(integral(*n, index)?, value),
            (Value::Expando(_) | Value::Reference(_) | Value::Nil, _) => {
                self.set_field(&index.to_string(), value)
            }
            _ => Err(ValueError::TypeMismatch {
                op: "[]=".to_string(),
                left: self.type_name(),
                right: index.type_name(),
            }),
        }
    }

    /// Member call: `value.name(args)`.
    pub fn invoke_func(&self, name: &str, args: &Arguments) -> Result<Value, ValueError> {
        match self {
            Value::Nil => Err(ValueError::NilAccess(format!("method {}", name))),
            Value::Array(a) => match name {
                "add" => {
                    for arg in args.values() {
                        a.add_range(arg.clone());
                    }
                    Ok(self.clone())
                }
                _ => path::invoke_collection(&a.to_vec(), name, args)
                    .unwrap_or_else(|| Err(self.unknown_method(name))),
            },
            Value::Path(p) => p.invoke_func(name, args),
            Value::Expando(e) => match e.get(name) {
                Some(Value::Closure(closure)) => closure.call(args.clone().into_positional()?),
                _ => match name {
                    "containsKey" => {
                        let key = args.expect_one()?;
                        Ok(Value::Bool(e.contains_key(&key.to_string())))
                    }
                    "keys" => Ok(Value::array(
                        e.keys().into_iter().map(Value::String).collect(),
                    )),
                    "values" => Ok(Value::array(e.values())),
                    "entries" => Ok(Value::array(
                        e.entries()
                            .into_iter()
                            .map(|(key, value)| Value::KeyValue(Box::new(KeyValuePair { key, value })))
                            .collect(),
                    )),
                    "size" => Ok(Value::from(e.len())),
                    _ => Err(self.unknown_method(name)),
                },
            },
            Value::String(s) => string_method(s, name, args)
                .unwrap_or_else(|| Err(self.unknown_method(name))),
            Value::Reference(r) => r.invoke(name, args),
            _ => Err(self.unknown_method(name)),
        }
    }

    /// Binary operator dispatch. `&&` and `||` short-circuit in the
    /// evaluator before reaching here.
    pub fn invoke_op(&self, op: BinOp, other: &Value) -> Result<Value, ValueError> {
        match op {
            BinOp::Equal => return Ok(Value::Bool(self == other)),
            BinOp::NotEqual => return Ok(Value::Bool(self != other)),
            _ => {}
        }

        match (self, other) {
            (Value::Number(a), Value::Number(b)) => number_op(op, *a, *b),
            (Value::String(a), Value::String(b)) if op.is_comparison() => {
                Ok(Value::Bool(compare(op, a.as_str().cmp(b.as_str()))))
            }
            (Value::String(a), _) if op == BinOp::Add => {
                Ok(Value::String(format!("{}{}", a, other)))
            }
            (Value::Bool(a), Value::Bool(b)) if op == BinOp::And => Ok(Value::Bool(*a && *b)),
            (Value::Bool(a), Value::Bool(b)) if op == BinOp::Or => Ok(Value::Bool(*a || *b)),
            (Value::Array(a), _) if op == BinOp::Add => {
                let result = Array::new(a.to_vec());
                result.add_range(other.clone());
                Ok(Value::Array(result))
            }
            _ => Err(ValueError::TypeMismatch {
                op: op.to_string(),
                left: self.type_name(),
                right: other.type_name(),
            }),
        }
    }

    pub fn invoke_unary(&self, op: UnaryOp) -> Result<Value, ValueError> {
        match (op, self) {
            (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
            (UnaryOp::Negate, Value::Number(n)) => Ok(Value::Number(-n)),
            _ => Err(ValueError::UnaryMismatch {
                op: op.to_string(),
                operand: self.type_name(),
            }),
        }
    }

    /// Direct children, as visited by the `*` path segment.
    pub fn children(&self) -> Result<Vec<Value>, ValueError> {
        match self {
            Value::Array(a) => Ok(a.to_vec()),
            Value::Expando(e) => Ok(e.values()),
            Value::Path(p) => {
                let mut out = Vec::new();
                for item in p.items() {
                    if let Ok(children) = item.children() {
                        out.extend(children);
                    }
                }
                Ok(out)
            }
            Value::KeyValue(kv) => Ok(vec![kv.value.clone()]),
            Value::Reference(r) => r.children(),
            _ => Err(ValueError::NotTraversable(self.type_name().to_string())),
        }
    }

    /// Every descendant in depth-first pre-order, as visited by `**`.
    pub fn descendants(&self) -> Result<Vec<Value>, ValueError> {
        let mut out = Vec::new();
        for child in self.children()? {
            let nested = child.children().is_ok();
            out.push(child.clone());
            if nested {
                out.extend(child.descendants()?);
            }
        }
        Ok(out)
    }

    fn unknown_member(&self, name: &str) -> ValueError {
        ValueError::UnknownMember {
            type_name: self.type_name().to_string(),
            name: name.to_string(),
        }
    }

    fn unknown_method(&self, name: &str) -> ValueError {
        ValueError::UnknownMethod {
            type_name: self.type_name().to_string(),
            name: name.to_string(),
        }
    }
}

fn integral(n: f64, original: &Value) -> Result<i64, ValueError> {
    if n.fract() == 0.0 && n.is_finite() {
        Ok(n as i64)
    } else {
        Err(ValueError::Conversion {
            expected: "integer index",
            got: original.type_name(),
        })
    }
}

fn compare(op: BinOp, ordering: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        BinOp::LessThan => ordering == Less,
        BinOp::LessEqual => ordering != Greater,
        BinOp::GreaterThan => ordering == Greater,
        BinOp::GreaterEqual => ordering != Less,
        _ => false,
    }
}

/// Exact decimal arithmetic where both operands fit, so `0.1 + 0.2` is `0.3`.
fn decimal_op(a: f64, b: f64, f: fn(Decimal, Decimal) -> Option<Decimal>) -> Option<f64> {
    let ad = Decimal::from_f64(a)?;
    let bd = Decimal::from_f64(b)?;
    f(ad, bd)?.to_f64()
}

fn number_op(op: BinOp, a: f64, b: f64) -> Result<Value, ValueError> {
    let n = match op {
        BinOp::Add => decimal_op(a, b, Decimal::checked_add).unwrap_or(a + b),
        BinOp::Subtract => decimal_op(a, b, Decimal::checked_sub).unwrap_or(a - b),
        BinOp::Multiply => decimal_op(a, b, Decimal::checked_mul).unwrap_or(a * b),
        BinOp::Divide => {
            if b == 0.0 {
                return Err(ValueError::DivisionByZero);
            }
            a / b
        }
        BinOp::Modulo => {
            if a.fract() != 0.0 || b.fract() != 0.0 {
                return Err(ValueError::NonIntegral(format_number(a), format_number(b)));
            }
            if b == 0.0 {
                return Err(ValueError::DivisionByZero);
            }
            a % b
        }
        BinOp::LessThan | BinOp::LessEqual | BinOp::GreaterThan | BinOp::GreaterEqual => {
            let ordering = a.partial_cmp(&b).ok_or(ValueError::TypeMismatch {
                op: op.to_string(),
                left: "NaN",
                right: "number",
            })?;
            return Ok(Value::Bool(compare(op, ordering)));
        }
        _ => {
            return Err(ValueError::TypeMismatch {
                op: op.to_string(),
                left: "number",
                right: "number",
            });
        }
    };
    Ok(Value::Number(n))
}

fn string_method(s: &str, name: &str, args: &Arguments) -> Option<Result<Value, ValueError>> {
    let text_arg = |args: &Arguments| -> Result<String, ValueError> {
        let value = args.expect_one()?;
        String::from_value(value)
    };

    Some(match name {
        "size" | "length" => Ok(Value::from(s.chars().count())),
        "contains" => text_arg(args).map(|t| Value::Bool(s.contains(&t))),
        "startsWith" => text_arg(args).map(|t| Value::Bool(s.starts_with(&t))),
        "endsWith" => text_arg(args).map(|t| Value::Bool(s.ends_with(&t))),
        "matches" => text_arg(args).and_then(|pattern| {
            let re = regex::Regex::new(&pattern)?;
            Ok(Value::Bool(re.is_match(s)))
        }),
        "toUpper" => Ok(Value::String(s.to_uppercase())),
        "toLower" => Ok(Value::String(s.to_lowercase())),
        "trim" => Ok(Value::String(s.trim().to_string())),
        "split" => text_arg(args).map(|sep| {
            Value::array(s.split(sep.as_str()).map(Value::from).collect())
        }),
        _ => return None,
    })
}

/// Renders a number the way scripts expect: integral values without a
/// fractional part.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("NULL"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Array(a) => guarded(f, a.id(), |f| write_list(f, &a.to_vec())),
            Value::Path(p) => write_list(f, p.items()),
            Value::Expando(e) => guarded(f, e.id(), |f| {
                f.write_str("{")?;
                for (i, (k, v)) in e.entries().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }),
            Value::KeyValue(kv) => write!(f, "{}: {}", kv.key, kv.value),
            Value::Closure(c) => write!(f, "closure({})", c.params().join(", ")),
            Value::Reference(r) => f.write_str(&r.render()),
            Value::Step(s) => write!(f, "step {}", s.name),
        }
    }
}

thread_local! {
    /// Collections currently being rendered on this thread.
    static RENDERING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Renders the collection `id` with `body`, or `<cycle>` when it is already
/// being rendered further up.
fn guarded(
    f: &mut fmt::Formatter<'_>,
    id: usize,
    body: impl FnOnce(&mut fmt::Formatter<'_>) -> fmt::Result,
) -> fmt::Result {
    if RENDERING.with(|r| r.borrow().contains(&id)) {
        return f.write_str("<cycle>");
    }
    RENDERING.with(|r| r.borrow_mut().push(id));
    let result = body(f);
    RENDERING.with(|r| r.borrow_mut().pop());
    result
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    f.write_str("[")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    f.write_str("]")
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            other => write!(f, "{}({})", other.type_name(), other),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b) || a.to_vec() == b.to_vec(),
            (Value::Array(a), Value::Path(p)) | (Value::Path(p), Value::Array(a)) => {
                a.to_vec().as_slice() == p.items()
            }
            (Value::Path(a), Value::Path(b)) => a.items() == b.items(),
            (Value::Expando(a), Value::Expando(b)) => a.ptr_eq(b) || a.same_entries(b),
            (Value::KeyValue(a), Value::KeyValue(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => Arc::ptr_eq(&a.expr, &b.expr),
            (Value::Reference(a), Value::Reference(b)) => a.ptr_eq(b),
            (Value::Step(a), Value::Step(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(&a.step), Arc::as_ptr(&b.step))
            }
            _ => false,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::array(values)
    }
}

impl From<Reference> for Value {
    fn from(r: Reference) -> Self {
        Value::Reference(r)
    }
}

impl Array {
    pub fn new(values: Vec<Value>) -> Self {
        Array(Arc::new(RwLock::new(values)))
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    /// Snapshot of the current elements.
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.read().clone()
    }

    pub fn get(&self, index: i64) -> Result<Value, ValueError> {
        let items = self.0.read();
        usize::try_from(index)
            .ok()
            .and_then(|i| items.get(i).cloned())
            .ok_or(ValueError::IndexOutOfRange {
                index: index.to_string(),
                len: items.len(),
            })
    }

    pub fn set(&self, index: i64, value: Value) -> Result<(), ValueError> {
        let mut items = self.0.write();
        let len = items.len();
        match usize::try_from(index).ok().and_then(|i| items.get_mut(i)) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(ValueError::IndexOutOfRange {
                index: index.to_string(),
                len,
            }),
        }
    }

    pub fn push(&self, value: Value) {
        self.0.write().push(value);
    }

    /// Appends `value`, splicing in its elements when it is itself an array.
    pub fn add_range(&self, value: Value) {
        match value.materialize() {
            Value::Array(other) => {
                let items = other.to_vec();
                self.0.write().extend(items);
            }
            other => self.push(other),
        }
    }

    pub fn ptr_eq(&self, other: &Array) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn id(&self) -> usize {
        Arc::as_ptr(&self.0).cast::<()>() as usize
    }
}

impl Expando {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Expando(Arc::new(RwLock::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )))
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.read().get(key).cloned()
    }

    /// Inserts or replaces; a replaced key keeps its original position.
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.0.write().insert(key.into(), value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.read().keys().cloned().collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.0.read().values().cloned().collect()
    }

    /// Snapshot of the entries in insertion order.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.0
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn ptr_eq(&self, other: &Expando) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn id(&self) -> usize {
        Arc::as_ptr(&self.0).cast::<()>() as usize
    }

    fn same_entries(&self, other: &Expando) -> bool {
        let mine = self.entries();
        let theirs = other.entries();
        mine.len() == theirs.len()
            && mine
                .iter()
                .all(|(k, v)| theirs.iter().any(|(k2, v2)| k == k2 && v == v2))
    }
}

impl Closure {
    pub(crate) fn new(expr: Arc<ClosureExpr>, scope: Scope) -> Self {
        Closure { expr, scope }
    }

    pub fn params(&self) -> &[String] {
        &self.expr.params
    }

    /// Runs the body in a fresh scope under the captured one and returns the
    /// value of its last statement.
    pub fn call(&self, args: Vec<Value>) -> Result<Value, ValueError> {
        if args.len() != self.expr.params.len() {
            return Err(ValueError::Arity {
                expected: self.expr.params.len(),
                got: args.len(),
            });
        }

        let scope = self.scope.child();
        for (name, value) in self.expr.params.iter().zip(args) {
            scope.insert(name.clone(), value);
        }

        let mut evaluator = Evaluator::new(scope);
        evaluator
            .exec_block(&self.expr.body)
            .map_err(|e| ValueError::Eval(ErrorList::from(e)))
    }
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional(values: impl IntoIterator<Item = Value>) -> Self {
        Arguments(
            values
                .into_iter()
                .map(|value| KeyValuePair {
                    key: String::new(),
                    value,
                })
                .collect(),
        )
    }

    pub fn push(&mut self, name: Option<String>, value: Value) {
        self.0.push(KeyValuePair {
            key: name.unwrap_or_default(),
            value,
        });
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, KeyValuePair> {
        self.0.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.0.iter().map(|kv| &kv.value)
    }

    /// Argument bound to `name`, or else the `position`-th positional one.
    pub fn get(&self, position: usize, name: &str) -> Option<&Value> {
        self.0
            .iter()
            .find(|kv| kv.key == name)
            .or_else(|| self.0.iter().filter(|kv| kv.key.is_empty()).nth(position))
            .map(|kv| &kv.value)
    }

    /// Entries keyed for host calls: positional arguments become `"0"`,
    /// `"1"`, ... by their position among positional arguments.
    pub fn keyed(&self) -> Vec<KeyValuePair> {
        let mut position = 0;
        self.0
            .iter()
            .map(|kv| {
                if kv.key.is_empty() {
                    let key = position.to_string();
                    position += 1;
                    KeyValuePair {
                        key,
                        value: kv.value.clone(),
                    }
                } else {
                    kv.clone()
                }
            })
            .collect()
    }

    /// Values for a closure call, which only binds by position.
    pub fn into_positional(self) -> Result<Vec<Value>, ValueError> {
        self.0
            .into_iter()
            .map(|kv| {
                if kv.key.is_empty() {
                    Ok(kv.value)
                } else {
                    Err(ValueError::Host(format!(
                        "closures take positional arguments only, got {}",
                        kv.key
                    )))
                }
            })
            .collect()
    }

    pub fn expect_one(&self) -> Result<Value, ValueError> {
        match self.0.as_slice() {
            [only] => Ok(only.value.clone()),
            _ => Err(ValueError::Arity {
                expected: 1,
                got: self.0.len(),
            }),
        }
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.to_vec()).finish()
    }
}

impl fmt::Debug for Expando {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries()).finish()
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("params", &self.expr.params)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for StepValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepValue").field("name", &self.name).finish()
    }
}
