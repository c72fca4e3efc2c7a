//! Bridge between script values and host data.
//!
//! Host objects reach scripts as [`Reference`] values. Member names written
//! in scripts are lower camel case; hosts are free to spell them in
//! snake_case or TitleCase, and [`host_names`] lists the spellings a lookup
//! should try.

use std::{any::Any, fmt, sync::Arc, time::Duration};

use parking_lot::RwLock;
use serde::Serialize;

use crate::{
    duration,
    value::{Arguments, Closure, Value, ValueError, convert},
};

/// A host value scripts can read, write and call into.
pub trait HostObject: Send + Sync {
    fn type_name(&self) -> &str;

    fn get_field(&self, name: &str) -> Result<Value, ValueError>;

    fn set_field(&self, name: &str, _value: Value) -> Result<(), ValueError> {
        Err(ValueError::UnknownMember {
            type_name: self.type_name().to_string(),
            name: name.to_string(),
        })
    }

    /// Calls a host method. Positional arguments arrive keyed `"0"`, `"1"`,
    /// ... through [`Arguments::keyed`].
    fn invoke(&self, name: &str, _args: &Arguments) -> Result<Value, ValueError> {
        Err(ValueError::UnknownMethod {
            type_name: self.type_name().to_string(),
            name: name.to_string(),
        })
    }

    fn children(&self) -> Result<Vec<Value>, ValueError> {
        Err(ValueError::NotTraversable(self.type_name().to_string()))
    }

    fn render(&self) -> String {
        format!("<{}>", self.type_name())
    }

    fn as_any(&self) -> &dyn Any;
}

/// Handle to a host object.
#[derive(Clone)]
pub struct Reference(Arc<dyn HostObject>);

impl Reference {
    pub fn new(object: impl HostObject + 'static) -> Self {
        Reference(Arc::new(object))
    }

    pub fn from_arc(object: Arc<dyn HostObject>) -> Self {
        Reference(object)
    }

    /// Wraps any serializable host value; see [`Data`].
    pub fn serialize<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Reference::new(Data::new(value)?))
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    pub fn type_name(&self) -> &str {
        self.0.type_name()
    }

    pub fn get_field(&self, name: &str) -> Result<Value, ValueError> {
        self.0.get_field(name)
    }

    pub fn set_field(&self, name: &str, value: Value) -> Result<(), ValueError> {
        self.0.set_field(name, value)
    }

    pub fn invoke(&self, name: &str, args: &Arguments) -> Result<Value, ValueError> {
        self.0.invoke(name, args)
    }

    pub fn children(&self) -> Result<Vec<Value>, ValueError> {
        self.0.children()
    }

    pub fn render(&self) -> String {
        self.0.render()
    }

    pub fn ptr_eq(&self, other: &Reference) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Reference").field(&self.type_name()).finish()
    }
}

/// Spellings to try when looking `name` up on a host value: as written,
/// snake_case, then TitleCase.
///
/// ```
/// use pipeline_lang::value::host_names;
///
/// assert_eq!(host_names("workingDir"), ["workingDir", "working_dir", "WorkingDir"]);
/// ```
pub fn host_names(name: &str) -> Vec<String> {
    let mut snake = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                snake.push('_');
            }
            snake.extend(ch.to_lowercase());
        } else {
            snake.push(ch);
        }
    }

    let mut chars = name.chars();
    let title: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };

    let mut names = vec![name.to_string()];
    for candidate in [snake, title] {
        if !names.contains(&candidate) {
            names.push(candidate);
        }
    }
    names
}

/// Host data exposed through its serde representation.
///
/// Objects answer field lookups by key (trying every [`host_names`]
/// spelling), arrays answer numeric names, and writes go back into the
/// stored document.
pub struct Data {
    type_name: String,
    value: RwLock<serde_json::Value>,
}

impl Data {
    pub fn new<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        let full = std::any::type_name::<T>();
        let short = full.rsplit("::").next().unwrap_or(full);
        Ok(Data {
            type_name: short.to_string(),
            value: RwLock::new(serde_json::to_value(value)?),
        })
    }

    pub fn from_json(value: serde_json::Value) -> Self {
        Data {
            type_name: "data".to_string(),
            value: RwLock::new(value),
        }
    }

    pub fn snapshot(&self) -> serde_json::Value {
        self.value.read().clone()
    }
}

impl HostObject for Data {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn get_field(&self, name: &str) -> Result<Value, ValueError> {
        let value = self.value.read();
        match &*value {
            serde_json::Value::Object(map) => Ok(host_names(name)
                .iter()
                .find_map(|n| map.get(n))
                .map(|v| convert::from_json(v.clone()))
                .unwrap_or(Value::Nil)),
            serde_json::Value::Array(items) => {
                if name == "size" {
                    return Ok(Value::from(items.len()));
                }
                let index: usize = name.parse().map_err(|_| ValueError::UnknownMember {
                    type_name: self.type_name.clone(),
                    name: name.to_string(),
                })?;
                items
                    .get(index)
                    .map(|v| convert::from_json(v.clone()))
                    .ok_or(ValueError::IndexOutOfRange {
                        index: name.to_string(),
                        len: items.len(),
                    })
            }
            _ => Err(ValueError::UnknownMember {
                type_name: self.type_name.clone(),
                name: name.to_string(),
            }),
        }
    }

    fn set_field(&self, name: &str, new: Value) -> Result<(), ValueError> {
        let json = convert::to_json(&new);
        let mut value = self.value.write();
        match &mut *value {
            serde_json::Value::Object(map) => {
                let key = host_names(name)
                    .into_iter()
                    .find(|n| map.contains_key(n))
                    .unwrap_or_else(|| name.to_string());
                map.insert(key, json);
                Ok(())
            }
            serde_json::Value::Array(items) => {
                let len = items.len();
                match name.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                    Some(slot) => {
                        *slot = json;
                        Ok(())
                    }
                    None => Err(ValueError::IndexOutOfRange {
                        index: name.to_string(),
                        len,
                    }),
                }
            }
            _ => Err(ValueError::UnknownMember {
                type_name: self.type_name.clone(),
                name: name.to_string(),
            }),
        }
    }

    fn children(&self) -> Result<Vec<Value>, ValueError> {
        match &*self.value.read() {
            serde_json::Value::Array(items) => {
                Ok(items.iter().cloned().map(convert::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                Ok(map.values().cloned().map(convert::from_json).collect())
            }
            _ => Err(ValueError::NotTraversable(self.type_name.clone())),
        }
    }

    fn render(&self) -> String {
        convert::from_json(self.snapshot()).to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Conversion from a script value into a host type.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, ValueError>;
}

fn mismatch(expected: &'static str, got: &Value) -> ValueError {
    ValueError::Conversion {
        expected,
        got: got.type_name(),
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        Ok(value.materialize())
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Number(n) => Ok(n),
            other => Err(mismatch("number", &other)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Number(n) if n.fract() == 0.0 => Ok(n as i64),
            other => Err(mismatch("integer", &other)),
        }
    }
}

impl FromValue for u64 {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Number(n) if n.fract() == 0.0 && n >= 0.0 => Ok(n as u64),
            other => Err(mismatch("non-negative integer", &other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch("bool", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Nil => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value.materialize() {
            Value::Array(a) => a.to_vec().into_iter().map(T::from_value).collect(),
            other => Err(mismatch("array", &other)),
        }
    }
}

/// Durations come from strings such as `"1s"` or `"250ms"`, or from a
/// number of milliseconds.
impl FromValue for Duration {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::String(s) => duration::parse(&s).map_err(|e| ValueError::Host(e.to_string())),
            Value::Number(n) if n >= 0.0 => Ok(Duration::from_nanos((n * 1e6).round() as u64)),
            other => Err(mismatch("duration", &other)),
        }
    }
}

/// A script closure handed to host code as a callable.
#[derive(Debug, Clone)]
pub struct Function(Closure);

impl Function {
    pub fn call(&self, args: Vec<Value>) -> Result<Value, ValueError> {
        self.0.call(args).map(Value::materialize)
    }

    pub fn arity(&self) -> usize {
        self.0.params().len()
    }
}

impl FromValue for Function {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Closure(c) => Ok(Function(c)),
            other => Err(mismatch("closure", &other)),
        }
    }
}
