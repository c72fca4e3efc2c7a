//! JSON / YAML <-> script value conversion

use crate::value::{Value, format_number};

/// Convert serde_json::Value to a script Value
pub fn from_json(v: serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Nil,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Nil),
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(arr) => Value::array(arr.into_iter().map(from_json).collect()),
        serde_json::Value::Object(obj) => {
            Value::expando(obj.into_iter().map(|(k, v)| (k, from_json(v))))
        }
    }
}

/// Convert serde_yaml::Value to a script Value. Non-string keys are
/// rendered to text; tags are dropped.
pub fn from_yaml(v: serde_yaml::Value) -> Value {
    match v {
        serde_yaml::Value::Null => Value::Nil,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Nil),
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(seq) => {
            Value::array(seq.into_iter().map(from_yaml).collect())
        }
        serde_yaml::Value::Mapping(map) => Value::expando(
            map.into_iter()
                .map(|(k, v)| (from_yaml(k).to_string(), from_yaml(v))),
        ),
        serde_yaml::Value::Tagged(tagged) => from_yaml(tagged.value),
    }
}

/// Convert a script Value to serde_json::Value. Values without a JSON form
/// (closures, steps) become their rendered text.
pub fn to_json(v: &Value) -> serde_json::Value {
    match v {
        Value::Nil => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 9.0e15 {
                serde_json::Value::Number((*n as i64).into())
            } else {
                serde_json::Number::from_f64(*n)
                    .map(serde_json::Value::Number)
                    .unwrap_or_else(|| serde_json::Value::String(format_number(*n)))
            }
        }
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Array(a) => serde_json::Value::Array(a.to_vec().iter().map(to_json).collect()),
        Value::Path(p) => serde_json::Value::Array(p.items().iter().map(to_json).collect()),
        Value::Expando(e) => serde_json::Value::Object(
            e.entries()
                .iter()
                .map(|(k, v)| (k.clone(), to_json(v)))
                .collect(),
        ),
        Value::KeyValue(kv) => {
            let mut map = serde_json::Map::new();
            map.insert(kv.key.clone(), to_json(&kv.value));
            serde_json::Value::Object(map)
        }
        Value::Reference(r) => match r.downcast_ref::<crate::value::Data>() {
            Some(data) => data.snapshot(),
            None => serde_json::Value::String(r.render()),
        },
        Value::Closure(_) | Value::Step(_) => serde_json::Value::String(v.to_string()),
    }
}
