use crate::value::{Arguments, Closure, Value, ValueError};

/// Cursor produced by the `*` and `**` path segments.
///
/// Member access on a path fans out over every item and the results form a
/// new path, so `orders.*.customer.name` reads `customer.name` of each
/// order. Items for which the member is missing (or nil) drop out. When the
/// surrounding expression is done, the path becomes an ordinary array.
#[derive(Debug, Clone, Default)]
pub struct PathValue {
    items: Vec<Value>,
}

impl PathValue {
    pub fn new(items: Vec<Value>) -> Self {
        PathValue { items }
    }

    /// Cursor over the children of `root`.
    pub fn children_of(root: &Value) -> Result<Self, ValueError> {
        Ok(PathValue::new(root.children()?))
    }

    /// Cursor over every descendant of `root`, depth first.
    pub fn descendants_of(root: &Value) -> Result<Self, ValueError> {
        Ok(PathValue::new(root.descendants()?))
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Value> {
        self.items
    }

    pub fn get_field(&self, name: &str) -> Result<Value, ValueError> {
        if name == "size" {
            return Ok(Value::from(self.items.len()));
        }

        let items = self
            .items
            .iter()
            .filter_map(|item| item.get_field(name).ok())
            .filter(|value| !value.is_nil())
            .collect();
        Ok(Value::Path(PathValue::new(items)))
    }

    /// Collection operations apply to the cursor as a whole; any other
    /// method is called on each item.
    pub fn invoke_func(&self, name: &str, args: &Arguments) -> Result<Value, ValueError> {
        if let Some(result) = invoke_collection(&self.items, name, args) {
            return result;
        }

        let mut out = Vec::with_capacity(self.items.len());
        for item in &self.items {
            let value = item.invoke_func(name, args)?;
            if !value.is_nil() {
                out.push(value);
            }
        }
        Ok(Value::Path(PathValue::new(out)))
    }
}

/// Operations shared by arrays and path cursors. `None` when `name` is not
/// one of them.
pub(crate) fn invoke_collection(
    items: &[Value],
    name: &str,
    args: &Arguments,
) -> Option<Result<Value, ValueError>> {
    Some(match name {
        "size" => Ok(Value::from(items.len())),
        "contains" => args
            .expect_one()
            .map(|needle| Value::Bool(items.iter().any(|item| *item == needle))),
        "find" => predicate(args).and_then(|f| {
            for item in items {
                if test(&f, item)? {
                    return Ok(item.clone());
                }
            }
            Ok(Value::Nil)
        }),
        "findAll" => predicate(args).and_then(|f| {
            let mut out = Vec::new();
            for item in items {
                if test(&f, item)? {
                    out.push(item.clone());
                }
            }
            Ok(Value::array(out))
        }),
        "any" => predicate(args).and_then(|f| {
            for item in items {
                if test(&f, item)? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }),
        "every" => predicate(args).and_then(|f| {
            for item in items {
                if !test(&f, item)? {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }),
        "select" => predicate(args).and_then(|f| {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(f.call(vec![item.clone()])?.materialize());
            }
            Ok(Value::array(out))
        }),
        _ => return None,
    })
}

fn predicate(args: &Arguments) -> Result<Closure, ValueError> {
    match args.expect_one()? {
        Value::Closure(closure) => Ok(closure),
        other => Err(ValueError::Conversion {
            expected: "closure",
            got: other.type_name(),
        }),
    }
}

fn test(f: &Closure, item: &Value) -> Result<bool, ValueError> {
    match f.call(vec![item.clone()])? {
        Value::Bool(b) => Ok(b),
        other => Err(ValueError::NotAPredicate(other.type_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_fan_out_skips_missing() {
        let root = Value::array(vec![
            Value::expando([("id", Value::from(1))]),
            Value::expando([("name", Value::from("x"))]),
            Value::expando([("id", Value::from(3))]),
        ]);
        let path = PathValue::children_of(&root).unwrap();
        let ids = path.get_field("id").unwrap().materialize();
        assert_eq!(ids.to_string(), "[1, 3]");
    }

    #[test]
    fn test_descendants_are_depth_first() {
        let root = Value::expando([
            ("a", Value::array(vec![Value::from(1), Value::from(2)])),
            ("b", Value::from(3)),
        ]);
        let all = PathValue::descendants_of(&root).unwrap();
        assert_eq!(Value::Path(all).to_string(), "[[1, 2], 1, 2, 3]");
    }

    #[test]
    fn test_contains() {
        let items = vec![Value::from(1), Value::from("two")];
        let args = Arguments::positional([Value::from("two")]);
        let found = invoke_collection(&items, "contains", &args).unwrap().unwrap();
        assert_eq!(found, Value::Bool(true));
    }
}
