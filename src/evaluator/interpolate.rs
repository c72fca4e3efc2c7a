//! `$name` and `${expr}` substitution in double-quoted strings.

use crate::{
    error::{Error, Position},
    evaluator::Evaluator,
    parser::parse_expression,
    scope::{Scope, ScopeError},
};

/// Cooks a double-quoted literal body. `\$`, `\\` and `\"` produce the
/// escaped character; `$name` and `${expr}` are replaced by the rendered
/// value, with nil rendering as `NULL`.
pub(crate) fn interpolate(body: &str, scope: &Scope, pos: Position) -> Result<String, Error> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        match ch {
            '\\' => {
                if let Some((_, escaped)) = chars.next() {
                    out.push(escaped);
                }
            }
            '$' => match chars.peek().map(|&(_, c)| c) {
                Some('{') => {
                    let start = i + 2;
                    let end = closing_brace(body, start).ok_or_else(|| {
                        Error::new(pos, "unterminated ${ in string literal")
                    })?;
                    out.push_str(&evaluate(&body[start..end], scope, pos)?);
                    while chars.peek().is_some_and(|&(j, _)| j <= end) {
                        chars.next();
                    }
                }
                Some(c) if c.is_alphabetic() || c == '_' => {
                    let mut name = String::new();
                    while let Some(&(_, c)) = chars.peek() {
                        if c.is_alphanumeric() || c == '_' {
                            name.push(c);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    let value = scope
                        .lookup(&name)
                        .ok_or_else(|| Error::new(pos, ScopeError::Undefined(name)))?;
                    out.push_str(&value.materialize().to_string());
                }
                _ => out.push('$'),
            },
            _ => out.push(ch),
        }
    }
    Ok(out)
}

/// Byte offset of the `}` closing an expression starting at `start`,
/// skipping nested braces and quoted strings.
fn closing_brace(body: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (offset, ch) in body[start..].char_indices() {
        if let Some(q) = quote {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                c if c == q => quote = None,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '{' => depth += 1,
            '}' if depth == 0 => return Some(start + offset),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

fn evaluate(src: &str, scope: &Scope, pos: Position) -> Result<String, Error> {
    let expr = parse_expression(src, scope)
        .map_err(|errors| Error::new(pos, format!("in ${{{}}}: {}", src, errors)))?;
    let value = Evaluator::new(scope.clone())
        .eval_expression(&expr)
        .map_err(|e| Error::new(pos, format!("in ${{{}}}: {}", src, e.message)))?;
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn scope() -> Scope {
        let scope = Scope::new();
        scope.insert("name", Value::from("world"));
        scope.insert("n", Value::from(3));
        scope.insert("missing", Value::Nil);
        scope
    }

    fn cook(body: &str) -> String {
        interpolate(body, &scope(), Position::default()).unwrap()
    }

    #[test]
    fn test_names_and_expressions() {
        assert_eq!(cook("hello $name!"), "hello world!");
        assert_eq!(cook("${n * 2} items"), "6 items");
        assert_eq!(cook("${ [a: n] }"), "{a: 3}");
        assert_eq!(cook("value: $missing"), "value: NULL");
    }

    #[test]
    fn test_escapes_suppress_interpolation() {
        assert_eq!(cook(r"costs \$5"), "costs $5");
        assert_eq!(cook(r#"say \"hi\""#), r#"say "hi""#);
        assert_eq!(cook(r"back\\slash"), r"back\slash");
        assert_eq!(cook("lone $ sign"), "lone $ sign");
    }

    #[test]
    fn test_undefined_name_is_an_error() {
        assert!(interpolate("$nope", &scope(), Position::default()).is_err());
        assert!(interpolate("${n +}", &scope(), Position::default()).is_err());
        assert!(interpolate("${n", &scope(), Position::default()).is_err());
    }
}
