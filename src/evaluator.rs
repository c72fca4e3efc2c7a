//! Tree-walking runtime.
//!
//! An [`Evaluator`] executes statements against one runtime [`Scope`]. Each
//! pipeline, stage and closure call gets a fresh scope chained under its
//! parent, mirroring the lexical scopes the parser recorded. A stage stops at
//! its first failing statement and the error bubbles up with the position of
//! the expression that failed.

mod calls;
mod interpolate;

use tracing::{debug, info};

use crate::{
    ast::{AssignOp, Assignment, BinOp, Block, Expr, ExprKind, File, Literal, Pipeline, Segment, Stage, Stmt},
    error::{Error, ErrorList, Position},
    scope::{Scope, ScopeError},
    value::{Closure, Expando, PathValue, Value, ValueError},
};

pub(crate) use interpolate::interpolate;

pub struct Evaluator {
    scope: Scope,
}

impl Evaluator {
    pub fn new(scope: Scope) -> Self {
        Evaluator { scope }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Runs the pipeline called `name`. A file with a single pipeline runs
    /// it whatever its name.
    pub fn run_file(&mut self, file: &File, name: &str) -> Result<Value, ErrorList> {
        match file.pipeline(name) {
            Some(pipeline) => self.run_pipeline(pipeline),
            None => Err(ErrorList::from(Error::new(
                Position::default(),
                format!("pipeline {:?} not found", name),
            ))),
        }
    }

    /// Declares the pipeline's vars, then runs its stages in order. Returns
    /// the value of the last statement executed.
    pub fn run_pipeline(&mut self, pipeline: &Pipeline) -> Result<Value, ErrorList> {
        debug!(pipeline = %pipeline.name, "running pipeline");
        let mut evaluator = Evaluator::new(self.scope.child());

        if let Some(vars) = &pipeline.vars {
            for spec in &vars.specs {
                evaluator.exec_stmt(spec)?;
            }
        }

        let mut last = Value::Nil;
        for stage in &pipeline.stages {
            last = evaluator.run_stage(stage)?;
        }
        Ok(last)
    }

    /// Runs `stage` in a scope under this evaluator's. A `when` condition
    /// that yields `false` skips the stage; any other value runs it.
    pub fn run_stage(&mut self, stage: &Stage) -> Result<Value, Error> {
        let mut evaluator = Evaluator::new(self.scope.child());

        if let Some(when) = &stage.when
            && evaluator.eval_expression(when)? == Value::Bool(false)
        {
            info!(stage = %stage.name, "skipping stage, when condition is false");
            return Ok(Value::Nil);
        }

        debug!(stage = %stage.name, "running stage");
        evaluator.exec_block(&stage.steps)
    }

    /// Executes statements in order and returns the value of the last one.
    pub(crate) fn exec_block(&mut self, block: &Block) -> Result<Value, Error> {
        let mut last = Value::Nil;
        for stmt in &block.stmts {
            last = self.exec_stmt(stmt)?;
        }
        Ok(last)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Value, Error> {
        match stmt {
            Stmt::Expr(expr) => self.eval_expression(expr),
            Stmt::Decl(decl) => {
                let value = match &decl.value {
                    Some(expr) => self.eval_expression(expr)?,
                    None => Value::Nil,
                };
                self.scope
                    .define(decl.name.clone(), value)
                    .map_err(|e| Error::new(decl.pos, e))?;
                Ok(Value::Nil)
            }
            Stmt::Assign(assign) => {
                self.exec_assign(assign)?;
                Ok(Value::Nil)
            }
        }
    }

    fn exec_assign(&mut self, assign: &Assignment) -> Result<(), Error> {
        let value = match assign.op {
            AssignOp::Define => {
                let value = self.eval_expression(&assign.rhs)?;
                let ExprKind::Ident(name) = &assign.lhs.kind else {
                    return Err(Error::new(assign.pos, "non-name on left side of :="));
                };
                return self
                    .scope
                    .define(name.clone(), value)
                    .map_err(|e| Error::new(assign.pos, e));
            }
            AssignOp::Assign => self.eval_expression(&assign.rhs)?,
            AssignOp::Compound(op) => {
                let current = self.eval_expression(&assign.lhs)?;
                let operand = self.eval_expression(&assign.rhs)?;
                current
                    .invoke_op(op, &operand)
                    .map_err(|e| value_error(assign.pos, e))?
            }
        };
        self.store(&assign.lhs, value)
    }

    /// Writes `value` to the place `target` denotes.
    fn store(&mut self, target: &Expr, value: Value) -> Result<(), Error> {
        match &target.kind {
            ExprKind::Ident(name) => self
                .scope
                .assign(name, value)
                .map_err(|e| Error::new(target.pos, e)),
            ExprKind::Path(path) => {
                let Segment::Name(name) = &path.segment else {
                    return Err(Error::new(target.pos, "cannot assign to a wildcard"));
                };
                let object = self.eval(&path.object)?;
                object
                    .set_field(name, value)
                    .map_err(|e| value_error(target.pos, e))
            }
            ExprKind::Index { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval_expression(index)?;
                object
                    .set_index(&index, value)
                    .map_err(|e| value_error(target.pos, e))
            }
            _ => Err(Error::new(target.pos, "cannot assign to this expression")),
        }
    }

    /// Evaluates `expr` to a value that can outlive it: path cursors become
    /// arrays.
    pub fn eval_expression(&mut self, expr: &Expr) -> Result<Value, Error> {
        self.eval(expr).map(Value::materialize)
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, Error> {
        let pos = expr.pos;
        match &expr.kind {
            ExprKind::Ident(name) => self
                .scope
                .lookup(name)
                .ok_or_else(|| Error::new(pos, ScopeError::Undefined(name.clone()))),

            ExprKind::Literal(Literal::Number(n)) => Ok(Value::Number(*n)),
            ExprKind::Literal(Literal::String(body)) => {
                interpolate(body, &self.scope, pos).map(Value::String)
            }
            ExprKind::Literal(Literal::RawString(text)) => Ok(Value::String(text.clone())),

            ExprKind::Binary { op, left, right } => self.eval_binary(*op, left, right, pos),

            ExprKind::Unary { op, operand } => {
                let operand = self.eval_expression(operand)?;
                operand.invoke_unary(*op).map_err(|e| value_error(pos, e))
            }

            ExprKind::Call { func, args } => {
                let callee = self.eval(func)?;
                let args = self.eval_arguments(args)?;
                self.call_value(callee, args, pos)
            }

            ExprKind::Index { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval_expression(index)?;
                object.index(&index).map_err(|e| value_error(pos, e))
            }

            ExprKind::Path(path) => {
                let object = self.eval(&path.object)?;
                let result = match (&path.segment, &path.args) {
                    (Segment::Wildcard, _) => PathValue::children_of(&object).map(Value::Path),
                    (Segment::DeepWildcard, _) => {
                        PathValue::descendants_of(&object).map(Value::Path)
                    }
                    (Segment::Name(name), Some(args)) => {
                        let args = self.eval_arguments(args)?;
                        return self.call_member(&object, name, args, pos);
                    }
                    (Segment::Name(name), None) => object.get_field(name),
                };
                result.map_err(|e| value_error(pos, e))
            }

            ExprKind::Paren(inner) => self.eval(inner),

            ExprKind::Closure(closure) => Ok(Value::Closure(Closure::new(
                closure.clone(),
                self.scope.clone(),
            ))),

            ExprKind::Sequence { values, is_map } => {
                if *is_map {
                    let map = Expando::new();
                    for entry in values {
                        match &entry.kind {
                            ExprKind::KeyValue { key, value } => {
                                map.insert(key.clone(), self.eval_expression(value)?);
                            }
                            _ => {
                                let value = self.eval_expression(entry)?;
                                map.insert(value.to_string(), value);
                            }
                        }
                    }
                    Ok(Value::Expando(map))
                } else {
                    let mut items = Vec::with_capacity(values.len());
                    for value in values {
                        items.push(self.eval_expression(value)?);
                    }
                    Ok(Value::array(items))
                }
            }

            ExprKind::KeyValue { key, value } => {
                let value = self.eval_expression(value)?;
                Ok(Value::KeyValue(Box::new(crate::value::KeyValuePair {
                    key: key.clone(),
                    value,
                })))
            }

            ExprKind::Range { start, end } => {
                let start = self.eval_expression(start)?;
                let end = self.eval_expression(end)?;
                range(&start, &end).map_err(|e| value_error(pos, e))
            }
        }
    }

    fn eval_binary(&mut self, op: BinOp, left: &Expr, right: &Expr, pos: Position) -> Result<Value, Error> {
        let left = self.eval_expression(left)?;
        match (op, &left) {
            (BinOp::And, Value::Bool(false)) => return Ok(Value::Bool(false)),
            (BinOp::Or, Value::Bool(true)) => return Ok(Value::Bool(true)),
            _ => {}
        }
        let right = self.eval_expression(right)?;
        left.invoke_op(op, &right).map_err(|e| value_error(pos, e))
    }
}

/// `a..b` over integers, inclusive at both ends and counting down when
/// `b < a`.
/// Longest range `a..b` will materialize.
pub const MAX_RANGE_LEN: u64 = 1_000_000;

fn range(start: &Value, end: &Value) -> Result<Value, ValueError> {
    match (start, end) {
        (Value::Number(a), Value::Number(b)) if a.fract() == 0.0 && b.fract() == 0.0 => {
            let (a, b) = (*a as i64, *b as i64);
            let len = a.abs_diff(b).saturating_add(1);
            if len > MAX_RANGE_LEN {
                return Err(ValueError::RangeTooLarge {
                    len,
                    max: MAX_RANGE_LEN,
                });
            }
            let items = if a <= b {
                (a..=b).map(Value::from).collect()
            } else {
                (b..=a).rev().map(Value::from).collect()
            };
            Ok(Value::array(items))
        }
        _ => Err(ValueError::RangeMismatch(start.type_name(), end.type_name())),
    }
}

/// Attaches `pos` to a value error. Errors raised inside a closure body
/// already carry their own position.
fn value_error(pos: Position, err: ValueError) -> Error {
    match err {
        ValueError::Eval(list) => match list.into_iter().next() {
            Some(first) => first,
            None => Error::new(pos, "closure evaluation failed"),
        },
        other => Error::new(pos, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;

    fn eval(src: &str) -> Value {
        let scope = Scope::new();
        scope.insert("true", Value::Bool(true));
        scope.insert("false", Value::Bool(false));
        let expr = parse_expression(src, &scope).unwrap();
        Evaluator::new(scope).eval_expression(&expr).unwrap()
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval("1 + 2 * 3"), Value::from(7));
        assert_eq!(eval("(1 + 2) * 3"), Value::from(9));
        assert_eq!(eval("10 - 4 - 3"), Value::from(3));
        assert_eq!(eval("2 * 3 == 6 && 1 < 2"), Value::Bool(true));
        assert_eq!(eval("-2 * 3"), Value::from(-6));
    }

    #[test]
    fn test_short_circuit() {
        // the right side would fail if evaluated
        assert_eq!(eval("false && 1 / 0 == 1"), Value::Bool(false));
        assert_eq!(eval("true || 1 / 0 == 1"), Value::Bool(true));
    }

    #[test]
    fn test_ranges() {
        assert_eq!(eval("1..4").to_string(), "[1, 2, 3, 4]");
        assert_eq!(eval("3..1").to_string(), "[3, 2, 1]");
        let scope = Scope::new();
        let expr = parse_expression("1..'a'", &scope).unwrap();
        assert!(Evaluator::new(scope).eval_expression(&expr).is_err());

        let Value::Array(items) = eval("0..999999") else {
            panic!("expected array");
        };
        assert_eq!(items.len(), MAX_RANGE_LEN as usize);
        let scope = Scope::new();
        let expr = parse_expression("0..1000000000000", &scope).unwrap();
        let err = Evaluator::new(scope).eval_expression(&expr).unwrap_err();
        assert_eq!(
            err.to_string(),
            "1:1: range of 1000000000001 items exceeds the limit of 1000000"
        );
    }
}
