use tracing::debug;

use crate::{
    ast::Argument,
    error::{Error, Position},
    evaluator::{Evaluator, value_error},
    step::{Context, bind_arguments},
    value::{Arguments, StepValue, Value, ValueError},
};

impl Evaluator {
    /// Evaluates arguments left to right. Positional entries keep an empty
    /// key.
    pub(super) fn eval_arguments(&mut self, args: &[Argument]) -> Result<Arguments, Error> {
        let mut out = Arguments::new();
        for arg in args {
            let value = self.eval_expression(&arg.value)?;
            out.push(arg.name.clone(), value);
        }
        Ok(out)
    }

    pub(super) fn call_value(
        &mut self,
        callee: Value,
        args: Arguments,
        pos: Position,
    ) -> Result<Value, Error> {
        match callee {
            Value::Step(step) => self.run_step(&step, &args, pos),
            Value::Closure(closure) => args
                .into_positional()
                .and_then(|args| closure.call(args))
                .map_err(|e| value_error(pos, e)),
            other => Err(value_error(pos, ValueError::NotCallable(other.type_name()))),
        }
    }

    /// `object.name args`. Steps and closures stored as members are called
    /// directly; everything else is a method of the value.
    pub(super) fn call_member(
        &mut self,
        object: &Value,
        name: &str,
        args: Arguments,
        pos: Position,
    ) -> Result<Value, Error> {
        if let Value::Expando(map) = object
            && let Some(member @ Value::Step(_)) = map.get(name)
        {
            return self.call_value(member, args, pos);
        }
        object
            .invoke_func(name, &args)
            .map_err(|e| value_error(pos, e))
    }

    /// Starts a fresh execution, binds the arguments into it and runs it
    /// with the current scope as its context.
    fn run_step(&mut self, step: &StepValue, args: &Arguments, pos: Position) -> Result<Value, Error> {
        debug!(step = %step.name, args = args.len(), "calling step");
        let mut execution = step.step.start();
        bind_arguments(&step.name, execution.as_mut(), args).map_err(|e| Error::new(pos, e))?;

        let ctx = Context::new(&self.scope, &step.name);
        execution
            .run(&ctx)
            .map(Value::materialize)
            .map_err(|e| Error::new(pos, e))
    }
}
