use std::time::Duration;

use rand::Rng;
use tracing::info;

use crate::{
    host::HostContext,
    step::{Context, Execution, Parameter, Step, StepError, convert},
    value::Value,
};

/// `echo message` logs the rendered message.
pub struct Echo;

#[derive(Default)]
struct EchoExecution {
    message: Value,
}

impl Step for Echo {
    fn start(&self) -> Box<dyn Execution> {
        Box::new(EchoExecution::default())
    }
}

impl Execution for EchoExecution {
    fn parameters(&self) -> Vec<Parameter> {
        vec![Parameter::tagged("message", "position=0,required")]
    }

    fn bind(&mut self, field: &str, value: Value) -> Result<(), StepError> {
        match field {
            "message" => self.message = value,
            _ => return Err(StepError::UnknownField(field.to_string())),
        }
        Ok(())
    }

    fn run(&mut self, _ctx: &Context<'_>) -> Result<Value, StepError> {
        info!(target: "pipeline::echo", "{}", self.message);
        Ok(Value::Nil)
    }
}

/// `delay "250ms"` blocks the running pipeline.
pub struct Delay;

#[derive(Default)]
struct DelayExecution {
    duration: Duration,
}

impl Step for Delay {
    fn start(&self) -> Box<dyn Execution> {
        Box::new(DelayExecution::default())
    }
}

impl Execution for DelayExecution {
    fn parameters(&self) -> Vec<Parameter> {
        vec![Parameter::tagged("duration", "position=0,required")]
    }

    fn bind(&mut self, field: &str, value: Value) -> Result<(), StepError> {
        match field {
            "duration" => self.duration = convert(field, value)?,
            _ => return Err(StepError::UnknownField(field.to_string())),
        }
        Ok(())
    }

    fn run(&mut self, _ctx: &Context<'_>) -> Result<Value, StepError> {
        std::thread::sleep(self.duration);
        Ok(Value::Nil)
    }
}

/// `random 10` is an integer in `[0, 10)`; `random(max: 1, type: "float")`
/// a float in `[0, 1)`. Without a positive, finite `max` integers span the
/// whole `u32` range and floats `[0, 1)`.
pub struct Random;

#[derive(Default)]
struct RandomExecution {
    max: f64,
    kind: String,
}

impl Step for Random {
    fn start(&self) -> Box<dyn Execution> {
        Box::new(RandomExecution::default())
    }
}

impl Execution for RandomExecution {
    fn parameters(&self) -> Vec<Parameter> {
        vec![
            Parameter::tagged("max", "position=0"),
            Parameter::tagged("kind", "name=type,position=1"),
        ]
    }

    fn bind(&mut self, field: &str, value: Value) -> Result<(), StepError> {
        match field {
            "max" => self.max = convert(field, value)?,
            "kind" => self.kind = convert(field, value)?,
            _ => return Err(StepError::UnknownField(field.to_string())),
        }
        Ok(())
    }

    fn run(&mut self, _ctx: &Context<'_>) -> Result<Value, StepError> {
        let mut rng = rand::thread_rng();
        let bounded = self.max.is_finite() && self.max > 0.0;
        let n = match (self.kind.as_str(), bounded) {
            ("float", true) => rng.gen_range(0.0..self.max),
            ("float", false) => rng.r#gen::<f64>(),
            (_, true) if self.max >= 1.0 => rng.gen_range(0..self.max as u64) as f64,
            (_, true) => 0.0,
            (_, false) => f64::from(rng.r#gen::<u32>()),
        };
        Ok(Value::Number(n))
    }
}

/// `getContext "env"` returns a host object registered with
/// [`crate::host::with_context`].
pub struct GetContext;

#[derive(Default)]
struct GetContextExecution {
    name: String,
}

impl Step for GetContext {
    fn start(&self) -> Box<dyn Execution> {
        Box::new(GetContextExecution::default())
    }
}

impl Execution for GetContextExecution {
    fn parameters(&self) -> Vec<Parameter> {
        vec![Parameter::tagged("name", "position=0,required")]
    }

    fn bind(&mut self, field: &str, value: Value) -> Result<(), StepError> {
        match field {
            "name" => self.name = convert(field, value)?,
            _ => return Err(StepError::UnknownField(field.to_string())),
        }
        Ok(())
    }

    fn run(&mut self, ctx: &Context<'_>) -> Result<Value, StepError> {
        let registry = ctx
            .get::<HostContext>()
            .ok_or_else(|| StepError::Failed("no host context registered".to_string()))?;
        registry
            .get(&self.name)
            .map(Value::Reference)
            .ok_or_else(|| StepError::Failed(format!("no context object named {:?}", self.name)))
    }
}
