//! Run one pipeline of a script

use tracing::info;

use crate::{
    evaluator::Evaluator,
    host::{run_scope, with_params},
    parser::parse_file,
    value::{Value, from_json},
};

use super::CliError;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub source: String,
    /// Pipeline to run; empty selects the only pipeline in the file.
    pub pipeline: String,
    pub params: Vec<(String, Value)>,
}

pub fn execute_run(options: &RunOptions) -> Result<Value, CliError> {
    let scope = run_scope(&[with_params(options.params.clone())]);
    let file = parse_file(&options.source, &scope)?;

    info!(pipeline = %options.pipeline, "running");
    let result = Evaluator::new(scope).run_file(&file, &options.pipeline)?;
    Ok(result)
}

/// Parses `name=value`. Values that read as JSON keep their type; anything
/// else is a string.
pub fn parse_param(raw: &str) -> Result<(String, Value), CliError> {
    let (name, value) = raw
        .split_once('=')
        .filter(|(name, _)| !name.trim().is_empty())
        .ok_or_else(|| CliError::InvalidParam(raw.to_string()))?;
    let value = match serde_json::from_str::<serde_json::Value>(value) {
        Ok(json) => from_json(json),
        Err(_) => Value::from(value),
    };
    Ok((name.trim().to_string(), value))
}
