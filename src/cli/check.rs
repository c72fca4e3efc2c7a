//! Parse a script and summarize what it would run

use std::fmt;

use crate::{
    ast::{ExprKind, Node, Segment, Stage, Visitor, walk},
    host::run_scope,
    parser::parse_file,
};

use super::CliError;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Summary {
    pub pipelines: Vec<PipelineSummary>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineSummary {
    pub name: String,
    pub variables: usize,
    pub stages: Vec<StageSummary>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StageSummary {
    pub name: String,
    pub conditional: bool,
    /// Steps and methods invoked, in source order.
    pub calls: Vec<String>,
}

/// Parses `source` against a default run scope. Syntax and resolution
/// errors come back as [`CliError::Script`].
pub fn execute_check(source: &str) -> Result<Summary, CliError> {
    let scope = run_scope(&[]);
    let file = parse_file(source, &scope)?;

    let mut summary = Summary::default();
    for pipeline in &file.pipelines {
        summary.pipelines.push(PipelineSummary {
            name: pipeline.name.clone(),
            variables: pipeline.vars.as_ref().map_or(0, |v| v.specs.len()),
            stages: pipeline.stages.iter().map(summarize_stage).collect(),
        });
    }
    Ok(summary)
}

fn summarize_stage(stage: &Stage) -> StageSummary {
    let mut calls = CallCollector::default();
    walk(&mut calls, Node::Stage(stage));
    StageSummary {
        name: stage.name.clone(),
        conditional: stage.when.is_some(),
        calls: calls.names,
    }
}

#[derive(Default)]
struct CallCollector {
    names: Vec<String>,
}

impl<'a> Visitor<'a> for CallCollector {
    fn visit(&mut self, node: Node<'a>) -> bool {
        if let Node::Expr(expr) = node {
            match &expr.kind {
                ExprKind::Call { func, .. } => {
                    if let ExprKind::Ident(name) = &func.kind {
                        self.names.push(name.clone());
                    }
                }
                ExprKind::Path(path) if path.args.is_some() => {
                    if let Segment::Name(name) = &path.segment {
                        self.names.push(format!(".{}", name));
                    }
                }
                _ => {}
            }
        }
        true
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pipeline in &self.pipelines {
            writeln!(
                f,
                "pipeline {:?}: {} variable(s), {} stage(s)",
                pipeline.name,
                pipeline.variables,
                pipeline.stages.len()
            )?;
            for stage in &pipeline.stages {
                let when = if stage.conditional { " (conditional)" } else { "" };
                writeln!(f, "  stage {:?}{}", stage.name, when)?;
                if !stage.calls.is_empty() {
                    writeln!(f, "    calls: {}", stage.calls.join(", "))?;
                }
            }
        }
        Ok(())
    }
}
