//! Scheduler configuration: pipelines described in YAML and the schedules
//! that run them.
//!
//! ```yaml
//! pipelines:
//!   - name: heartbeat
//!     variables:
//!       - name: target
//!         value: api
//!       - expr: "started := 0"
//!     steps: |
//!       echo "ping ${target}"
//! schedules:
//!   - name: every-second
//!     pipeline: heartbeat
//!     every: 1s
//!     iterations: 0
//! ```
//!
//! Each pipeline is turned back into script source by
//! [`Config::to_source`] and parsed like any other script.

use std::{fmt::Write, path::Path, time::Duration};

use serde::Deserialize;

use crate::{duration, value::format_number};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("pipeline {0:?} is defined more than once")]
    DuplicatePipeline(String),

    #[error("schedule {schedule:?} refers to unknown pipeline {pipeline:?}")]
    UnknownPipeline { schedule: String, pipeline: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipelines: Vec<PipelineConfig>,
    #[serde(default)]
    pub schedules: Vec<ScheduleConfig>,
}

/// A pipeline body. Stages come from `stages`, a single `stage`, or bare
/// `steps` wrapped in an unnamed stage, in that order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    #[serde(default)]
    pub variables: Vec<VariableSpec>,
    #[serde(default)]
    pub stages: Vec<StageSpec>,
    #[serde(default)]
    pub stage: Option<StageSpec>,
    #[serde(default)]
    pub steps: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum VariableSpec {
    /// Declares `name` bound to a literal value.
    Value {
        name: String,
        #[serde(default)]
        value: serde_yaml::Value,
    },
    /// Inserted into the `vars` block as written.
    Expr { expr: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StageSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "when")]
    pub condition: Option<String>,
    #[serde(default)]
    pub steps: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    pub name: String,
    pub pipeline: String,
    #[serde(deserialize_with = "duration::deserialize")]
    pub every: Duration,
    /// Number of runs before the schedule stops; 0 runs forever.
    #[serde(default)]
    pub iterations: u32,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (i, pipeline) in self.pipelines.iter().enumerate() {
            if self.pipelines[..i].iter().any(|p| p.name == pipeline.name) {
                return Err(ConfigError::DuplicatePipeline(pipeline.name.clone()));
            }
        }
        for schedule in &self.schedules {
            if self.pipeline(&schedule.pipeline).is_none() {
                return Err(ConfigError::UnknownPipeline {
                    schedule: schedule.name.clone(),
                    pipeline: schedule.pipeline.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn pipeline(&self, name: &str) -> Option<&PipelineConfig> {
        self.pipelines.iter().find(|p| p.name == name)
    }

    /// Script source for `pipeline`.
    pub fn to_source(pipeline: &PipelineConfig) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "pipeline({}) {{", quote(&pipeline.name));

        if !pipeline.variables.is_empty() {
            out.push_str("    vars {\n");
            for var in &pipeline.variables {
                match var {
                    VariableSpec::Value { name, value } => {
                        let _ = writeln!(out, "        {} = {}", name, literal(value));
                    }
                    VariableSpec::Expr { expr } => {
                        let _ = writeln!(out, "        {}", expr.trim());
                    }
                }
            }
            out.push_str("    }\n");
        }

        let bare;
        let stages: Vec<&StageSpec> = if !pipeline.stages.is_empty() {
            pipeline.stages.iter().collect()
        } else if let Some(stage) = &pipeline.stage {
            vec![stage]
        } else if let Some(steps) = &pipeline.steps {
            bare = StageSpec {
                steps: steps.clone(),
                ..StageSpec::default()
            };
            vec![&bare]
        } else {
            Vec::new()
        };

        out.push_str("    stages {\n");
        for stage in stages {
            let _ = writeln!(out, "        stage({}) {{", quote(&stage.name));
            if let Some(condition) = &stage.condition {
                let _ = writeln!(out, "            when {{\n{}\n            }}", indent(condition));
            }
            let _ = writeln!(out, "            steps {{\n{}\n            }}", indent(&stage.steps));
            out.push_str("        }\n");
        }
        out.push_str("    }\n}\n");
        out
    }
}

fn indent(body: &str) -> String {
    body.trim_end()
        .lines()
        .map(|line| format!("                {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Single-quoted string literal, which is never interpolated.
fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for ch in text.chars() {
        if ch == '\\' || ch == '\'' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('\'');
    out
}

/// Script literal denoting a YAML value.
fn literal(value: &serde_yaml::Value) -> String {
    use serde_yaml::Value as Yaml;
    match value {
        Yaml::Null => "nil".to_string(),
        Yaml::Bool(b) => b.to_string(),
        Yaml::Number(n) => n
            .as_f64()
            .map(format_number)
            .unwrap_or_else(|| "nil".to_string()),
        Yaml::String(s) => quote(s),
        Yaml::Sequence(items) => {
            let items: Vec<String> = items.iter().map(literal).collect();
            format!("[{}]", items.join(", "))
        }
        Yaml::Mapping(map) if map.is_empty() => "[:]".to_string(),
        Yaml::Mapping(map) => {
            let entries: Vec<String> = map
                .iter()
                .map(|(k, v)| {
                    let key = match k {
                        Yaml::String(s) => s.clone(),
                        other => literal(other),
                    };
                    format!("{}: {}", quote(&key), literal(v))
                })
                .collect();
            format!("[{}]", entries.join(", "))
        }
        Yaml::Tagged(tagged) => literal(&tagged.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
pipelines:
  - name: p
    variables:
      - name: limit
        value: 3
      - name: tags
        value: [a, "it's"]
      - expr: "seen := [:]"
    steps: |
      echo "tick"
  - name: staged
    stages:
      - name: first
        condition: limit > 0
        steps: echo 1
schedules:
  - name: fast
    pipeline: p
    every: 10ms
    iterations: 3
  - name: slow
    pipeline: staged
    every: 1500
"#;

    #[test]
    fn test_parse_config() {
        let config = Config::from_yaml_str(YAML).unwrap();
        assert_eq!(config.pipelines.len(), 2);
        assert_eq!(config.schedules[0].every, Duration::from_millis(10));
        assert_eq!(config.schedules[0].iterations, 3);
        assert_eq!(config.schedules[1].every, Duration::from_millis(1500));
        assert_eq!(config.schedules[1].iterations, 0);
    }

    #[test]
    fn test_source_synthesis() {
        let config = Config::from_yaml_str(YAML).unwrap();
        let source = Config::to_source(&config.pipelines[0]);
        assert!(source.starts_with("pipeline('p') {\n    vars {\n"));
        assert!(source.contains("        limit = 3\n"));
        assert!(source.contains(r"        tags = ['a', 'it\'s']"));
        assert!(source.contains("        seen := [:]\n"));
        assert!(source.contains("stage('') {"));
        assert!(source.contains("                echo \"tick\"\n"));

        let staged = Config::to_source(&config.pipelines[1]);
        assert!(staged.contains("            when {\n                limit > 0\n            }"));
    }

    #[test]
    fn test_unknown_pipeline_is_rejected() {
        let yaml = "schedules:\n  - name: s\n    pipeline: nope\n    every: 1s\n";
        assert!(matches!(
            Config::from_yaml_str(yaml),
            Err(ConfigError::UnknownPipeline { .. })
        ));
    }
}
