//! Host registration API.
//!
//! A run starts from [`run_scope`]: a fresh scope under the universe holding
//! `env`, an empty `params` map and whatever the host's [`ScopeOption`]s
//! install. Options are plain closures so the scheduler can apply the same
//! set to every firing.

use std::{
    any::Any,
    path::{Path, PathBuf},
    sync::Arc,
};

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::{
    builtins::universe,
    scope::Scope,
    step::Step,
    value::{Arguments, Expando, HostObject, Reference, StepValue, Value, ValueError, host_names},
};

/// Configures a run scope.
pub type ScopeOption = Arc<dyn Fn(&Scope) + Send + Sync>;

/// Builds the scope a pipeline run starts from.
pub fn run_scope(options: &[ScopeOption]) -> Scope {
    let scope = universe().child();
    scope.insert_extension(HostContext::default());
    scope.insert("params", Value::Expando(Expando::new()));
    with_context("env", EnvVars::capture())(&scope);
    for option in options {
        option(&scope);
    }
    scope
}

/// Installs steps under their script names, shadowing built-ins.
pub fn with_steps<I, S>(steps: I) -> ScopeOption
where
    I: IntoIterator<Item = (S, Arc<dyn Step>)>,
    S: Into<String>,
{
    let steps: Vec<(String, Arc<dyn Step>)> =
        steps.into_iter().map(|(n, s)| (n.into(), s)).collect();
    Arc::new(move |scope: &Scope| {
        for (name, step) in &steps {
            scope.insert(
                name.clone(),
                Value::Step(StepValue {
                    name: name.clone(),
                    step: step.clone(),
                }),
            );
        }
    })
}

/// Adds entries to the `params` map. Every run gets its own copy, so
/// scripts cannot leak changes from one run into the next.
pub fn with_params<I, S>(params: I) -> ScopeOption
where
    I: IntoIterator<Item = (S, Value)>,
    S: Into<String>,
{
    let params: Vec<(String, Value)> = params.into_iter().map(|(k, v)| (k.into(), v)).collect();
    Arc::new(move |scope: &Scope| {
        let target = match scope.lookup("params") {
            Some(Value::Expando(map)) if scope.contains_local("params") => map,
            _ => {
                let map = Expando::new();
                scope.insert("params", Value::Expando(map.clone()));
                map
            }
        };
        for (key, value) in &params {
            target.insert(key.clone(), value.deep_copy());
        }
    })
}

/// Exposes host objects to scripts under the given names.
pub fn with_global_vars<I, S>(vars: I) -> ScopeOption
where
    I: IntoIterator<Item = (S, Reference)>,
    S: Into<String>,
{
    let vars: Vec<(String, Reference)> = vars.into_iter().map(|(k, v)| (k.into(), v)).collect();
    Arc::new(move |scope: &Scope| {
        for (name, reference) in &vars {
            scope.insert(name.clone(), Value::Reference(reference.clone()));
        }
    })
}

/// Registers a host object for steps: typed through
/// [`crate::step::Context::get`], and by name through `getContext`.
pub fn with_context<T>(name: &str, object: T) -> ScopeOption
where
    T: HostObject + Any + 'static,
{
    let name = name.to_string();
    let object = Arc::new(object);
    Arc::new(move |scope: &Scope| {
        scope.insert_extension_arc(object.clone());
        if let Some(registry) = scope.extension::<HostContext>() {
            let shared: Arc<dyn HostObject> = object.clone();
            registry.insert(&name, Reference::from_arc(shared.clone()));
            let replaceable = !scope.contains_local(&name)
                || matches!(scope.lookup(&name), Some(Value::Reference(_)));
            if replaceable {
                scope.insert(name.clone(), Value::Reference(Reference::from_arc(shared)));
            }
        }
    })
}

/// Named host objects available to `getContext`.
#[derive(Default)]
pub struct HostContext(RwLock<IndexMap<String, Reference>>);

impl HostContext {
    pub fn insert(&self, name: &str, object: Reference) {
        self.0.write().insert(name.to_string(), object);
    }

    pub fn get(&self, name: &str) -> Option<Reference> {
        self.0.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.0.read().keys().cloned().collect()
    }
}

/// Working directory and environment variables, captured when a run
/// starts and never updated afterwards.
#[derive(Debug, Clone)]
pub struct EnvVars {
    pub working_dir: PathBuf,
    pub vars: IndexMap<String, String>,
}

impl EnvVars {
    pub fn capture() -> Self {
        EnvVars {
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            vars: std::env::vars().collect(),
        }
    }

    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        EnvVars {
            working_dir: working_dir.into(),
            vars: IndexMap::new(),
        }
    }

    /// Relative paths are taken relative to the captured working directory.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    fn var(&self, name: &str) -> Value {
        self.vars
            .get(name)
            .map(|v| Value::String(v.clone()))
            .unwrap_or(Value::Nil)
    }
}

impl HostObject for EnvVars {
    fn type_name(&self) -> &str {
        "EnvVars"
    }

    fn get_field(&self, name: &str) -> Result<Value, ValueError> {
        for candidate in host_names(name) {
            match candidate.as_str() {
                "working_dir" => {
                    return Ok(Value::String(self.working_dir.display().to_string()));
                }
                "vars" => {
                    return Ok(Value::expando(
                        self.vars.iter().map(|(k, v)| (k.clone(), Value::from(v.as_str()))),
                    ));
                }
                _ => {}
            }
        }
        Ok(self.var(name))
    }

    fn invoke(&self, name: &str, args: &Arguments) -> Result<Value, ValueError> {
        match name {
            "get" => {
                let key = args.expect_one()?;
                Ok(self.var(&key.to_string()))
            }
            _ => Err(ValueError::UnknownMethod {
                type_name: "EnvVars".to_string(),
                name: name.to_string(),
            }),
        }
    }

    fn render(&self) -> String {
        format!("<EnvVars {}>", self.working_dir.display())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_scope_has_env_and_params() {
        let scope = run_scope(&[]);
        assert!(matches!(scope.lookup("env"), Some(Value::Reference(_))));
        assert!(matches!(scope.lookup("params"), Some(Value::Expando(_))));
        assert!(scope.extension::<EnvVars>().is_some());
        assert!(scope.lookup("echo").is_some());
    }

    #[test]
    fn test_params_are_copied_per_run() {
        let shared = Value::array(vec![Value::from(1)]);
        let options = [with_params([("ids", shared.clone())])];

        let first = run_scope(&options);
        let Some(params) = first.lookup("params") else {
            panic!("params missing");
        };
        let ids = params.get_field("ids").unwrap();
        if let Value::Array(a) = &ids {
            a.push(Value::from(2));
        }
        assert_eq!(shared.to_string(), "[1]");

        let second = run_scope(&options);
        let again = second.lookup("params").unwrap().get_field("ids").unwrap();
        assert_eq!(again.to_string(), "[1]");
    }

    #[test]
    fn test_env_vars_fields() {
        let mut env = EnvVars::new("/srv/app");
        env.vars.insert("MODE".into(), "test".into());
        assert_eq!(env.get_field("workingDir").unwrap(), Value::from("/srv/app"));
        assert_eq!(env.get_field("MODE").unwrap(), Value::from("test"));
        assert_eq!(env.get_field("OTHER").unwrap(), Value::Nil);
        let args = Arguments::positional([Value::from("MODE")]);
        assert_eq!(env.invoke("get", &args).unwrap(), Value::from("test"));
        assert_eq!(env.resolve("a.txt"), PathBuf::from("/srv/app/a.txt"));
    }
}
