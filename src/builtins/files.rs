use std::path::PathBuf;

use crate::{
    host::EnvVars,
    step::{Context, Execution, Parameter, Step, StepError, convert},
    value::{Value, from_json, from_yaml},
};

/// Every file step takes a single `path`, relative to the working directory
/// captured for the run.
#[derive(Default)]
struct PathArgument {
    path: String,
}

impl PathArgument {
    fn parameters() -> Vec<Parameter> {
        vec![Parameter::tagged("path", "position=0,required")]
    }

    fn bind(&mut self, field: &str, value: Value) -> Result<(), StepError> {
        match field {
            "path" => self.path = convert(field, value)?,
            _ => return Err(StepError::UnknownField(field.to_string())),
        }
        Ok(())
    }

    fn resolve(&self, ctx: &Context<'_>) -> PathBuf {
        match ctx.get::<EnvVars>() {
            Some(env) => env.resolve(&self.path),
            None => PathBuf::from(&self.path),
        }
    }

    fn read(&self, ctx: &Context<'_>) -> Result<String, StepError> {
        let path = self.resolve(ctx);
        std::fs::read_to_string(&path).map_err(|source| StepError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Declares a step over [`PathArgument`] whose `run` maps the argument to
/// a value.
macro_rules! path_step {
    ($(#[$doc:meta])* $step:ident, $execution:ident, |$arg:ident, $ctx:ident| $body:expr) => {
        $(#[$doc])*
        pub struct $step;

        #[derive(Default)]
        struct $execution(PathArgument);

        impl Step for $step {
            fn start(&self) -> Box<dyn Execution> {
                Box::new($execution::default())
            }
        }

        impl Execution for $execution {
            fn parameters(&self) -> Vec<Parameter> {
                PathArgument::parameters()
            }

            fn bind(&mut self, field: &str, value: Value) -> Result<(), StepError> {
                self.0.bind(field, value)
            }

            fn run(&mut self, $ctx: &Context<'_>) -> Result<Value, StepError> {
                let $arg = &self.0;
                $body
            }
        }
    };
}

path_step!(
    /// `fileExists "config.yaml"`
    FileExists,
    FileExistsExecution,
    |arg, ctx| Ok(Value::Bool(arg.resolve(ctx).exists()))
);

path_step!(
    /// `readFile "notes.txt"` returns the contents as a string.
    ReadFile,
    ReadFileExecution,
    |arg, ctx| arg.read(ctx).map(Value::String)
);

path_step!(
    /// `readJson "data.json"` parses the file into script values.
    ReadJson,
    ReadJsonExecution,
    |arg, ctx| {
        let text = arg.read(ctx)?;
        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| StepError::Failed(format!("{}: {}", arg.path, e)))?;
        Ok(from_json(json))
    }
);

path_step!(
    /// `readYaml "data.yaml"` parses the file into script values.
    ReadYaml,
    ReadYamlExecution,
    |arg, ctx| {
        let text = arg.read(ctx)?;
        let yaml: serde_yaml::Value = serde_yaml::from_str(&text)
            .map_err(|e| StepError::Failed(format!("{}: {}", arg.path, e)))?;
        Ok(from_yaml(yaml))
    }
);

/// `xmlPath("feed.xml", "//item/title")` evaluates an XPath expression
/// against the file. A node set yields the text of a single match, an
/// array for several and nil for none; scalar results map to numbers,
/// strings and bools.
pub struct XmlPath;

#[derive(Default)]
struct XmlPathExecution {
    file: PathArgument,
    xpath: String,
}

impl Step for XmlPath {
    fn start(&self) -> Box<dyn Execution> {
        Box::new(XmlPathExecution::default())
    }
}

impl Execution for XmlPathExecution {
    fn parameters(&self) -> Vec<Parameter> {
        vec![
            Parameter::tagged("path", "position=0,required"),
            Parameter::tagged("xpath", "position=1,required"),
        ]
    }

    fn bind(&mut self, field: &str, value: Value) -> Result<(), StepError> {
        match field {
            "xpath" => self.xpath = convert(field, value)?,
            _ => return self.file.bind(field, value),
        }
        Ok(())
    }

    fn run(&mut self, ctx: &Context<'_>) -> Result<Value, StepError> {
        let text = self.file.read(ctx)?;
        let package = sxd_document::parser::parse(&text)
            .map_err(|e| StepError::Failed(format!("{}: {:?}", self.file.path, e)))?;
        let document = package.as_document();
        let result = sxd_xpath::evaluate_xpath(&document, &self.xpath)
            .map_err(|e| StepError::Failed(format!("{}: {}", self.xpath, e)))?;

        Ok(match result {
            sxd_xpath::Value::Nodeset(nodes) => {
                let mut matches: Vec<Value> = nodes
                    .document_order()
                    .iter()
                    .map(|node| Value::String(node.string_value()))
                    .collect();
                match matches.len() {
                    0 => Value::Nil,
                    1 => matches.remove(0),
                    _ => Value::array(matches),
                }
            }
            sxd_xpath::Value::String(s) => Value::String(s),
            sxd_xpath::Value::Number(n) => Value::Number(n),
            sxd_xpath::Value::Boolean(b) => Value::Bool(b),
        })
    }
}
