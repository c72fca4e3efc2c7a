//! Built-in steps and the universe scope every run starts from.
//!
//! | step          | arguments                      | result              |
//! |---------------|--------------------------------|---------------------|
//! | `echo`        | `message`                      | nil, logs message   |
//! | `delay`       | `duration` (`"250ms"`, `1000`) | nil                 |
//! | `fileExists`  | `path`                         | bool                |
//! | `readFile`    | `path`                         | string              |
//! | `readJson`    | `path`                         | parsed document     |
//! | `readYaml`    | `path`                         | parsed document     |
//! | `xmlPath`     | `path`, `xpath`                | text, array or nil  |
//! | `random`      | `max`, `type`                  | number              |
//! | `getContext`  | `name`                         | host context object |

mod basic;
mod files;

use std::sync::{Arc, LazyLock};

use crate::{
    scope::Scope,
    step::Step,
    value::{StepValue, Value},
};

pub use basic::{Delay, Echo, GetContext, Random};
pub use files::{FileExists, ReadFile, ReadJson, ReadYaml, XmlPath};

/// The built-in steps by script name.
pub fn steps() -> Vec<(&'static str, Arc<dyn Step>)> {
    vec![
        entry("echo", Echo),
        entry("delay", Delay),
        entry("fileExists", FileExists),
        entry("readFile", ReadFile),
        entry("readJson", ReadJson),
        entry("readYaml", ReadYaml),
        entry("xmlPath", XmlPath),
        entry("random", Random),
        entry("getContext", GetContext),
    ]
}

fn entry(name: &'static str, step: impl Step + 'static) -> (&'static str, Arc<dyn Step>) {
    let step: Arc<dyn Step> = Arc::new(step);
    (name, step)
}

static UNIVERSE: LazyLock<Scope> = LazyLock::new(|| {
    let scope = Scope::new();
    scope.insert("true", Value::Bool(true));
    scope.insert("false", Value::Bool(false));
    scope.insert("nil", Value::Nil);
    for (name, step) in steps() {
        scope.insert(
            name,
            Value::Step(StepValue {
                name: name.to_string(),
                step,
            }),
        );
    }
    scope.freeze();
    scope
});

/// Process-wide, read-only root of every scope chain: `true`, `false`,
/// `nil` and the built-in steps.
pub fn universe() -> &'static Scope {
    &UNIVERSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_universe_is_frozen() {
        let scope = universe().child();
        assert_eq!(scope.lookup("true"), Some(Value::Bool(true)));
        assert!(matches!(scope.lookup("echo"), Some(Value::Step(_))));
        assert!(scope.assign("true", Value::Bool(false)).is_err());
    }
}
