// tests/evaluator_tests.rs

use pipeline_lang::{
    ErrorList, Evaluator, HostObject, Reference, ScopeOption, Value, ValueError,
    builtins::universe,
    parse_expression, parse_file, run_scope,
    step::{Context, Execution, Parameter, Step, StepError},
    value::Arguments,
    with_global_vars, with_params, with_steps,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tracing::field::{Field, Visit};
use tracing_subscriber::{Layer, layer, layer::SubscriberExt};
use std::{
    any::Any,
    fmt,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

// ============================================================================
// Helpers
// ============================================================================

/// `echo` replacement that remembers every message it was called with.
#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<Value>>>);

impl Recorder {
    fn calls(&self) -> Vec<Value> {
        self.0.lock().unwrap().clone()
    }

    fn rendered(&self) -> Vec<String> {
        self.calls().iter().map(|v| v.to_string()).collect()
    }

    fn option(&self) -> ScopeOption {
        let step: Arc<dyn Step> = Arc::new(self.clone());
        with_steps([("echo", step)])
    }
}

struct RecordExecution {
    log: Arc<Mutex<Vec<Value>>>,
    message: Value,
}

impl Step for Recorder {
    fn start(&self) -> Box<dyn Execution> {
        Box::new(RecordExecution {
            log: self.0.clone(),
            message: Value::Nil,
        })
    }
}

impl Execution for RecordExecution {
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
        self.log.lock().unwrap().push(self.message.clone());
        Ok(Value::Nil)
    }
}

/// Layer that keeps the fields of every event as `(name, rendered)` pairs.
#[derive(Clone, Default)]
struct EventLog(Arc<Mutex<Vec<Vec<(String, String)>>>>);

#[derive(Default)]
struct EventFields(Vec<(String, String)>);

impl Visit for EventFields {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.push((field.name().to_string(), format!("{:?}", value)));
    }
}

impl<S: tracing::Subscriber> Layer<S> for EventLog {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: layer::Context<'_, S>) {
        let mut fields = EventFields::default();
        event.record(&mut fields);
        self.0.lock().unwrap().push(fields.0);
    }
}

impl EventLog {
    fn entries(&self) -> Vec<Vec<(String, String)>> {
        self.0.lock().unwrap().clone()
    }
}

fn run_with(src: &str, recorder: &Recorder, extra: Vec<ScopeOption>) -> Result<Value, ErrorList> {
    let mut options = vec![recorder.option()];
    options.extend(extra);
    let scope = run_scope(&options);
    let file = parse_file(src, &scope)?;
    Evaluator::new(scope).run_file(&file, "")
}

fn run(src: &str, recorder: &Recorder) -> Result<Value, ErrorList> {
    run_with(src, recorder, Vec::new())
}

/// Wraps `body` in a single unnamed stage.
fn steps(body: &str) -> String {
    format!("pipeline(){{stages{{stage(){{steps{{{}}}}}}}}}", body)
}

fn eval(src: &str) -> Value {
    let scope = universe().child();
    let expr = parse_expression(src, &scope).unwrap();
    Evaluator::new(scope).eval_expression(&expr).unwrap()
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[test]
fn test_simple_assignment_and_call() {
    let recorder = Recorder::default();
    run("pipeline(){stages{stage(){steps{x := 12; echo x}}}}", &recorder).unwrap();
    assert_eq!(recorder.calls(), vec![Value::Number(12.0)]);
}

#[test]
fn test_array_filter_with_closure() {
    let recorder = Recorder::default();
    run(
        "pipeline(){stages{stage(){steps{x := [1,2,3,4]; x = x.findAll {y => y > 2}; echo x}}}}",
        &recorder,
    )
    .unwrap();
    assert_eq!(
        recorder.calls(),
        vec![Value::array(vec![Value::from(3), Value::from(4)])]
    );
}

#[test]
fn test_map_literal_keeps_order() {
    let recorder = Recorder::default();
    run("pipeline(){stages{stage(){steps{x := [a:1,b:2,c:3,d:4]; echo x}}}}", &recorder).unwrap();
    assert_eq!(recorder.rendered(), vec!["{a: 1, b: 2, c: 3, d: 4}"]);
    assert!(matches!(recorder.calls()[0], Value::Expando(_)));
}

#[test]
fn test_wildcard_with_predicate_and_contains() {
    let recorder = Recorder::default();
    let data = Reference::serialize(&json!([{"id": 1}, {"id": 2}, {"id": 3}])).unwrap();
    run_with(
        "pipeline(){stages{stage(){steps{ids := [1, 2]; r := data.*.findAll {x => ids.contains x.id}; echo r}}}}",
        &recorder,
        vec![with_global_vars([("data", data)])],
    )
    .unwrap();

    let calls = recorder.calls();
    assert_eq!(calls.len(), 1);
    let Value::Array(items) = &calls[0] else {
        panic!("expected array, got {:?}", calls[0]);
    };
    assert_eq!(items.len(), 2);
    assert_eq!(recorder.rendered(), vec!["[{id: 1}, {id: 2}]"]);
}

#[test]
fn test_when_false_skips_stage() {
    let recorder = Recorder::default();
    let result = run(
        r#"pipeline(){stages{stage(){when{false};steps{echo "nope"}}}}"#,
        &recorder,
    );
    assert!(result.is_ok());
    assert!(recorder.calls().is_empty());
}

#[test]
fn test_skipped_stage_is_logged() {
    let events = EventLog::default();
    let subscriber = tracing_subscriber::registry().with(events.clone());
    let recorder = Recorder::default();
    tracing::subscriber::with_default(subscriber, || {
        run(
            r#"pipeline(){stages{stage("gate"){when{false};steps{echo "nope"}} stage("next"){steps{echo "yes"}}}}"#,
            &recorder,
        )
        .unwrap();
    });

    let skipped: Vec<String> = events
        .entries()
        .into_iter()
        .filter(|fields| fields.iter().any(|(k, v)| k == "message" && v.starts_with("skipping stage")))
        .filter_map(|fields| fields.into_iter().find(|(k, _)| k == "stage").map(|(_, v)| v))
        .collect();
    assert_eq!(skipped, vec!["gate"]);
    assert_eq!(recorder.rendered(), vec!["yes"]);
}

#[test]
fn test_step_arguments_without_parentheses() {
    let recorder = Recorder::default();
    run(
        &steps("flag := false; echo [1, 2]; echo [a: 1]; echo !flag; echo -1"),
        &recorder,
    )
    .unwrap();
    assert_eq!(recorder.rendered(), vec!["[1, 2]", "{a: 1}", "true", "-1"]);
}

#[test]
fn test_echo_of_self_containing_map() {
    let recorder = Recorder::default();
    run(&steps("m := [:]; m.self = m; echo m"), &recorder).unwrap();
    assert_eq!(recorder.rendered(), vec!["{self: <cycle>}"]);
}

#[test]
fn test_when_non_bool_runs_stage() {
    let recorder = Recorder::default();
    run(r#"pipeline(){stages{stage(){when{0};steps{echo "yes"}}}}"#, &recorder).unwrap();
    assert_eq!(recorder.rendered(), vec!["yes"]);
}

#[test]
fn test_stages_run_in_order_with_pipeline_vars() {
    let recorder = Recorder::default();
    let src = r#"pipeline("deploy") {
    vars {
        limit := 2
        label = "run"
        empty
    }
    stages {
        stage("first") {
            steps {
                echo label
                echo empty
            }
        }
        stage("skipped") {
            when { limit > 5 }
            steps {
                echo "never"
            }
        }
        stage("last") {
            when { limit > 1 }
            steps {
                echo "${label} ${limit}"
            }
        }
    }
}"#;
    run(src, &recorder).unwrap();
    assert_eq!(recorder.rendered(), vec!["run", "NULL", "run 2"]);
}

#[test]
fn test_named_pipeline_selection() {
    let recorder = Recorder::default();
    let src = r#"
pipeline("a") { stages { stage() { steps { echo "a" } } } }
pipeline("b") { stages { stage() { steps { echo "b" } } } }
"#;
    let scope = run_scope(&[recorder.option()]);
    let file = parse_file(src, &scope).unwrap();
    Evaluator::new(scope.clone()).run_file(&file, "b").unwrap();
    assert_eq!(recorder.rendered(), vec!["b"]);

    let err = Evaluator::new(scope).run_file(&file, "c").unwrap_err();
    assert_eq!(err.to_string(), "0:0: pipeline \"c\" not found");
}

// ============================================================================
// Scope discipline
// ============================================================================

#[test]
fn test_undefined_identifier_fails_to_parse() {
    let recorder = Recorder::default();
    let err = run(&steps("echo y"), &recorder).unwrap_err();
    assert!(err.to_string().contains("identifier y does not exist"), "{}", err);
    assert!(recorder.calls().is_empty());
}

#[test]
fn test_use_before_declaration_fails() {
    let recorder = Recorder::default();
    let err = run(&steps("echo z; z := 1"), &recorder).unwrap_err();
    assert!(err.to_string().contains("identifier z does not exist"), "{}", err);
}

#[test]
fn test_stage_scopes_are_separate() {
    let recorder = Recorder::default();
    let src = "pipeline(){stages{stage(){steps{x := 1}} stage(){steps{echo x}}}}";
    let err = run(src, &recorder).unwrap_err();
    assert!(err.to_string().contains("identifier x does not exist"), "{}", err);
}

#[test]
fn test_closure_may_shadow_outer_name() {
    let recorder = Recorder::default();
    run(&steps("x := 1; f := {=> x := 5; x}; echo f(); echo x"), &recorder).unwrap();
    assert_eq!(recorder.calls(), vec![Value::from(5), Value::from(1)]);
}

// ============================================================================
// Assignment
// ============================================================================

#[test]
fn test_assignment_laws() {
    let recorder = Recorder::default();
    run(&steps("x := 1; echo x; x = 2; echo x"), &recorder).unwrap();
    assert_eq!(recorder.calls(), vec![Value::from(1), Value::from(2)]);

    let err = run(&steps("x := 1; x := 2"), &recorder).unwrap_err();
    assert!(err.to_string().contains("identifier x already declared in this scope"));

    let err = run(&steps("y = 1"), &recorder).unwrap_err();
    assert!(err.to_string().contains("identifier y does not exist"));
}

#[test]
fn test_predefined_names_are_read_only() {
    let recorder = Recorder::default();
    let err = run(&steps("true = 1"), &recorder).unwrap_err();
    assert!(
        err.to_string().contains("cannot assign to predefined identifier true"),
        "{}",
        err
    );
}

#[test]
fn test_compound_assignment() {
    let recorder = Recorder::default();
    run(
        &steps("n := 1; n += 4; n++; n *= 3; n--; n %= 7; echo n; s := 'a'; s += 'b'; echo s"),
        &recorder,
    )
    .unwrap();
    assert_eq!(recorder.rendered(), vec!["3", "ab"]);
}

#[test]
fn test_field_and_index_assignment() {
    let recorder = Recorder::default();
    run(
        &steps("m := [:]; m.a = 1; m['b'] = 2; xs := [1, 2]; xs[1] = 9; echo m; echo xs"),
        &recorder,
    )
    .unwrap();
    assert_eq!(recorder.rendered(), vec!["{a: 1, b: 2}", "[1, 9]"]);
}

#[test]
fn test_closures_capture_by_scope() {
    let recorder = Recorder::default();
    run(
        &steps("count := 0; bump := {=> count += 1}; bump(); bump(); echo count"),
        &recorder,
    )
    .unwrap();
    assert_eq!(recorder.calls(), vec![Value::from(2)]);
}

// ============================================================================
// Operators
// ============================================================================

#[test]
fn test_precedence_matches_arithmetic() {
    let cases = vec![
        ("1 + 2 * 3", Value::from(7)),
        ("(1 + 2) * 3", Value::from(9)),
        ("10 - 4 - 3", Value::from(3)),
        ("8 / 4 / 2", Value::from(1)),
        ("7 % 4 * 2", Value::from(6)),
        ("1 + 2 == 3 && 4 > 3", Value::Bool(true)),
        ("true || false && false", Value::Bool(true)),
        ("1 < 2 == true", Value::Bool(true)),
        ("-2 * -3", Value::from(6)),
        ("!false && !(1 > 2)", Value::Bool(true)),
        ("0.1 + 0.2", Value::Number(0.3)),
    ];
    for (src, expected) in cases {
        assert_eq!(eval(src), expected, "Failed for: {}", src);
    }
}

#[test]
fn test_string_concatenation_and_comparison() {
    assert_eq!(eval("'a' + 1"), Value::from("a1"));
    assert_eq!(eval("'abc' < 'abd'"), Value::Bool(true));
    assert_eq!(eval("[1, 2] == [1, 2]"), Value::Bool(true));
    assert_eq!(eval("[a: 1] != [a: 2]"), Value::Bool(true));
}

#[test]
fn test_runtime_errors_stop_the_stage() {
    let recorder = Recorder::default();
    let err = run(&steps("echo 1; x := 1 / 0; echo 2"), &recorder).unwrap_err();
    assert_eq!(err.to_string(), "1:46: division by zero");
    assert_eq!(recorder.calls(), vec![Value::from(1)]);
}

#[test]
fn test_type_errors_carry_operator() {
    let recorder = Recorder::default();
    let err = run(&steps("x := true + 1"), &recorder).unwrap_err();
    assert!(
        err.to_string().contains("operator + is not defined for bool and number"),
        "{}",
        err
    );
}

#[test]
fn test_modulo_requires_integers() {
    let recorder = Recorder::default();
    let err = run(&steps("x := 1.5 % 1"), &recorder).unwrap_err();
    assert!(err.to_string().contains("requires integral operands"), "{}", err);
}

// ============================================================================
// Interpolation
// ============================================================================

#[test]
fn test_interpolation_renders_values() {
    let recorder = Recorder::default();
    run(
        &steps(r#"n := 3; xs := [1, n]; echo "${n * 2} of $n: ${xs}, ${params.none}, \${n}""#),
        &recorder,
    )
    .unwrap();
    assert_eq!(recorder.rendered(), vec!["6 of 3: [1, 3], NULL, ${n}"]);
}

#[test]
fn test_raw_strings_are_not_interpolated() {
    let recorder = Recorder::default();
    run(&steps("n := 1; echo '${n} $n'"), &recorder).unwrap();
    assert_eq!(recorder.rendered(), vec!["${n} $n"]);
}

#[test]
fn test_interpolation_equals_rendering() {
    for src in ["1 + 1", "'x'", "[1, 2]", "[k: 'v']", "true", "2.5"] {
        let direct = eval(src).to_string();
        let interpolated = eval(&format!("\"${{{}}}\"", src));
        assert_eq!(interpolated, Value::String(direct), "Failed for: {}", src);
    }
}

// ============================================================================
// Paths
// ============================================================================

#[test]
fn test_wildcard_distributes_over_expando_values() {
    let recorder = Recorder::default();
    run(
        &steps("e := [a: [f: 1], b: [f: 2], c: [f: 3]]; echo e.*.f"),
        &recorder,
    )
    .unwrap();
    assert_eq!(
        recorder.calls(),
        vec![Value::array(vec![Value::from(1), Value::from(2), Value::from(3)])]
    );
}

#[test]
fn test_deep_wildcard_is_depth_first() {
    let recorder = Recorder::default();
    run(&steps("t := [a: [b: 1, c: [d: 2]], e: 3]; echo t.**"), &recorder).unwrap();
    assert_eq!(
        recorder.rendered(),
        vec!["[{b: 1, c: {d: 2}}, 1, {d: 2}, 2, 3]"]
    );
}

#[test]
fn test_collection_operations() {
    let cases = vec![
        ("[1, 2, 3].find {x => x > 1}", "2"),
        ("[1, 2, 3].find {x => x > 5}", "NULL"),
        ("[1, 2, 3].any {x => x == 2}", "true"),
        ("[1, 2, 3].every {x => x > 1}", "false"),
        ("[1, 2, 3].select {x => x * 10}", "[10, 20, 30]"),
        ("[1, 2, 3].size", "3"),
        ("(1..3).contains 2", "true"),
        ("[1, 2].add 3, [4, 5]", "[1, 2, 3, 4, 5]"),
    ];
    for (src, expected) in cases {
        assert_eq!(eval(src).to_string(), expected, "Failed for: {}", src);
    }
}

#[test]
fn test_string_methods() {
    assert_eq!(eval("'Hello'.toUpper()"), Value::from("HELLO"));
    assert_eq!(eval("'a,b'.split ','").to_string(), "[a, b]");
    assert_eq!(eval("'abc'.matches '^a.c$'"), Value::Bool(true));
    assert_eq!(eval("'abc'[1]"), Value::from("b"));
}

// ============================================================================
// Steps, params and host objects
// ============================================================================

#[test]
fn test_named_and_positional_step_arguments() {
    let recorder = Recorder::default();
    run(&steps(r#"echo(message: "named"); echo("paren")"#), &recorder).unwrap();
    assert_eq!(recorder.rendered(), vec!["named", "paren"]);
}

#[test]
fn test_missing_required_argument() {
    let recorder = Recorder::default();
    let err = run(&steps("echo()"), &recorder).unwrap_err();
    assert!(
        err.to_string().contains("echo: missing required argument message"),
        "{}",
        err
    );
}

#[test]
fn test_params_are_visible() {
    let recorder = Recorder::default();
    run_with(
        &steps("echo params.target; echo params.retries + 1"),
        &recorder,
        vec![with_params([
            ("target", Value::from("api")),
            ("retries", Value::from(2)),
        ])],
    )
    .unwrap();
    assert_eq!(recorder.rendered(), vec!["api", "3"]);
}

struct Counter {
    hits: AtomicUsize,
}

impl HostObject for Counter {
    fn type_name(&self) -> &str {
        "Counter"
    }

    fn get_field(&self, name: &str) -> Result<Value, ValueError> {
        match name {
            "hits" => Ok(Value::from(self.hits.load(Ordering::SeqCst))),
            _ => Err(ValueError::UnknownMember {
                type_name: "Counter".to_string(),
                name: name.to_string(),
            }),
        }
    }

    fn invoke(&self, name: &str, args: &Arguments) -> Result<Value, ValueError> {
        match name {
            "hit" => {
                let by = args.get(0, "by").and_then(Value::as_number).unwrap_or(1.0);
                let total = self.hits.fetch_add(by as usize, Ordering::SeqCst) + by as usize;
                Ok(Value::from(total))
            }
            _ => Err(ValueError::UnknownMethod {
                type_name: "Counter".to_string(),
                name: name.to_string(),
            }),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[test]
fn test_host_object_fields_and_methods() {
    let recorder = Recorder::default();
    let counter = Reference::new(Counter {
        hits: AtomicUsize::new(0),
    });
    run_with(
        &steps("counter.hit(); counter.hit(by: 4); echo counter.hits"),
        &recorder,
        vec![with_global_vars([("counter", counter.clone())])],
    )
    .unwrap();
    assert_eq!(recorder.calls(), vec![Value::from(5)]);
    assert_eq!(
        counter.downcast_ref::<Counter>().map(|c| c.hits.load(Ordering::SeqCst)),
        Some(5)
    );
}

#[test]
fn test_unknown_member_is_reported() {
    let recorder = Recorder::default();
    let err = run(&steps("x := [1].nope()"), &recorder).unwrap_err();
    assert!(err.to_string().contains("array has no method nope"), "{}", err);
}
