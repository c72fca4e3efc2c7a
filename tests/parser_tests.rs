// tests/parser_tests.rs

use pipeline_lang::{
    File, Scope,
    ast::{AssignOp, BinOp, Expr, ExprKind, Literal, Segment, Stmt, UnaryOp},
    builtins::universe,
    parse_expression, parse_file,
};
use pretty_assertions::assert_eq;

fn scope() -> Scope {
    universe().child()
}

fn parse(src: &str) -> File {
    parse_file(src, &scope()).unwrap_or_else(|e| panic!("parse failed:\n{}", e))
}

fn parse_err(src: &str) -> String {
    parse_file(src, &scope()).unwrap_err().to_string()
}

fn expr(src: &str) -> Expr {
    parse_expression(src, &scope()).unwrap_or_else(|e| panic!("parse failed:\n{}", e))
}

fn steps_of(file: &File) -> &[Stmt] {
    &file.pipelines[0].stages[0].steps.stmts
}

// ============================================================================
// Structure
// ============================================================================

#[test]
fn test_pipeline_structure() {
    let file = parse(
        r#"pipeline("build") {
    vars {
        retries := 3
        target = 'api'
        pending
    }
    stages {
        stage("prepare") {
            when { retries > 0 }
            steps {
                echo target
            }
        }
        stage('ship') {
            steps { echo "done" }
            steps { delay 1 }
        }
    }
}"#,
    );

    assert_eq!(file.pipelines.len(), 1);
    let pipeline = &file.pipelines[0];
    assert_eq!(pipeline.name, "build");
    assert_eq!(pipeline.scope.names, vec!["retries", "target", "pending"]);
    assert_eq!(pipeline.vars.as_ref().map(|v| v.specs.len()), Some(3));

    let names: Vec<&str> = pipeline.stages.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["prepare", "ship"]);
    assert!(pipeline.stages[0].when.is_some());
    assert!(pipeline.stages[1].when.is_none());
    assert_eq!(pipeline.stages[1].steps.stmts.len(), 2);
}

#[test]
fn test_unnamed_blocks_and_semicolons() {
    let file = parse("pipeline(){stages{stage(){steps{x := 1; y := x; echo y}}}}");
    assert_eq!(file.pipelines[0].name, "");
    assert_eq!(steps_of(&file).len(), 3);
    assert_eq!(file.pipelines[0].stages[0].scope.names, vec!["x", "y"]);
}

#[test]
fn test_multiple_pipelines() {
    let file = parse(
        "pipeline('a') { stages { stage() { steps { echo 1 } } } }\npipeline('b') { stages { } }",
    );
    assert_eq!(file.pipelines.len(), 2);
    assert!(file.pipeline("a").is_some());
    assert!(file.pipeline("b").is_some());
    assert!(file.pipeline("c").is_none());
}

// ============================================================================
// Statements
// ============================================================================

#[test]
fn test_assignment_forms() {
    let file = parse(
        "pipeline(){stages{stage(){steps{
            n := 1
            n = 2
            n += 3
            n++
            m := [:]
            m.key = n
            m['other'] -= 1
        }}}}",
    );
    let ops: Vec<AssignOp> = steps_of(&file)
        .iter()
        .map(|stmt| match stmt {
            Stmt::Assign(a) => a.op,
            other => panic!("expected assignment, got {:?}", other),
        })
        .collect();
    assert_eq!(
        ops,
        vec![
            AssignOp::Define,
            AssignOp::Assign,
            AssignOp::Compound(BinOp::Add),
            AssignOp::Compound(BinOp::Add),
            AssignOp::Define,
            AssignOp::Assign,
            AssignOp::Compound(BinOp::Subtract),
        ]
    );
}

#[test]
fn test_newlines_end_statements_only_in_step_blocks() {
    let file = parse(
        "pipeline()
{
    stages
    {
        stage()
        {
            steps {
                x := 1 +
                    2
                echo x
            }
        }
    }
}",
    );
    assert_eq!(steps_of(&file).len(), 2);
}

#[test]
fn test_bracketed_lists_span_lines() {
    let file = parse(
        "pipeline(){stages{stage(){steps{
            xs := [
                1,
                2
            ]
            echo(
                xs
            )
        }}}}",
    );
    assert_eq!(steps_of(&file).len(), 2);
}

// ============================================================================
// Expressions
// ============================================================================

#[test]
fn test_binary_precedence() {
    let e = expr("1 + 2 * 3 > 4 && true || false");
    let ExprKind::Binary { op: BinOp::Or, left, .. } = e.kind else {
        panic!("expected || at the root");
    };
    let ExprKind::Binary { op: BinOp::And, left, .. } = left.kind else {
        panic!("expected && under ||");
    };
    let ExprKind::Binary { op: BinOp::GreaterThan, left, .. } = left.kind else {
        panic!("expected > under &&");
    };
    let ExprKind::Binary { op: BinOp::Add, right, .. } = left.kind else {
        panic!("expected + under >");
    };
    assert!(matches!(right.kind, ExprKind::Binary { op: BinOp::Multiply, .. }));
}

#[test]
fn test_left_associativity() {
    let e = expr("10 - 4 - 3");
    let ExprKind::Binary { op: BinOp::Subtract, left, right } = e.kind else {
        panic!("expected subtraction");
    };
    assert!(matches!(left.kind, ExprKind::Binary { op: BinOp::Subtract, .. }));
    assert_eq!(right.kind, ExprKind::Literal(Literal::Number(3.0)));
}

#[test]
fn test_range_binds_looser_than_arithmetic() {
    let e = expr("1 + 1..2 * 3");
    let ExprKind::Range { start, end } = e.kind else {
        panic!("expected range");
    };
    assert!(matches!(start.kind, ExprKind::Binary { op: BinOp::Add, .. }));
    assert!(matches!(end.kind, ExprKind::Binary { op: BinOp::Multiply, .. }));
}

#[test]
fn test_unary() {
    let scope = scope();
    scope.insert("x", pipeline_lang::Value::Nil);
    let e = parse_expression("!-x", &scope).unwrap();
    let ExprKind::Unary { op: UnaryOp::Not, operand } = e.kind else {
        panic!("expected !");
    };
    assert!(matches!(operand.kind, ExprKind::Unary { op: UnaryOp::Negate, .. }));
}

#[test]
fn test_paths_and_wildcards() {
    let scope = scope();
    scope.insert("data", pipeline_lang::Value::Nil);
    let e = parse_expression("data.*.items.**.name", &scope).unwrap();

    let mut segments = Vec::new();
    let mut current = &e;
    while let ExprKind::Path(path) = &current.kind {
        segments.push(path.segment.clone());
        current = &path.object;
    }
    segments.reverse();
    assert_eq!(
        segments,
        vec![
            Segment::Wildcard,
            Segment::Name("items".to_string()),
            Segment::DeepWildcard,
            Segment::Name("name".to_string()),
        ]
    );
    assert_eq!(current.kind, ExprKind::Ident("data".to_string()));
}

#[test]
fn test_keyword_and_string_members() {
    let scope = scope();
    scope.insert("cfg", pipeline_lang::Value::Nil);
    let e = parse_expression("cfg.stage.'content-type'", &scope).unwrap();
    let ExprKind::Path(path) = e.kind else {
        panic!("expected path");
    };
    assert_eq!(path.segment, Segment::Name("content-type".to_string()));
    let ExprKind::Path(inner) = path.object.kind else {
        panic!("expected path");
    };
    assert_eq!(inner.segment, Segment::Name("stage".to_string()));
}

#[test]
fn test_bare_and_parenthesized_calls() {
    let e = expr("echo 'a', message: 2");
    let ExprKind::Call { args, .. } = e.kind else {
        panic!("expected call");
    };
    assert_eq!(args.len(), 2);
    assert_eq!(args[0].name, None);
    assert_eq!(args[1].name.as_deref(), Some("message"));

    let e = expr("delay(duration: '1s')");
    let ExprKind::Call { args, .. } = e.kind else {
        panic!("expected call");
    };
    assert_eq!(args[0].name.as_deref(), Some("duration"));
}

#[test]
fn test_bare_step_arguments_from_literals_and_unary() {
    let scope = scope();
    scope.insert("flag", pipeline_lang::Value::Bool(true));

    let cases: [(&str, fn(&ExprKind) -> bool); 4] = [
        ("echo [1, 2]", |k| matches!(k, ExprKind::Sequence { is_map: false, .. })),
        ("echo [a: 1]", |k| matches!(k, ExprKind::Sequence { is_map: true, .. })),
        ("echo !flag", |k| matches!(k, ExprKind::Unary { op: UnaryOp::Not, .. })),
        ("echo -1", |k| matches!(k, ExprKind::Unary { op: UnaryOp::Negate, .. })),
    ];
    for (src, is_expected) in cases {
        let e = parse_expression(src, &scope).unwrap_or_else(|e| panic!("{}: {}", src, e));
        let ExprKind::Call { func, args } = e.kind else {
            panic!("expected call for {}", src);
        };
        assert_eq!(func.kind, ExprKind::Ident("echo".to_string()), "Failed for: {}", src);
        assert_eq!(args.len(), 1, "Failed for: {}", src);
        assert!(is_expected(&args[0].value.kind), "Failed for: {}", src);
    }
}

#[test]
fn test_brackets_and_minus_after_variables_stay_operators() {
    let scope = scope();
    scope.insert("xs", pipeline_lang::Value::Nil);
    scope.insert("n", pipeline_lang::Value::Nil);

    assert!(matches!(
        parse_expression("xs [0]", &scope).unwrap().kind,
        ExprKind::Index { .. }
    ));
    assert!(matches!(
        parse_expression("n -1", &scope).unwrap().kind,
        ExprKind::Binary { op: BinOp::Subtract, .. }
    ));

    let file = parse("pipeline(){stages{stage(){steps{echo := 3; x := echo -1}}}}");
    let Stmt::Assign(assign) = &steps_of(&file)[1] else {
        panic!("expected assignment");
    };
    assert!(matches!(assign.rhs.kind, ExprKind::Binary { op: BinOp::Subtract, .. }));
}

#[test]
fn test_method_with_closure_argument() {
    let e = expr("[1, 2].findAll {x => x > 1}");
    let ExprKind::Path(path) = e.kind else {
        panic!("expected path");
    };
    assert_eq!(path.segment, Segment::Name("findAll".to_string()));
    let args = path.args.expect("member call");
    let ExprKind::Closure(closure) = &args[0].value.kind else {
        panic!("expected closure argument");
    };
    assert_eq!(closure.params, vec!["x"]);
    assert_eq!(closure.scope.names, vec!["x"]);
}

#[test]
fn test_closure_forms() {
    for (src, params) in [
        ("{a, b => a + b}", vec!["a", "b"]),
        ("{=> 1}", vec![]),
        ("{1}", vec![]),
    ] {
        let ExprKind::Closure(closure) = expr(src).kind else {
            panic!("expected closure for {}", src);
        };
        assert_eq!(closure.params, params, "Failed for: {}", src);
        assert_eq!(closure.body.stmts.len(), 1, "Failed for: {}", src);
    }
}

#[test]
fn test_sequences() {
    let cases = [
        ("[]", 0, false),
        ("[:]", 0, true),
        ("[1, 2, 3]", 3, false),
        ("[a: 1, 'b-c': 2]", 2, true),
    ];
    for (src, len, map) in cases {
        let ExprKind::Sequence { values, is_map } = expr(src).kind else {
            panic!("expected sequence for {}", src);
        };
        assert_eq!((values.len(), is_map), (len, map), "Failed for: {}", src);
    }
}

#[test]
fn test_string_literals() {
    assert_eq!(
        expr(r#""hi ${x}""#).kind,
        ExprKind::Literal(Literal::String("hi ${x}".to_string()))
    );
    assert_eq!(
        expr(r"'it\'s'").kind,
        ExprKind::Literal(Literal::RawString("it's".to_string()))
    );
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_undefined_identifier() {
    assert_eq!(
        parse_err("pipeline(){stages{stage(){steps{echo nope}}}}"),
        "1:38: identifier nope does not exist"
    );
}

#[test]
fn test_redeclaration_in_vars() {
    let err = parse_err("pipeline(){vars{a := 1\na := 2}stages{}}");
    assert_eq!(err, "2:1: identifier a already declared in this scope");
}

#[test]
fn test_same_name_in_nested_scope_is_allowed() {
    parse("pipeline(){vars{a := 1}stages{stage(){steps{a := 2; f := {a => a}}}}}");
}

#[test]
fn test_non_name_define() {
    let err = parse_err("pipeline(){stages{stage(){steps{m := [:]; m.x := 1}}}}");
    assert!(err.contains("non-name on left side of :="), "{}", err);
}

#[test]
fn test_cannot_assign_to_call() {
    let err = parse_err("pipeline(){stages{stage(){steps{echo(1) = 2}}}}");
    assert!(err.contains("cannot assign to this expression"), "{}", err);
}

#[test]
fn test_duplicate_when() {
    let err = parse_err("pipeline(){stages{stage('s'){when{true} when{false} steps{}}}}");
    assert!(err.contains("stage \"s\" has more than one when block"), "{}", err);
}

#[test]
fn test_duplicate_closure_parameter() {
    let err = parse_expression("{a, a => a}", &scope()).unwrap_err().to_string();
    assert!(err.contains("duplicate parameter a"), "{}", err);
}

#[test]
fn test_trailing_tokens_after_expression() {
    let err = parse_expression("1 2", &scope()).unwrap_err().to_string();
    assert_eq!(err, "1:3: unexpected NUMBER 2 after expression");
}

#[test]
fn test_errors_are_collected_and_sorted() {
    let err = parse_file(
        "pipeline(){stages{stage(){steps{\necho a\necho b\nx := #\n}}}}",
        &scope(),
    )
    .unwrap_err();
    let lines: Vec<String> = err.iter().map(|e| e.to_string()).collect();
    assert!(lines.len() >= 3, "{:?}", lines);
    assert_eq!(lines[0], "2:6: identifier a does not exist");
    assert_eq!(lines[1], "3:6: identifier b does not exist");
    assert!(lines[2].starts_with("4:6: illegal character '#'"), "{:?}", lines);
}

#[test]
fn test_missing_closing_brace() {
    let err = parse_err("pipeline(){stages{stage(){steps{echo 1}}");
    assert!(err.contains("expected '}', found EOF"), "{}", err);
}
