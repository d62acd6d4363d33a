/// End-to-end tests for computing expressions and running actions
use crate::*;
use serde_json::json;
use std::collections::HashMap;

fn values(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
    pairs
        .iter()
        .map(|(id, value)| (id.to_string(), value.clone()))
        .collect()
}

#[test]
fn test_bound_id_resolves_to_value() {
    let values = values(&[("myId", Value::from("value"))]);
    assert_eq!(
        compute_expression("$ws$dataSource$myId", &values),
        Value::from("value")
    );
}

#[test]
fn test_dashed_id_resolves() {
    let values = values(&[("seed-1", Value::Number(2.0))]);
    let code = format!("{} * 21", encode_data_variable_id("seed-1"));
    assert_eq!(compute_expression(&code, &values), Value::Number(42.0));
}

#[test]
fn test_free_identifier_is_undefined() {
    assert_eq!(compute_expression("a", &HashMap::new()), Value::Undefined);
}

#[test]
fn test_missing_bound_value_is_undefined() {
    assert_eq!(
        compute_expression("$ws$dataSource$missing", &HashMap::new()),
        Value::Undefined
    );
}

#[test]
fn test_syntax_error_yields_undefined() {
    assert_eq!(
        compute_expression("https://github.com", &HashMap::new()),
        Value::Undefined
    );
    assert!(matches!(
        try_compute_expression("https://github.com", &HashMap::new()),
        Err(ExpressionError::Parse(_))
    ));
}

#[test]
fn test_runtime_error_yields_undefined() {
    let code = "$ws$dataSource$a.b.c";
    assert_eq!(compute_expression(code, &HashMap::new()), Value::Undefined);
    assert!(matches!(
        try_compute_expression(code, &HashMap::new()),
        Err(ExpressionError::Eval(EvalError::TypeError { .. }))
    ));
}

#[test]
fn test_optional_chain_short_circuits() {
    assert_eq!(
        try_compute_expression("$ws$dataSource$a?.b.c", &HashMap::new()),
        Ok(Value::Undefined)
    );
}

#[test]
fn test_template_with_object_value() {
    let values = values(&[("user", Value::from(json!({ "name": "Ada", "tags": ["x"] })))]);
    assert_eq!(
        compute_expression("`Hi ${$ws$dataSource$user.name} ${$ws$dataSource$user.tags}`", &values),
        Value::from(r#"Hi Ada ["x"]"#)
    );
}

#[test]
fn test_operators() {
    let empty = HashMap::new();
    let cases = [
        ("1 + 2 * 3", Value::Number(7.0)),
        ("'a' + 1", Value::from("a1")),
        ("2 ** 3 ** 2", Value::Number(512.0)),
        ("7 % 4", Value::Number(3.0)),
        ("1 == '1'", Value::Boolean(true)),
        ("1 === '1'", Value::Boolean(false)),
        ("null == undefined", Value::Boolean(true)),
        ("'b' > 'a'", Value::Boolean(true)),
        ("null ?? 'fallback'", Value::from("fallback")),
        ("0 || 'x'", Value::from("x")),
        ("'' && 'x'", Value::from("")),
        ("!0", Value::Boolean(true)),
        ("-'3'", Value::Number(-3.0)),
        ("true ? [1, 2].length : 0", Value::Number(2.0)),
        ("{ a: 1 }.a", Value::Number(1.0)),
        ("[1, 2, 3][1]", Value::Number(2.0)),
    ];
    for (code, expected) in cases {
        assert_eq!(try_compute_expression(code, &empty), Ok(expected), "{}", code);
    }
}

#[test]
fn test_allowed_methods() {
    let empty = HashMap::new();
    let cases = [
        ("'Hello'.toUpperCase()", Value::from("HELLO")),
        ("'a,b'.split(',').length", Value::Number(2.0)),
        ("[1, 2, 3].join('-')", Value::from("1-2-3")),
        ("[1, 2, 3].slice(-2).at(0)", Value::Number(2.0)),
        ("(1.005).toFixed(1)", Value::from("1.0")),
        ("'abc'.includes('b')", Value::Boolean(true)),
    ];
    for (code, expected) in cases {
        assert_eq!(try_compute_expression(code, &empty), Ok(expected), "{}", code);
    }
}

#[test]
fn test_unknown_functions_are_rejected() {
    let empty = HashMap::new();
    assert!(matches!(
        try_compute_expression("fetch('x')", &empty),
        Err(ExpressionError::Eval(EvalError::NotAFunction { .. }))
    ));
    assert!(matches!(
        try_compute_expression("'a'.constructor('x')", &empty),
        Err(ExpressionError::Eval(EvalError::NotAFunction { .. }))
    ));
}

#[test]
fn test_assignment_is_rejected_in_expressions() {
    assert!(matches!(
        try_compute_expression("$ws$dataSource$a = 1", &HashMap::new()),
        Err(ExpressionError::Eval(EvalError::AssignmentNotAllowed { .. }))
    ));
}

#[test]
fn test_action_returns_assigned_variables() {
    let values = values(&[("count", Value::Number(1.0)), ("other", Value::from("x"))]);
    let updates = execute_action(
        "$ws$dataSource$count = $ws$dataSource$count + step; $ws$dataSource$other",
        &[("step".to_string(), Value::Number(2.0))],
        &values,
    );
    assert_eq!(updates.len(), 1);
    assert_eq!(updates.get("count"), Some(&Value::Number(3.0)));
}

#[test]
fn test_action_nested_assignment() {
    let values = values(&[("form", Value::from(json!({ "fields": { "name": "" } })))]);
    let updates = execute_action(
        "$ws$dataSource$form.fields.name = 'Ada'",
        &[],
        &values,
    );
    assert_eq!(
        updates.get("form"),
        Some(&Value::from(json!({ "fields": { "name": "Ada" } })))
    );
}

#[test]
fn test_action_compound_assignment() {
    let values = values(&[("count", Value::Number(5.0))]);
    let updates = execute_action("$ws$dataSource$count -= 2\n$ws$dataSource$count *= 10", &[], &values);
    assert_eq!(updates.get("count"), Some(&Value::Number(30.0)));
}

#[test]
fn test_failed_action_updates_nothing() {
    let values = values(&[("count", Value::Number(5.0))]);
    let updates = execute_action(
        "$ws$dataSource$count = 1; $ws$dataSource$missing.field = 2",
        &[],
        &values,
    );
    assert!(updates.is_empty());
}

#[test]
fn test_action_appends_to_array() {
    let values = values(&[("list", Value::from(json!([1])))]);
    let updates = execute_action(
        "$ws$dataSource$list[1] = 2; $ws$dataSource$list[0] = 0",
        &[],
        &values,
    );
    assert_eq!(updates.get("list"), Some(&Value::from(json!([0, 2]))));
}

#[test]
fn test_action_far_array_index_updates_nothing() {
    let values = values(&[("list", Value::from(json!([])))]);
    let code = "$ws$dataSource$list[1e18] = 1";
    assert!(execute_action(code, &[], &values).is_empty());
    assert!(matches!(
        try_execute_action(code, &[], &values),
        Err(ExpressionError::Eval(EvalError::TypeError { .. }))
    ));

    // A gap of one is refused as well
    assert!(execute_action("$ws$dataSource$list[1] = 1", &[], &values).is_empty());
}

#[test]
fn test_deep_nesting_yields_undefined() {
    let parens = format!("{}1{}", "(".repeat(100_000), ")".repeat(100_000));
    assert_eq!(compute_expression(&parens, &HashMap::new()), Value::Undefined);
    assert!(matches!(
        try_compute_expression(&parens, &HashMap::new()),
        Err(ExpressionError::Parse(ParseError::TooDeep { .. }))
    ));

    let arrays = format!("{}{}", "[".repeat(50_000), "]".repeat(50_000));
    assert_eq!(compute_expression(&arrays, &HashMap::new()), Value::Undefined);

    let negations = format!("{}true", "!".repeat(50_000));
    assert_eq!(compute_expression(&negations, &HashMap::new()), Value::Undefined);

    let sum = vec!["1"; 50_000].join(" + ");
    assert_eq!(compute_expression(&sum, &HashMap::new()), Value::Undefined);

    let members = format!("$ws$dataSource$a{}", ".b".repeat(50_000));
    assert_eq!(compute_expression(&members, &HashMap::new()), Value::Undefined);
}

#[test]
fn test_moderate_nesting_still_computes() {
    let parens = format!("{}1{}", "(".repeat(40), ")".repeat(40));
    assert_eq!(compute_expression(&parens, &HashMap::new()), Value::Number(1.0));

    let sum = vec!["1"; 40].join(" + ");
    assert_eq!(compute_expression(&sum, &HashMap::new()), Value::Number(40.0));

    let template = "`${`${`${1 + 1}`}`}`";
    assert_eq!(compute_expression(template, &HashMap::new()), Value::from("2"));
}

#[test]
fn test_deeply_nested_templates_yield_undefined() {
    let code = format!("{}1{}", "`${".repeat(200), "}`".repeat(200));
    assert_eq!(compute_expression(&code, &HashMap::new()), Value::Undefined);

    let code = format!("{}1{}", "`${".repeat(100_000), "}`".repeat(100_000));
    assert_eq!(compute_expression(&code, &HashMap::new()), Value::Undefined);
}
