use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::collections::{HashMap, HashSet};
use trellis_expression::{
    compute_expression, encode_data_variable_id, format_diagnostics, lint_expression,
    restore_expression_variables, LintOptions, Severity, Value,
};

#[derive(Args, Debug)]
pub struct EvalArgs {
    /// Expression to evaluate
    pub expression: String,

    /// Variables as a JSON object, e.g. '{"count": 2}'
    #[arg(long)]
    pub vars: Option<String>,
}

/// Bind `vars` (name → JSON value) to `code`
///
/// Each name becomes a data source of the same id so the expression can be
/// checked and computed exactly like one stored in a project.
pub(crate) fn bind_vars(
    code: &str,
    vars: &serde_json::Map<String, serde_json::Value>,
) -> (String, HashMap<String, Value>) {
    let ids: HashMap<String, String> = vars.keys().map(|name| (name.clone(), name.clone())).collect();
    let values = vars
        .iter()
        .map(|(name, value)| (name.clone(), Value::from(value.clone())))
        .collect();
    (restore_expression_variables(code, &ids, &[]), values)
}

pub fn eval(args: EvalArgs, _cwd: &str) -> Result<()> {
    let vars = match &args.vars {
        Some(json) => serde_json::from_str(json).context("--vars must be a JSON object")?,
        None => serde_json::Map::new(),
    };
    let (code, values) = bind_vars(&args.expression, &vars);

    let available: HashSet<String> = vars.keys().map(|name| encode_data_variable_id(name)).collect();
    let diagnostics = lint_expression(&code, &LintOptions::expression(available));
    if !diagnostics.is_empty() {
        eprint!("{}", format_diagnostics(&code, "expression", &diagnostics));
    }
    if diagnostics
        .iter()
        .any(|diagnostic| diagnostic.severity == Severity::Error)
    {
        anyhow::bail!("Expression has errors");
    }

    let value = compute_expression(&code, &values);
    match value {
        Value::Undefined => println!("{}", "undefined".dimmed()),
        value => println!("{}", serde_json::to_string_pretty(&value.to_json())?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_vars() {
        let vars = serde_json::json!({ "count": 2, "label": "items" });
        let vars = vars.as_object().unwrap();
        let (code, values) = bind_vars("`${count * 2} ${label}`", vars);
        assert_eq!(
            compute_expression(&code, &values),
            Value::String("4 items".into())
        );
    }

    #[test]
    fn test_unbound_names_stay_plain() {
        let (code, _) = bind_vars("missing + 1", &serde_json::Map::new());
        assert_eq!(code, "missing + 1");
    }
}
