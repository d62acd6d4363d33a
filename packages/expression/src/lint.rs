//! Static checks for expression and action code

use crate::ast::{Expression, Span};
use crate::encoding::decode_data_variable_name;
use crate::parser::{parse_expression, parse_program};
use crate::transpile::collect_identifiers;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub message: String,
    pub span: Span,
    pub severity: Severity,
}

impl Diagnostic {
    pub fn error(span: Span, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            span,
            severity: Severity::Error,
        }
    }

    pub fn warning(span: Span, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            span,
            severity: Severity::Warning,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LintOptions {
    /// Identifiers that resolve (encoded ids of variables in scope, action args)
    pub available: HashSet<String>,
    /// Action code: statements and assignments are allowed
    pub allow_assignments: bool,
}

impl LintOptions {
    pub fn expression(available: HashSet<String>) -> Self {
        Self {
            available,
            allow_assignments: false,
        }
    }

    pub fn action(available: HashSet<String>) -> Self {
        Self {
            available,
            allow_assignments: true,
        }
    }
}

/// Diagnostics for a piece of code; empty when it is fine
pub fn lint_expression(code: &str, options: &LintOptions) -> Vec<Diagnostic> {
    if code.trim().is_empty() {
        return vec![Diagnostic::error(
            Span::new(0, code.len()),
            "Expression cannot be empty",
        )];
    }

    let statements = if options.allow_assignments {
        parse_program(code).map(|program| program.body)
    } else {
        parse_expression(code).map(|expression| vec![expression])
    };
    let statements = match statements {
        Ok(statements) => statements,
        Err(err) => return vec![Diagnostic::error(err.span(), err.to_string())],
    };

    let mut diagnostics = Vec::new();
    for statement in &statements {
        if !options.allow_assignments {
            find_assignments(statement, &mut diagnostics);
        }
        for identifier in collect_identifiers(statement) {
            if !options.available.contains(&identifier.name) {
                diagnostics.push(Diagnostic::error(
                    identifier.span,
                    format!(
                        "\"{}\" is not defined in the scope",
                        decode_data_variable_name(&identifier.name)
                    ),
                ));
            }
        }
    }

    if options.allow_assignments && !statements.iter().any(has_assignment) {
        diagnostics.push(Diagnostic::warning(
            Span::new(0, code.len()),
            "Action does not assign any variable",
        ));
    }

    diagnostics.sort_by_key(|diagnostic| diagnostic.span.start);
    diagnostics
}

fn has_assignment(expr: &Expression) -> bool {
    let mut found = Vec::new();
    find_assignments(expr, &mut found);
    !found.is_empty()
}

fn find_assignments(expr: &Expression, out: &mut Vec<Diagnostic>) {
    match expr {
        Expression::Assign { span, value, .. } => {
            out.push(Diagnostic::error(*span, "Assignment is only allowed in actions"));
            find_assignments(value, out);
        }
        Expression::Template { parts, .. } => {
            for part in parts {
                if let crate::ast::TemplatePart::Expression(expr) = part {
                    find_assignments(expr, out);
                }
            }
        }
        Expression::Array { elements, .. } => {
            elements.iter().for_each(|element| find_assignments(element, out))
        }
        Expression::Object { properties, .. } => properties
            .iter()
            .for_each(|property| find_assignments(&property.value, out)),
        Expression::Member { object, .. } => find_assignments(object, out),
        Expression::Index { object, index, .. } => {
            find_assignments(object, out);
            find_assignments(index, out);
        }
        Expression::Call {
            callee, arguments, ..
        } => {
            find_assignments(callee, out);
            arguments
                .iter()
                .for_each(|argument| find_assignments(argument, out));
        }
        Expression::Unary { operand, .. } => find_assignments(operand, out),
        Expression::Binary { left, right, .. } | Expression::Logical { left, right, .. } => {
            find_assignments(left, out);
            find_assignments(right, out);
        }
        Expression::Conditional {
            test,
            consequent,
            alternate,
            ..
        } => {
            find_assignments(test, out);
            find_assignments(consequent, out);
            find_assignments(alternate, out);
        }
        Expression::String { .. }
        | Expression::Number { .. }
        | Expression::Boolean { .. }
        | Expression::Null { .. }
        | Expression::Undefined { .. }
        | Expression::Identifier { .. } => {}
    }
}

/// Render diagnostics against their source with ariadne
#[cfg(feature = "pretty-errors")]
pub fn format_diagnostics(code: &str, label: &str, diagnostics: &[Diagnostic]) -> String {
    use ariadne::{Color, Config, Label, Report, ReportKind, Source};

    let mut output = Vec::new();

    for diagnostic in diagnostics {
        let (kind, color) = match diagnostic.severity {
            Severity::Error => (ReportKind::Error, Color::Red),
            Severity::Warning => (ReportKind::Warning, Color::Yellow),
        };
        let end = diagnostic.span.end.min(code.len());
        let start = diagnostic.span.start.min(end);

        let report = Report::build(kind, label, start)
            .with_config(Config::default().with_color(false))
            .with_message(&diagnostic.message)
            .with_label(
                Label::new((label, start..end))
                    .with_color(color)
                    .with_message(&diagnostic.message),
            )
            .finish();

        if report.write((label, Source::from(code)), &mut output).is_err() {
            output.extend_from_slice(diagnostic.message.as_bytes());
            output.push(b'\n');
        }
    }

    String::from_utf8(output).unwrap_or_else(|_| "Error formatting failed".to_string())
}
