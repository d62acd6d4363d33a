//! Source-preserving identifier rewriting
//!
//! Rewrites only touch identifier spans; everything else in the source,
//! whitespace and formatting included, is kept as written.

use crate::ast::*;
use crate::encoding::{decode_data_variable_id, encode_data_variable_id};
use crate::error::ParseResult;
use crate::parser::parse_program;
use std::collections::HashMap;
use tracing::debug;

/// One identifier occurrence in source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierRef {
    pub name: String,
    pub span: Span,
    /// Value of a `{ name }` object shorthand
    pub shorthand: bool,
    /// Root of an assignment target
    pub assigned: bool,
}

/// Identifier occurrences in source order
pub fn collect_identifiers(expr: &Expression) -> Vec<IdentifierRef> {
    let mut identifiers = Vec::new();
    walk_identifiers(expr, &mut identifiers, false);
    identifiers.sort_by_key(|identifier| identifier.span.start);
    identifiers
}

fn walk_identifiers(expr: &Expression, out: &mut Vec<IdentifierRef>, assigned: bool) {
    match expr {
        Expression::Identifier { name, span } => out.push(IdentifierRef {
            name: name.clone(),
            span: *span,
            shorthand: false,
            assigned,
        }),
        Expression::String { .. }
        | Expression::Number { .. }
        | Expression::Boolean { .. }
        | Expression::Null { .. }
        | Expression::Undefined { .. } => {}
        Expression::Template { parts, .. } => {
            for part in parts {
                if let TemplatePart::Expression(expr) = part {
                    walk_identifiers(expr, out, false);
                }
            }
        }
        Expression::Array { elements, .. } => {
            for element in elements {
                walk_identifiers(element, out, false);
            }
        }
        Expression::Object { properties, .. } => {
            for property in properties {
                match (&property.value, property.shorthand) {
                    (Expression::Identifier { name, span }, true) => out.push(IdentifierRef {
                        name: name.clone(),
                        span: *span,
                        shorthand: true,
                        assigned: false,
                    }),
                    (value, _) => walk_identifiers(value, out, false),
                }
            }
        }
        Expression::Member { object, .. } => walk_identifiers(object, out, assigned),
        Expression::Index { object, index, .. } => {
            walk_identifiers(object, out, assigned);
            walk_identifiers(index, out, false);
        }
        Expression::Call {
            callee, arguments, ..
        } => {
            walk_identifiers(callee, out, false);
            for argument in arguments {
                walk_identifiers(argument, out, false);
            }
        }
        Expression::Unary { operand, .. } => walk_identifiers(operand, out, false),
        Expression::Binary { left, right, .. } | Expression::Logical { left, right, .. } => {
            walk_identifiers(left, out, false);
            walk_identifiers(right, out, false);
        }
        Expression::Conditional {
            test,
            consequent,
            alternate,
            ..
        } => {
            walk_identifiers(test, out, false);
            walk_identifiers(consequent, out, false);
            walk_identifiers(alternate, out, false);
        }
        Expression::Assign { target, value, .. } => {
            walk_identifiers(target, out, true);
            walk_identifiers(value, out, false);
        }
    }
}

/// Identifiers used by expression or action code
pub fn find_identifiers(code: &str) -> ParseResult<Vec<IdentifierRef>> {
    let program = parse_program(code)?;
    Ok(program.body.iter().flat_map(collect_identifiers).collect())
}

/// Rewrite identifiers through `replace`
///
/// Returning `None` keeps an identifier. A replaced shorthand property is
/// expanded, so `{ a }` becomes `{ a: replacement }`.
pub fn transpile_expression(
    code: &str,
    mut replace: impl FnMut(&IdentifierRef) -> Option<String>,
) -> ParseResult<String> {
    let identifiers = find_identifiers(code)?;

    let mut result = String::with_capacity(code.len());
    let mut last = 0;
    for identifier in &identifiers {
        let Some(replacement) = replace(identifier) else {
            continue;
        };
        result.push_str(&code[last..identifier.span.start]);
        if identifier.shorthand {
            result.push_str(&identifier.name);
            result.push_str(": ");
        }
        result.push_str(&replacement);
        last = identifier.span.end;
    }
    result.push_str(&code[last..]);

    Ok(result)
}

/// Replace references to removed data sources with their plain names
///
/// `names` maps data source id to the name to leave behind. The result no
/// longer resolves, which is how a detached variable shows up as unset.
pub fn unset_expression_variables(code: &str, names: &HashMap<String, String>) -> String {
    let rewritten = transpile_expression(code, |identifier| {
        let id = decode_data_variable_id(&identifier.name)?;
        names
            .get(&id)
            .map(|name| crate::encoding::encode_data_variable_name(name))
    });
    rewritten.unwrap_or_else(|err| {
        debug!(error = %err, "Leaving unparseable expression as is");
        code.to_string()
    })
}

/// Bind plain names to data sources in scope
///
/// `ids` maps variable name to data source id. Names listed in `reserved`
/// (action arguments) are never rebound.
pub fn restore_expression_variables(
    code: &str,
    ids: &HashMap<String, String>,
    reserved: &[String],
) -> String {
    let rewritten = transpile_expression(code, |identifier| {
        if decode_data_variable_id(&identifier.name).is_some()
            || reserved.contains(&identifier.name)
        {
            return None;
        }
        let name = crate::encoding::decode_data_variable_name(&identifier.name);
        ids.get(&name).map(|id| encode_data_variable_id(id))
    });
    rewritten.unwrap_or_else(|err| {
        debug!(error = %err, "Leaving unparseable expression as is");
        code.to_string()
    })
}

/// Plain (unbound) names an expression refers to, decoded
pub fn find_unset_names(code: &str, reserved: &[String]) -> Vec<String> {
    let Ok(identifiers) = find_identifiers(code) else {
        return Vec::new();
    };
    let mut names = Vec::new();
    for identifier in identifiers {
        if decode_data_variable_id(&identifier.name).is_some()
            || reserved.contains(&identifier.name)
        {
            continue;
        }
        let name = crate::encoding::decode_data_variable_name(&identifier.name);
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Data source ids an expression refers to
pub fn find_used_data_source_ids(code: &str) -> Vec<String> {
    let Ok(identifiers) = find_identifiers(code) else {
        return Vec::new();
    };
    let mut ids = Vec::new();
    for identifier in identifiers {
        if let Some(id) = decode_data_variable_id(&identifier.name) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transpile_keeps_formatting() {
        let result = transpile_expression("a  +   b.a * `${a}`", |identifier| {
            (identifier.name == "a").then(|| "x".to_string())
        })
        .unwrap();
        assert_eq!(result, "x  +   b.a * `${x}`");
    }

    #[test]
    fn test_transpile_expands_shorthand() {
        let result = transpile_expression("{ a, b }", |identifier| {
            (identifier.name == "a").then(|| "$ws$dataSource$1".to_string())
        })
        .unwrap();
        assert_eq!(result, "{ a: $ws$dataSource$1, b }");
    }

    #[test]
    fn test_unset_then_restore() {
        let code = "$ws$dataSource$d__DASH__1 + $ws$dataSource$d__DASH__2";
        let names = HashMap::from([("d-1".to_string(), "Collection Item".to_string())]);
        let unset = unset_expression_variables(code, &names);
        assert_eq!(unset, "Collection$32$Item + $ws$dataSource$d__DASH__2");

        let ids = HashMap::from([("Collection Item".to_string(), "d-9".to_string())]);
        let restored = restore_expression_variables(&unset, &ids, &[]);
        assert_eq!(restored, "$ws$dataSource$d__DASH__9 + $ws$dataSource$d__DASH__2");
    }

    #[test]
    fn test_restore_skips_reserved_names() {
        let ids = HashMap::from([("event".to_string(), "d-1".to_string())]);
        let restored = restore_expression_variables("event = 1", &ids, &["event".to_string()]);
        assert_eq!(restored, "event = 1");
    }

    #[test]
    fn test_assignment_roots_are_flagged() {
        let identifiers = find_identifiers("a.b = c").unwrap();
        assert_eq!(identifiers.len(), 2);
        assert!(identifiers[0].assigned);
        assert!(!identifiers[1].assigned);
    }

    #[test]
    fn test_unparseable_code_is_left_alone() {
        let names = HashMap::new();
        assert_eq!(unset_expression_variables("a +", &names), "a +");
        assert!(find_unset_names("a +", &[]).is_empty());
    }

    #[test]
    fn test_find_unset_names_decodes() {
        assert_eq!(
            find_unset_names("Collection$32$Item.title + $ws$dataSource$x", &[]),
            vec!["Collection Item".to_string()]
        );
        assert_eq!(
            find_used_data_source_ids("$ws$dataSource$x + $ws$dataSource$x"),
            vec!["x".to_string()]
        );
    }
}
