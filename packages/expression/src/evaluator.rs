//! Tree-walking evaluator
//!
//! Expressions only see the names declared in their [`Scope`]; there are no
//! globals, so an identifier that was not bound evaluates to `undefined`.

use crate::ast::*;
use crate::encoding::decode_data_variable_id;
use crate::error::{EvalError, EvalResult, ExpressionError};
use crate::parser::{parse_expression, parse_program};
use crate::transpile::{collect_identifiers, IdentifierRef};
use crate::value::{format_number, Value};
use std::collections::HashMap;
use tracing::{error, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    /// Read-only: assignments are rejected
    Expression,
    /// Action code: assignments update the scope
    Action,
}

#[derive(Debug, Clone, Default)]
pub struct Scope {
    values: HashMap<String, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}

pub struct Evaluator<'s> {
    scope: &'s mut Scope,
    mode: EvalMode,
    assigned: Vec<String>,
}

impl<'s> Evaluator<'s> {
    pub fn new(scope: &'s mut Scope, mode: EvalMode) -> Self {
        Self {
            scope,
            mode,
            assigned: Vec::new(),
        }
    }

    /// Names assigned so far, in first-assignment order
    pub fn into_assigned(self) -> Vec<String> {
        self.assigned
    }

    pub fn evaluate(&mut self, expr: &Expression) -> EvalResult<Value> {
        Ok(self.evaluate_chain(expr)?.unwrap_or_default())
    }

    /// Evaluate, returning `None` when an optional chain short-circuits
    fn evaluate_chain(&mut self, expr: &Expression) -> EvalResult<Option<Value>> {
        let value = match expr {
            Expression::Member {
                object,
                property,
                optional,
                span,
            } => {
                let Some(object) = self.evaluate_chain(object)? else {
                    return Ok(None);
                };
                if object.is_nullish() {
                    if *optional {
                        return Ok(None);
                    }
                    return Err(EvalError::type_error(
                        *span,
                        format!(
                            "Cannot read properties of {} (reading '{}')",
                            object.type_name(),
                            property
                        ),
                    ));
                }
                object.get_property(property)
            }
            Expression::Index {
                object,
                index,
                optional,
                span,
            } => {
                let Some(object) = self.evaluate_chain(object)? else {
                    return Ok(None);
                };
                if object.is_nullish() {
                    if *optional {
                        return Ok(None);
                    }
                    return Err(EvalError::type_error(
                        *span,
                        format!("Cannot read properties of {}", object.type_name()),
                    ));
                }
                let key = self.evaluate(index)?;
                object.get_property(&property_key(&key))
            }
            Expression::Call {
                callee,
                arguments,
                optional,
                span,
            } => return self.evaluate_call(callee, arguments, *optional, *span),
            other => self.evaluate_value(other)?,
        };
        Ok(Some(value))
    }

    fn evaluate_value(&mut self, expr: &Expression) -> EvalResult<Value> {
        match expr {
            Expression::String { value, .. } => Ok(Value::String(value.clone())),
            Expression::Number { value, .. } => Ok(Value::Number(*value)),
            Expression::Boolean { value, .. } => Ok(Value::Boolean(*value)),
            Expression::Null { .. } => Ok(Value::Null),
            Expression::Undefined { .. } => Ok(Value::Undefined),

            Expression::Identifier { name, .. } => match self.scope.get(name) {
                Some(value) => Ok(value.clone()),
                None => {
                    trace!(name = name.as_str(), "Unresolved identifier");
                    Ok(Value::Undefined)
                }
            },

            Expression::Template { parts, .. } => {
                let mut result = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Literal(text) => result.push_str(text),
                        TemplatePart::Expression(expr) => {
                            result.push_str(&self.evaluate(expr)?.to_display_string())
                        }
                    }
                }
                Ok(Value::String(result))
            }

            Expression::Array { elements, .. } => Ok(Value::Array(
                elements
                    .iter()
                    .map(|element| self.evaluate(element))
                    .collect::<EvalResult<_>>()?,
            )),

            Expression::Object { properties, .. } => {
                let mut map = std::collections::BTreeMap::new();
                for property in properties {
                    let value = self.evaluate(&property.value)?;
                    map.insert(property.key.clone(), value);
                }
                Ok(Value::Object(map))
            }

            Expression::Unary {
                operator, operand, ..
            } => {
                let value = self.evaluate(operand)?;
                Ok(match operator {
                    UnaryOp::Not => Value::Boolean(!value.is_truthy()),
                    UnaryOp::Negate => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                })
            }

            Expression::Binary {
                left,
                operator,
                right,
                ..
            } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                Ok(apply_binary(*operator, &left, &right))
            }

            Expression::Logical {
                left,
                operator,
                right,
                ..
            } => {
                let left = self.evaluate(left)?;
                let short_circuits = match operator {
                    LogicalOp::And => !left.is_truthy(),
                    LogicalOp::Or => left.is_truthy(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuits {
                    Ok(left)
                } else {
                    self.evaluate(right)
                }
            }

            Expression::Conditional {
                test,
                consequent,
                alternate,
                ..
            } => {
                if self.evaluate(test)?.is_truthy() {
                    self.evaluate(consequent)
                } else {
                    self.evaluate(alternate)
                }
            }

            Expression::Assign {
                target,
                operator,
                value,
                span,
            } => {
                if self.mode != EvalMode::Action {
                    return Err(EvalError::AssignmentNotAllowed { span: *span });
                }
                let mut value = self.evaluate(value)?;
                if let Some(binary) = operator.binary_op() {
                    let current = self.evaluate(target)?;
                    value = apply_binary(binary, &current, &value);
                }
                self.assign(target, value.clone())?;
                Ok(value)
            }

            Expression::Member { .. } | Expression::Index { .. } | Expression::Call { .. } => {
                self.evaluate(expr)
            }
        }
    }

    /// Only allow-listed methods on built-in values can be called
    fn evaluate_call(
        &mut self,
        callee: &Expression,
        arguments: &[Expression],
        optional: bool,
        span: Span,
    ) -> EvalResult<Option<Value>> {
        let Expression::Member {
            object,
            property,
            optional: member_optional,
            ..
        } = callee
        else {
            let callee_value = self.evaluate(callee)?;
            if optional && callee_value.is_nullish() {
                return Ok(None);
            }
            return Err(EvalError::NotAFunction {
                callee: describe_callee(callee),
                span,
            });
        };

        let Some(receiver) = self.evaluate_chain(object)? else {
            return Ok(None);
        };
        if receiver.is_nullish() {
            if *member_optional {
                return Ok(None);
            }
            return Err(EvalError::type_error(
                span,
                format!(
                    "Cannot read properties of {} (reading '{}')",
                    receiver.type_name(),
                    property
                ),
            ));
        }

        let args = arguments
            .iter()
            .map(|argument| self.evaluate(argument))
            .collect::<EvalResult<Vec<_>>>()?;

        match call_method(&receiver, property, &args, span) {
            Some(result) => result.map(Some),
            None if optional => Ok(None),
            None => Err(EvalError::NotAFunction {
                callee: describe_callee(callee),
                span,
            }),
        }
    }

    fn assign(&mut self, target: &Expression, value: Value) -> EvalResult<()> {
        match target {
            Expression::Identifier { name, .. } => {
                self.scope.declare(name.clone(), value);
                if !self.assigned.contains(name) {
                    self.assigned.push(name.clone());
                }
                Ok(())
            }
            Expression::Member {
                object,
                property,
                span,
                ..
            } => {
                let mut container = self.evaluate(object)?;
                set_property(&mut container, property, value, *span)?;
                self.assign(object, container)
            }
            Expression::Index {
                object,
                index,
                span,
                ..
            } => {
                let key = property_key(&self.evaluate(index)?);
                let mut container = self.evaluate(object)?;
                set_property(&mut container, &key, value, *span)?;
                self.assign(object, container)
            }
            other => Err(EvalError::InvalidAssignmentTarget { span: other.span() }),
        }
    }
}

fn property_key(key: &Value) -> String {
    match key {
        Value::Number(n) => format_number(*n),
        other => other.to_display_string(),
    }
}

fn set_property(container: &mut Value, key: &str, value: Value, span: Span) -> EvalResult<()> {
    match container {
        Value::Object(map) => {
            map.insert(key.to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            let index = key.parse::<usize>().map_err(|_| {
                EvalError::type_error(span, format!("Invalid array index '{}'", key))
            })?;
            // One past the end appends; anything further is refused
            match index.cmp(&items.len()) {
                std::cmp::Ordering::Less => items[index] = value,
                std::cmp::Ordering::Equal => items.push(value),
                std::cmp::Ordering::Greater => {
                    return Err(EvalError::type_error(
                        span,
                        format!("Array index {} is out of range (length {})", key, items.len()),
                    ))
                }
            }
            Ok(())
        }
        other => Err(EvalError::type_error(
            span,
            format!(
                "Cannot set properties of {} (setting '{}')",
                other.type_name(),
                key
            ),
        )),
    }
}

fn describe_callee(callee: &Expression) -> String {
    match callee {
        Expression::Identifier { name, .. } => name.clone(),
        Expression::Member {
            object, property, ..
        } => format!("{}.{}", describe_callee(object), property),
        _ => "expression".to_string(),
    }
}

pub(crate) fn apply_binary(operator: BinaryOp, left: &Value, right: &Value) -> Value {
    match operator {
        BinaryOp::Add => {
            let concatenates = |value: &Value| {
                matches!(value, Value::String(_) | Value::Array(_) | Value::Object(_))
            };
            if concatenates(left) || concatenates(right) {
                Value::String(left.to_display_string() + &right.to_display_string())
            } else {
                Value::Number(left.to_number() + right.to_number())
            }
        }
        BinaryOp::Subtract => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Multiply => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Divide => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Remainder => Value::Number(left.to_number() % right.to_number()),
        BinaryOp::Exponent => Value::Number(left.to_number().powf(right.to_number())),
        BinaryOp::StrictEquals => Value::Boolean(left == right),
        BinaryOp::StrictNotEquals => Value::Boolean(left != right),
        BinaryOp::Equals => Value::Boolean(loose_equals(left, right)),
        BinaryOp::NotEquals => Value::Boolean(!loose_equals(left, right)),
        BinaryOp::LessThan => compare(left, right, |o| o.is_lt()),
        BinaryOp::LessThanOrEqual => compare(left, right, |o| o.is_le()),
        BinaryOp::GreaterThan => compare(left, right, |o| o.is_gt()),
        BinaryOp::GreaterThanOrEqual => compare(left, right, |o| o.is_ge()),
    }
}

fn compare(left: &Value, right: &Value, test: impl Fn(std::cmp::Ordering) -> bool) -> Value {
    let ordering = match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    };
    Value::Boolean(ordering.map(test).unwrap_or(false))
}

fn loose_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
        (Value::Number(_), Value::String(_))
        | (Value::String(_), Value::Number(_))
        | (Value::Boolean(_), _)
        | (_, Value::Boolean(_)) => left.to_number() == right.to_number(),
        (Value::String(s), Value::Array(_) | Value::Object(_))
        | (Value::Array(_) | Value::Object(_), Value::String(s)) => {
            let other = if matches!(left, Value::String(_)) {
                right
            } else {
                left
            };
            *s == other.to_display_string()
        }
        _ => left == right,
    }
}

/// Clamp a relative index the way `slice` and `at` read them
fn resolve_index(index: f64, len: usize) -> usize {
    if index.is_nan() {
        return 0;
    }
    let index = index.trunc();
    if index < 0.0 {
        (len as f64 + index).max(0.0) as usize
    } else {
        (index as usize).min(len)
    }
}

fn string_arg(args: &[Value], index: usize) -> String {
    args.get(index)
        .map(Value::to_display_string)
        .unwrap_or_else(|| "undefined".to_string())
}

/// Built-in methods; `None` when the receiver has no such method
fn call_method(
    receiver: &Value,
    method: &str,
    args: &[Value],
    span: Span,
) -> Option<EvalResult<Value>> {
    let value = match (receiver, method) {
        (Value::String(s), "toLowerCase") => Value::String(s.to_lowercase()),
        (Value::String(s), "toUpperCase") => Value::String(s.to_uppercase()),
        (Value::String(s), "trim") => Value::String(s.trim().to_string()),
        (Value::String(s), "includes") => Value::Boolean(s.contains(&string_arg(args, 0))),
        (Value::String(s), "startsWith") => Value::Boolean(s.starts_with(&string_arg(args, 0))),
        (Value::String(s), "endsWith") => Value::Boolean(s.ends_with(&string_arg(args, 0))),
        (Value::String(s), "indexOf") => {
            let needle = string_arg(args, 0);
            let index = s
                .find(&needle)
                .map(|byte| s[..byte].chars().count() as f64)
                .unwrap_or(-1.0);
            Value::Number(index)
        }
        (Value::String(s), "replace") => {
            Value::String(s.replacen(&string_arg(args, 0), &string_arg(args, 1), 1))
        }
        (Value::String(s), "split") => match args.first() {
            None | Some(Value::Undefined) => Value::Array(vec![Value::String(s.clone())]),
            Some(separator) => {
                let separator = separator.to_display_string();
                if separator.is_empty() {
                    Value::Array(s.chars().map(|c| Value::String(c.to_string())).collect())
                } else {
                    Value::Array(
                        s.split(separator.as_str())
                            .map(|part| Value::String(part.to_string()))
                            .collect(),
                    )
                }
            }
        },
        (Value::String(s), "slice") => {
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = slice_bounds(args, chars.len());
            Value::String(chars[start..end.max(start)].iter().collect())
        }
        (Value::String(s), "at") => {
            let chars: Vec<char> = s.chars().collect();
            at_index(args, chars.len())
                .map(|index| Value::String(chars[index].to_string()))
                .unwrap_or_default()
        }

        (Value::Array(items), "join") => {
            let separator = match args.first() {
                None | Some(Value::Undefined) => ",".to_string(),
                Some(separator) => separator.to_display_string(),
            };
            Value::String(join_items(items, &separator))
        }
        (Value::Array(items), "includes") => {
            let needle = args.first().cloned().unwrap_or_default();
            Value::Boolean(items.iter().any(|item| {
                item == &needle
                    || matches!((item, &needle), (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan())
            }))
        }
        (Value::Array(items), "indexOf") => {
            let needle = args.first().cloned().unwrap_or_default();
            let index = items
                .iter()
                .position(|item| item == &needle)
                .map(|index| index as f64)
                .unwrap_or(-1.0);
            Value::Number(index)
        }
        (Value::Array(items), "slice") => {
            let (start, end) = slice_bounds(args, items.len());
            Value::Array(items[start..end.max(start)].to_vec())
        }
        (Value::Array(items), "at") => at_index(args, items.len())
            .map(|index| items[index].clone())
            .unwrap_or_default(),
        (Value::Array(items), "toString") => Value::String(join_items(items, ",")),

        (Value::Number(n), "toFixed") => {
            let digits = args.first().map(Value::to_number).unwrap_or(0.0);
            if !(0.0..=100.0).contains(&digits) {
                return Some(Err(EvalError::InvalidArgument {
                    message: "toFixed() digits argument must be between 0 and 100".to_string(),
                    span,
                }));
            }
            if n.is_finite() {
                Value::String(format!("{:.*}", digits as usize, n))
            } else {
                Value::String(format_number(*n))
            }
        }
        (Value::Number(_) | Value::Boolean(_) | Value::String(_), "toString") => {
            Value::String(receiver.to_display_string())
        }
        _ => return None,
    };
    Some(Ok(value))
}

fn join_items(items: &[Value], separator: &str) -> String {
    items
        .iter()
        .map(|item| {
            if item.is_nullish() {
                String::new()
            } else {
                item.to_display_string()
            }
        })
        .collect::<Vec<_>>()
        .join(separator)
}

fn slice_bounds(args: &[Value], len: usize) -> (usize, usize) {
    let start = match args.first() {
        None | Some(Value::Undefined) => 0,
        Some(value) => resolve_index(value.to_number(), len),
    };
    let end = match args.get(1) {
        None | Some(Value::Undefined) => len,
        Some(value) => resolve_index(value.to_number(), len),
    };
    (start, end)
}

fn at_index(args: &[Value], len: usize) -> Option<usize> {
    let index = args.first().map(Value::to_number).unwrap_or(0.0);
    let index = if index.is_nan() { 0.0 } else { index.trunc() };
    let resolved = if index < 0.0 {
        len as f64 + index
    } else {
        index
    };
    (resolved >= 0.0 && resolved < len as f64).then_some(resolved as usize)
}

/// Declare every encoded data source id the code uses
///
/// Ids without a value are declared as `undefined`, so the evaluation scope
/// only ever contains what the code references.
fn bind_used_variables(
    scope: &mut Scope,
    identifiers: &[IdentifierRef],
    values: &HashMap<String, Value>,
) {
    for identifier in identifiers {
        if scope.contains(&identifier.name) {
            continue;
        }
        if let Some(id) = decode_data_variable_id(&identifier.name) {
            let value = values.get(&id).cloned().unwrap_or_default();
            scope.declare(identifier.name.clone(), value);
        }
    }
}

/// Evaluate an expression against data source values keyed by id
pub fn try_compute_expression(
    code: &str,
    values: &HashMap<String, Value>,
) -> Result<Value, ExpressionError> {
    let expression = parse_expression(code)?;
    let mut scope = Scope::new();
    bind_used_variables(&mut scope, &collect_identifiers(&expression), values);
    let value = Evaluator::new(&mut scope, EvalMode::Expression).evaluate(&expression)?;
    Ok(value)
}

/// Like [`try_compute_expression`], but failures are logged and yield `undefined`
pub fn compute_expression(code: &str, values: &HashMap<String, Value>) -> Value {
    match try_compute_expression(code, values) {
        Ok(value) => value,
        Err(err) => {
            error!(expression = code, error = %err, "Failed to compute expression");
            Value::Undefined
        }
    }
}

/// Run action code and return the data sources it assigned, keyed by id
pub fn try_execute_action(
    code: &str,
    args: &[(String, Value)],
    values: &HashMap<String, Value>,
) -> Result<HashMap<String, Value>, ExpressionError> {
    let program = parse_program(code)?;

    let mut scope = Scope::new();
    for (name, value) in args {
        scope.declare(name.clone(), value.clone());
    }
    let identifiers: Vec<_> = program.body.iter().flat_map(collect_identifiers).collect();
    bind_used_variables(&mut scope, &identifiers, values);

    let mut evaluator = Evaluator::new(&mut scope, EvalMode::Action);
    for statement in &program.body {
        evaluator.evaluate(statement)?;
    }
    let assigned = evaluator.into_assigned();

    let mut updates = HashMap::new();
    for name in assigned {
        if let (Some(id), Some(value)) = (decode_data_variable_id(&name), scope.get(&name)) {
            updates.insert(id, value.clone());
        }
    }
    Ok(updates)
}

/// Like [`try_execute_action`], but a failing action updates nothing
pub fn execute_action(
    code: &str,
    args: &[(String, Value)],
    values: &HashMap<String, Value>,
) -> HashMap<String, Value> {
    match try_execute_action(code, args, values) {
        Ok(updates) => updates,
        Err(err) => {
            error!(action = code, error = %err, "Failed to execute action");
            HashMap::new()
        }
    }
}
