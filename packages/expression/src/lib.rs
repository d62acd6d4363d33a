//! # Trellis Expression
//!
//! The small expression language used by bindings, resource fields and
//! action props. Code is parsed into an AST and interpreted; nothing is
//! ever handed to a host language `eval`.
//!
//! Data sources are referenced by encoded id (`$ws$dataSource$<id>`), which
//! keeps expressions stable when variables are renamed. Unbound plain names
//! are what remain after a variable goes out of scope; see
//! [`unset_expression_variables`] and [`restore_expression_variables`].

pub mod ast;
pub mod encoding;
pub mod error;
pub mod evaluator;
pub mod lexer;
pub mod lint;
pub mod parser;
pub mod transpile;
pub mod value;

#[cfg(test)]
mod tests_expressions;

pub use encoding::{
    decode_data_variable_id, decode_data_variable_name, encode_data_variable_id,
    encode_data_variable_name, is_data_variable_id, DATA_SOURCE_ID_PREFIX,
};
pub use error::{EvalError, ExpressionError, ParseError, ParseResult};
pub use evaluator::{
    compute_expression, execute_action, try_compute_expression, try_execute_action, EvalMode,
    Evaluator, Scope,
};
#[cfg(feature = "pretty-errors")]
pub use lint::format_diagnostics;
pub use lint::{lint_expression, Diagnostic, LintOptions, Severity};
pub use parser::{parse_expression, parse_program};
pub use transpile::{
    find_identifiers, find_unset_names, find_used_data_source_ids, restore_expression_variables,
    transpile_expression, unset_expression_variables, IdentifierRef,
};
pub use value::Value;
