use crate::ast::Span;
use thiserror::Error;

pub type ParseResult<T> = Result<T, ParseError>;
pub type EvalResult<T> = Result<T, EvalError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Unexpected token at {}: expected {expected}, found {found}", .span.start)]
    UnexpectedToken {
        span: Span,
        expected: String,
        found: String,
    },

    #[error("Unexpected end of input at {pos}: expected {expected}")]
    UnexpectedEof { pos: usize, expected: String },

    #[error("Invalid syntax at {}: {message}", .span.start)]
    InvalidSyntax { span: Span, message: String },

    #[error("Lexer error at {}", .span.start)]
    LexerError { span: Span },

    #[error("Expression nested too deeply at {}: limit is {limit}", .span.start)]
    TooDeep { span: Span, limit: usize },
}

impl ParseError {
    pub fn unexpected_token(span: Span, expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::UnexpectedToken {
            span,
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn unexpected_eof(pos: usize, expected: impl Into<String>) -> Self {
        Self::UnexpectedEof {
            pos,
            expected: expected.into(),
        }
    }

    pub fn invalid_syntax(span: Span, message: impl Into<String>) -> Self {
        Self::InvalidSyntax {
            span,
            message: message.into(),
        }
    }

    pub fn lexer_error(span: Span) -> Self {
        Self::LexerError { span }
    }

    pub fn span(&self) -> Span {
        match self {
            ParseError::UnexpectedToken { span, .. }
            | ParseError::InvalidSyntax { span, .. }
            | ParseError::LexerError { span }
            | ParseError::TooDeep { span, .. } => *span,
            ParseError::UnexpectedEof { pos, .. } => Span::new(*pos, *pos),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("TypeError: {message}")]
    TypeError { message: String, span: Span },

    #[error("{callee} is not a function")]
    NotAFunction { callee: String, span: Span },

    #[error("Assignments are only allowed in actions")]
    AssignmentNotAllowed { span: Span },

    #[error("Invalid assignment target")]
    InvalidAssignmentTarget { span: Span },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String, span: Span },
}

impl EvalError {
    pub fn type_error(span: Span, message: impl Into<String>) -> Self {
        Self::TypeError {
            message: message.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            EvalError::TypeError { span, .. }
            | EvalError::NotAFunction { span, .. }
            | EvalError::AssignmentNotAllowed { span }
            | EvalError::InvalidAssignmentTarget { span }
            | EvalError::InvalidArgument { span, .. } => *span,
        }
    }
}

/// Anything that can go wrong between source text and a value
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}

impl ExpressionError {
    pub fn span(&self) -> Span {
        match self {
            ExpressionError::Parse(error) => error.span(),
            ExpressionError::Eval(error) => error.span(),
        }
    }
}
