//! Lexer for the expression language using logos
//!
//! Template literals are scanned by hand from a callback so that nested
//! `${ ... }` interpolations (which may themselves contain strings and
//! templates) stay part of a single token.

use crate::parser::MAX_NESTING_DEPTH;
use logos::{Lexer, Logos};
use std::ops::Range;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum Token<'src> {
    // Keywords
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,
    #[token("undefined")]
    Undefined,

    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*", |lex| lex.slice())]
    Ident(&'src str),

    // Literals
    #[regex(r"[0-9]+(\.[0-9]*)?([eE][+-]?[0-9]+)?", |lex| lex.slice())]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice())]
    Number(&'src str),

    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| {
        let s = lex.slice();
        &s[1..s.len() - 1]
    })]
    #[regex(r"'([^'\\\n]|\\.)*'", |lex| {
        let s = lex.slice();
        &s[1..s.len() - 1]
    })]
    String(&'src str),

    /// Raw template content between the backticks
    #[token("`", lex_template)]
    Template(&'src str),

    // Operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("**")]
    StarStar,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("=")]
    Equals,
    #[token("+=")]
    PlusEquals,
    #[token("-=")]
    MinusEquals,
    #[token("*=")]
    StarEquals,
    #[token("/=")]
    SlashEquals,
    #[token("==")]
    EqualsEquals,
    #[token("===")]
    StrictEquals,
    #[token("!=")]
    NotEquals,
    #[token("!==")]
    StrictNotEquals,
    #[token("<")]
    LessThan,
    #[token("<=")]
    LessThanEquals,
    #[token(">")]
    GreaterThan,
    #[token(">=")]
    GreaterThanEquals,
    #[token("&&")]
    And,
    #[token("||")]
    Or,
    #[token("??")]
    Nullish,
    #[token("!")]
    Bang,
    #[token("?")]
    Question,
    #[token("?.")]
    QuestionDot,
    #[token("=>")]
    Arrow,

    // Punctuation
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
}

fn lex_template<'src>(lex: &mut Lexer<'src, Token<'src>>) -> Option<&'src str> {
    let end = scan_template_end(lex.remainder())?;
    lex.bump(end + 1);
    let slice = lex.slice();
    Some(&slice[1..slice.len() - 1])
}

/// Offset of the closing backtick, given the text after the opening one
pub(crate) fn scan_template_end(source: &str) -> Option<usize> {
    scan_template(source, 0)
}

/// Templates nested deeper than the parser accepts fail to lex
fn scan_template(source: &str, depth: usize) -> Option<usize> {
    if depth > MAX_NESTING_DEPTH {
        return None;
    }
    let bytes = source.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'`' => return Some(i),
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                i = scan_interpolation(source, i + 2, depth)? + 1;
            }
            _ => i += 1,
        }
    }
    None
}

/// Offset of the `}` closing an interpolation whose body starts at `start`
pub(crate) fn scan_interpolation_end(source: &str, start: usize) -> Option<usize> {
    scan_interpolation(source, start, 0)
}

fn scan_interpolation(source: &str, start: usize, depth: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut depth = 0usize;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                if depth == 0 {
                    return Some(i);
                }
                depth -= 1;
            }
            quote @ (b'"' | b'\'') => i = scan_quoted_end(bytes, i + 1, quote)?,
            b'`' => i = i + 1 + scan_template(&source[i + 1..], depth + 1)?,
            _ => {}
        }
        i += 1;
    }
    None
}

fn scan_quoted_end(bytes: &[u8], start: usize, quote: u8) -> Option<usize> {
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            byte if byte == quote => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// Tokenize a source string, failing on the first unrecognized input
pub fn tokenize(source: &str) -> Result<Vec<(Token<'_>, Range<usize>)>, Range<usize>> {
    let mut tokens = Vec::new();
    for (token, span) in Token::lexer(source).spanned() {
        match token {
            Ok(token) => tokens.push((token, span)),
            Err(()) => return Err(span),
        }
    }
    Ok(tokens)
}
