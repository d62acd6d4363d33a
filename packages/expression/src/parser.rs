use crate::ast::*;
use crate::error::{ParseError, ParseResult};
use crate::lexer::{scan_interpolation_end, tokenize, Token};
use std::ops::Range;

/// Deepest expression nesting accepted before parsing fails
pub const MAX_NESTING_DEPTH: usize = 128;

/// Recursive descent parser for expressions and action statements
pub struct Parser<'src> {
    source: &'src str,
    tokens: Vec<(Token<'src>, Range<usize>)>,
    pos: usize,
    /// Where `source` starts inside the outermost source text
    offset: usize,
    /// Nesting of the expression being parsed
    depth: usize,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> ParseResult<Self> {
        Self::with_offset(source, 0)
    }

    fn with_offset(source: &'src str, offset: usize) -> ParseResult<Self> {
        let tokens = tokenize(source).map_err(|range| {
            ParseError::lexer_error(Span::new(range.start + offset, range.end + offset))
        })?;
        Ok(Self {
            source,
            tokens,
            pos: 0,
            offset,
            depth: 0,
        })
    }

    /// Parse exactly one expression spanning the whole input
    pub fn parse_single(&mut self) -> ParseResult<Expression> {
        let expression = self.parse_expression()?;
        if !self.is_at_end() {
            return Err(ParseError::unexpected_token(
                self.peek_span(),
                "end of expression",
                Self::format_token(self.peek()),
            ));
        }
        Ok(expression)
    }

    /// Parse statements separated by `;` or line breaks
    pub fn parse_program(&mut self) -> ParseResult<Program> {
        let start = self.peek_start();
        let mut body = Vec::new();

        while !self.is_at_end() {
            if self.match_token(Token::Semicolon) {
                continue;
            }

            body.push(self.parse_expression()?);

            if !self.is_at_end() && !self.check(Token::Semicolon) && !self.at_line_break() {
                return Err(ParseError::unexpected_token(
                    self.peek_span(),
                    "';' or end of input",
                    Self::format_token(self.peek()),
                ));
            }
        }

        Ok(Program {
            body,
            span: Span::new(start, self.prev_end()),
        })
    }

    pub fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.parse_assignment_expression()
    }

    fn parse_assignment_expression(&mut self) -> ParseResult<Expression> {
        self.enter()?;
        let expression = self.parse_assignment_inner();
        self.leave(1);
        expression
    }

    fn parse_assignment_inner(&mut self) -> ParseResult<Expression> {
        let start = self.peek_start();
        let target = self.parse_conditional_expression()?;

        let Some(operator) = self.match_assign_op() else {
            return Ok(target);
        };

        let assignable = matches!(
            target,
            Expression::Identifier { .. }
                | Expression::Member {
                    optional: false,
                    ..
                }
                | Expression::Index {
                    optional: false,
                    ..
                }
        );
        if !assignable {
            return Err(ParseError::invalid_syntax(
                target.span(),
                "Invalid assignment target",
            ));
        }

        let value = self.parse_assignment_expression()?;
        Ok(Expression::Assign {
            target: Box::new(target),
            operator,
            value: Box::new(value),
            span: Span::new(start, self.prev_end()),
        })
    }

    fn parse_conditional_expression(&mut self) -> ParseResult<Expression> {
        let start = self.peek_start();
        let test = self.parse_nullish_expression()?;

        if !self.match_token(Token::Question) {
            return Ok(test);
        }

        let consequent = self.parse_assignment_expression()?;
        self.expect(Token::Colon)?;
        let alternate = self.parse_assignment_expression()?;

        Ok(Expression::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
            span: Span::new(start, self.prev_end()),
        })
    }

    fn parse_nullish_expression(&mut self) -> ParseResult<Expression> {
        let start = self.peek_start();
        let mut left = self.parse_or_expression()?;
        let mut chain = 0;

        while self.match_token(Token::Nullish) {
            self.enter()?;
            chain += 1;
            let right = self.parse_or_expression()?;
            left = self.logical(left, LogicalOp::Nullish, right, start);
        }

        self.leave(chain);
        Ok(left)
    }

    fn parse_or_expression(&mut self) -> ParseResult<Expression> {
        let start = self.peek_start();
        let mut left = self.parse_and_expression()?;
        let mut chain = 0;

        while self.match_token(Token::Or) {
            self.enter()?;
            chain += 1;
            let right = self.parse_and_expression()?;
            left = self.logical(left, LogicalOp::Or, right, start);
        }

        self.leave(chain);
        Ok(left)
    }

    fn parse_and_expression(&mut self) -> ParseResult<Expression> {
        let start = self.peek_start();
        let mut left = self.parse_equality_expression()?;
        let mut chain = 0;

        while self.match_token(Token::And) {
            self.enter()?;
            chain += 1;
            let right = self.parse_equality_expression()?;
            left = self.logical(left, LogicalOp::And, right, start);
        }

        self.leave(chain);
        Ok(left)
    }

    fn parse_equality_expression(&mut self) -> ParseResult<Expression> {
        let start = self.peek_start();
        let mut left = self.parse_relational_expression()?;
        let mut chain = 0;

        while let Some(operator) = self.match_equality_op() {
            self.enter()?;
            chain += 1;
            let right = self.parse_relational_expression()?;
            left = self.binary(left, operator, right, start);
        }

        self.leave(chain);
        Ok(left)
    }

    fn parse_relational_expression(&mut self) -> ParseResult<Expression> {
        let start = self.peek_start();
        let mut left = self.parse_additive_expression()?;
        let mut chain = 0;

        while let Some(operator) = self.match_relational_op() {
            self.enter()?;
            chain += 1;
            let right = self.parse_additive_expression()?;
            left = self.binary(left, operator, right, start);
        }

        self.leave(chain);
        Ok(left)
    }

    fn parse_additive_expression(&mut self) -> ParseResult<Expression> {
        let start = self.peek_start();
        let mut left = self.parse_multiplicative_expression()?;
        let mut chain = 0;

        while let Some(operator) = self.match_additive_op() {
            self.enter()?;
            chain += 1;
            let right = self.parse_multiplicative_expression()?;
            left = self.binary(left, operator, right, start);
        }

        self.leave(chain);
        Ok(left)
    }

    fn parse_multiplicative_expression(&mut self) -> ParseResult<Expression> {
        let start = self.peek_start();
        let mut left = self.parse_exponent_expression()?;
        let mut chain = 0;

        while let Some(operator) = self.match_multiplicative_op() {
            self.enter()?;
            chain += 1;
            let right = self.parse_exponent_expression()?;
            left = self.binary(left, operator, right, start);
        }

        self.leave(chain);
        Ok(left)
    }

    /// `**` is right associative
    fn parse_exponent_expression(&mut self) -> ParseResult<Expression> {
        let start = self.peek_start();
        let base = self.parse_unary_expression()?;

        if self.match_token(Token::StarStar) {
            self.enter()?;
            let exponent = self.parse_exponent_expression()?;
            self.leave(1);
            return Ok(self.binary(base, BinaryOp::Exponent, exponent, start));
        }

        Ok(base)
    }

    fn parse_unary_expression(&mut self) -> ParseResult<Expression> {
        let start = self.peek_start();
        let operator = if self.match_token(Token::Bang) {
            UnaryOp::Not
        } else if self.match_token(Token::Minus) {
            UnaryOp::Negate
        } else if self.match_token(Token::Plus) {
            UnaryOp::Plus
        } else {
            return self.parse_postfix_expression();
        };

        self.enter()?;
        let operand = self.parse_unary_expression()?;
        self.leave(1);
        Ok(Expression::Unary {
            operator,
            operand: Box::new(operand),
            span: Span::new(start, self.prev_end()),
        })
    }

    /// Member access, optional chaining, indexing and calls
    fn parse_postfix_expression(&mut self) -> ParseResult<Expression> {
        let start = self.peek_start();
        let mut expr = self.parse_primary_expression()?;
        let mut chain = 0;

        loop {
            if matches!(
                self.peek(),
                Some((Token::Dot | Token::QuestionDot | Token::LBracket | Token::LParen, _))
            ) {
                self.enter()?;
                chain += 1;
            }

            if self.match_token(Token::Dot) {
                let property = self.expect_property_name()?;
                expr = Expression::Member {
                    object: Box::new(expr),
                    property,
                    optional: false,
                    span: Span::new(start, self.prev_end()),
                };
            } else if self.match_token(Token::QuestionDot) {
                if self.match_token(Token::LBracket) {
                    let index = self.parse_expression()?;
                    self.expect(Token::RBracket)?;
                    expr = Expression::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        optional: true,
                        span: Span::new(start, self.prev_end()),
                    };
                } else if self.match_token(Token::LParen) {
                    let arguments = self.parse_arguments()?;
                    expr = Expression::Call {
                        callee: Box::new(expr),
                        arguments,
                        optional: true,
                        span: Span::new(start, self.prev_end()),
                    };
                } else {
                    let property = self.expect_property_name()?;
                    expr = Expression::Member {
                        object: Box::new(expr),
                        property,
                        optional: true,
                        span: Span::new(start, self.prev_end()),
                    };
                }
            } else if self.match_token(Token::LBracket) {
                let index = self.parse_expression()?;
                self.expect(Token::RBracket)?;
                expr = Expression::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                    optional: false,
                    span: Span::new(start, self.prev_end()),
                };
            } else if self.match_token(Token::LParen) {
                let arguments = self.parse_arguments()?;
                expr = Expression::Call {
                    callee: Box::new(expr),
                    arguments,
                    optional: false,
                    span: Span::new(start, self.prev_end()),
                };
            } else {
                break;
            }
        }

        self.leave(chain);
        Ok(expr)
    }

    /// Arguments after an already consumed `(`
    fn parse_arguments(&mut self) -> ParseResult<Vec<Expression>> {
        let mut arguments = Vec::new();
        while !self.check(Token::RParen) {
            arguments.push(self.parse_expression()?);
            if !self.match_token(Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen)?;
        Ok(arguments)
    }

    fn parse_primary_expression(&mut self) -> ParseResult<Expression> {
        let Some((token, range)) = self.advance().cloned() else {
            return Err(ParseError::unexpected_eof(self.prev_end(), "expression"));
        };
        let span = self.to_span(&range);

        match token {
            Token::Number(raw) => Ok(Expression::Number {
                value: parse_number(raw, span)?,
                span,
            }),
            Token::String(raw) => Ok(Expression::String {
                value: unescape(raw, span)?,
                span,
            }),
            Token::Template(raw) => self.parse_template(raw, span),
            Token::True => Ok(Expression::Boolean { value: true, span }),
            Token::False => Ok(Expression::Boolean { value: false, span }),
            Token::Null => Ok(Expression::Null { span }),
            Token::Undefined => Ok(Expression::Undefined { span }),
            Token::Ident(name) => Ok(Expression::Identifier {
                name: name.to_string(),
                span,
            }),
            Token::LParen => {
                let expr = self.parse_expression()?;
                self.expect(Token::RParen)?;
                if self.check(Token::Arrow) {
                    return Err(ParseError::invalid_syntax(
                        self.peek_span(),
                        "Functions are not supported in expressions",
                    ));
                }
                Ok(expr)
            }
            Token::LBracket => {
                let start = span.start;
                let mut elements = Vec::new();
                while !self.check(Token::RBracket) {
                    elements.push(self.parse_expression()?);
                    if !self.match_token(Token::Comma) {
                        break;
                    }
                }
                self.expect(Token::RBracket)?;
                Ok(Expression::Array {
                    elements,
                    span: Span::new(start, self.prev_end()),
                })
            }
            Token::LBrace => self.parse_object(span.start),
            Token::Arrow => Err(ParseError::invalid_syntax(
                span,
                "Functions are not supported in expressions",
            )),
            token => Err(ParseError::unexpected_token(
                span,
                "expression",
                Self::format_token(Some(&(token, range))),
            )),
        }
    }

    /// Object literal after an already consumed `{`
    fn parse_object(&mut self, start: usize) -> ParseResult<Expression> {
        let mut properties = Vec::new();

        while !self.check(Token::RBrace) {
            let key_start = self.peek_start();
            let (key, allows_shorthand) = match self.advance().cloned() {
                Some((Token::Ident(name), _)) => (name.to_string(), true),
                Some((Token::String(raw), range)) => (unescape(raw, self.to_span(&range))?, false),
                Some((Token::Number(raw), range)) => {
                    let value = parse_number(raw, self.to_span(&range))?;
                    (crate::value::format_number(value), false)
                }
                Some((Token::True, _)) => ("true".to_string(), false),
                Some((Token::False, _)) => ("false".to_string(), false),
                Some((Token::Null, _)) => ("null".to_string(), false),
                Some((Token::Undefined, _)) => ("undefined".to_string(), false),
                Some((token, range)) => {
                    return Err(ParseError::unexpected_token(
                        self.to_span(&range),
                        "property name",
                        Self::format_token(Some(&(token, range))),
                    ))
                }
                None => return Err(ParseError::unexpected_eof(self.prev_end(), "property name")),
            };
            let key_span = Span::new(key_start, self.prev_end());

            if self.match_token(Token::Colon) {
                let value = self.parse_expression()?;
                properties.push(ObjectProperty {
                    key,
                    value,
                    shorthand: false,
                    span: Span::new(key_start, self.prev_end()),
                });
            } else if allows_shorthand {
                properties.push(ObjectProperty {
                    value: Expression::Identifier {
                        name: key.clone(),
                        span: key_span,
                    },
                    key,
                    shorthand: true,
                    span: key_span,
                });
            } else {
                return Err(ParseError::unexpected_token(
                    self.peek_span(),
                    "':'",
                    Self::format_token(self.peek()),
                ));
            }

            if !self.match_token(Token::Comma) {
                break;
            }
        }

        self.expect(Token::RBrace)?;
        Ok(Expression::Object {
            properties,
            span: Span::new(start, self.prev_end()),
        })
    }

    /// Split raw template content into literal text and interpolations
    fn parse_template(&self, raw: &str, span: Span) -> ParseResult<Expression> {
        // content starts right after the opening backtick
        let content_start = span.start + 1;
        let bytes = raw.as_bytes();
        let mut parts = Vec::new();
        let mut literal_start = 0;
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                b'\\' => i += 2,
                b'$' if bytes.get(i + 1) == Some(&b'{') => {
                    if i > literal_start {
                        parts.push(TemplatePart::Literal(unescape(
                            &raw[literal_start..i],
                            span,
                        )?));
                    }

                    let body_start = i + 2;
                    let body_end = scan_interpolation_end(raw, body_start).ok_or_else(|| {
                        ParseError::invalid_syntax(span, "Unterminated template interpolation")
                    })?;
                    let mut parser =
                        Parser::with_offset(&raw[body_start..body_end], content_start + body_start)?;
                    parser.depth = self.depth + 1;
                    parts.push(TemplatePart::Expression(parser.parse_single()?));

                    i = body_end + 1;
                    literal_start = i;
                }
                _ => i += 1,
            }
        }

        if literal_start < raw.len() {
            parts.push(TemplatePart::Literal(unescape(&raw[literal_start..], span)?));
        }

        Ok(Expression::Template { parts, span })
    }

    /// Go one level deeper, failing past [`MAX_NESTING_DEPTH`]
    fn enter(&mut self) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::TooDeep {
                span: self.peek_span(),
                limit: MAX_NESTING_DEPTH,
            });
        }
        Ok(())
    }

    fn leave(&mut self, levels: usize) {
        self.depth = self.depth.saturating_sub(levels);
    }

    fn logical(
        &self,
        left: Expression,
        operator: LogicalOp,
        right: Expression,
        start: usize,
    ) -> Expression {
        Expression::Logical {
            left: Box::new(left),
            operator,
            right: Box::new(right),
            span: Span::new(start, self.prev_end()),
        }
    }

    fn binary(&self, left: Expression, operator: BinaryOp, right: Expression, start: usize) -> Expression {
        Expression::Binary {
            left: Box::new(left),
            operator,
            right: Box::new(right),
            span: Span::new(start, self.prev_end()),
        }
    }

    fn match_assign_op(&mut self) -> Option<AssignOp> {
        if self.match_token(Token::Equals) {
            Some(AssignOp::Assign)
        } else if self.match_token(Token::PlusEquals) {
            Some(AssignOp::Add)
        } else if self.match_token(Token::MinusEquals) {
            Some(AssignOp::Subtract)
        } else if self.match_token(Token::StarEquals) {
            Some(AssignOp::Multiply)
        } else if self.match_token(Token::SlashEquals) {
            Some(AssignOp::Divide)
        } else {
            None
        }
    }

    fn match_equality_op(&mut self) -> Option<BinaryOp> {
        if self.match_token(Token::StrictEquals) {
            Some(BinaryOp::StrictEquals)
        } else if self.match_token(Token::StrictNotEquals) {
            Some(BinaryOp::StrictNotEquals)
        } else if self.match_token(Token::EqualsEquals) {
            Some(BinaryOp::Equals)
        } else if self.match_token(Token::NotEquals) {
            Some(BinaryOp::NotEquals)
        } else {
            None
        }
    }

    fn match_relational_op(&mut self) -> Option<BinaryOp> {
        if self.match_token(Token::LessThanEquals) {
            Some(BinaryOp::LessThanOrEqual)
        } else if self.match_token(Token::GreaterThanEquals) {
            Some(BinaryOp::GreaterThanOrEqual)
        } else if self.match_token(Token::LessThan) {
            Some(BinaryOp::LessThan)
        } else if self.match_token(Token::GreaterThan) {
            Some(BinaryOp::GreaterThan)
        } else {
            None
        }
    }

    fn match_additive_op(&mut self) -> Option<BinaryOp> {
        if self.match_token(Token::Plus) {
            Some(BinaryOp::Add)
        } else if self.match_token(Token::Minus) {
            Some(BinaryOp::Subtract)
        } else {
            None
        }
    }

    fn match_multiplicative_op(&mut self) -> Option<BinaryOp> {
        if self.match_token(Token::Star) {
            Some(BinaryOp::Multiply)
        } else if self.match_token(Token::Slash) {
            Some(BinaryOp::Divide)
        } else if self.match_token(Token::Percent) {
            Some(BinaryOp::Remainder)
        } else {
            None
        }
    }

    // Helper methods

    fn peek(&self) -> Option<&(Token<'src>, Range<usize>)> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&(Token<'src>, Range<usize>)> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn check(&self, token: Token) -> bool {
        if let Some((t, _)) = self.peek() {
            std::mem::discriminant(t) == std::mem::discriminant(&token)
        } else {
            false
        }
    }

    fn match_token(&mut self, token: Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> ParseResult<()> {
        if self.check(token.clone()) {
            self.advance();
            Ok(())
        } else if self.is_at_end() {
            Err(ParseError::unexpected_eof(
                self.prev_end(),
                Self::format_expected_token(&token),
            ))
        } else {
            Err(ParseError::unexpected_token(
                self.peek_span(),
                Self::format_expected_token(&token),
                Self::format_token(self.peek()),
            ))
        }
    }

    fn expect_property_name(&mut self) -> ParseResult<String> {
        let name = match self.peek() {
            Some((Token::Ident(name), _)) => name.to_string(),
            Some((Token::True, _)) => "true".to_string(),
            Some((Token::False, _)) => "false".to_string(),
            Some((Token::Null, _)) => "null".to_string(),
            Some((Token::Undefined, _)) => "undefined".to_string(),
            _ => {
                return Err(ParseError::unexpected_token(
                    self.peek_span(),
                    "property name",
                    Self::format_token(self.peek()),
                ))
            }
        };
        self.advance();
        Ok(name)
    }

    /// Whether a line break separates the previous token from the next one
    fn at_line_break(&self) -> bool {
        let Some((_, next)) = self.peek() else {
            return true;
        };
        let prev_end = self
            .tokens
            .get(self.pos.saturating_sub(1))
            .map(|(_, range)| range.end)
            .unwrap_or(0);
        self.source[prev_end..next.start].contains('\n')
    }

    fn to_span(&self, range: &Range<usize>) -> Span {
        Span::new(range.start + self.offset, range.end + self.offset)
    }

    /// Absolute start of the next token
    fn peek_start(&self) -> usize {
        self.peek_span().start
    }

    /// Absolute end of the last consumed token
    fn prev_end(&self) -> usize {
        if self.pos == 0 {
            return self.offset;
        }
        self.tokens
            .get(self.pos - 1)
            .or_else(|| self.tokens.last())
            .map(|(_, range)| range.end + self.offset)
            .unwrap_or(self.offset)
    }

    fn peek_span(&self) -> Span {
        match self.tokens.get(self.pos) {
            Some((_, range)) => self.to_span(range),
            None => {
                let end = self.offset + self.source.len();
                Span::new(end, end)
            }
        }
    }

    fn format_token(token: Option<&(Token, Range<usize>)>) -> String {
        match token {
            None => "end of input".to_string(),
            Some((Token::Ident(s), _)) => format!("identifier '{}'", s),
            Some((Token::String(s), _)) => format!("string '{}'", s),
            Some((Token::Number(n), _)) => format!("number {}", n),
            Some((Token::Template(_), _)) => "template literal".to_string(),
            Some((token, _)) => Self::format_expected_token(token),
        }
    }

    fn format_expected_token(token: &Token) -> String {
        let text = match token {
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Colon => ":",
            Token::Semicolon => ";",
            Token::Comma => ",",
            Token::Dot => ".",
            Token::Question => "?",
            Token::QuestionDot => "?.",
            Token::Arrow => "=>",
            Token::Equals => "=",
            Token::Slash => "/",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            token => return format!("{:?}", token),
        };
        format!("'{}'", text)
    }
}

fn parse_number(raw: &str, span: Span) -> ParseResult<f64> {
    raw.parse::<f64>()
        .map_err(|_| ParseError::invalid_syntax(span, format!("Invalid number '{}'", raw)))
}

/// Resolve backslash escapes in string and template literal text
pub(crate) fn unescape(raw: &str, span: Span) -> ParseResult<String> {
    let mut result = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }

        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('b') => result.push('\u{8}'),
            Some('f') => result.push('\u{c}'),
            Some('v') => result.push('\u{b}'),
            Some('0') => result.push('\0'),
            Some('\n') => {}
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                result.push(decode_code_point(&hex, span)?);
            }
            Some('u') => {
                let hex: String = if chars.peek() == Some(&'{') {
                    chars.next();
                    chars.by_ref().take_while(|c| *c != '}').collect()
                } else {
                    chars.by_ref().take(4).collect()
                };
                result.push(decode_code_point(&hex, span)?);
            }
            Some(other) => result.push(other),
            None => return Err(ParseError::invalid_syntax(span, "Unterminated escape sequence")),
        }
    }

    Ok(result)
}

fn decode_code_point(hex: &str, span: Span) -> ParseResult<char> {
    u32::from_str_radix(hex, 16)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| ParseError::invalid_syntax(span, format!("Invalid escape '{}'", hex)))
}

/// Parse a single expression; trailing tokens are an error
pub fn parse_expression(source: &str) -> ParseResult<Expression> {
    Parser::new(source)?.parse_single()
}

/// Parse action code: zero or more statements
pub fn parse_program(source: &str) -> ParseResult<Program> {
    Parser::new(source)?.parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        let Expression::Binary {
            operator, right, ..
        } = expr
        else {
            panic!("Expected binary expression");
        };
        assert_eq!(operator, BinaryOp::Add);
        assert!(matches!(
            *right,
            Expression::Binary {
                operator: BinaryOp::Multiply,
                ..
            }
        ));
    }

    #[test]
    fn test_exponent_is_right_associative() {
        let expr = parse_expression("2 ** 3 ** 2").unwrap();
        let Expression::Binary { left, right, .. } = expr else {
            panic!("Expected binary expression");
        };
        assert!(matches!(*left, Expression::Number { value, .. } if value == 2.0));
        assert!(matches!(*right, Expression::Binary { .. }));
    }

    #[test]
    fn test_url_is_a_syntax_error() {
        let err = parse_expression("https://github.com").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { .. }));
    }

    #[test]
    fn test_template_spans_are_absolute() {
        let source = "`Hello ${name}!`";
        let expr = parse_expression(source).unwrap();
        let Expression::Template { parts, .. } = expr else {
            panic!("Expected template");
        };
        assert_eq!(parts.len(), 3);
        let TemplatePart::Expression(Expression::Identifier { span, .. }) = &parts[1] else {
            panic!("Expected identifier interpolation");
        };
        assert_eq!(&source[span.range()], "name");
    }

    #[test]
    fn test_object_shorthand() {
        let expr = parse_expression("{ a, b: 1, 'c d': 2 }").unwrap();
        let Expression::Object { properties, .. } = expr else {
            panic!("Expected object");
        };
        assert!(properties[0].shorthand);
        assert_eq!(properties[0].key, "a");
        assert!(!properties[1].shorthand);
        assert_eq!(properties[2].key, "c d");
    }

    #[test]
    fn test_optional_chaining() {
        let expr = parse_expression("a?.b?.[0]?.(1)").unwrap();
        assert!(matches!(expr, Expression::Call { optional: true, .. }));
    }

    #[test]
    fn test_program_statements() {
        let program = parse_program("a = 1; b += 2\nc = a").unwrap();
        assert_eq!(program.body.len(), 3);
        assert!(parse_program("a = 1 b = 2").is_err());
    }

    #[test]
    fn test_invalid_assignment_target() {
        let err = parse_program("1 = 2").unwrap_err();
        assert!(err.to_string().contains("Invalid assignment target"));
    }

    #[test]
    fn test_arrow_functions_are_rejected() {
        assert!(parse_expression("(a) => a").is_err());
        assert!(parse_expression("a => a").is_err());
    }

    #[test]
    fn test_string_escapes() {
        let expr = parse_expression(r#""a\nA\u{1F600}""#).unwrap();
        assert!(matches!(expr, Expression::String { value, .. } if value == "a\nA\u{1F600}"));
    }

    #[test]
    fn test_empty_source() {
        assert!(matches!(
            parse_expression("").unwrap_err(),
            ParseError::UnexpectedEof { .. }
        ));
    }

    #[test]
    fn test_nesting_limit() {
        let at_limit = format!(
            "{}1{}",
            "(".repeat(MAX_NESTING_DEPTH - 1),
            ")".repeat(MAX_NESTING_DEPTH - 1)
        );
        assert!(parse_expression(&at_limit).is_ok());

        let past_limit = format!("({})", at_limit);
        assert!(matches!(
            parse_expression(&past_limit).unwrap_err(),
            ParseError::TooDeep { limit: MAX_NESTING_DEPTH, .. }
        ));
    }

    #[test]
    fn test_depth_is_released_between_statements() {
        let nested = format!("{}1{}", "[".repeat(100), "]".repeat(100));
        let source = vec![nested.as_str(); 10].join("; ");
        assert_eq!(parse_program(&source).unwrap().body.len(), 10);
    }
}
