//! Tokenizer for arithmetic expressions with embedded variable references.

use super::ast::{Span, VariableRef};
use super::reference::parse_reference;
use super::{EvaluationError, ExprError};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Number(f64),
    Reference(VariableRef),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    End,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            Self::Number(value) => value.to_string(),
            Self::Reference(reference) => format!("reference to variable {}", reference.id),
            Self::Plus => "`+`".to_string(),
            Self::Minus => "`-`".to_string(),
            Self::Star => "`*`".to_string(),
            Self::Slash => "`/`".to_string(),
            Self::LParen => "`(`".to_string(),
            Self::RParen => "`)`".to_string(),
            Self::End => "end of expression".to_string(),
        }
    }
}

pub(crate) struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    /// Splits the input into tokens, always terminated by `TokenKind::End`.
    ///
    /// A malformed reference wins over malformed arithmetic anywhere in the
    /// text: arithmetic lexing errors are held back until every brace
    /// candidate has been decoded.
    pub fn tokenize(mut self) -> Result<Vec<Token>, ExprError> {
        let mut tokens = Vec::new();
        let mut first_error: Option<ExprError> = None;

        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() {
                self.pos += ch.len_utf8();
                continue;
            }

            let start = self.pos;
            let kind = match ch {
                '+' => self.single(TokenKind::Plus),
                '-' => self.single(TokenKind::Minus),
                '*' => self.single(TokenKind::Star),
                '/' => self.single(TokenKind::Slash),
                '(' => self.single(TokenKind::LParen),
                ')' => self.single(TokenKind::RParen),
                '{' => match self.lex_reference()? {
                    Some(kind) => kind,
                    None => {
                        self.pos += 1;
                        first_error.get_or_insert(unexpected_char('{', start));
                        continue;
                    }
                },
                '0'..='9' | '.' => match self.lex_number() {
                    Ok(kind) => kind,
                    Err(err) => {
                        first_error.get_or_insert(err);
                        continue;
                    }
                },
                other => {
                    self.pos += other.len_utf8();
                    first_error.get_or_insert(unexpected_char(other, start));
                    continue;
                }
            };
            tokens.push(Token {
                kind,
                span: Span::new(start, self.pos),
            });
        }

        if let Some(err) = first_error {
            return Err(err);
        }

        tokens.push(Token {
            kind: TokenKind::End,
            span: Span::new(self.input.len(), self.input.len()),
        });
        Ok(tokens)
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 1;
        kind
    }

    /// Decodes `{ ... }` up to the first closing brace.
    ///
    /// Returns `Ok(None)` when the brace does not open a candidate (another
    /// `{` comes first, or it is never closed).
    fn lex_reference(&mut self) -> Result<Option<TokenKind>, ExprError> {
        let start = self.pos;
        let rest = &self.input[start + 1..];
        let close = match rest.find(['{', '}']) {
            Some(offset) if rest[offset..].starts_with('}') => start + 1 + offset,
            _ => return Ok(None),
        };

        let snippet = &self.input[start..=close];
        let span = Span::new(start, close + 1);
        let reference = parse_reference(snippet).map_err(|message| ExprError::ReferenceParse {
            snippet: snippet.to_string(),
            span,
            message,
        })?;
        self.pos = close + 1;
        Ok(Some(TokenKind::Reference(reference)))
    }

    fn lex_number(&mut self) -> Result<TokenKind, ExprError> {
        let start = self.pos;
        let bytes = self.input.as_bytes();
        let mut end = start;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        if end < bytes.len() && bytes[end] == b'.' {
            end += 1;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
        }
        if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
            let mut exp_end = end + 1;
            if exp_end < bytes.len() && matches!(bytes[exp_end], b'+' | b'-') {
                exp_end += 1;
            }
            if exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
                while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
                    exp_end += 1;
                }
                end = exp_end;
            }
        }

        self.pos = end;
        let literal = &self.input[start..end];
        // Literals beyond f64 range parse to infinity; reject them here.
        match literal.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(TokenKind::Number(value)),
            _ => Err(ExprError::Evaluation(EvaluationError::InvalidNumber {
                literal: literal.to_string(),
                offset: start,
            })),
        }
    }
}

fn unexpected_char(ch: char, offset: usize) -> ExprError {
    ExprError::Evaluation(EvaluationError::UnexpectedChar { ch, offset })
}

#[cfg(test)]
mod tests {
    use super::{Lexer, TokenKind};
    use crate::expr::{EvaluationError, ExprError};

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input)
            .tokenize()
            .expect("input should tokenize")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn tokenizes_numbers_operators_and_references() {
        let tokens = kinds(r#"{ "id": 1 } * (1.5e2 - .5)"#);
        assert!(matches!(&tokens[0], TokenKind::Reference(r) if r.id == 1));
        assert_eq!(tokens[1], TokenKind::Star);
        assert_eq!(tokens[2], TokenKind::LParen);
        assert_eq!(tokens[3], TokenKind::Number(150.0));
        assert_eq!(tokens[4], TokenKind::Minus);
        assert_eq!(tokens[5], TokenKind::Number(0.5));
        assert_eq!(tokens[6], TokenKind::RParen);
        assert_eq!(tokens[7], TokenKind::End);
    }

    #[test]
    fn reference_span_covers_braces() {
        let tokens = Lexer::new("2 + {id:7}").tokenize().expect("tokenize");
        assert_eq!(tokens[2].span.start, 4);
        assert_eq!(tokens[2].span.end, 10);
    }

    #[test]
    fn malformed_reference_beats_earlier_stray_character() {
        let err = Lexer::new("1 $ {id: }").tokenize().expect_err("should fail");
        assert!(matches!(err, ExprError::ReferenceParse { .. }));
    }

    #[test]
    fn stray_braces_are_arithmetic_errors() {
        let err = Lexer::new("{ {id:1}").tokenize().expect_err("nested brace");
        assert!(matches!(
            err,
            ExprError::Evaluation(EvaluationError::UnexpectedChar { ch: '{', offset: 0 })
        ));

        let err = Lexer::new("1 + }").tokenize().expect_err("stray close");
        assert!(matches!(
            err,
            ExprError::Evaluation(EvaluationError::UnexpectedChar { ch: '}', .. })
        ));
    }

    #[test]
    fn lone_dot_is_invalid_number() {
        let err = Lexer::new("1 + .").tokenize().expect_err("lone dot");
        assert!(matches!(
            err,
            ExprError::Evaluation(EvaluationError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn out_of_range_literal_is_invalid_number() {
        let err = Lexer::new("2 * 1e400").tokenize().expect_err("overflowing literal");
        assert!(matches!(
            err,
            ExprError::Evaluation(EvaluationError::InvalidNumber { offset: 4, .. })
        ));
        assert_eq!(kinds("1e308")[0], TokenKind::Number(1e308));
    }
}
