//! Recursive-descent parser producing [`Expr`] trees.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! expr    := term (("+" | "-") term)*
//! term    := unary (("*" | "/") unary)*
//! unary   := ("+" | "-") unary | primary
//! primary := NUMBER | REFERENCE | "(" expr ")"
//! ```

use super::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use super::lexer::{Token, TokenKind};
use super::{EvaluationError, ExprError};

/// Bound on parenthesis/unary nesting, which drives parser recursion.
const MAX_NESTING_DEPTH: usize = 256;
/// Bound on the height of the finished tree, which drives evaluation,
/// reference collection and drop recursion.
const MAX_TREE_HEIGHT: usize = 1024;

pub(crate) struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    /// `tokens` must come from the lexer, which always appends `End`.
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    pub fn parse(mut self) -> Result<Expr, ExprError> {
        if matches!(self.peek().kind, TokenKind::End) {
            return Err(EvaluationError::EmptyExpression.into());
        }
        let (expr, _) = self.parse_add_sub()?;
        let trailing = self.peek();
        if !matches!(trailing.kind, TokenKind::End) {
            return Err(unexpected(trailing));
        }
        Ok(expr)
    }

    // Each rule returns the subtree together with its height so that long
    // operator chains are bounded as well as explicit nesting.

    fn parse_add_sub(&mut self) -> Result<(Expr, usize), ExprError> {
        let (mut left, mut height) = self.parse_mul_div()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.next();
            let (right, right_height) = self.parse_mul_div()?;
            height = grow(height.max(right_height))?;
            left = binary(op, left, right);
        }
        Ok((left, height))
    }

    fn parse_mul_div(&mut self) -> Result<(Expr, usize), ExprError> {
        let (mut left, mut height) = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => break,
            };
            self.next();
            let (right, right_height) = self.parse_unary()?;
            height = grow(height.max(right_height))?;
            left = binary(op, left, right);
        }
        Ok((left, height))
    }

    fn parse_unary(&mut self) -> Result<(Expr, usize), ExprError> {
        let op = match self.peek().kind {
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Minus => UnaryOp::Minus,
            _ => return self.parse_primary(),
        };
        let token = self.next();
        self.enter()?;
        let (operand, height) = self.parse_unary()?;
        self.depth -= 1;
        let expr = Expr {
            span: token.span.to(operand.span),
            kind: ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
        };
        Ok((expr, grow(height)?))
    }

    fn parse_primary(&mut self) -> Result<(Expr, usize), ExprError> {
        let token = self.next();
        match token.kind {
            TokenKind::Number(value) => Ok((
                Expr {
                    kind: ExprKind::Number(value),
                    span: token.span,
                },
                1,
            )),
            TokenKind::Reference(reference) => Ok((
                Expr {
                    kind: ExprKind::Variable(reference),
                    span: token.span,
                },
                1,
            )),
            TokenKind::LParen => {
                self.enter()?;
                let (inner, height) = self.parse_add_sub()?;
                self.depth -= 1;
                let close = self.next();
                match close.kind {
                    TokenKind::RParen => Ok((
                        Expr {
                            kind: inner.kind,
                            span: token.span.to(close.span),
                        },
                        height,
                    )),
                    TokenKind::End => Err(EvaluationError::UnclosedParen {
                        offset: token.span.start,
                    }
                    .into()),
                    _ => Err(unexpected(&close)),
                }
            }
            TokenKind::End => Err(EvaluationError::UnexpectedEnd.into()),
            _ => Err(unexpected(&token)),
        }
    }

    fn enter(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(EvaluationError::NestingTooDeep {
                limit: MAX_NESTING_DEPTH,
            }
            .into());
        }
        Ok(())
    }

    fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }
}

fn grow(height: usize) -> Result<usize, ExprError> {
    let height = height + 1;
    if height > MAX_TREE_HEIGHT {
        return Err(EvaluationError::NestingTooDeep {
            limit: MAX_TREE_HEIGHT,
        }
        .into());
    }
    Ok(height)
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr {
        span: left.span.to(right.span),
        kind: ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    }
}

fn unexpected(token: &Token) -> ExprError {
    EvaluationError::UnexpectedToken {
        found: token.kind.describe(),
        offset: token.span.start,
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::{Parser, MAX_TREE_HEIGHT};
    use crate::expr::ast::{BinaryOp, ExprKind, UnaryOp};
    use crate::expr::lexer::Lexer;
    use crate::expr::{EvaluationError, ExprError};

    fn parse(input: &str) -> Result<crate::expr::ast::Expr, ExprError> {
        Parser::new(Lexer::new(input).tokenize()?).parse()
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let expr = parse("1 + 2 * 3").expect("parse");
        match expr.kind {
            ExprKind::Binary {
                op: BinaryOp::Add,
                right,
                ..
            } => assert!(matches!(
                right.kind,
                ExprKind::Binary {
                    op: BinaryOp::Mul,
                    ..
                }
            )),
            other => panic!("unexpected tree: {other:?}"),
        }
    }

    #[test]
    fn subtraction_is_left_associative() {
        let expr = parse("10 - 4 - 3").expect("parse");
        match expr.kind {
            ExprKind::Binary {
                op: BinaryOp::Sub,
                left,
                right,
            } => {
                assert!(matches!(
                    left.kind,
                    ExprKind::Binary {
                        op: BinaryOp::Sub,
                        ..
                    }
                ));
                assert_eq!(right.kind, ExprKind::Number(3.0));
            }
            other => panic!("unexpected tree: {other:?}"),
        }
    }

    #[test]
    fn unary_minus_applies_to_reference() {
        let expr = parse("-{id:1}").expect("parse");
        assert!(matches!(
            expr.kind,
            ExprKind::Unary {
                op: UnaryOp::Minus,
                ..
            }
        ));
        assert_eq!(expr.variable_ids(), vec![1]);
    }

    #[test]
    fn reports_malformed_arithmetic() {
        assert!(matches!(
            parse(""),
            Err(ExprError::Evaluation(EvaluationError::EmptyExpression))
        ));
        assert!(matches!(
            parse("(1 + 2"),
            Err(ExprError::Evaluation(EvaluationError::UnclosedParen { offset: 0 }))
        ));
        assert!(matches!(
            parse("1 +"),
            Err(ExprError::Evaluation(EvaluationError::UnexpectedEnd))
        ));
        assert!(matches!(
            parse("1 2"),
            Err(ExprError::Evaluation(EvaluationError::UnexpectedToken { offset: 2, .. }))
        ));
        assert!(matches!(
            parse("1 + )"),
            Err(ExprError::Evaluation(EvaluationError::UnexpectedToken { .. }))
        ));
    }

    #[test]
    fn rejects_excessive_nesting() {
        let input = format!("{}1{}", "(".repeat(300), ")".repeat(300));
        assert!(matches!(
            parse(&input),
            Err(ExprError::Evaluation(EvaluationError::NestingTooDeep { .. }))
        ));
    }

    #[test]
    fn long_operator_chains_are_bounded() {
        let within = format!("1{}", "+1".repeat(MAX_TREE_HEIGHT / 2));
        assert!(parse(&within).is_ok());

        for input in [
            format!("1{}", "+1".repeat(5_000)),
            format!("2{}", "*2".repeat(50_000)),
            format!("{{id:1}}{}", " - 1 / 2".repeat(MAX_TREE_HEIGHT)),
        ] {
            assert!(matches!(
                parse(&input),
                Err(ExprError::Evaluation(EvaluationError::NestingTooDeep { .. }))
            ));
        }
    }
}
