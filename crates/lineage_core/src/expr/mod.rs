//! Arithmetic expression engine with embedded variable references.
//!
//! # Responsibility
//! - Parse expression text into a syntax tree whose leaves are numbers and
//!   variable-reference nodes.
//! - Resolve every referenced variable through a [`VariableResolver`].
//! - Evaluate the bound tree to a finite `f64`.
//!
//! # Invariants
//! - No caching: every evaluation re-parses the raw text.
//! - Expressions may only reference variables, never other calculations.
//! - Errors are classified as reference-token, missing-variable or
//!   arithmetic failures; the pipeline reports them in that stage order:
//!   lex (references first), parse, resolve, evaluate.

use crate::model::variable::VariableId;
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod ast;
mod eval;
mod lexer;
mod parser;
mod reference;

pub use ast::{BinaryOp, Expr, ExprKind, Span, UnaryOp, VariableRef};
pub use eval::{evaluate, Bindings};

/// Result type for expression parsing and evaluation.
pub type ExprResult<T> = Result<T, ExprError>;

/// Expression pipeline failure.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprError {
    /// A brace-delimited candidate is not a valid reference literal.
    ReferenceParse {
        snippet: String,
        span: Span,
        message: String,
    },
    /// A reference names a variable that does not exist.
    VariableNotFound(VariableId),
    /// Malformed arithmetic or a numeric domain error.
    Evaluation(EvaluationError),
}

/// Arithmetic failure detail.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationError {
    EmptyExpression,
    UnexpectedChar { ch: char, offset: usize },
    InvalidNumber { literal: String, offset: usize },
    UnexpectedToken { found: String, offset: usize },
    UnexpectedEnd,
    UnclosedParen { offset: usize },
    NestingTooDeep { limit: usize },
    DivisionByZero { offset: usize },
    NonFiniteResult { operator: char, offset: usize },
}

impl Display for ExprError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReferenceParse {
                snippet,
                span,
                message,
            } => write!(
                f,
                "invalid variable reference `{snippet}` at {}..{}: {message}",
                span.start, span.end
            ),
            Self::VariableNotFound(id) => write!(f, "variable not found: {id}"),
            Self::Evaluation(err) => write!(f, "{err}"),
        }
    }
}

impl Display for EvaluationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyExpression => write!(f, "expression is empty"),
            Self::UnexpectedChar { ch, offset } => {
                write!(f, "unexpected character `{ch}` at offset {offset}")
            }
            Self::InvalidNumber { literal, offset } => {
                write!(f, "invalid number literal `{literal}` at offset {offset}")
            }
            Self::UnexpectedToken { found, offset } => {
                write!(f, "unexpected {found} at offset {offset}")
            }
            Self::UnexpectedEnd => write!(f, "expression ended where an operand was expected"),
            Self::UnclosedParen { offset } => {
                write!(f, "parenthesis opened at offset {offset} is never closed")
            }
            Self::NestingTooDeep { limit } => {
                write!(f, "expression nesting exceeds {limit} levels")
            }
            Self::DivisionByZero { offset } => {
                write!(f, "division by zero (divisor at offset {offset})")
            }
            Self::NonFiniteResult { operator, offset } => write!(
                f,
                "operator `{operator}` at offset {offset} produced a non-finite value"
            ),
        }
    }
}

impl Error for ExprError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Evaluation(err) => Some(err),
            _ => None,
        }
    }
}

impl Error for EvaluationError {}

impl From<EvaluationError> for ExprError {
    fn from(value: EvaluationError) -> Self {
        Self::Evaluation(value)
    }
}

/// Parsed expression plus its distinct variable references.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedExpression {
    ast: Expr,
    references: Vec<VariableId>,
}

impl ParsedExpression {
    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    /// Distinct referenced variable ids in first-appearance order.
    pub fn references(&self) -> &[VariableId] {
        &self.references
    }
}

/// Lexes and parses `text` without resolving any variable.
pub fn parse_expression(text: &str) -> ExprResult<ParsedExpression> {
    let tokens = lexer::Lexer::new(text).tokenize()?;
    let ast = parser::Parser::new(tokens).parse()?;
    let references = ast.variable_ids();
    Ok(ParsedExpression { ast, references })
}

/// Source of current variable values.
///
/// `Error` absorbs [`ExprError`] so a store-backed resolver can report both
/// its own I/O failures and expression failures through one type.
pub trait VariableResolver {
    type Error: From<ExprError>;

    /// Returns the current value, or `None` when no such variable exists.
    fn lookup(&self, id: VariableId) -> Result<Option<f64>, Self::Error>;
}

impl<T: VariableResolver + ?Sized> VariableResolver for &T {
    type Error = T::Error;

    fn lookup(&self, id: VariableId) -> Result<Option<f64>, Self::Error> {
        (**self).lookup(id)
    }
}

impl VariableResolver for HashMap<VariableId, f64> {
    type Error = ExprError;

    fn lookup(&self, id: VariableId) -> Result<Option<f64>, Self::Error> {
        Ok(self.get(&id).copied())
    }
}

impl VariableResolver for BTreeMap<VariableId, f64> {
    type Error = ExprError;

    fn lookup(&self, id: VariableId) -> Result<Option<f64>, Self::Error> {
        Ok(self.get(&id).copied())
    }
}

/// Parse → resolve → evaluate pipeline over one resolver.
pub struct ExpressionEngine<R: VariableResolver> {
    resolver: R,
}

impl<R: VariableResolver> ExpressionEngine<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }

    /// Parses and evaluates `text` against current variable values.
    pub fn evaluate(&self, text: &str) -> Result<f64, R::Error> {
        let parsed = parse_expression(text)?;
        self.evaluate_parsed(&parsed)
    }

    /// Resolves the references of an already parsed expression and evaluates it.
    pub fn evaluate_parsed(&self, parsed: &ParsedExpression) -> Result<f64, R::Error> {
        let bindings = self.bind(parsed)?;
        let value = evaluate(parsed.ast(), &bindings)?;
        debug!(
            "event=calc_eval module=expr status=ok references={}",
            parsed.references().len()
        );
        Ok(value)
    }

    /// Looks up every referenced id; the first missing one fails the call.
    pub fn bind(&self, parsed: &ParsedExpression) -> Result<Bindings, R::Error> {
        let mut bindings = Bindings::new();
        for &id in parsed.references() {
            match self.resolver.lookup(id)? {
                Some(value) => bindings.insert(id, value),
                None => return Err(ExprError::VariableNotFound(id).into()),
            }
        }
        Ok(bindings)
    }
}
