//! Numeric evaluation of bound expression trees.

use super::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use super::{EvaluationError, ExprError};
use crate::model::variable::VariableId;
use std::collections::HashMap;

/// Resolved variable values for one evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    values: HashMap<VariableId, f64>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: VariableId, value: f64) {
        self.values.insert(id, value);
    }

    pub fn get(&self, id: VariableId) -> Option<f64> {
        self.values.get(&id).copied()
    }
}

impl FromIterator<(VariableId, f64)> for Bindings {
    fn from_iter<T: IntoIterator<Item = (VariableId, f64)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Evaluates `expr` against `bindings`.
///
/// Division by zero and any non-finite intermediate value are errors, so a
/// successful result is always finite.
pub fn evaluate(expr: &Expr, bindings: &Bindings) -> Result<f64, ExprError> {
    match &expr.kind {
        ExprKind::Number(value) => Ok(*value),
        ExprKind::Variable(reference) => bindings
            .get(reference.id)
            .ok_or(ExprError::VariableNotFound(reference.id)),
        ExprKind::Unary { op, operand } => {
            let value = evaluate(operand, bindings)?;
            Ok(match op {
                UnaryOp::Plus => value,
                UnaryOp::Minus => -value,
            })
        }
        ExprKind::Binary { op, left, right } => {
            let lhs = evaluate(left, bindings)?;
            let rhs = evaluate(right, bindings)?;
            let value = match op {
                BinaryOp::Add => lhs + rhs,
                BinaryOp::Sub => lhs - rhs,
                BinaryOp::Mul => lhs * rhs,
                BinaryOp::Div => {
                    if rhs == 0.0 {
                        return Err(EvaluationError::DivisionByZero {
                            offset: right.span.start,
                        }
                        .into());
                    }
                    lhs / rhs
                }
            };
            if !value.is_finite() {
                return Err(EvaluationError::NonFiniteResult {
                    operator: op.symbol(),
                    offset: expr.span.start,
                }
                .into());
            }
            Ok(value)
        }
    }
}
