//! Expression syntax tree.

use crate::model::variable::VariableId;

/// Half-open byte span into the source expression text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// Parsed variable-reference token, e.g. `{ "id": 1, "name": "base_price" }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableRef {
    pub id: VariableId,
    /// Informational only; lookups always go by `id`.
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn symbol(self) -> char {
        match self {
            Self::Add => '+',
            Self::Sub => '-',
            Self::Mul => '*',
            Self::Div => '/',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Number(f64),
    Variable(VariableRef),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    /// Distinct referenced variable ids in first-appearance order.
    pub fn variable_ids(&self) -> Vec<VariableId> {
        let mut ids = Vec::new();
        self.collect_variable_ids(&mut ids);
        ids
    }

    fn collect_variable_ids(&self, ids: &mut Vec<VariableId>) {
        match &self.kind {
            ExprKind::Number(_) => {}
            ExprKind::Variable(reference) => {
                if !ids.contains(&reference.id) {
                    ids.push(reference.id);
                }
            }
            ExprKind::Unary { operand, .. } => operand.collect_variable_ids(ids),
            ExprKind::Binary { left, right, .. } => {
                left.collect_variable_ids(ids);
                right.collect_variable_ids(ids);
            }
        }
    }
}
