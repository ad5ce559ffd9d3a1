//! Variable domain model.

use serde::{Deserialize, Serialize};

/// Store-assigned variable identifier.
pub type VariableId = i64;

/// Named numeric value that expressions reference by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub id: VariableId,
    pub name: String,
    /// Always finite; writes reject `NaN` and infinities.
    pub value: f64,
}
