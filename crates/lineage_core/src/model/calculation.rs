//! Calculation domain model.
//!
//! # Responsibility
//! - Describe stored calculation definitions and their derived value.
//! - Describe transient calculations submitted for one-off evaluation.
//! - Describe the evaluation result envelope returned to callers.

use serde::{Deserialize, Serialize};

/// Store-assigned calculation identifier.
pub type CalculationId = i64;

/// Stored calculation definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Calculation {
    pub id: CalculationId,
    pub name: String,
    /// Free text with zero or more embedded variable-reference tokens.
    pub expression: String,
    /// `None` until the first successful evaluation.
    pub calculated_value: Option<f64>,
}

/// Caller-supplied calculation that is evaluated without being loaded.
///
/// When `id` is set the computed value is also written to that stored
/// calculation, if it exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationDraft {
    #[serde(default)]
    pub id: Option<CalculationId>,
    pub name: String,
    pub expression: String,
}

/// Outcome of one successful evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CalculationId>,
    pub name: String,
    pub expression: String,
    pub calculated_value: f64,
}

impl CalculationResult {
    pub fn from_calculation(calculation: &Calculation, value: f64) -> Self {
        Self {
            id: Some(calculation.id),
            name: calculation.name.clone(),
            expression: calculation.expression.clone(),
            calculated_value: value,
        }
    }

    pub fn from_draft(draft: &CalculationDraft, value: f64) -> Self {
        Self {
            id: draft.id,
            name: draft.name.clone(),
            expression: draft.expression.clone(),
            calculated_value: value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CalculationDraft, CalculationResult};

    #[test]
    fn result_serializes_with_camel_case_value() {
        let result = CalculationResult {
            id: Some(1),
            name: "price_with_markup".to_string(),
            expression: "{id:1}+10*2".to_string(),
            calculated_value: 22.5,
        };
        let json = serde_json::to_value(&result).expect("serialize result");
        assert_eq!(json["calculatedValue"], 22.5);
        assert_eq!(json["id"], 1);
    }

    #[test]
    fn transient_result_omits_missing_id() {
        let draft = CalculationDraft {
            id: None,
            name: "adhoc".to_string(),
            expression: "1+1".to_string(),
        };
        let json = serde_json::to_value(CalculationResult::from_draft(&draft, 2.0))
            .expect("serialize result");
        assert!(json.get("id").is_none());
    }
}
