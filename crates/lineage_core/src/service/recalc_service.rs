//! Calculation evaluation and dependency-driven recalculation.
//!
//! # Responsibility
//! - Evaluate stored or transient calculations against current variables.
//! - Persist derived values and keep the dependency index in step with the
//!   expressions it was parsed from.
//! - Re-run every calculation that depends on a changed variable.
//!
//! # Invariants
//! - `calculated_value` is only written after a successful evaluation; a
//!   failure leaves the previous value in place.
//! - A recalculation pass never aborts on a single failing calculation.
//! - Dependents are discovered by exact variable id, never by text search.

use crate::db::DbError;
use crate::expr::{parse_expression, ExprError, ExpressionEngine, VariableResolver};
use crate::model::calculation::{
    Calculation, CalculationDraft, CalculationId, CalculationResult,
};
use crate::model::variable::{Variable, VariableId};
use crate::repo::calculation_repo::CalculationRepository;
use crate::repo::variable_repo::VariableRepository;
use crate::repo::{Entity, RepoError};
use log::{debug, info, warn};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Errors from calculation and recalculation operations.
#[derive(Debug)]
pub enum RecalcServiceError {
    /// Stored calculation does not exist.
    CalculationNotFound(CalculationId),
    /// Variable targeted by a value update does not exist.
    VariableNotFound(VariableId),
    /// Calculation name is blank after trim.
    InvalidName,
    /// Variable value is NaN or infinite.
    InvalidValue(f64),
    /// Parse, resolution or arithmetic failure.
    Expression(ExprError),
    /// Repository-level failure.
    Repo(RepoError),
}

impl Display for RecalcServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CalculationNotFound(id) => write!(f, "calculation not found: {id}"),
            Self::VariableNotFound(id) => write!(f, "variable not found: {id}"),
            Self::InvalidName => write!(f, "calculation name must not be blank"),
            Self::InvalidValue(value) => write!(f, "variable value must be finite, got {value}"),
            Self::Expression(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RecalcServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Expression(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for RecalcServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound {
                entity: Entity::Calculation,
                id,
            } => Self::CalculationNotFound(id),
            RepoError::NotFound {
                entity: Entity::Variable,
                id,
            } => Self::VariableNotFound(id),
            other => Self::Repo(other),
        }
    }
}

impl From<ExprError> for RecalcServiceError {
    fn from(value: ExprError) -> Self {
        Self::Expression(value)
    }
}

impl From<DbError> for RecalcServiceError {
    fn from(value: DbError) -> Self {
        Self::Repo(RepoError::Db(value))
    }
}

/// One calculation that failed during a recalculation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalcFailure {
    pub calculation_id: CalculationId,
    pub name: String,
    pub message: String,
}

/// Outcome of recalculating every dependent of one variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalcReport {
    pub pass_id: String,
    pub variable_id: VariableId,
    /// Successful results in discovery order.
    pub updated: Vec<CalculationResult>,
    pub failed: Vec<RecalcFailure>,
}

/// Outcome of re-deriving the dependency index from stored expressions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRebuildReport {
    pub rebuilt: usize,
    /// Calculations whose expression no longer parses; their rows are kept.
    pub skipped: Vec<CalculationId>,
}

/// Serves current variable values from the repository to the engine.
struct RepoResolver<'a, V: VariableRepository> {
    variables: &'a V,
}

impl<V: VariableRepository> VariableResolver for RepoResolver<'_, V> {
    type Error = RecalcServiceError;

    fn lookup(&self, id: VariableId) -> Result<Option<f64>, Self::Error> {
        self.variables.get_value(id).map_err(RecalcServiceError::Repo)
    }
}

/// Recalculation coordinator over variable and calculation repositories.
pub struct RecalcService<V: VariableRepository, C: CalculationRepository> {
    variables: V,
    calculations: C,
}

impl<V: VariableRepository, C: CalculationRepository> RecalcService<V, C> {
    /// Creates service from repository implementations.
    pub fn new(variables: V, calculations: C) -> Self {
        Self {
            variables,
            calculations,
        }
    }

    /// Evaluates one stored calculation and persists its value.
    pub fn process_calculation_by_id(
        &self,
        id: CalculationId,
    ) -> Result<CalculationResult, RecalcServiceError> {
        let calculation = self
            .calculations
            .get_calculation(id)?
            .ok_or(RecalcServiceError::CalculationNotFound(id))?;

        let parsed = parse_expression(&calculation.expression)?;
        let value = self.engine().evaluate_parsed(&parsed)?;

        self.calculations
            .replace_dependencies(id, parsed.references())?;
        self.calculations.set_calculated_value(id, value)?;
        debug!("event=calc_persist module=service status=ok id={id}");
        Ok(CalculationResult::from_calculation(&calculation, value))
    }

    /// Evaluates a caller-supplied calculation.
    ///
    /// The value is written back only when `draft.id` names a stored
    /// calculation; its stored name and expression are left untouched.
    pub fn process_calculation(
        &self,
        draft: &CalculationDraft,
    ) -> Result<CalculationResult, RecalcServiceError> {
        let value = self.engine().evaluate(&draft.expression)?;

        if let Some(id) = draft.id {
            match self.calculations.get_calculation(id)? {
                Some(_) => {
                    self.calculations.set_calculated_value(id, value)?;
                    debug!("event=calc_persist module=service status=ok id={id}");
                }
                None => warn!(
                    "event=calc_persist module=service status=skipped id={id} reason=not_found"
                ),
            }
        }
        Ok(CalculationResult::from_draft(draft, value))
    }

    /// Recomputes every calculation that references `variable_id` and
    /// returns the successful results.
    pub fn recalculate_for_variable(
        &self,
        variable_id: VariableId,
    ) -> Result<Vec<CalculationResult>, RecalcServiceError> {
        Ok(self.recalculate_for_variable_report(variable_id)?.updated)
    }

    /// Same pass as [`Self::recalculate_for_variable`], also reporting the
    /// calculations that failed.
    pub fn recalculate_for_variable_report(
        &self,
        variable_id: VariableId,
    ) -> Result<RecalcReport, RecalcServiceError> {
        let pass_id = Uuid::new_v4().to_string();
        let candidates = self.calculations.dependents_of(variable_id)?;
        info!(
            "event=recalc_pass module=service status=start pass_id={pass_id} variable_id={variable_id} candidates={}",
            candidates.len()
        );

        let mut updated = Vec::with_capacity(candidates.len());
        let mut failed = Vec::new();
        for candidate in candidates {
            match self.process_calculation_by_id(candidate.id) {
                Ok(result) => updated.push(result),
                Err(err) => {
                    warn!(
                        "event=recalc_item module=service status=error pass_id={pass_id} calculation_id={} error={err}",
                        candidate.id
                    );
                    failed.push(RecalcFailure {
                        calculation_id: candidate.id,
                        name: candidate.name,
                        message: err.to_string(),
                    });
                }
            }
        }

        info!(
            "event=recalc_pass module=service status=ok pass_id={pass_id} variable_id={variable_id} updated={} failed={}",
            updated.len(),
            failed.len()
        );
        Ok(RecalcReport {
            pass_id,
            variable_id,
            updated,
            failed,
        })
    }

    /// Stores a new calculation after checking that its expression parses.
    ///
    /// References are not resolved here; a missing variable only surfaces
    /// when the calculation is evaluated.
    pub fn create_calculation(
        &self,
        name: impl Into<String>,
        expression: impl Into<String>,
    ) -> Result<Calculation, RecalcServiceError> {
        let name = normalize_name(name.into())?;
        let expression = expression.into();
        let parsed = parse_expression(&expression)?;
        self.calculations
            .create_calculation(name.as_str(), expression.as_str(), parsed.references())
            .map_err(Into::into)
    }

    /// Replaces the expression of a stored calculation without evaluating it.
    pub fn update_expression(
        &self,
        id: CalculationId,
        expression: impl Into<String>,
    ) -> Result<Calculation, RecalcServiceError> {
        let expression = expression.into();
        let parsed = parse_expression(&expression)?;
        self.calculations
            .update_expression(id, expression.as_str(), parsed.references())?;
        self.get_calculation(id)
    }

    pub fn get_calculation(&self, id: CalculationId) -> Result<Calculation, RecalcServiceError> {
        self.calculations
            .get_calculation(id)?
            .ok_or(RecalcServiceError::CalculationNotFound(id))
    }

    /// Re-derives dependency rows for every stored calculation.
    pub fn rebuild_dependency_index(&self) -> Result<IndexRebuildReport, RecalcServiceError> {
        let mut report = IndexRebuildReport {
            rebuilt: 0,
            skipped: Vec::new(),
        };
        for calculation in self.calculations.list_calculations()? {
            match parse_expression(&calculation.expression) {
                Ok(parsed) => {
                    self.calculations
                        .replace_dependencies(calculation.id, parsed.references())?;
                    report.rebuilt += 1;
                }
                Err(err) => {
                    warn!(
                        "event=dependency_rebuild module=service status=skipped calculation_id={} error={err}",
                        calculation.id
                    );
                    report.skipped.push(calculation.id);
                }
            }
        }
        info!(
            "event=dependency_rebuild module=service status=ok rebuilt={} skipped={}",
            report.rebuilt,
            report.skipped.len()
        );
        Ok(report)
    }

    /// Sets a variable's value; dependents are not recomputed here.
    pub fn update_variable_value(
        &self,
        id: VariableId,
        value: f64,
    ) -> Result<Variable, RecalcServiceError> {
        if !value.is_finite() {
            return Err(RecalcServiceError::InvalidValue(value));
        }
        self.variables.update_value(id, value)?;
        self.variables
            .get_variable(id)?
            .ok_or(RecalcServiceError::VariableNotFound(id))
    }

    fn engine(&self) -> ExpressionEngine<RepoResolver<'_, V>> {
        ExpressionEngine::new(RepoResolver {
            variables: &self.variables,
        })
    }
}

fn normalize_name(value: String) -> Result<String, RecalcServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RecalcServiceError::InvalidName);
    }
    Ok(trimmed.to_string())
}
