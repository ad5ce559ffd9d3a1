//! Core domain logic for resource lineage and expression recalculation.
//! This crate is the single source of truth for tree and calculation invariants.

pub mod db;
pub mod expr;
pub mod logging;
pub mod model;
pub mod repo;
pub mod seed;
pub mod service;

pub use db::{open_db, open_db_in_memory, DbError, DbResult, Store, StoreMode};
pub use expr::{parse_expression, EvaluationError, ExprError, ExpressionEngine, VariableResolver};
pub use logging::{default_log_level, init_logging, logging_status, LogTarget};
pub use model::calculation::{Calculation, CalculationDraft, CalculationId, CalculationResult};
pub use model::resource::{Resource, ResourceId};
pub use model::variable::{Variable, VariableId};
pub use repo::calculation_repo::{CalculationRepository, SqliteCalculationRepository};
pub use repo::resource_repo::{ResourceRepository, SqliteResourceRepository};
pub use repo::variable_repo::{SqliteVariableRepository, VariableRepository};
pub use repo::{Entity, RepoError, RepoResult};
pub use seed::{seed_demo_data, SeedSummary};
pub use service::recalc_service::{
    IndexRebuildReport, RecalcFailure, RecalcReport, RecalcService, RecalcServiceError,
};
pub use service::resource_service::{ResourceService, ResourceServiceError};

