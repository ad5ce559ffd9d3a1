//! Demo dataset used by local runs and integration tests.
//!
//! # Invariants
//! - Variables and calculations are replaced wholesale, so ids are always
//!   `1..=3` after seeding.
//! - Resources are only inserted when their id is free; existing tree edits
//!   survive a re-seed.

use crate::expr::parse_expression;
use crate::repo::calculation_repo::{CalculationRepository, SqliteCalculationRepository};
use crate::repo::{with_savepoint, RepoError, RepoResult};
use log::info;
use rusqlite::{params, Connection};

const DEMO_VARIABLES: [(i64, &str, f64); 3] = [
    (1, "base_price", 2.5),
    (2, "tax_rate", 0.08),
    (3, "discount", 5.0),
];

const DEMO_CALCULATIONS: [(i64, &str, &str); 3] = [
    (
        1,
        "price_with_markup",
        r#"{ "id": 1, "name": "base_price" } + 10 * 2"#,
    ),
    (
        2,
        "price_with_tax",
        r#"{ "id": 1, "name": "base_price" } * (1 + { "id": 2, "name": "tax_rate" })"#,
    ),
    (
        3,
        "discounted_price",
        r#"{ "id": 1, "name": "base_price" } * 10 - { "id": 3, "name": "discount" }"#,
    ),
];

/// Resources A -> B -> C, listed parents first.
const DEMO_RESOURCES: [(i64, &str, Option<i64>); 3] = [
    (1, "Resource A", None),
    (2, "Resource B", Some(1)),
    (3, "Resource C", Some(2)),
];

/// Row counts written by [`seed_demo_data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub variables: usize,
    pub calculations: usize,
    pub resources_inserted: usize,
}

/// Resets variables and calculations to the demo set and makes sure the
/// demo resource chain exists.
pub fn seed_demo_data(conn: &Connection) -> RepoResult<SeedSummary> {
    let calculations = SqliteCalculationRepository::try_new(conn)?;

    let summary = with_savepoint(conn, "seed_demo_data", || {
        conn.execute_batch(
            "DELETE FROM calculation_dependencies;
             DELETE FROM calculations;
             DELETE FROM variables;
             DELETE FROM sqlite_sequence WHERE name IN ('variables', 'calculations');",
        )?;

        for (id, name, value) in DEMO_VARIABLES {
            conn.execute(
                "INSERT INTO variables (id, name, value) VALUES (?1, ?2, ?3);",
                params![id, name, value],
            )?;
        }

        for (id, name, expression) in DEMO_CALCULATIONS {
            let parsed = parse_expression(expression)
                .map_err(|err| RepoError::InvalidData(format!("demo calculation {id}: {err}")))?;
            conn.execute(
                "INSERT INTO calculations (id, name, expression, calculated_value)
                 VALUES (?1, ?2, ?3, NULL);",
                params![id, name, expression],
            )?;
            calculations.replace_dependencies(id, parsed.references())?;
        }

        let mut resources_inserted = 0;
        for (id, name, parent_id) in DEMO_RESOURCES {
            resources_inserted += conn.execute(
                "INSERT OR IGNORE INTO singleresource (id, name, \"parentId\") VALUES (?1, ?2, ?3);",
                params![id, name, parent_id],
            )?;
        }

        Ok(SeedSummary {
            variables: DEMO_VARIABLES.len(),
            calculations: DEMO_CALCULATIONS.len(),
            resources_inserted,
        })
    })?;

    info!(
        "event=seed_demo module=seed status=ok variables={} calculations={} resources_inserted={}",
        summary.variables, summary.calculations, summary.resources_inserted
    );
    Ok(summary)
}
