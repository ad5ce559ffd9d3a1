//! Calculation repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist calculation definitions and their derived `calculated_value`.
//! - Maintain the `calculation_dependencies` index (calculation → variable
//!   ids referenced by its parsed expression).
//!
//! # Invariants
//! - Dependency rows always mirror the stored expression they were derived
//!   from; definition and index are written in one savepoint.
//! - Dependent discovery is an exact id match, never a text search.
//! - Listings are ordered by `id ASC`.

use super::{ensure_connection_ready, with_savepoint, Entity, RepoError, RepoResult};
use crate::model::calculation::{Calculation, CalculationId};
use crate::model::variable::VariableId;
use rusqlite::{params, Connection, OptionalExtension, Row};

const CALCULATION_SELECT_SQL: &str = "SELECT
    id,
    name,
    expression,
    calculated_value
FROM calculations";

/// Repository interface for calculation definitions and results.
pub trait CalculationRepository {
    /// Inserts a definition together with its dependency index rows.
    fn create_calculation(
        &self,
        name: &str,
        expression: &str,
        references: &[VariableId],
    ) -> RepoResult<Calculation>;
    fn get_calculation(&self, id: CalculationId) -> RepoResult<Option<Calculation>>;
    fn list_calculations(&self) -> RepoResult<Vec<Calculation>>;
    /// Replaces expression text and dependency rows; leaves the stored value.
    fn update_expression(
        &self,
        id: CalculationId,
        expression: &str,
        references: &[VariableId],
    ) -> RepoResult<()>;
    /// Overwrites the derived value.
    fn set_calculated_value(&self, id: CalculationId, value: f64) -> RepoResult<()>;
    fn replace_dependencies(&self, id: CalculationId, references: &[VariableId])
        -> RepoResult<()>;
    /// Variable ids indexed for one calculation, ascending.
    fn dependencies_of(&self, id: CalculationId) -> RepoResult<Vec<VariableId>>;
    /// Calculations whose index contains `variable_id`, ordered by id.
    fn dependents_of(&self, variable_id: VariableId) -> RepoResult<Vec<Calculation>>;
}

/// SQLite-backed calculation repository.
pub struct SqliteCalculationRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCalculationRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(
            conn,
            "calculations",
            &["id", "name", "expression", "calculated_value"],
        )?;
        ensure_connection_ready(
            conn,
            "calculation_dependencies",
            &["calculation_id", "variable_id"],
        )?;
        Ok(Self { conn })
    }
}

impl CalculationRepository for SqliteCalculationRepository<'_> {
    fn create_calculation(
        &self,
        name: &str,
        expression: &str,
        references: &[VariableId],
    ) -> RepoResult<Calculation> {
        with_savepoint(self.conn, "create_calculation", || {
            self.conn.execute(
                "INSERT INTO calculations (name, expression, calculated_value)
                 VALUES (?1, ?2, NULL);",
                params![name, expression],
            )?;
            let id = self.conn.last_insert_rowid();
            write_dependencies(self.conn, id, references)?;
            Ok(Calculation {
                id,
                name: name.to_string(),
                expression: expression.to_string(),
                calculated_value: None,
            })
        })
    }

    fn get_calculation(&self, id: CalculationId) -> RepoResult<Option<Calculation>> {
        let calculation = self
            .conn
            .query_row(
                &format!("{CALCULATION_SELECT_SQL} WHERE id = ?1;"),
                [id],
                parse_calculation_row,
            )
            .optional()?;
        Ok(calculation)
    }

    fn list_calculations(&self) -> RepoResult<Vec<Calculation>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CALCULATION_SELECT_SQL} ORDER BY id ASC;"))?;
        let rows = stmt.query_map([], parse_calculation_row)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    fn update_expression(
        &self,
        id: CalculationId,
        expression: &str,
        references: &[VariableId],
    ) -> RepoResult<()> {
        with_savepoint(self.conn, "update_expression", || {
            let changed = self.conn.execute(
                "UPDATE calculations SET expression = ?2 WHERE id = ?1;",
                params![id, expression],
            )?;
            if changed == 0 {
                return Err(not_found(id));
            }
            clear_dependencies(self.conn, id)?;
            write_dependencies(self.conn, id, references)
        })
    }

    fn set_calculated_value(&self, id: CalculationId, value: f64) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE calculations SET calculated_value = ?2 WHERE id = ?1;",
            params![id, value],
        )?;
        if changed == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    fn replace_dependencies(
        &self,
        id: CalculationId,
        references: &[VariableId],
    ) -> RepoResult<()> {
        with_savepoint(self.conn, "replace_dependencies", || {
            let exists: i64 = self.conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM calculations WHERE id = ?1);",
                [id],
                |row| row.get(0),
            )?;
            if exists == 0 {
                return Err(not_found(id));
            }
            clear_dependencies(self.conn, id)?;
            write_dependencies(self.conn, id, references)
        })
    }

    fn dependencies_of(&self, id: CalculationId) -> RepoResult<Vec<VariableId>> {
        let mut stmt = self.conn.prepare(
            "SELECT variable_id
             FROM calculation_dependencies
             WHERE calculation_id = ?1
             ORDER BY variable_id ASC;",
        )?;
        let rows = stmt.query_map([id], |row| row.get::<_, VariableId>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    fn dependents_of(&self, variable_id: VariableId) -> RepoResult<Vec<Calculation>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                c.id AS id,
                c.name AS name,
                c.expression AS expression,
                c.calculated_value AS calculated_value
             FROM calculations c
             INNER JOIN calculation_dependencies d ON d.calculation_id = c.id
             WHERE d.variable_id = ?1
             ORDER BY c.id ASC;",
        )?;
        let rows = stmt.query_map([variable_id], parse_calculation_row)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }
}

fn write_dependencies(
    conn: &Connection,
    id: CalculationId,
    references: &[VariableId],
) -> RepoResult<()> {
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO calculation_dependencies (calculation_id, variable_id)
         VALUES (?1, ?2);",
    )?;
    for variable_id in references {
        stmt.execute(params![id, variable_id])?;
    }
    Ok(())
}

fn clear_dependencies(conn: &Connection, id: CalculationId) -> RepoResult<()> {
    conn.execute(
        "DELETE FROM calculation_dependencies WHERE calculation_id = ?1;",
        [id],
    )?;
    Ok(())
}

fn not_found(id: CalculationId) -> RepoError {
    RepoError::NotFound {
        entity: Entity::Calculation,
        id,
    }
}

fn parse_calculation_row(row: &Row<'_>) -> rusqlite::Result<Calculation> {
    Ok(Calculation {
        id: row.get("id")?,
        name: row.get("name")?,
        expression: row.get("expression")?,
        calculated_value: row.get("calculated_value")?,
    })
}

#[cfg(test)]
mod tests {
    use super::{CalculationRepository, SqliteCalculationRepository};
    use crate::db::open_db_in_memory;
    use crate::repo::{Entity, RepoError};

    #[test]
    fn create_records_dependencies_and_starts_without_value() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteCalculationRepository::try_new(&conn).unwrap();

        let calc = repo
            .create_calculation("price_with_tax", "{id:1}*(1+{id:2})", &[1, 2])
            .unwrap();
        assert_eq!(calc.calculated_value, None);
        assert_eq!(repo.dependencies_of(calc.id).unwrap(), vec![1, 2]);
    }

    #[test]
    fn dependents_use_exact_id_match() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteCalculationRepository::try_new(&conn).unwrap();

        let uses_one = repo.create_calculation("a", "{id:1}", &[1]).unwrap();
        repo.create_calculation("b", "{id:12}", &[12]).unwrap();

        let dependents = repo.dependents_of(1).unwrap();
        assert_eq!(dependents.len(), 1);
        assert_eq!(dependents[0].id, uses_one.id);
    }

    #[test]
    fn update_expression_replaces_index_and_keeps_value() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteCalculationRepository::try_new(&conn).unwrap();

        let calc = repo.create_calculation("a", "{id:1}", &[1]).unwrap();
        repo.set_calculated_value(calc.id, 4.0).unwrap();
        repo.update_expression(calc.id, "{id:3} * 2", &[3]).unwrap();

        let loaded = repo.get_calculation(calc.id).unwrap().unwrap();
        assert_eq!(loaded.expression, "{id:3} * 2");
        assert_eq!(loaded.calculated_value, Some(4.0));
        assert!(repo.dependents_of(1).unwrap().is_empty());
        assert_eq!(repo.dependents_of(3).unwrap()[0].id, calc.id);
    }

    #[test]
    fn writes_to_missing_calculation_report_not_found() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteCalculationRepository::try_new(&conn).unwrap();

        let err = repo.set_calculated_value(99, 1.0).unwrap_err();
        assert!(matches!(
            err,
            RepoError::NotFound {
                entity: Entity::Calculation,
                id: 99
            }
        ));
        assert!(repo.replace_dependencies(99, &[1]).is_err());
        assert!(repo.update_expression(99, "1", &[]).is_err());
    }
}
