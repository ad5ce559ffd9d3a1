//! Variable repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Own reads and writes of the `variables` table.
//! - Serve current values to the expression engine.
//!
//! # Invariants
//! - Every read goes to the store; values are never cached.
//! - `update_value` touches exactly one row or reports `NotFound`.

use super::{ensure_connection_ready, Entity, RepoError, RepoResult};
use crate::model::variable::{Variable, VariableId};
use rusqlite::{params, Connection, OptionalExtension, Row};

const VARIABLE_SELECT_SQL: &str = "SELECT id, name, value FROM variables";

/// Repository interface for named numeric variables.
pub trait VariableRepository {
    /// Inserts a variable and returns it with its assigned id.
    fn create_variable(&self, name: &str, value: f64) -> RepoResult<Variable>;
    fn get_variable(&self, id: VariableId) -> RepoResult<Option<Variable>>;
    /// Current value only; `None` when the variable does not exist.
    fn get_value(&self, id: VariableId) -> RepoResult<Option<f64>>;
    /// All variables ordered by id.
    fn list_variables(&self) -> RepoResult<Vec<Variable>>;
    fn update_value(&self, id: VariableId, value: f64) -> RepoResult<()>;
}

/// SQLite-backed variable repository.
pub struct SqliteVariableRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteVariableRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, "variables", &["id", "name", "value"])?;
        Ok(Self { conn })
    }
}

impl VariableRepository for SqliteVariableRepository<'_> {
    fn create_variable(&self, name: &str, value: f64) -> RepoResult<Variable> {
        self.conn.execute(
            "INSERT INTO variables (name, value) VALUES (?1, ?2);",
            params![name, value],
        )?;
        Ok(Variable {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            value,
        })
    }

    fn get_variable(&self, id: VariableId) -> RepoResult<Option<Variable>> {
        let variable = self
            .conn
            .query_row(
                &format!("{VARIABLE_SELECT_SQL} WHERE id = ?1;"),
                [id],
                parse_variable_row,
            )
            .optional()?;
        Ok(variable)
    }

    fn get_value(&self, id: VariableId) -> RepoResult<Option<f64>> {
        let value = self
            .conn
            .query_row("SELECT value FROM variables WHERE id = ?1;", [id], |row| {
                row.get::<_, Option<f64>>(0)
            })
            .optional()?;
        match value {
            None => Ok(None),
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => Err(RepoError::InvalidData(format!(
                "variables.value is NULL for id {id}"
            ))),
        }
    }

    fn list_variables(&self) -> RepoResult<Vec<Variable>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{VARIABLE_SELECT_SQL} ORDER BY id ASC;"))?;
        let rows = stmt.query_map([], parse_variable_row)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    fn update_value(&self, id: VariableId, value: f64) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE variables SET value = ?2 WHERE id = ?1;",
            params![id, value],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: Entity::Variable,
                id,
            });
        }
        Ok(())
    }
}

fn parse_variable_row(row: &Row<'_>) -> rusqlite::Result<Variable> {
    Ok(Variable {
        id: row.get("id")?,
        name: row.get("name")?,
        value: row.get("value")?,
    })
}

#[cfg(test)]
mod tests {
    use super::{SqliteVariableRepository, VariableRepository};
    use crate::db::open_db_in_memory;
    use crate::repo::{Entity, RepoError};

    #[test]
    fn create_get_and_update_value() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteVariableRepository::try_new(&conn).unwrap();

        let created = repo.create_variable("base_price", 2.5).unwrap();
        assert_eq!(repo.get_value(created.id).unwrap(), Some(2.5));

        repo.update_value(created.id, 3.0).unwrap();
        let loaded = repo.get_variable(created.id).unwrap().unwrap();
        assert_eq!(loaded.name, "base_price");
        assert_eq!(loaded.value, 3.0);
    }

    #[test]
    fn missing_variable_reads_none_and_update_reports_not_found() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteVariableRepository::try_new(&conn).unwrap();

        assert_eq!(repo.get_value(77).unwrap(), None);
        let err = repo.update_value(77, 1.0).unwrap_err();
        assert!(matches!(
            err,
            RepoError::NotFound {
                entity: Entity::Variable,
                id: 77
            }
        ));
    }

    #[test]
    fn list_is_ordered_by_id() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteVariableRepository::try_new(&conn).unwrap();
        let a = repo.create_variable("a", 1.0).unwrap();
        let b = repo.create_variable("b", 2.0).unwrap();

        let ids: Vec<_> = repo
            .list_variables()
            .unwrap()
            .into_iter()
            .map(|variable| variable.id)
            .collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }
}
