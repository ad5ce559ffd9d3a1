//! Explicit store context owning one migrated SQLite connection.
//!
//! # Responsibility
//! - Give callers a constructed handle instead of process-wide pool state.
//! - Run multi-step validate-then-write sequences as one unit of work.
//!
//! # Invariants
//! - A `Store` only exists for a connection whose migrations succeeded.
//! - `write` closures run inside an IMMEDIATE transaction; returning `Err`
//!   rolls every statement of the closure back.

use super::open::{open_db, open_db_in_memory};
use super::{DbError, DbResult};
use log::{error, info};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};

/// Where a store keeps its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreMode {
    File(PathBuf),
    Memory,
}

/// Store context passed to services and the request boundary.
pub struct Store {
    conn: Connection,
    mode: StoreMode,
}

impl Store {
    /// Opens (or creates) a file-backed store and applies migrations.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = open_db(&path)?;
        Ok(Self {
            conn,
            mode: StoreMode::File(path),
        })
    }

    /// Opens an isolated in-memory store.
    pub fn open_in_memory() -> DbResult<Self> {
        Ok(Self {
            conn: open_db_in_memory()?,
            mode: StoreMode::Memory,
        })
    }

    pub fn mode(&self) -> &StoreMode {
        &self.mode
    }

    /// Raw connection for single-statement reads and test assertions.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Runs `f` against a deferred read transaction so that every query of
    /// the closure observes the same snapshot.
    pub fn read<T, E>(&self, f: impl FnOnce(&Connection) -> Result<T, E>) -> Result<T, E>
    where
        E: From<DbError>,
    {
        self.run(TransactionBehavior::Deferred, f)
    }

    /// Runs `f` inside an IMMEDIATE transaction and commits on `Ok`.
    ///
    /// The write lock is taken before the first statement, so checks made
    /// inside `f` cannot be invalidated by a concurrent writer before the
    /// closure's own writes land.
    pub fn write<T, E>(&self, f: impl FnOnce(&Connection) -> Result<T, E>) -> Result<T, E>
    where
        E: From<DbError>,
    {
        self.run(TransactionBehavior::Immediate, f)
    }

    /// Closes the underlying connection, surfacing any close-time error.
    pub fn close(self) -> DbResult<()> {
        let mode = mode_label(&self.mode);
        match self.conn.close() {
            Ok(()) => {
                info!("event=store_close module=db status=ok mode={mode}");
                Ok(())
            }
            Err((_, err)) => {
                error!("event=store_close module=db status=error mode={mode} error={err}");
                Err(err.into())
            }
        }
    }

    fn run<T, E>(
        &self,
        behavior: TransactionBehavior,
        f: impl FnOnce(&Connection) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<DbError>,
    {
        let tx = Transaction::new_unchecked(&self.conn, behavior)
            .map_err(|err| E::from(DbError::from(err)))?;
        // Dropping `tx` on the error path rolls back.
        let value = f(&tx)?;
        tx.commit().map_err(|err| E::from(DbError::from(err)))?;
        Ok(value)
    }
}

fn mode_label(mode: &StoreMode) -> &'static str {
    match mode {
        StoreMode::File(_) => "file",
        StoreMode::Memory => "memory",
    }
}

#[cfg(test)]
mod tests {
    use super::{Store, StoreMode};
    use crate::db::DbError;

    #[test]
    fn write_commits_on_ok() {
        let store = Store::open_in_memory().expect("open store");
        store
            .write(|conn| -> Result<(), DbError> {
                conn.execute(
                    "INSERT INTO variables (name, value) VALUES ('x', 1.5);",
                    [],
                )?;
                Ok(())
            })
            .expect("write should commit");

        let count: i64 = store
            .connection()
            .query_row("SELECT COUNT(*) FROM variables;", [], |row| row.get(0))
            .expect("count rows");
        assert_eq!(count, 1);
    }

    #[test]
    fn write_rolls_back_on_err() {
        let store = Store::open_in_memory().expect("open store");
        let result = store.write(|conn| -> Result<(), DbError> {
            conn.execute(
                "INSERT INTO variables (name, value) VALUES ('x', 1.5);",
                [],
            )?;
            Err(DbError::UnsupportedSchemaVersion {
                db_version: 0,
                latest_supported: 0,
            })
        });
        assert!(result.is_err());

        let count: i64 = store
            .connection()
            .query_row("SELECT COUNT(*) FROM variables;", [], |row| row.get(0))
            .expect("count rows");
        assert_eq!(count, 0);
    }

    #[test]
    fn file_store_reports_mode_and_closes() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("lineage.sqlite3");
        let store = Store::open(&path).expect("open file store");
        assert_eq!(store.mode(), &StoreMode::File(path));
        store.close().expect("close store");
    }
}
