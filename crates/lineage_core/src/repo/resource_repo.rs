//! Resource tree repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist resource nodes and their single parent edge.
//! - Keep SQL and the legacy `"parentId"` column naming inside the boundary.
//!
//! # Invariants
//! - Child listing is deterministic: `id ASC`.
//! - `set_parent` rewrites exactly one row; it performs no hierarchy
//!   validation, which belongs to the tree service.

use super::{ensure_connection_ready, Entity, RepoError, RepoResult};
use crate::model::resource::{Resource, ResourceId};
use rusqlite::{params, Connection, OptionalExtension, Row};

const RESOURCE_SELECT_SQL: &str = "SELECT id, name, \"parentId\" AS parent_id FROM singleresource";

/// Repository interface for the resource forest.
pub trait ResourceRepository {
    /// Inserts a node under `parent_id` (or as a root) and returns it.
    fn create_resource(&self, name: &str, parent_id: Option<ResourceId>)
        -> RepoResult<Resource>;
    fn get_resource(&self, id: ResourceId) -> RepoResult<Option<Resource>>;
    fn resource_exists(&self, id: ResourceId) -> RepoResult<bool>;
    /// Direct children of `parent_id`, or roots when `None`.
    fn list_children(&self, parent_id: Option<ResourceId>) -> RepoResult<Vec<Resource>>;
    /// Points `id` at `parent_id` in one statement.
    fn set_parent(&self, id: ResourceId, parent_id: ResourceId) -> RepoResult<()>;
}

/// SQLite-backed resource repository.
pub struct SqliteResourceRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteResourceRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, "singleresource", &["id", "name", "parentId"])?;
        Ok(Self { conn })
    }
}

impl ResourceRepository for SqliteResourceRepository<'_> {
    fn create_resource(
        &self,
        name: &str,
        parent_id: Option<ResourceId>,
    ) -> RepoResult<Resource> {
        self.conn.execute(
            "INSERT INTO singleresource (name, \"parentId\") VALUES (?1, ?2);",
            params![name, parent_id],
        )?;
        Ok(Resource {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            parent_id,
        })
    }

    fn get_resource(&self, id: ResourceId) -> RepoResult<Option<Resource>> {
        let resource = self
            .conn
            .query_row(
                &format!("{RESOURCE_SELECT_SQL} WHERE id = ?1;"),
                [id],
                parse_resource_row,
            )
            .optional()?;
        Ok(resource)
    }

    fn resource_exists(&self, id: ResourceId) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM singleresource WHERE id = ?1);",
            [id],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn list_children(&self, parent_id: Option<ResourceId>) -> RepoResult<Vec<Resource>> {
        let mut items = Vec::new();
        match parent_id {
            Some(parent_id) => {
                let mut stmt = self.conn.prepare(&format!(
                    "{RESOURCE_SELECT_SQL} WHERE \"parentId\" = ?1 ORDER BY id ASC;"
                ))?;
                let rows = stmt.query_map([parent_id], parse_resource_row)?;
                for row in rows {
                    items.push(row?);
                }
            }
            None => {
                let mut stmt = self.conn.prepare(&format!(
                    "{RESOURCE_SELECT_SQL} WHERE \"parentId\" IS NULL ORDER BY id ASC;"
                ))?;
                let rows = stmt.query_map([], parse_resource_row)?;
                for row in rows {
                    items.push(row?);
                }
            }
        }
        Ok(items)
    }

    fn set_parent(&self, id: ResourceId, parent_id: ResourceId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE singleresource SET \"parentId\" = ?2 WHERE id = ?1;",
            params![id, parent_id],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: Entity::Resource,
                id,
            });
        }
        Ok(())
    }
}

fn parse_resource_row(row: &Row<'_>) -> rusqlite::Result<Resource> {
    Ok(Resource {
        id: row.get("id")?,
        name: row.get("name")?,
        parent_id: row.get("parent_id")?,
    })
}

#[cfg(test)]
mod tests {
    use super::{ResourceRepository, SqliteResourceRepository};
    use crate::db::open_db_in_memory;

    #[test]
    fn create_and_list_children_in_id_order() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteResourceRepository::try_new(&conn).unwrap();

        let root = repo.create_resource("Root", None).unwrap();
        let a = repo.create_resource("A", Some(root.id)).unwrap();
        let b = repo.create_resource("B", Some(root.id)).unwrap();

        let roots = repo.list_children(None).unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id, root.id);

        let children: Vec<_> = repo
            .list_children(Some(root.id))
            .unwrap()
            .into_iter()
            .map(|resource| resource.id)
            .collect();
        assert_eq!(children, vec![a.id, b.id]);
    }

    #[test]
    fn foreign_key_rejects_unknown_parent() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteResourceRepository::try_new(&conn).unwrap();
        assert!(repo.create_resource("Orphan", Some(404)).is_err());
    }

    #[test]
    fn set_parent_moves_single_row() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteResourceRepository::try_new(&conn).unwrap();
        let a = repo.create_resource("A", None).unwrap();
        let b = repo.create_resource("B", None).unwrap();

        repo.set_parent(b.id, a.id).unwrap();
        assert_eq!(repo.get_resource(b.id).unwrap().unwrap().parent_id, Some(a.id));
        assert!(repo.get_resource(a.id).unwrap().unwrap().is_root());
        assert!(repo.set_parent(999, a.id).is_err());
    }
}
