//! Resource tree use-case service.
//!
//! # Responsibility
//! - Compute ancestry (lineage) for a resource.
//! - Validate create and reparent requests before touching storage.
//!
//! # Invariants
//! - No resource is ever its own ancestor.
//! - Lineage is root-first, ends with the immediate parent and never
//!   contains the queried id.
//! - Reparent checks short-circuit in a fixed order: missing resource,
//!   missing parent, self parent, cycle.

use crate::db::DbError;
use crate::model::resource::{Resource, ResourceId};
use crate::repo::resource_repo::ResourceRepository;
use crate::repo::{Entity, RepoError};
use log::{info, warn};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from resource tree operations.
#[derive(Debug)]
pub enum ResourceServiceError {
    /// Name is blank after trim.
    InvalidName,
    /// Target resource does not exist.
    ResourceNotFound(ResourceId),
    /// Requested new parent does not exist.
    ParentNotFound(ResourceId),
    /// Parent given at creation time does not exist.
    DanglingParent(ResourceId),
    /// Resource would become its own parent.
    SelfParent(ResourceId),
    /// Resource is already an ancestor of the requested parent.
    Cycle {
        resource_id: ResourceId,
        parent_id: ResourceId,
    },
    /// Repository-level failure.
    Repo(RepoError),
}

impl Display for ResourceServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName => write!(f, "resource name must not be blank"),
            Self::ResourceNotFound(id) => write!(f, "resource not found: {id}"),
            Self::ParentNotFound(id) => write!(f, "parent resource not found: {id}"),
            Self::DanglingParent(id) => {
                write!(f, "cannot attach new resource to missing parent {id}")
            }
            Self::SelfParent(id) => write!(f, "resource {id} cannot be its own parent"),
            Self::Cycle {
                resource_id,
                parent_id,
            } => write!(
                f,
                "moving resource {resource_id} under {parent_id} would create a cycle"
            ),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ResourceServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ResourceServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound {
                entity: Entity::Resource,
                id,
            } => Self::ResourceNotFound(id),
            other => Self::Repo(other),
        }
    }
}

impl From<DbError> for ResourceServiceError {
    fn from(value: DbError) -> Self {
        Self::Repo(RepoError::Db(value))
    }
}

/// Resource tree service facade.
pub struct ResourceService<R: ResourceRepository> {
    repo: R,
}

impl<R: ResourceRepository> ResourceService<R> {
    /// Creates service from repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn get_resource(&self, id: ResourceId) -> Result<Resource, ResourceServiceError> {
        self.repo
            .get_resource(id)?
            .ok_or(ResourceServiceError::ResourceNotFound(id))
    }

    /// Direct children of `parent_id`, or the roots when `None`.
    pub fn list_children(
        &self,
        parent_id: Option<ResourceId>,
    ) -> Result<Vec<Resource>, ResourceServiceError> {
        if let Some(parent_id) = parent_id {
            if !self.repo.resource_exists(parent_id)? {
                return Err(ResourceServiceError::ResourceNotFound(parent_id));
            }
        }
        self.repo.list_children(parent_id).map_err(Into::into)
    }

    /// Ancestor ids of `resource_id`, root first and immediate parent last.
    pub fn get_lineage(
        &self,
        resource_id: ResourceId,
    ) -> Result<Vec<ResourceId>, ResourceServiceError> {
        let start = self.get_resource(resource_id)?;
        self.collect_ancestors(resource_id, start.parent_id)
    }

    /// Creates one resource under optional parent and returns its id.
    pub fn create_resource(
        &self,
        name: impl Into<String>,
        parent_id: Option<ResourceId>,
    ) -> Result<ResourceId, ResourceServiceError> {
        let normalized = normalize_name(name.into())?;
        if let Some(parent_id) = parent_id {
            if !self.repo.resource_exists(parent_id)? {
                warn!(
                    "event=resource_create module=service status=error parent_id={parent_id} reason=dangling_parent"
                );
                return Err(ResourceServiceError::DanglingParent(parent_id));
            }
        }

        let created = self.repo.create_resource(normalized.as_str(), parent_id)?;
        info!(
            "event=resource_create module=service status=ok id={} has_parent={}",
            created.id,
            parent_id.is_some()
        );
        Ok(created.id)
    }

    /// Moves `resource_id` under `new_parent_id`.
    pub fn reparent(
        &self,
        resource_id: ResourceId,
        new_parent_id: ResourceId,
    ) -> Result<(), ResourceServiceError> {
        if !self.repo.resource_exists(resource_id)? {
            return Err(ResourceServiceError::ResourceNotFound(resource_id));
        }
        let parent = self
            .repo
            .get_resource(new_parent_id)?
            .ok_or(ResourceServiceError::ParentNotFound(new_parent_id))?;
        if resource_id == new_parent_id {
            return Err(ResourceServiceError::SelfParent(resource_id));
        }

        let parent_lineage = self.collect_ancestors(new_parent_id, parent.parent_id)?;
        if parent_lineage.contains(&resource_id) {
            warn!(
                "event=resource_reparent module=service status=error id={resource_id} parent_id={new_parent_id} reason=cycle"
            );
            return Err(ResourceServiceError::Cycle {
                resource_id,
                parent_id: new_parent_id,
            });
        }

        self.repo.set_parent(resource_id, new_parent_id)?;
        info!(
            "event=resource_reparent module=service status=ok id={resource_id} parent_id={new_parent_id}"
        );
        Ok(())
    }

    fn collect_ancestors(
        &self,
        origin: ResourceId,
        first_parent: Option<ResourceId>,
    ) -> Result<Vec<ResourceId>, ResourceServiceError> {
        let mut lineage = Vec::new();
        let mut visited = HashSet::from([origin]);
        let mut cursor = first_parent;
        while let Some(current) = cursor {
            if !visited.insert(current) {
                warn!(
                    "event=lineage_walk module=service status=error id={origin} revisited={current}"
                );
                break;
            }
            lineage.push(current);
            cursor = match self.repo.get_resource(current)? {
                Some(node) => node.parent_id,
                None => None,
            };
        }
        lineage.reverse();
        Ok(lineage)
    }
}

fn normalize_name(value: String) -> Result<String, ResourceServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ResourceServiceError::InvalidName);
    }
    Ok(trimmed.to_string())
}
