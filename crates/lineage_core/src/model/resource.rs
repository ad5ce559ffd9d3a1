//! Resource tree node model.
//!
//! # Invariants
//! - `parent_id`, when set, names an existing resource.
//! - Following `parent_id` links never revisits a node (forest invariant).

use serde::{Deserialize, Serialize};

/// Store-assigned resource identifier.
pub type ResourceId = i64;

/// One node of the resource forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
    /// `None` means the resource is a root.
    pub parent_id: Option<ResourceId>,
}

impl Resource {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}
