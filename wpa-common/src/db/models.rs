//! Database models
//!
//! Typed records for the rows that cross the storage boundary.

use serde::{Deserialize, Serialize};

/// Wiki page id (subject page)
pub type PageId = i64;

/// Project id assigned by the project dictionary; always positive once assigned
pub type ProjectId = i64;

/// Page revision id
pub type RevisionId = i64;

/// Wiki namespace number
pub type Namespace = i64;

/// A WikiProject or subproject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: ProjectId,
    pub title: String,
    pub parent_id: Option<ProjectId>,
}

impl Project {
    pub fn is_subproject(&self) -> bool {
        self.parent_id.is_some()
    }
}

/// One page's rating by one project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Assessment {
    pub page_id: PageId,
    pub project_id: ProjectId,
    pub class: String,
    pub importance: String,
    pub page_revision_id: RevisionId,
}

/// Page identity as known to the page directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PageRecord {
    pub page_id: PageId,
    pub namespace: Namespace,
    pub title: String,
}

/// Which pool a read must be served from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadConsistency {
    /// May read from the reader pool, which can lag behind the primary
    #[default]
    Replica,
    /// Must read the latest committed data from the primary
    Primary,
}
