//! Project dictionary
//!
//! Maps project titles to stable integer ids. Ids are created lazily the
//! first time a page declares a project and are never reused.
//!
//! Creation is race tolerant without locking: two callers creating the same
//! title both issue `INSERT OR IGNORE` and then resolve the surviving row.

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::Row;
use tokio::sync::RwLock;
use tracing::{debug, info};
use wpa_common::db::{Database, Project, ProjectId, ReadConsistency};
use wpa_common::{Error, Result};

use crate::cleaner::MAX_TITLE_CHARS;

/// Read-through cache of project names keyed by id
///
/// Entries are never evicted or invalidated: an id's title does not change
/// after creation. Only hits are cached, so an id that does not exist yet is
/// looked up again next time.
#[derive(Debug, Default)]
pub struct ProjectNameCache {
    names: RwLock<HashMap<ProjectId, String>>,
}

impl ProjectNameCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: ProjectId) -> Option<String> {
        self.names.read().await.get(&id).cloned()
    }

    pub async fn insert(&self, id: ProjectId, name: String) {
        self.names.write().await.insert(id, name);
    }

    pub async fn len(&self) -> usize {
        self.names.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.names.read().await.is_empty()
    }
}

/// Title ↔ id lookups and get-or-create
#[derive(Debug, Clone)]
pub struct ProjectDictionary {
    db: Database,
    cache: Arc<ProjectNameCache>,
    subprojects_enabled: bool,
}

impl ProjectDictionary {
    pub fn new(db: Database, cache: Arc<ProjectNameCache>, subprojects_enabled: bool) -> Self {
        Self {
            db,
            cache,
            subprojects_enabled,
        }
    }

    /// Exact-match lookup; may be served by the reader pool
    pub async fn get_id(&self, title: &str) -> Result<Option<ProjectId>> {
        self.lookup_id(title, ReadConsistency::Replica).await
    }

    async fn lookup_id(
        &self,
        title: &str,
        consistency: ReadConsistency,
    ) -> Result<Option<ProjectId>> {
        let id: Option<ProjectId> = sqlx::query_scalar("SELECT id FROM projects WHERE title = ?")
            .bind(title)
            .fetch_optional(self.db.reader(consistency))
            .await?;

        Ok(id)
    }

    /// Get-or-create the id for an already cleaned title
    pub async fn ensure_id(&self, title: &str) -> Result<ProjectId> {
        validate_title(title)?;

        if let Some(id) = self.get_id(title).await? {
            return Ok(id);
        }

        let parent_id = if self.subprojects_enabled {
            self.parent_project_id(title).await?
        } else {
            None
        };

        let inserted =
            sqlx::query("INSERT OR IGNORE INTO projects (title, parent_id) VALUES (?, ?)")
                .bind(title)
                .bind(parent_id)
                .execute(self.db.primary())
                .await?
                .rows_affected();

        // Whoever won the insert, the surviving row is authoritative
        let id = self
            .lookup_id(title, ReadConsistency::Primary)
            .await?
            .ok_or_else(|| Error::Internal(format!("Project '{}' vanished after insert", title)))?;

        if inserted == 1 {
            info!(project_id = id, ?parent_id, "Created project '{}'", title);
        } else {
            debug!(project_id = id, "Project '{}' created concurrently", title);
        }

        Ok(id)
    }

    /// Parent of a `Parent/Child` title, one level up only
    ///
    /// Returns `None` when the title has no `/`, the prefix is empty, or no
    /// project with the prefix title exists yet.
    pub async fn parent_project_id(&self, title: &str) -> Result<Option<ProjectId>> {
        match title.split_once('/') {
            Some((parent, _)) if !parent.is_empty() => {
                self.lookup_id(parent, ReadConsistency::Primary).await
            }
            _ => Ok(None),
        }
    }

    /// Title for an id, through the name cache
    pub async fn get_name(&self, id: ProjectId) -> Result<Option<String>> {
        if id <= 0 {
            return Ok(None);
        }

        if let Some(name) = self.cache.get(id).await {
            return Ok(Some(name));
        }

        let name: Option<String> = sqlx::query_scalar("SELECT title FROM projects WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.reader(ReadConsistency::Replica))
            .await?;

        if let Some(name) = &name {
            self.cache.insert(id, name.clone()).await;
        }

        Ok(name)
    }

    /// Full project row
    pub async fn get_project(&self, id: ProjectId) -> Result<Option<Project>> {
        let row = sqlx::query("SELECT id, title, parent_id FROM projects WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.reader(ReadConsistency::Replica))
            .await?;

        Ok(row.map(|row| Project {
            id: row.get("id"),
            title: row.get("title"),
            parent_id: row.get("parent_id"),
        }))
    }
}

fn validate_title(title: &str) -> Result<()> {
    if title.is_empty() {
        return Err(Error::InvalidInput("Project title is empty".to_string()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(Error::InvalidInput(format!(
            "Project title longer than {} characters",
            MAX_TITLE_CHARS
        )));
    }
    Ok(())
}
