//! Assessment persistence
//!
//! At most one row per (page, project). Every write here is idempotent, so a
//! reconciliation that fails part way can be replayed as a whole.

use std::collections::BTreeSet;

use tracing::debug;
use wpa_common::db::{Assessment, Database, PageId, ProjectId, ReadConsistency};
use wpa_common::Result;

/// Row-level access to the `assessments` table
#[derive(Debug, Clone)]
pub struct AssessmentStore {
    db: Database,
}

impl AssessmentStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Write the assessment unless class and importance are already stored
    ///
    /// Returns false, without writing, when the stored row has the same class
    /// and importance; the stored revision then stays the one that last
    /// changed the values. Otherwise inserts or updates and returns true.
    pub async fn upsert_if_changed(&self, assessment: &Assessment) -> Result<bool> {
        let existing = self
            .get(assessment.page_id, assessment.project_id, ReadConsistency::Primary)
            .await?;

        if let Some(row) = existing {
            if row.class == assessment.class && row.importance == assessment.importance {
                return Ok(false);
            }
        }

        sqlx::query(
            r#"
            INSERT INTO assessments (page_id, project_id, class, importance, page_revision_id)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(page_id, project_id) DO UPDATE SET
                class = excluded.class,
                importance = excluded.importance,
                page_revision_id = excluded.page_revision_id
            "#,
        )
        .bind(assessment.page_id)
        .bind(assessment.project_id)
        .bind(&assessment.class)
        .bind(&assessment.importance)
        .bind(assessment.page_revision_id)
        .execute(self.db.primary())
        .await?;

        Ok(true)
    }

    /// Insert-or-ignore; returns false when a row for the pair already existed
    pub async fn insert(&self, assessment: &Assessment) -> Result<bool> {
        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO assessments
                (page_id, project_id, class, importance, page_revision_id)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(assessment.page_id)
        .bind(assessment.project_id)
        .bind(&assessment.class)
        .bind(&assessment.importance)
        .bind(assessment.page_revision_id)
        .execute(self.db.primary())
        .await?
        .rows_affected();

        if inserted == 0 {
            debug!(
                page_id = assessment.page_id,
                project_id = assessment.project_id,
                "Assessment already present, insert ignored"
            );
        }

        Ok(inserted == 1)
    }

    /// Delete one row; absent rows are not an error
    pub async fn delete(&self, page_id: PageId, project_id: ProjectId) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM assessments WHERE page_id = ? AND project_id = ?")
            .bind(page_id)
            .bind(project_id)
            .execute(self.db.primary())
            .await?
            .rows_affected();

        Ok(deleted > 0)
    }

    /// Delete every row of a page; returns the number removed
    pub async fn delete_all_for_page(&self, page_id: PageId) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM assessments WHERE page_id = ?")
            .bind(page_id)
            .execute(self.db.primary())
            .await?
            .rows_affected();

        Ok(deleted)
    }

    /// Project ids with a stored assessment for the page
    ///
    /// Use [`ReadConsistency::Primary`] right after writing in the same
    /// logical operation.
    pub async fn get_project_ids_for_page(
        &self,
        page_id: PageId,
        consistency: ReadConsistency,
    ) -> Result<BTreeSet<ProjectId>> {
        let ids: Vec<ProjectId> =
            sqlx::query_scalar("SELECT project_id FROM assessments WHERE page_id = ?")
                .bind(page_id)
                .fetch_all(self.db.reader(consistency))
                .await?;

        Ok(ids.into_iter().collect())
    }

    /// Stored row for a (page, project) pair
    pub async fn get(
        &self,
        page_id: PageId,
        project_id: ProjectId,
        consistency: ReadConsistency,
    ) -> Result<Option<Assessment>> {
        let row = sqlx::query_as::<_, Assessment>(
            r#"
            SELECT page_id, project_id, class, importance, page_revision_id
            FROM assessments
            WHERE page_id = ? AND project_id = ?
            "#,
        )
        .bind(page_id)
        .bind(project_id)
        .fetch_optional(self.db.reader(consistency))
        .await?;

        Ok(row)
    }

    /// All rows of a page ordered by project id
    pub async fn assessments_for_page(
        &self,
        page_id: PageId,
        consistency: ReadConsistency,
    ) -> Result<Vec<Assessment>> {
        let rows = sqlx::query_as::<_, Assessment>(
            r#"
            SELECT page_id, project_id, class, importance, page_revision_id
            FROM assessments
            WHERE page_id = ?
            ORDER BY project_id
            "#,
        )
        .bind(page_id)
        .fetch_all(self.db.reader(consistency))
        .await?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{create_projects, open_test_db};

    fn assessment(
        page_id: PageId,
        project_id: ProjectId,
        class: &str,
        importance: &str,
        rev: i64,
    ) -> Assessment {
        Assessment {
            page_id,
            project_id,
            class: class.to_string(),
            importance: importance.to_string(),
            page_revision_id: rev,
        }
    }

    #[tokio::test]
    async fn test_insert_then_read_back() {
        let (_dir, db) = open_test_db().await;
        create_projects(&db, 4).await;
        let store = AssessmentStore::new(db);

        assert!(store.insert(&assessment(10, 3, "A", "High", 20)).await.unwrap());

        let row = store.get(10, 3, ReadConsistency::Primary).await.unwrap().unwrap();
        assert_eq!(row, assessment(10, 3, "A", "High", 20));
    }

    #[tokio::test]
    async fn test_get_project_ids_for_page() {
        let (_dir, db) = open_test_db().await;
        create_projects(&db, 4).await;
        let store = AssessmentStore::new(db);

        store.insert(&assessment(10, 3, "A", "High", 20)).await.unwrap();
        store.insert(&assessment(10, 4, "B", "Low", 21)).await.unwrap();
        store.insert(&assessment(11, 1, "C", "Mid", 22)).await.unwrap();

        let ids = store.get_project_ids_for_page(10, ReadConsistency::Primary).await.unwrap();
        assert_eq!(ids, BTreeSet::from([3, 4]));

        let rows = store.assessments_for_page(10, ReadConsistency::Primary).await.unwrap();
        assert_eq!(
            rows,
            vec![assessment(10, 3, "A", "High", 20), assessment(10, 4, "B", "Low", 21)]
        );
    }

    #[tokio::test]
    async fn test_duplicate_insert_ignored() {
        let (_dir, db) = open_test_db().await;
        create_projects(&db, 3).await;
        let store = AssessmentStore::new(db);

        assert!(store.insert(&assessment(10, 3, "A", "High", 20)).await.unwrap());
        assert!(!store.insert(&assessment(10, 3, "B", "Low", 21)).await.unwrap());

        // First writer's row survives
        let row = store.get(10, 3, ReadConsistency::Primary).await.unwrap().unwrap();
        assert_eq!(row.class, "A");
    }

    #[tokio::test]
    async fn test_upsert_if_changed() {
        let (_dir, db) = open_test_db().await;
        create_projects(&db, 3).await;
        let store = AssessmentStore::new(db);

        store.insert(&assessment(10, 3, "A", "High", 20)).await.unwrap();

        let changed = store.upsert_if_changed(&assessment(10, 3, "B", "Low", 21)).await.unwrap();
        assert!(changed);
        let row = store.get(10, 3, ReadConsistency::Primary).await.unwrap().unwrap();
        assert_eq!(row, assessment(10, 3, "B", "Low", 21));

        // Same values again is a no-op, revision untouched
        let changed = store.upsert_if_changed(&assessment(10, 3, "B", "Low", 22)).await.unwrap();
        assert!(!changed);
        let row = store.get(10, 3, ReadConsistency::Primary).await.unwrap().unwrap();
        assert_eq!(row.page_revision_id, 21);
    }

    #[tokio::test]
    async fn test_upsert_inserts_missing_row() {
        let (_dir, db) = open_test_db().await;
        create_projects(&db, 2).await;
        let store = AssessmentStore::new(db);

        assert!(store.upsert_if_changed(&assessment(5, 2, "GA", "Top", 9)).await.unwrap());
        assert!(store.get(5, 2, ReadConsistency::Primary).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_missing_row_is_noop() {
        let (_dir, db) = open_test_db().await;
        create_projects(&db, 3).await;
        let store = AssessmentStore::new(db);

        store.insert(&assessment(10, 3, "A", "High", 20)).await.unwrap();

        assert!(store.delete(10, 3).await.unwrap());
        assert!(!store.delete(10, 3).await.unwrap());
        assert!(store.get(10, 3, ReadConsistency::Primary).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_all_for_page_spares_other_pages() {
        let (_dir, db) = open_test_db().await;
        create_projects(&db, 4).await;
        let store = AssessmentStore::new(db);

        store.insert(&assessment(10, 3, "A", "High", 20)).await.unwrap();
        store.insert(&assessment(10, 4, "B", "Low", 21)).await.unwrap();
        store.insert(&assessment(11, 3, "C", "Mid", 22)).await.unwrap();

        assert_eq!(store.delete_all_for_page(10).await.unwrap(), 2);

        assert!(store
            .get_project_ids_for_page(10, ReadConsistency::Primary)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            store.get_project_ids_for_page(11, ReadConsistency::Primary).await.unwrap(),
            BTreeSet::from([3])
        );
    }
}
