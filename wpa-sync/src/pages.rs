//! Page directory
//!
//! Namespace and title of the pages that carry assessments, so the project
//! pages query can report them.

use wpa_common::db::{Database, PageId, PageRecord, ReadConsistency};
use wpa_common::Result;

#[derive(Debug, Clone)]
pub struct PageDirectory {
    db: Database,
}

impl PageDirectory {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record or refresh a page's namespace and title
    pub async fn upsert(&self, page: &PageRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pages (page_id, namespace, title)
            VALUES (?, ?, ?)
            ON CONFLICT(page_id) DO UPDATE SET
                namespace = excluded.namespace,
                title = excluded.title
            "#,
        )
        .bind(page.page_id)
        .bind(page.namespace)
        .bind(&page.title)
        .execute(self.db.primary())
        .await?;

        Ok(())
    }

    /// Forget a page; returns true if it was known
    pub async fn remove(&self, page_id: PageId) -> Result<bool> {
        let removed = sqlx::query("DELETE FROM pages WHERE page_id = ?")
            .bind(page_id)
            .execute(self.db.primary())
            .await?
            .rows_affected();

        Ok(removed > 0)
    }

    pub async fn get(&self, page_id: PageId) -> Result<Option<PageRecord>> {
        let page = sqlx::query_as::<_, PageRecord>(
            "SELECT page_id, namespace, title FROM pages WHERE page_id = ?",
        )
        .bind(page_id)
        .fetch_optional(self.db.reader(ReadConsistency::Replica))
        .await?;

        Ok(page)
    }
}
