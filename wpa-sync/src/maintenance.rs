//! Maintenance purges
//!
//! One-off cleanups an operator runs against a live database. Both are safe
//! to run while reconciliation is writing.

use serde::Serialize;
use tracing::info;
use wpa_common::db::Database;
use wpa_common::Result;

/// Delete assessments recorded against page id 0
///
/// Such rows were written for pages that no longer resolved to an id.
/// Returns the number of rows removed.
pub async fn purge_bad_assessments(db: &Database) -> Result<u64> {
    let purged = sqlx::query("DELETE FROM assessments WHERE page_id = 0")
        .execute(db.primary())
        .await?
        .rows_affected();

    info!(purged, "Purged assessments without a page");
    Ok(purged)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub before: i64,
    pub after: i64,
    pub purged: i64,
    pub dry_run: bool,
}

const UNUSED_PROJECTS: &str = r#"
    FROM projects
    WHERE NOT EXISTS (SELECT 1 FROM assessments a WHERE a.project_id = projects.id)
      AND NOT EXISTS (SELECT 1 FROM projects c WHERE c.parent_id = projects.id)
"#;

/// Delete projects that no assessment refers to
///
/// Projects that are still the parent of another project are kept. With
/// `dry_run` nothing is deleted and `after` is what a real run would leave.
pub async fn purge_unused_projects(db: &Database, dry_run: bool) -> Result<PurgeReport> {
    let pool = db.primary();

    let before: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projects")
        .fetch_one(pool)
        .await?;

    let purged: i64 = if dry_run {
        sqlx::query_scalar(&format!("SELECT COUNT(*) {}", UNUSED_PROJECTS))
            .fetch_one(pool)
            .await?
    } else {
        let deleted = sqlx::query(&format!(
            "DELETE FROM projects WHERE id IN (SELECT id {})",
            UNUSED_PROJECTS
        ))
        .execute(pool)
        .await?
        .rows_affected();
        deleted as i64
    };

    let after = if dry_run {
        before - purged
    } else {
        sqlx::query_scalar("SELECT COUNT(*) FROM projects")
            .fetch_one(pool)
            .await?
    };

    info!(before, after, purged, dry_run, "Purged unused projects");

    Ok(PurgeReport {
        before,
        after,
        purged,
        dry_run,
    })
}
