//! Database schema migrations
//!
//! Versioned schema migrations tracked in the `schema_version` table. Every
//! migration is idempotent: it checks for the change before applying it, so
//! running against a database created with the current schema is a no-op.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** - databases in the field depend on them
//! 2. **Always add new migrations** - one function per schema change
//! 3. **Use ALTER TABLE** - prefer it over DROP/CREATE to preserve data

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("Migration v1 completed");
    }

    Ok(())
}

/// Migration v1: subproject support
///
/// Databases created before subprojects existed have no `parent_id` on
/// `projects`. Adds the column and its index.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v1: Add parent_id column to projects");

    let has_column: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info('projects') WHERE name = 'parent_id'",
    )
    .fetch_one(pool)
    .await?;

    if has_column == 0 {
        // Catch duplicate column error for concurrent initialization
        let alter = "ALTER TABLE projects ADD COLUMN parent_id INTEGER REFERENCES projects(id)";
        match sqlx::query(alter).execute(pool).await {
            Ok(_) => info!("  Added parent_id column to projects table"),
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("duplicate column") => {
                info!("  parent_id column added by concurrent initializer - skipping");
            }
            Err(e) => return Err(e.into()),
        }
    } else {
        info!("  parent_id column already exists - skipping");
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_projects_parent ON projects(parent_id)")
        .execute(pool)
        .await?;

    Ok(())
}
