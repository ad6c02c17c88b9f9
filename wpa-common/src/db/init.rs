//! Database initialization
//!
//! Opens (creating if needed) the assessment database, creates the tables,
//! runs pending migrations and hands back a [`Database`] with a primary pool
//! and a reader pool.

use crate::config::DatabaseConfig;
use crate::db::models::ReadConsistency;
use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Primary and reader pools over the same database
///
/// With `separate_reader` off both handles point at the same pool, so
/// [`ReadConsistency::Replica`] reads are never stale.
#[derive(Debug, Clone)]
pub struct Database {
    primary: SqlitePool,
    reader: SqlitePool,
}

impl Database {
    /// Open the database described by `config` at `db_path`
    pub async fn open(db_path: &Path, config: &DatabaseConfig) -> Result<Self> {
        let primary = init_database(db_path, config.busy_timeout_ms).await?;

        if config.separate_reader {
            let reader = connect_reader(db_path, config.busy_timeout_ms).await?;
            info!("Opened read-only reader pool: {}", db_path.display());
            Ok(Self { primary, reader })
        } else {
            Ok(Self::from_pool(primary))
        }
    }

    /// Use one pool for both reads and writes
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            reader: pool.clone(),
            primary: pool,
        }
    }

    /// Pool for writes and latest reads
    pub fn primary(&self) -> &SqlitePool {
        &self.primary
    }

    /// Pool matching the requested consistency
    pub fn reader(&self, consistency: ReadConsistency) -> &SqlitePool {
        match consistency {
            ReadConsistency::Replica => &self.reader,
            ReadConsistency::Primary => &self.primary,
        }
    }

    /// Close both pools
    pub async fn close(&self) {
        self.reader.close().await;
        self.primary.close().await;
    }
}

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path, busy_timeout_ms: u64) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // WAL lets readers proceed while a reconciliation is writing.
    // Pragmas set through the options apply to every pooled connection.
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(busy_timeout_ms));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Idempotent - safe to call multiple times
    create_schema_version_table(&pool).await?;
    create_projects_table(&pool).await?;
    create_assessments_table(&pool).await?;
    create_pages_table(&pool).await?;

    // Columns added after the first release
    crate::db::migrations::run_migrations(&pool).await?;

    Ok(pool)
}

/// Connect a read-only pool to an existing database
pub async fn connect_reader(db_path: &Path, busy_timeout_ms: u64) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .read_only(true)
        .busy_timeout(Duration::from_millis(busy_timeout_ms));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    debug!("Connected reader pool to {}", db_path.display());
    Ok(pool)
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the projects table
///
/// AUTOINCREMENT keeps ids of purged projects from being handed out again.
pub async fn create_projects_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL UNIQUE CHECK (length(title) BETWEEN 1 AND 255),
            parent_id INTEGER REFERENCES projects(id),
            CHECK (parent_id IS NULL OR parent_id <> id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the assessments table
///
/// At most one row per (page, project).
pub async fn create_assessments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assessments (
            page_id INTEGER NOT NULL,
            project_id INTEGER NOT NULL REFERENCES projects(id),
            class TEXT NOT NULL DEFAULT '',
            importance TEXT NOT NULL DEFAULT '',
            page_revision_id INTEGER NOT NULL,
            PRIMARY KEY (page_id, project_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Project-first ordering for the project pages query
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_assessments_project ON assessments(project_id, page_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the page directory table
pub async fn create_pages_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pages (
            page_id INTEGER PRIMARY KEY,
            namespace INTEGER NOT NULL DEFAULT 0,
            title TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
