//! Shared helpers for wpa-sync integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use wpa_common::config::{CheckpointMode, SyncConfig};
use wpa_common::db::{init_database, Database};
use wpa_common::{Error, Result};
use wpa_sync::checkpoint::WriteCheckpoint;
use wpa_sync::dictionary::ProjectNameCache;
use wpa_sync::{Declaration, ReconciliationDriver};

pub async fn open_db() -> (TempDir, Database) {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("assessments.db"), 5000)
        .await
        .unwrap();
    (dir, Database::from_pool(pool))
}

/// Sync config that checkpoints by yielding only
pub fn sync_config() -> SyncConfig {
    SyncConfig {
        checkpoint: CheckpointMode::Yield,
        ..SyncConfig::default()
    }
}

/// Counts checkpoint calls
#[derive(Default)]
pub struct CountingCheckpoint {
    calls: AtomicUsize,
}

impl CountingCheckpoint {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WriteCheckpoint for CountingCheckpoint {
    async fn wait_for_replication(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fails with a storage error on call number `fail_on` (1-based)
pub struct FailingCheckpoint {
    calls: AtomicUsize,
    fail_on: usize,
}

impl FailingCheckpoint {
    pub fn new(fail_on: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_on,
        }
    }
}

#[async_trait]
impl WriteCheckpoint for FailingCheckpoint {
    async fn wait_for_replication(&self) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on {
            return Err(Error::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

pub fn driver_with_checkpoint(
    db: &Database,
    config: SyncConfig,
    checkpoint: Arc<dyn WriteCheckpoint>,
) -> ReconciliationDriver {
    ReconciliationDriver::new(
        db.clone(),
        Arc::new(ProjectNameCache::new()),
        config,
        checkpoint,
    )
}

pub fn driver_with(
    db: &Database,
    config: SyncConfig,
) -> (ReconciliationDriver, Arc<CountingCheckpoint>) {
    let checkpoint = Arc::new(CountingCheckpoint::default());
    let driver = driver_with_checkpoint(db, config, checkpoint.clone());
    (driver, checkpoint)
}

pub fn decl(project: &str, class: &str, importance: &str) -> Declaration {
    Declaration::new(project, class, importance)
}

/// (project title, class, importance) rows of a page, by title
pub async fn stored(db: &Database, page_id: i64) -> Vec<(String, String, String)> {
    sqlx::query_as(
        r#"
        SELECT p.title, a.class, a.importance
        FROM assessments a JOIN projects p ON a.project_id = p.id
        WHERE a.page_id = ?
        ORDER BY p.title
        "#,
    )
    .bind(page_id)
    .fetch_all(db.primary())
    .await
    .unwrap()
}

pub fn row(title: &str, class: &str, importance: &str) -> (String, String, String) {
    (title.to_string(), class.to_string(), importance.to_string())
}
