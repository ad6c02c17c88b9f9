//! Replication checkpoints between write batches
//!
//! The reconciliation driver calls [`WriteCheckpoint::wait_for_replication`]
//! after every `update_rows_per_query` writes. This is backpressure only:
//! skipping it never changes the final rows.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;
use wpa_common::config::CheckpointMode;
use wpa_common::db::Database;
use wpa_common::Result;

#[async_trait]
pub trait WriteCheckpoint: Send + Sync {
    /// Give readers and replicas a chance to catch up
    async fn wait_for_replication(&self) -> Result<()>;
}

/// Yield to the scheduler and nothing else
#[derive(Debug, Clone, Copy, Default)]
pub struct YieldCheckpoint;

#[async_trait]
impl WriteCheckpoint for YieldCheckpoint {
    async fn wait_for_replication(&self) -> Result<()> {
        tokio::task::yield_now().await;
        Ok(())
    }
}

/// Passive WAL checkpoint on the primary pool
///
/// Copies committed WAL frames into the main database file without blocking
/// readers or writers.
#[derive(Debug, Clone)]
pub struct WalCheckpoint {
    pool: SqlitePool,
}

impl WalCheckpoint {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WriteCheckpoint for WalCheckpoint {
    async fn wait_for_replication(&self) -> Result<()> {
        let (busy, log_frames, checkpointed): (i64, i64, i64) =
            sqlx::query_as("PRAGMA wal_checkpoint(PASSIVE)")
                .fetch_one(&self.pool)
                .await?;

        debug!(busy, log_frames, checkpointed, "WAL checkpoint");
        tokio::task::yield_now().await;
        Ok(())
    }
}

/// Checkpoint implementation for the configured mode
pub fn checkpoint_for(mode: CheckpointMode, db: &Database) -> Arc<dyn WriteCheckpoint> {
    match mode {
        CheckpointMode::Wal => Arc::new(WalCheckpoint::new(db.primary().clone())),
        CheckpointMode::Yield => Arc::new(YieldCheckpoint),
    }
}
