//! wpa-sync library - WikiProject assessment reconciliation
//!
//! Keeps the stored per-project assessments of each page in line with the
//! banner declarations parsed from the page, and answers read queries over
//! them.

use std::sync::Arc;

use wpa_common::config::SyncConfig;
use wpa_common::db::Database;

pub mod checkpoint;
pub mod cleaner;
pub mod diff;
pub mod dictionary;
pub mod driver;
pub mod events;
pub mod maintenance;
pub mod pages;
pub mod queries;
pub mod store;

pub use driver::{EventOutcome, ReconcileOutcome, ReconcileStage, ReconciliationDriver};
pub use events::{Declaration, PageContentEvent, PageDeletedEvent, PageEvent};

use checkpoint::checkpoint_for;
use dictionary::ProjectNameCache;
use queries::AssessmentQueries;

/// Shared state for the writers and readers of one database
///
/// All drivers and query handles built from one service share its project
/// name cache.
#[derive(Clone)]
pub struct SyncService {
    db: Database,
    cache: Arc<ProjectNameCache>,
    config: SyncConfig,
}

impl SyncService {
    pub fn new(db: Database, config: SyncConfig) -> Self {
        Self::with_cache(db, config, Arc::new(ProjectNameCache::new()))
    }

    pub fn with_cache(db: Database, config: SyncConfig, cache: Arc<ProjectNameCache>) -> Self {
        Self { db, cache, config }
    }

    /// Reconciliation driver using the configured checkpoint mode
    pub fn driver(&self) -> ReconciliationDriver {
        let checkpoint = checkpoint_for(self.config.checkpoint, &self.db);
        ReconciliationDriver::new(
            self.db.clone(),
            Arc::clone(&self.cache),
            self.config.clone(),
            checkpoint,
        )
    }

    pub fn queries(&self) -> AssessmentQueries {
        AssessmentQueries::new(
            self.db.clone(),
            Arc::clone(&self.cache),
            self.config.subprojects_enabled,
        )
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}
