//! Reconciliation driver
//!
//! Brings a page's stored assessments in line with the declarations parsed
//! from its latest content:
//!
//! `Start → ProjectsResolved → Diffed → Writing → Committed`, or `Failed` on a
//! storage error. There is no rollback: writes already applied stay applied,
//! and replaying the same event converges because every write is idempotent.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use wpa_common::config::SyncConfig;
use wpa_common::db::{Assessment, Database, PageId, PageRecord, ReadConsistency, RevisionId};
use wpa_common::{Error, Result};

use crate::checkpoint::WriteCheckpoint;
use crate::cleaner::clean_project_title;
use crate::diff::{diff, CurrentAssessments, ResolvedDeclaration};
use crate::dictionary::{ProjectDictionary, ProjectNameCache};
use crate::events::{is_talk_namespace, Declaration, PageContentEvent, PageEvent};
use crate::pages::PageDirectory;
use crate::store::AssessmentStore;

/// Reconciliation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileStage {
    Start,
    ProjectsResolved,
    Diffed,
    Writing,
    Committed,
    Failed,
}

impl fmt::Display for ReconcileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReconcileStage::Start => "start",
            ReconcileStage::ProjectsResolved => "projects_resolved",
            ReconcileStage::Diffed => "diffed",
            ReconcileStage::Writing => "writing",
            ReconcileStage::Committed => "committed",
            ReconcileStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What a committed reconciliation did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub page_id: PageId,
    pub revision_id: RevisionId,
    pub stage: ReconcileStage,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Inserts ignored because a concurrent run stored the row first
    pub conflicts: usize,
    pub deleted: usize,
    /// Declarations dropped for an empty or unresolvable project name
    pub skipped_declarations: usize,
    pub checkpoints: usize,
    /// Titles of the projects whose assessments were removed
    pub removed_projects: Vec<String>,
}

impl ReconcileOutcome {
    fn new(page_id: PageId, revision_id: RevisionId) -> Self {
        Self {
            page_id,
            revision_id,
            stage: ReconcileStage::Start,
            inserted: 0,
            updated: 0,
            unchanged: 0,
            conflicts: 0,
            deleted: 0,
            skipped_declarations: 0,
            checkpoints: 0,
            removed_projects: Vec::new(),
        }
    }
}

/// Result of handling one [`PageEvent`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum EventOutcome {
    Reconciled(ReconcileOutcome),
    /// The page kind does not carry assessments under the current config
    Ignored { page_id: PageId },
    PageDeleted { page_id: PageId, removed: u64 },
}

/// Orchestrates cleaner, dictionary, diff and store for page events
#[derive(Clone)]
pub struct ReconciliationDriver {
    dictionary: ProjectDictionary,
    store: AssessmentStore,
    pages: PageDirectory,
    checkpoint: Arc<dyn WriteCheckpoint>,
    config: SyncConfig,
}

impl ReconciliationDriver {
    pub fn new(
        db: Database,
        cache: Arc<ProjectNameCache>,
        config: SyncConfig,
        checkpoint: Arc<dyn WriteCheckpoint>,
    ) -> Self {
        Self {
            dictionary: ProjectDictionary::new(db.clone(), cache, config.subprojects_enabled),
            store: AssessmentStore::new(db.clone()),
            pages: PageDirectory::new(db),
            checkpoint,
            config,
        }
    }

    pub fn dictionary(&self) -> &ProjectDictionary {
        &self.dictionary
    }

    pub fn store(&self) -> &AssessmentStore {
        &self.store
    }

    pub fn pages(&self) -> &PageDirectory {
        &self.pages
    }

    /// Dispatch a page event
    pub async fn handle_event(&self, event: &PageEvent) -> Result<EventOutcome> {
        match event {
            PageEvent::ContentReconciled(content) => {
                Ok(match self.handle_content_event(content).await? {
                    Some(outcome) => EventOutcome::Reconciled(outcome),
                    None => EventOutcome::Ignored {
                        page_id: content.page_id,
                    },
                })
            }
            PageEvent::Deleted(deleted) => {
                let removed = self.handle_page_deleted(deleted.page_id).await?;
                Ok(EventOutcome::PageDeleted {
                    page_id: deleted.page_id,
                    removed,
                })
            }
        }
    }

    /// Reconcile a parsed page, mapping talk pages to their subject page
    ///
    /// Returns `None` when assessments are not recorded on this kind of page.
    /// An event with no declarations is still reconciled so that removed
    /// annotations are deleted.
    pub async fn handle_content_event(
        &self,
        event: &PageContentEvent,
    ) -> Result<Option<ReconcileOutcome>> {
        let is_talk = is_talk_namespace(event.namespace);
        if is_talk != self.config.assess_on_talk_pages {
            debug!(
                page_id = event.page_id,
                namespace = event.namespace,
                "Assessments not recorded on this page kind, ignoring"
            );
            return Ok(None);
        }

        // Assessments always belong to the subject page
        let (target_page_id, subject_namespace) = if is_talk {
            let subject = event.subject_page_id.ok_or_else(|| {
                Error::InvalidInput(format!(
                    "Talk page {} has no subject_page_id",
                    event.page_id
                ))
            })?;
            (subject, event.namespace - 1)
        } else {
            (event.page_id, event.namespace)
        };

        if target_page_id <= 0 {
            return Err(Error::InvalidInput(format!(
                "Page id must be positive, got {}",
                target_page_id
            )));
        }

        if let Some(title) = &event.title {
            let page = PageRecord {
                page_id: target_page_id,
                namespace: subject_namespace,
                title: title.clone(),
            };
            self.pages
                .upsert(&page)
                .await
                .map_err(|e| reconcile_error(target_page_id, ReconcileStage::Start, e))?;
        }

        self.reconcile(target_page_id, event.revision_id, &event.declarations)
            .await
            .map(Some)
    }

    /// Run the reconciliation state machine for one page revision
    pub async fn reconcile(
        &self,
        page_id: PageId,
        revision_id: RevisionId,
        declarations: &[Declaration],
    ) -> Result<ReconcileOutcome> {
        if page_id <= 0 {
            return Err(Error::InvalidInput(format!(
                "Page id must be positive, got {}",
                page_id
            )));
        }

        let mut outcome = ReconcileOutcome::new(page_id, revision_id);

        match self.run(&mut outcome, declarations).await {
            Ok(()) => {
                outcome.stage = ReconcileStage::Committed;
                info!(
                    page_id,
                    revision_id,
                    inserted = outcome.inserted,
                    updated = outcome.updated,
                    unchanged = outcome.unchanged,
                    conflicts = outcome.conflicts,
                    deleted = outcome.deleted,
                    skipped = outcome.skipped_declarations,
                    "Reconciliation committed"
                );
                Ok(outcome)
            }
            Err(e) => {
                let failed_in = outcome.stage;
                outcome.stage = ReconcileStage::Failed;
                warn!(
                    page_id,
                    revision_id,
                    stage = %failed_in,
                    partial = ?outcome,
                    "Reconciliation failed, applied writes kept: {}",
                    e
                );
                Err(reconcile_error(page_id, failed_in, e))
            }
        }
    }

    async fn run(
        &self,
        outcome: &mut ReconcileOutcome,
        declarations: &[Declaration],
    ) -> Result<()> {
        let page_id = outcome.page_id;

        let current = self.resolve_projects(outcome, declarations).await?;
        outcome.stage = ReconcileStage::ProjectsResolved;

        // A write earlier in the same causal chain must be visible here
        let previous = self
            .store
            .get_project_ids_for_page(page_id, ReadConsistency::Primary)
            .await?;
        let plan = diff(&current.project_ids(), &previous);
        outcome.stage = ReconcileStage::Diffed;
        debug!(
            page_id,
            insert = plan.to_insert.len(),
            update = plan.to_update.len(),
            delete = plan.to_delete.len(),
            "Computed assessment diff"
        );

        outcome.stage = ReconcileStage::Writing;
        let mut writes = 0usize;

        for declaration in current.iter() {
            let assessment = Assessment {
                page_id,
                project_id: declaration.project_id,
                class: declaration.class.clone(),
                importance: declaration.importance.clone(),
                page_revision_id: outcome.revision_id,
            };

            if plan.to_insert.contains(&declaration.project_id) {
                // A racing reconciliation may have inserted first; its row stands
                if self.store.insert(&assessment).await? {
                    outcome.inserted += 1;
                } else {
                    outcome.conflicts += 1;
                }
            } else if plan.to_update.contains(&declaration.project_id) {
                if self.store.upsert_if_changed(&assessment).await? {
                    outcome.updated += 1;
                } else {
                    outcome.unchanged += 1;
                }
            }

            writes += 1;
            self.checkpoint_if_due(outcome, writes).await?;
        }

        for &project_id in &plan.to_delete {
            self.store.delete(page_id, project_id).await?;
            outcome.deleted += 1;

            if let Some(name) = self.dictionary.get_name(project_id).await? {
                outcome.removed_projects.push(name);
            }

            writes += 1;
            self.checkpoint_if_due(outcome, writes).await?;
        }

        Ok(())
    }

    /// Clean titles and resolve them to ids, last declaration winning
    async fn resolve_projects(
        &self,
        outcome: &mut ReconcileOutcome,
        declarations: &[Declaration],
    ) -> Result<CurrentAssessments> {
        let mut current = CurrentAssessments::new();

        for declaration in declarations {
            if declaration.project.is_empty() {
                debug!(page_id = outcome.page_id, "Skipping declaration without project name");
                outcome.skipped_declarations += 1;
                continue;
            }

            let title = clean_project_title(&declaration.project);
            if title.is_empty() {
                debug!(
                    page_id = outcome.page_id,
                    raw = %declaration.project,
                    "Project name empty after cleaning, skipping"
                );
                outcome.skipped_declarations += 1;
                continue;
            }

            let project_id = self.dictionary.ensure_id(&title).await?;
            if project_id <= 0 {
                warn!(
                    page_id = outcome.page_id,
                    "Project '{}' resolved to id {}, skipping",
                    title,
                    project_id
                );
                outcome.skipped_declarations += 1;
                continue;
            }

            current.insert(ResolvedDeclaration {
                project_id,
                title,
                class: declaration.class.clone(),
                importance: declaration.importance.clone(),
            });
        }

        Ok(current)
    }

    async fn checkpoint_if_due(&self, outcome: &mut ReconcileOutcome, writes: usize) -> Result<()> {
        if writes % self.config.update_rows_per_query.max(1) == 0 {
            self.checkpoint.wait_for_replication().await?;
            outcome.checkpoints += 1;
        }
        Ok(())
    }

    /// Remove every assessment of a deleted page
    ///
    /// Undeletion needs no special handling: the rows come back when the
    /// restored page is parsed again.
    pub async fn handle_page_deleted(&self, page_id: PageId) -> Result<u64> {
        let removed = self.store.delete_all_for_page(page_id).await?;
        self.pages.remove(page_id).await?;

        info!(page_id, removed, "Page deleted, assessments removed");
        Ok(removed)
    }
}

fn reconcile_error(page_id: PageId, stage: ReconcileStage, source: Error) -> Error {
    Error::Reconcile {
        page_id,
        stage: stage.to_string(),
        source: Box::new(source),
    }
}
