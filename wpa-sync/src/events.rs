//! Input events
//!
//! Produced by the collaborator that parses page content for assessment
//! annotations and by page deletion.

use serde::{Deserialize, Serialize};
use wpa_common::db::{Namespace, PageId, RevisionId};

/// One `(project, class, importance)` annotation as written on the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub project: String,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub importance: String,
}

impl Declaration {
    pub fn new(
        project: impl Into<String>,
        class: impl Into<String>,
        importance: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            class: class.into(),
            importance: importance.into(),
        }
    }
}

/// Page content was parsed; declarations are in page order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContentEvent {
    pub page_id: PageId,
    pub revision_id: RevisionId,
    /// Namespace of the parsed page
    #[serde(default)]
    pub namespace: Namespace,
    /// Title of the parsed page, recorded in the page directory when present
    #[serde(default)]
    pub title: Option<String>,
    /// Subject page id; required when the parsed page is a talk page
    #[serde(default)]
    pub subject_page_id: Option<PageId>,
    #[serde(default)]
    pub declarations: Vec<Declaration>,
}

/// A page was deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDeletedEvent {
    pub page_id: PageId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PageEvent {
    ContentReconciled(PageContentEvent),
    Deleted(PageDeletedEvent),
}

/// Talk namespaces are the odd, non-negative ones
pub fn is_talk_namespace(namespace: Namespace) -> bool {
    namespace >= 0 && namespace % 2 == 1
}
