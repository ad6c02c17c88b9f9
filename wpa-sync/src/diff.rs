//! Assessment set diff
//!
//! Set algebra between the projects a page declares now and the projects
//! stored for it, plus the last-wins collapse of duplicate declarations.

use std::collections::{BTreeSet, HashMap};

use wpa_common::db::ProjectId;

/// Write plan for one page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssessmentDiff {
    /// Declared now, not stored
    pub to_insert: BTreeSet<ProjectId>,
    /// Declared and stored; values may have changed
    pub to_update: BTreeSet<ProjectId>,
    /// Stored, no longer declared
    pub to_delete: BTreeSet<ProjectId>,
}

impl AssessmentDiff {
    /// Maximum number of row writes this plan can cause
    pub fn write_count(&self) -> usize {
        self.to_insert.len() + self.to_update.len() + self.to_delete.len()
    }
}

/// Partition `current ∪ previous` into insert, update and delete sets
pub fn diff(current: &BTreeSet<ProjectId>, previous: &BTreeSet<ProjectId>) -> AssessmentDiff {
    AssessmentDiff {
        to_insert: current.difference(previous).copied().collect(),
        to_update: current.intersection(previous).copied().collect(),
        to_delete: previous.difference(current).copied().collect(),
    }
}

/// A declaration whose project title has been cleaned and resolved to an id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDeclaration {
    pub project_id: ProjectId,
    pub title: String,
    pub class: String,
    pub importance: String,
}

/// Current declarations of a page, one per project
///
/// When a project is declared more than once, the last declaration's class
/// and importance win. The entry keeps the position of the first one so
/// writes still follow page order.
#[derive(Debug, Clone, Default)]
pub struct CurrentAssessments {
    entries: Vec<ResolvedDeclaration>,
    positions: HashMap<ProjectId, usize>,
}

impl CurrentAssessments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a declaration; returns true if it replaced an earlier one
    pub fn insert(&mut self, declaration: ResolvedDeclaration) -> bool {
        match self.positions.get(&declaration.project_id) {
            Some(&pos) => {
                self.entries[pos] = declaration;
                true
            }
            None => {
                self.positions.insert(declaration.project_id, self.entries.len());
                self.entries.push(declaration);
                false
            }
        }
    }

    pub fn get(&self, project_id: ProjectId) -> Option<&ResolvedDeclaration> {
        self.positions.get(&project_id).map(|&pos| &self.entries[pos])
    }

    pub fn project_ids(&self) -> BTreeSet<ProjectId> {
        self.positions.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedDeclaration> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<ResolvedDeclaration> for CurrentAssessments {
    fn from_iter<I: IntoIterator<Item = ResolvedDeclaration>>(iter: I) -> Self {
        let mut current = CurrentAssessments::new();
        for declaration in iter {
            current.insert(declaration);
        }
        current
    }
}
