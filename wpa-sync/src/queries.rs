//! Read-side queries
//!
//! Assessments of given pages, pages of given projects, and the project list.
//! Both paged queries fetch one row more than the limit; that extra row's key
//! becomes the continue cursor and the next call resumes at it inclusively.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite};
use tracing::warn;
use wpa_common::db::{Database, Namespace, PageId, ProjectId, ReadConsistency};
use wpa_common::{Error, Result};

use crate::dictionary::{ProjectDictionary, ProjectNameCache};

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 500;

/// Continue position for [`AssessmentQueries::assessments_for_pages`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssessmentCursor {
    pub page_id: PageId,
    pub project_id: ProjectId,
}

impl fmt::Display for AssessmentCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.page_id, self.project_id)
    }
}

impl FromStr for AssessmentCursor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (page_id, project_id) = parse_cursor(s)?;
        Ok(Self { page_id, project_id })
    }
}

/// Continue position for [`AssessmentQueries::pages_for_projects`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectPageCursor {
    pub project_id: ProjectId,
    pub page_id: PageId,
}

impl fmt::Display for ProjectPageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.project_id, self.page_id)
    }
}

impl FromStr for ProjectPageCursor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (project_id, page_id) = parse_cursor(s)?;
        Ok(Self { project_id, page_id })
    }
}

/// Two `|`-separated integers in canonical form ("07" and "+7" are rejected)
fn parse_cursor(s: &str) -> Result<(i64, i64)> {
    let bad = || Error::InvalidInput(format!("Invalid continue value: {}", s));

    let mut parts = s.split('|');
    let (Some(first), Some(second), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(bad());
    };

    let parse = |part: &str| -> Result<i64> {
        let value: i64 = part.parse().map_err(|_| bad())?;
        if value.to_string() != part {
            return Err(bad());
        }
        Ok(value)
    };

    Ok((parse(first)?, parse(second)?))
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// One project's rating of a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectAssessment {
    pub project: String,
    pub class: String,
    pub importance: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageAssessments {
    pub pages: BTreeMap<PageId, Vec<ProjectAssessment>>,
    #[serde(rename = "continue", skip_serializing_if = "Option::is_none")]
    pub continue_from: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssessmentValues {
    pub class: String,
    pub importance: String,
}

/// A page assessed by a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectPage {
    pub page_id: PageId,
    /// Absent when the page directory does not know the page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<Namespace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment: Option<AssessmentValues>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectPages {
    pub projects: BTreeMap<String, Vec<ProjectPage>>,
    #[serde(rename = "continue", skip_serializing_if = "Option::is_none")]
    pub continue_from: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Parameters of [`AssessmentQueries::assessments_for_pages`]
#[derive(Debug, Clone, Default)]
pub struct AssessmentsRequest {
    pub page_ids: Vec<PageId>,
    pub limit: Option<i64>,
    pub continue_from: Option<String>,
    /// Only honored when subprojects are enabled
    pub include_subprojects: bool,
}

/// Parameters of [`AssessmentQueries::pages_for_projects`]
#[derive(Debug, Clone, Default)]
pub struct ProjectPagesRequest {
    pub projects: Vec<String>,
    pub include_assessments: bool,
    pub limit: Option<i64>,
    pub continue_from: Option<String>,
}

#[derive(sqlx::FromRow)]
struct PageAssessmentRow {
    page_id: PageId,
    project_id: ProjectId,
    class: String,
    importance: String,
    project_name: String,
}

#[derive(sqlx::FromRow)]
struct ProjectPageRow {
    page_id: PageId,
    project_id: ProjectId,
    class: String,
    importance: String,
    project_name: String,
    namespace: Option<Namespace>,
    page_title: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AssessmentQueries {
    db: Database,
    dictionary: ProjectDictionary,
    subprojects_enabled: bool,
}

impl AssessmentQueries {
    pub fn new(db: Database, cache: Arc<ProjectNameCache>, subprojects_enabled: bool) -> Self {
        Self {
            dictionary: ProjectDictionary::new(db.clone(), cache, subprojects_enabled),
            db,
            subprojects_enabled,
        }
    }

    /// Assessments of the given pages, ordered by (page, project)
    pub async fn assessments_for_pages(
        &self,
        request: &AssessmentsRequest,
    ) -> Result<PageAssessments> {
        let mut result = PageAssessments::default();
        if request.page_ids.is_empty() {
            return Ok(result);
        }

        let limit = clamp_limit(request.limit);
        let cursor = request
            .continue_from
            .as_deref()
            .map(AssessmentCursor::from_str)
            .transpose()?;

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            SELECT a.page_id, a.project_id, a.class, a.importance, p.title AS project_name
            FROM assessments a
            JOIN projects p ON a.project_id = p.id
            WHERE a.page_id IN ("#,
        );
        let mut ids = qb.separated(", ");
        for page_id in &request.page_ids {
            ids.push_bind(*page_id);
        }
        qb.push(")");

        // Subprojects are opt-in when the wiki distinguishes them
        if self.subprojects_enabled && !request.include_subprojects {
            qb.push(" AND p.parent_id IS NULL");
        }

        if let Some(cursor) = cursor {
            qb.push(" AND (a.page_id > ")
                .push_bind(cursor.page_id)
                .push(" OR (a.page_id = ")
                .push_bind(cursor.page_id)
                .push(" AND a.project_id >= ")
                .push_bind(cursor.project_id)
                .push("))");
        }

        qb.push(" ORDER BY a.page_id, a.project_id LIMIT ")
            .push_bind(limit + 1);

        let rows: Vec<PageAssessmentRow> = qb
            .build_query_as()
            .fetch_all(self.db.reader(ReadConsistency::Replica))
            .await?;

        for (count, row) in rows.into_iter().enumerate() {
            if count as i64 >= limit {
                result.continue_from = Some(
                    AssessmentCursor {
                        page_id: row.page_id,
                        project_id: row.project_id,
                    }
                    .to_string(),
                );
                break;
            }

            result
                .pages
                .entry(row.page_id)
                .or_default()
                .push(ProjectAssessment {
                    project: row.project_name,
                    class: row.class,
                    importance: row.importance,
                });
        }

        Ok(result)
    }

    /// Pages assessed by the named projects, ordered by (project, page)
    ///
    /// Unknown project names are reported as warnings and skipped.
    pub async fn pages_for_projects(
        &self,
        request: &ProjectPagesRequest,
    ) -> Result<ProjectPages> {
        let mut result = ProjectPages::default();

        let mut project_ids: Vec<ProjectId> = Vec::new();
        for name in &request.projects {
            match self.dictionary.get_id(name).await? {
                Some(id) => {
                    if !project_ids.contains(&id) {
                        project_ids.push(id);
                    }
                }
                None => {
                    warn!("Unknown project requested: {}", name);
                    result.warnings.push(format!("Unrecognized project: {}", name));
                }
            }
        }

        if project_ids.is_empty() {
            return Ok(result);
        }

        let limit = clamp_limit(request.limit);
        let cursor = request
            .continue_from
            .as_deref()
            .map(ProjectPageCursor::from_str)
            .transpose()?;

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            SELECT a.page_id, a.project_id, a.class, a.importance,
                   p.title AS project_name, pg.namespace, pg.title AS page_title
            FROM assessments a
            JOIN projects p ON a.project_id = p.id
            LEFT JOIN pages pg ON pg.page_id = a.page_id
            WHERE a.project_id IN ("#,
        );
        let mut ids = qb.separated(", ");
        for project_id in &project_ids {
            ids.push_bind(*project_id);
        }
        qb.push(")");

        if let Some(cursor) = cursor {
            qb.push(" AND (a.project_id > ")
                .push_bind(cursor.project_id)
                .push(" OR (a.project_id = ")
                .push_bind(cursor.project_id)
                .push(" AND a.page_id >= ")
                .push_bind(cursor.page_id)
                .push("))");
        }

        qb.push(" ORDER BY a.project_id, a.page_id LIMIT ")
            .push_bind(limit + 1);

        let rows: Vec<ProjectPageRow> = qb
            .build_query_as()
            .fetch_all(self.db.reader(ReadConsistency::Replica))
            .await?;

        for (count, row) in rows.into_iter().enumerate() {
            if count as i64 >= limit {
                result.continue_from = Some(
                    ProjectPageCursor {
                        project_id: row.project_id,
                        page_id: row.page_id,
                    }
                    .to_string(),
                );
                break;
            }

            let assessment = request.include_assessments.then(|| AssessmentValues {
                class: row.class,
                importance: row.importance,
            });

            result
                .projects
                .entry(row.project_name)
                .or_default()
                .push(ProjectPage {
                    page_id: row.page_id,
                    namespace: row.namespace,
                    title: row.page_title,
                    assessment,
                });
        }

        Ok(result)
    }

    /// Every project title, alphabetically
    pub async fn list_all_projects(&self) -> Result<Vec<String>> {
        let titles: Vec<String> = sqlx::query_scalar("SELECT title FROM projects ORDER BY title")
            .fetch_all(self.db.reader(ReadConsistency::Replica))
            .await?;

        Ok(titles)
    }
}
