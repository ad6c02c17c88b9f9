//! Read query and maintenance integration tests

mod common;

use std::collections::BTreeSet;

use common::{decl, open_db, sync_config};
use wpa_common::config::SyncConfig;
use wpa_common::Error;
use wpa_sync::maintenance::{purge_unused_projects, PurgeReport};
use wpa_sync::queries::{AssessmentsRequest, ProjectPagesRequest};
use wpa_sync::{PageContentEvent, SyncService};

async fn seeded_service(config: SyncConfig) -> (tempfile::TempDir, SyncService) {
    let (dir, db) = open_db().await;
    let service = SyncService::new(db, config);
    let driver = service.driver();

    driver
        .reconcile(10, 1, &[decl("Plants", "B", "Mid"), decl("Food", "C", "Low")])
        .await
        .unwrap();
    driver
        .reconcile(11, 2, &[decl("Plants", "GA", "High")])
        .await
        .unwrap();
    driver
        .reconcile(12, 3, &[decl("Food", "Stub", "")])
        .await
        .unwrap();

    (dir, service)
}

#[tokio::test]
async fn test_assessments_for_pages() {
    let (_dir, service) = seeded_service(sync_config()).await;

    let result = service
        .queries()
        .assessments_for_pages(&AssessmentsRequest {
            page_ids: vec![10, 11, 99],
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(result.continue_from, None);
    assert_eq!(result.pages.len(), 2);

    let projects: BTreeSet<_> = result.pages[&10].iter().map(|a| a.project.as_str()).collect();
    assert_eq!(projects, BTreeSet::from(["Plants", "Food"]));
    assert_eq!(result.pages[&11][0].class, "GA");
}

#[tokio::test]
async fn test_assessments_for_pages_paginates() {
    let (_dir, service) = seeded_service(sync_config()).await;
    let queries = service.queries();

    let mut request = AssessmentsRequest {
        page_ids: vec![10, 11, 12],
        limit: Some(2),
        ..Default::default()
    };

    let mut seen = Vec::new();
    let mut calls = 0;
    loop {
        let result = queries.assessments_for_pages(&request).await.unwrap();
        calls += 1;
        for (page_id, assessments) in &result.pages {
            for assessment in assessments {
                seen.push((*page_id, assessment.project.clone()));
            }
        }
        match result.continue_from {
            Some(next) => request.continue_from = Some(next),
            None => break,
        }
    }

    // Four rows, two per call, each exactly once
    assert_eq!(calls, 2);
    assert_eq!(seen.len(), 4);
    let unique: BTreeSet<_> = seen.iter().cloned().collect();
    assert_eq!(unique.len(), 4);
}

#[tokio::test]
async fn test_malformed_continue_rejected() {
    let (_dir, service) = seeded_service(sync_config()).await;

    let result = service
        .queries()
        .assessments_for_pages(&AssessmentsRequest {
            page_ids: vec![10],
            continue_from: Some("ten|3".to_string()),
            ..Default::default()
        })
        .await;

    assert!(matches!(result, Err(Error::InvalidInput(_))));
}

#[tokio::test]
async fn test_subprojects_hidden_unless_requested() {
    let config = SyncConfig {
        subprojects_enabled: true,
        ..sync_config()
    };
    let (_dir, db) = open_db().await;
    let service = SyncService::new(db, config);
    service
        .driver()
        .reconcile(
            10,
            1,
            &[decl("Military history", "B", "Mid"), decl("Military history/Aviation", "B", "Low")],
        )
        .await
        .unwrap();

    let queries = service.queries();
    let top_level = queries
        .assessments_for_pages(&AssessmentsRequest {
            page_ids: vec![10],
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(top_level.pages[&10].len(), 1);
    assert_eq!(top_level.pages[&10][0].project, "Military history");

    let all = queries
        .assessments_for_pages(&AssessmentsRequest {
            page_ids: vec![10],
            include_subprojects: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(all.pages[&10].len(), 2);
}

#[tokio::test]
async fn test_pages_for_projects_with_unknown_project() {
    let (_dir, service) = seeded_service(sync_config()).await;

    let result = service
        .queries()
        .pages_for_projects(&ProjectPagesRequest {
            projects: vec!["Plants".to_string(), "Nonexistent".to_string()],
            include_assessments: true,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("Nonexistent"));

    let pages = &result.projects["Plants"];
    let ids: Vec<i64> = pages.iter().map(|p| p.page_id).collect();
    assert_eq!(ids, vec![10, 11]);
    assert_eq!(pages[1].assessment.as_ref().unwrap().class, "GA");
    // Pages reconciled without a title are not in the page directory
    assert_eq!(pages[0].title, None);
}

#[tokio::test]
async fn test_pages_for_projects_reports_page_titles() {
    let (_dir, db) = open_db().await;
    let service = SyncService::new(db, sync_config());
    service
        .driver()
        .handle_content_event(&PageContentEvent {
            page_id: 101,
            revision_id: 7,
            namespace: 1,
            title: Some("Apple".to_string()),
            subject_page_id: Some(100),
            declarations: vec![decl("Plants", "B", "Mid")],
        })
        .await
        .unwrap();

    let result = service
        .queries()
        .pages_for_projects(&ProjectPagesRequest {
            projects: vec!["Plants".to_string()],
            ..Default::default()
        })
        .await
        .unwrap();

    let page = &result.projects["Plants"][0];
    assert_eq!(page.page_id, 100);
    assert_eq!(page.namespace, Some(0));
    assert_eq!(page.title.as_deref(), Some("Apple"));
    assert!(page.assessment.is_none());
}

#[tokio::test]
async fn test_pages_for_projects_paginates() {
    let (_dir, service) = seeded_service(sync_config()).await;

    let request = ProjectPagesRequest {
        projects: vec!["Plants".to_string(), "Food".to_string()],
        limit: Some(3),
        ..Default::default()
    };
    let queries = service.queries();

    let first = queries.pages_for_projects(&request).await.unwrap();
    let first_count: usize = first.projects.values().map(Vec::len).sum();
    assert_eq!(first_count, 3);
    let next = first.continue_from.clone().unwrap();

    let second = queries
        .pages_for_projects(&ProjectPagesRequest {
            continue_from: Some(next),
            ..request.clone()
        })
        .await
        .unwrap();
    let second_count: usize = second.projects.values().map(Vec::len).sum();
    assert_eq!(second_count, 1);
    assert_eq!(second.continue_from, None);
}

#[tokio::test]
async fn test_list_all_projects_sorted() {
    let (_dir, service) = seeded_service(sync_config()).await;

    let projects = service.queries().list_all_projects().await.unwrap();
    assert_eq!(projects, vec!["Food".to_string(), "Plants".to_string()]);
}

#[tokio::test]
async fn test_purge_after_declarations_removed() {
    let (_dir, service) = seeded_service(sync_config()).await;
    let driver = service.driver();

    // Food loses its last assessments
    driver.reconcile(10, 4, &[decl("Plants", "B", "Mid")]).await.unwrap();
    driver.reconcile(12, 5, &[]).await.unwrap();

    let report = purge_unused_projects(service.database(), false).await.unwrap();
    assert_eq!(
        report,
        PurgeReport {
            before: 2,
            after: 1,
            purged: 1,
            dry_run: false
        }
    );
    assert_eq!(
        service.queries().list_all_projects().await.unwrap(),
        vec!["Plants".to_string()]
    );
}
