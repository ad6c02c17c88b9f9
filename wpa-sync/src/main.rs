//! wpa-sync - WikiProject assessment reconciliation tool
//!
//! Applies page events to the assessment database and runs the read queries
//! and maintenance purges against it. Results go to stdout as JSON, logs go
//! to stderr.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wpa_common::config::{load_config, resolve_database_path};
use wpa_common::db::Database;
use wpa_sync::maintenance::{purge_bad_assessments, purge_unused_projects};
use wpa_sync::queries::{AssessmentsRequest, ProjectPagesRequest};
use wpa_sync::{PageEvent, SyncService};

/// Command-line arguments for wpa-sync
#[derive(Parser, Debug)]
#[command(name = "wpa-sync")]
#[command(about = "WikiProject page assessment reconciliation")]
#[command(version)]
struct Args {
    /// TOML config file (default: `WPA_CONFIG`, then the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database file (overrides `WPA_DATABASE` and the config file)
    #[arg(short, long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply page events, one JSON object per line, from FILE or stdin
    Reconcile { file: Option<PathBuf> },

    /// Remove every assessment of a deleted page
    DeletePage { page_id: i64 },

    /// List all project titles
    Projects,

    /// Assessments of the given pages
    PageAssessments {
        #[arg(required = true)]
        page_ids: Vec<i64>,
        #[arg(long)]
        limit: Option<i64>,
        /// Continue value from a previous call
        #[arg(long = "continue")]
        continue_from: Option<String>,
        /// Include subproject assessments
        #[arg(long)]
        subprojects: bool,
    },

    /// Pages assessed by the given projects
    ProjectPages {
        #[arg(required = true)]
        projects: Vec<String>,
        /// Include class and importance
        #[arg(long)]
        assessments: bool,
        #[arg(long)]
        limit: Option<i64>,
        /// Continue value from a previous call
        #[arg(long = "continue")]
        continue_from: Option<String>,
    },

    /// Delete assessments recorded against page id 0
    PurgeBadAssessments,

    /// Delete projects without assessments or subprojects
    PurgeUnusedProjects {
        /// Report what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Serialize)]
struct EventFailure {
    result: &'static str,
    line: usize,
    error: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting wpa-sync v{}", env!("CARGO_PKG_VERSION"));

    let db_path = resolve_database_path(args.database.as_deref(), &config);
    info!("Database path: {}", db_path.display());

    let db = match Database::open(&db_path, &config.database).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e.into());
        }
    };

    let service = SyncService::new(db.clone(), config.sync.clone());
    let result = run(&service, args.command).await;

    db.close().await;
    result
}

async fn run(service: &SyncService, command: Command) -> Result<()> {
    match command {
        Command::Reconcile { file } => reconcile(service, file.as_deref()).await,
        Command::DeletePage { page_id } => {
            let removed = service.driver().handle_page_deleted(page_id).await?;
            print_json(&serde_json::json!({ "page_id": page_id, "removed": removed }))
        }
        Command::Projects => {
            let projects = service.queries().list_all_projects().await?;
            print_json(&projects)
        }
        Command::PageAssessments {
            page_ids,
            limit,
            continue_from,
            subprojects,
        } => {
            let request = AssessmentsRequest {
                page_ids,
                limit,
                continue_from,
                include_subprojects: subprojects,
            };
            let result = service.queries().assessments_for_pages(&request).await?;
            print_json(&result)
        }
        Command::ProjectPages {
            projects,
            assessments,
            limit,
            continue_from,
        } => {
            let request = ProjectPagesRequest {
                projects,
                include_assessments: assessments,
                limit,
                continue_from,
            };
            let result = service.queries().pages_for_projects(&request).await?;
            print_json(&result)
        }
        Command::PurgeBadAssessments => {
            let purged = purge_bad_assessments(service.database()).await?;
            print_json(&serde_json::json!({ "purged": purged }))
        }
        Command::PurgeUnusedProjects { dry_run } => {
            let report = purge_unused_projects(service.database(), dry_run).await?;
            print_json(&report)
        }
    }
}

async fn reconcile(service: &SyncService, file: Option<&Path>) -> Result<()> {
    match file {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            apply_events(service, BufReader::new(file)).await
        }
        None => apply_events(service, BufReader::new(tokio::io::stdin())).await,
    }
}

/// Apply each line's event in order; a failed event does not stop the rest
async fn apply_events<R: AsyncBufRead + Unpin>(service: &SyncService, reader: R) -> Result<()> {
    let driver = service.driver();
    let mut lines = reader.lines();
    let mut line_no = 0usize;
    let mut failed = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let outcome = match serde_json::from_str::<PageEvent>(&line) {
            Ok(event) => driver.handle_event(&event).await.map_err(anyhow::Error::from),
            Err(e) => Err(anyhow::Error::from(e).context("Malformed event")),
        };

        match outcome {
            Ok(outcome) => print_json(&outcome)?,
            Err(e) => {
                error!(line = line_no, "Event failed: {:#}", e);
                failed += 1;
                print_json(&EventFailure {
                    result: "failed",
                    line: line_no,
                    error: format!("{:#}", e),
                })?;
            }
        }
    }

    info!(events = line_no, failed, "Reconcile run finished");
    if failed > 0 {
        bail!("{} event(s) failed", failed);
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
