use anyhow::Result;
use clap::{Args as ClapArgs, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;

use crate::commands::common;
use crate::config::Config;
use crate::engine::{ReviewStatus, WorktreeState};
use crate::models::{sort_records, ReviewRecord, SortOrder, WorktreeRecord};

#[derive(Clone, Copy, ValueEnum)]
pub enum SortKey {
    /// Most recently active first
    Active,
    Path,
}

#[derive(ClapArgs)]
pub struct Args {
    /// Only show worktrees whose path or branch contains this text
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Sort order (defaults to the sort_by_active setting)
    #[arg(short, long, value_enum)]
    pub sort: Option<SortKey>,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// Skip the review-request lookup
    #[arg(long)]
    pub no_reviews: bool,
}

#[derive(Serialize)]
struct ListEntry<'a> {
    path: &'a PathBuf,
    branch: &'a str,
    is_primary: bool,
    dirty: bool,
    status_known: bool,
    ahead: u32,
    behind: u32,
    untracked: u32,
    modified: u32,
    staged: u32,
    last_active: &'a str,
    review: Option<&'a ReviewRecord>,
}

impl<'a> From<&'a WorktreeRecord> for ListEntry<'a> {
    fn from(r: &'a WorktreeRecord) -> Self {
        Self {
            path: &r.path,
            branch: &r.branch,
            is_primary: r.is_primary,
            dirty: r.dirty(),
            status_known: r.status_known,
            ahead: r.ahead,
            behind: r.behind,
            untracked: r.untracked,
            modified: r.modified,
            staged: r.staged,
            last_active: &r.last_active,
            review: r.review.as_ref(),
        }
    }
}

#[derive(Serialize)]
struct ListOutput<'a> {
    worktrees: Vec<ListEntry<'a>>,
    reviews: &'a ReviewStatus,
}

pub async fn execute(args: Args, mut config: Config) -> Result<()> {
    if args.no_reviews {
        config.auto_fetch_reviews = false;
    }
    let order = match args.sort {
        Some(SortKey::Active) => SortOrder::LastActive,
        Some(SortKey::Path) => SortOrder::Path,
        None if config.sort_by_active => SortOrder::LastActive,
        None => SortOrder::Path,
    };

    let (_engine, state) = common::open_with_state(&config).await?;
    let records = visible_records(&state, args.filter.as_deref().unwrap_or(""), order);

    if args.json {
        let output = ListOutput {
            worktrees: records.iter().map(ListEntry::from).collect(),
            reviews: &state.reviews,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for record in &records {
        println!("{}", format_row(record));
    }
    if let ReviewStatus::Failed { reason } = &state.reviews {
        eprintln!("Review fetch failed: {}", reason);
    }
    Ok(())
}

fn visible_records(state: &WorktreeState, filter: &str, order: SortOrder) -> Vec<WorktreeRecord> {
    let mut records: Vec<WorktreeRecord> = state
        .records
        .iter()
        .filter(|r| r.matches_filter(filter))
        .cloned()
        .collect();
    sort_records(&mut records, order);
    records
}

fn status_summary(record: &WorktreeRecord) -> String {
    if !record.status_known {
        return "?".to_string();
    }
    if !record.dirty() {
        return "clean".to_string();
    }
    let mut parts = Vec::new();
    if record.staged > 0 {
        parts.push(format!("+{}", record.staged));
    }
    if record.modified > 0 {
        parts.push(format!("~{}", record.modified));
    }
    if record.untracked > 0 {
        parts.push(format!("?{}", record.untracked));
    }
    parts.join(" ")
}

fn format_row(record: &WorktreeRecord) -> String {
    let marker = if record.is_primary { "*" } else { " " };
    let sync = match (record.ahead, record.behind) {
        (0, 0) => String::new(),
        (a, b) => format!("↑{} ↓{}", a, b),
    };
    let review = record
        .review
        .as_ref()
        .map(|r| format!("#{} {}", r.id, r.state.as_str()))
        .unwrap_or_default();
    format!(
        "{} {:<40} {:<24} {:<12} {:<10} {:<16} {}",
        marker,
        record.path.display(),
        record.branch,
        status_summary(record),
        sync,
        record.last_active,
        review
    )
    .trim_end()
    .to_string()
}
