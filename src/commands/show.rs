use anyhow::{Context, Result};
use clap::Args as ClapArgs;

use crate::commands::common;
use crate::config::Config;
use crate::engine::{CommitDetail, DiffText, WorktreeDetail};
use crate::models::find_record;

#[derive(ClapArgs)]
pub struct Args {
    /// Worktree path, branch or directory name
    pub worktree: String,

    /// Show this commit instead of the worktree status
    #[arg(long, value_name = "SHA")]
    pub commit: Option<String>,
}

pub async fn execute(args: Args, config: Config) -> Result<()> {
    let (engine, state) = common::open_with_state(&config).await?;
    let path = common::resolve_worktree(&state, &args.worktree);

    if let Some(sha) = &args.commit {
        let commit = engine
            .commit_detail(&path, sha)
            .await
            .with_context(|| format!("No commit {} in {}", sha, args.worktree))?;
        print!("{}", render_commit(&commit));
        return Ok(());
    }

    let detail = engine
        .detail(&path)
        .await
        .with_context(|| format!("No worktree matches {}", args.worktree))?;

    if let Some(record) = find_record(&state.records, &path) {
        println!("Worktree: {}", record.path.display());
        println!("Branch:   {}", record.branch);
        if let Some(review) = &record.review {
            println!("Review:   #{} {} {}", review.id, review.state.as_str(), review.title);
        }
    }
    print!("{}", render_detail(&detail));
    Ok(())
}

fn render_detail(detail: &WorktreeDetail) -> String {
    let mut out = String::new();
    if !detail.divergence.is_empty() {
        out.push_str(&format!("{}\n", detail.divergence));
    }

    out.push_str("\nStatus:\n");
    if detail.status.is_empty() {
        out.push_str("  clean\n");
    }
    for line in &detail.status {
        out.push_str(&format!("  {:<2} {}\n", line.code, line.path));
    }

    out.push_str("\nRecent commits:\n");
    for commit in &detail.commits {
        out.push_str(&format!("  {} {}\n", commit.sha, commit.subject));
    }

    if !detail.diff.text.is_empty() {
        out.push('\n');
        push_diff(&mut out, &detail.diff);
    }
    out
}

fn push_diff(out: &mut String, diff: &DiffText) {
    out.push_str(&diff.text);
    if !diff.text.ends_with('\n') {
        out.push('\n');
    }
}

fn render_commit(commit: &CommitDetail) -> String {
    let mut out = String::new();
    if let Some(info) = &commit.info {
        out.push_str(&format!("Commit:  {}\n", info.sha));
        out.push_str(&format!("Author:  {}\n", info.author));
        out.push_str(&format!("Date:    {}\n", info.date));
        out.push_str(&format!("Subject: {}\n", info.subject));
        if !info.body.is_empty() {
            out.push_str(&format!("\n{}\n", info.body));
        }
    }
    out.push('\n');
    if commit.diff.text.is_empty() {
        out.push_str("No diff\n");
    } else {
        push_diff(&mut out, &commit.diff);
    }
    out
}
