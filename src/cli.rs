use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{absorb, create, delete, diff, fetch, list, rename, select, show};

#[derive(Parser)]
#[command(name = "wtdeck")]
#[command(about = "wtdeck - Inspect and manage the worktrees of a git repository")]
#[command(version)]
pub struct Cli {
    /// Custom config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Root directory for new worktrees and per-repository state
    #[arg(long, global = true)]
    pub worktree_dir: Option<String>,

    /// Write debug logs to this file
    #[arg(long, global = true)]
    pub debug_log: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List worktrees with their status
    List(list::Args),

    /// Create a worktree (and its branch if needed)
    Create(create::Args),

    /// Rename a worktree and its branch
    Rename(rename::Args),

    /// Delete a worktree and its branch
    Delete(delete::Args),

    /// Merge a worktree's branch into main, then delete it
    Absorb(absorb::Args),

    /// Show the combined diff of a worktree
    Diff(diff::Args),

    /// Show status, recent commits and divergence of a worktree, or one commit
    Show(show::Args),

    /// Fetch all remotes and refresh
    Fetch,

    /// Remember a worktree as selected and print its path
    Select(select::Args),
}
