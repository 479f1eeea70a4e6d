//! Parsers for the machine-readable git output the enumerator consumes.
//!
//! None of these formats has a versioned schema, so every parser skips
//! lines it does not recognise instead of failing the whole block.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::models::{WorktreeRecord, DETACHED_BRANCH};

/// Format string for `git for-each-ref`, one line per local branch.
pub const ACTIVITY_FORMAT: &str =
    "--format=%(refname:short)|%(committerdate:relative)|%(committerdate:unix)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub relative: String,
    pub epoch: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub ahead: u32,
    pub behind: u32,
    pub untracked: u32,
    pub modified: u32,
    pub staged: u32,
}

/// Parses `git worktree list --porcelain`. The first block is the primary worktree.
pub fn parse_worktree_list(output: &str) -> Vec<WorktreeRecord> {
    let mut records = Vec::new();
    let mut path: Option<PathBuf> = None;
    let mut branch: Option<String> = None;

    let mut flush = |path: &mut Option<PathBuf>, branch: &mut Option<String>| {
        if let Some(p) = path.take() {
            let is_primary = records.is_empty();
            let name = branch
                .take()
                .unwrap_or_else(|| DETACHED_BRANCH.to_string());
            records.push(WorktreeRecord::new(p, name, is_primary));
        }
        *branch = None;
    };

    for line in output.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            flush(&mut path, &mut branch);
            continue;
        }
        if let Some(p) = line.strip_prefix("worktree ") {
            flush(&mut path, &mut branch);
            path = Some(PathBuf::from(p));
        } else if let Some(r) = line.strip_prefix("branch ") {
            let short = r.strip_prefix("refs/heads/").unwrap_or(r);
            branch = Some(short.to_string());
        }
    }
    flush(&mut path, &mut branch);

    records
}

/// Parses `git for-each-ref` output produced with [`ACTIVITY_FORMAT`].
pub fn parse_activity(output: &str) -> HashMap<String, Activity> {
    output
        .lines()
        .filter_map(|line| {
            // Split from the right: a '|' inside a branch name stays in the name.
            let mut parts = line.rsplitn(3, '|');
            let epoch = parts.next()?.trim().parse::<i64>().ok()?;
            let relative = parts.next()?.trim().to_string();
            let branch = parts.next()?.trim();
            if branch.is_empty() {
                return None;
            }
            Some((branch.to_string(), Activity { relative, epoch }))
        })
        .collect()
}

/// Parses `git status --porcelain=v2 --branch`.
pub fn parse_status_v2(output: &str) -> StatusCounts {
    let mut counts = StatusCounts::default();

    for line in output.lines() {
        if let Some(ab) = line.strip_prefix("# branch.ab ") {
            for token in ab.split_whitespace() {
                if let Some(n) = token.strip_prefix('+') {
                    counts.ahead = n.parse().unwrap_or(0);
                } else if let Some(n) = token.strip_prefix('-') {
                    counts.behind = n.parse().unwrap_or(0);
                }
            }
            continue;
        }

        let mut fields = line.split(' ');
        match fields.next() {
            Some("1") | Some("2") => {
                let xy: Vec<char> = fields.next().unwrap_or("").chars().collect();
                if xy.len() == 2 {
                    if xy[0] != '.' {
                        counts.staged += 1;
                    }
                    if xy[1] != '.' {
                        counts.modified += 1;
                    }
                }
            }
            Some("u") => counts.modified += 1,
            Some("?") => counts.untracked += 1,
            _ => {}
        }
    }

    counts
}

/// Parses `git rev-list --left-right --count <main>...HEAD` into (behind, ahead).
pub fn parse_left_right(output: &str) -> Option<(u32, u32)> {
    let mut parts = output.split_whitespace();
    let behind = parts.next()?.parse().ok()?;
    let ahead = parts.next()?.parse().ok()?;
    Some((behind, ahead))
}

pub fn format_divergence(behind: u32, ahead: u32) -> String {
    format!("Main: ↑{ahead} ↓{behind}")
}

/// One line of `git status --short`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortStatusLine {
    pub code: String,
    pub path: String,
}

pub fn parse_short_status(output: &str) -> Vec<ShortStatusLine> {
    output
        .lines()
        .filter(|l| l.len() >= 3)
        .map(|line| {
            let code = line.get(..2).unwrap_or("").trim();
            let code = match code {
                "??" => "U",
                "" => "?",
                other => other,
            };
            ShortStatusLine {
                code: code.to_string(),
                path: line.get(3..).unwrap_or("").to_string(),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitLine {
    pub sha: String,
    pub subject: String,
}

/// Parses `git log --pretty=format:%h%x09%s`.
pub fn parse_log(output: &str) -> Vec<CommitLine> {
    output
        .lines()
        .filter_map(|line| {
            let (sha, subject) = line.split_once('\t').unwrap_or((line, ""));
            (!sha.is_empty()).then(|| CommitLine {
                sha: sha.to_string(),
                subject: subject.to_string(),
            })
        })
        .collect()
}

/// Format for `git show -s`: sha, author, date and subject on their own
/// lines, then the body.
pub const COMMIT_INFO_FORMAT: &str = "--format=%H%n%an <%ae>%n%ad%n%s%n%b";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: String,
    pub author: String,
    pub date: String,
    pub subject: String,
    pub body: String,
}

/// Parses `git show -s` output produced with [`COMMIT_INFO_FORMAT`].
pub fn parse_commit_info(output: &str) -> Option<CommitInfo> {
    let lines: Vec<&str> = output.lines().collect();
    if lines.len() < 4 || lines[0].trim().is_empty() {
        return None;
    }
    Some(CommitInfo {
        sha: lines[0].trim().to_string(),
        author: lines[1].trim().to_string(),
        date: lines[2].trim().to_string(),
        subject: lines[3].trim().to_string(),
        body: lines[4..].join("\n").trim().to_string(),
    })
}
