use std::path::Path;

use futures::stream::{self, StreamExt};

use crate::exec::{CommandRunner, CommandSpec};
use crate::git::GitService;
use crate::utils::truncate_chars;

const TRUNCATION_MARKER: &str = "\n\n# [truncated]";
const UNTRACKED_DISABLED_NOTE: &str = "# Note: Untracked diffs disabled";
const UNTRACKED_DIFF_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOptions {
    /// Per-file diffs generated for untracked files; 0 disables them.
    pub max_untracked: usize,
    /// Character ceiling for the assembled text; 0 disables truncation.
    pub max_chars: usize,
    /// Formatter command (program first); empty disables highlighting.
    pub highlighter: Vec<String>,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            max_untracked: 10,
            max_chars: 200_000,
            highlighter: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiffText {
    pub text: String,
    pub highlighted: bool,
}

/// Assembles the staged, unstaged and untracked changes of one worktree.
pub struct DiffBuilder<'a, R: CommandRunner> {
    git: &'a GitService<R>,
    options: &'a DiffOptions,
}

impl<'a, R: CommandRunner> DiffBuilder<'a, R> {
    pub fn new(git: &'a GitService<R>, options: &'a DiffOptions) -> Self {
        Self { git, options }
    }

    pub async fn build(&self, worktree: &Path) -> DiffText {
        let raw = self.assemble(worktree).await;
        if raw.is_empty() {
            return DiffText::default();
        }
        self.highlight(raw).await
    }

    /// Plain assembled text, sections in fixed order, truncated to the ceiling.
    pub async fn assemble(&self, worktree: &Path) -> String {
        let (staged, unstaged, untracked) = tokio::join!(
            self.run_raw(CommandSpec::git(["diff", "--cached", "--patch", "--no-color"]), worktree),
            self.run_raw(CommandSpec::git(["diff", "--patch", "--no-color"]), worktree),
            self.git.run(
                CommandSpec::git(["ls-files", "--others", "--exclude-standard"]).cwd(worktree)
            ),
        );

        let files: Vec<String> = untracked
            .text()
            .unwrap_or_default()
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        let untracked_parts = self.untracked_parts(worktree, files).await;

        let mut sections = Vec::new();
        if !staged.trim().is_empty() {
            sections.push(format!("# Staged\n{}", staged.trim_matches('\n')));
        }
        if !unstaged.trim().is_empty() {
            sections.push(format!("# Unstaged\n{}", unstaged.trim_matches('\n')));
        }
        if !untracked_parts.is_empty() {
            let body: Vec<&str> = untracked_parts.iter().map(|p| p.trim_matches('\n')).collect();
            sections.push(format!("# Untracked\n{}", body.join("\n\n")));
        }

        let text = sections.join("\n\n");
        self.clip(text.trim_matches('\n'))
    }

    /// Patch introduced by commit `sha`, truncated and highlighted like the
    /// worktree diff.
    pub async fn commit_patch(&self, worktree: &Path, sha: &str) -> DiffText {
        let raw = self
            .run_raw(
                CommandSpec::git(["show", "--patch", "--no-color", "--pretty=format:", sha]),
                worktree,
            )
            .await;
        let text = raw.trim_matches('\n');
        if text.is_empty() {
            return DiffText::default();
        }
        self.highlight(self.clip(text)).await
    }

    fn clip(&self, text: &str) -> String {
        if self.options.max_chars > 0 {
            truncate_chars(text, self.options.max_chars, TRUNCATION_MARKER)
        } else {
            text.to_string()
        }
    }

    async fn untracked_parts(&self, worktree: &Path, files: Vec<String>) -> Vec<String> {
        let max = self.options.max_untracked;
        let total = files.len();
        if total == 0 {
            return Vec::new();
        }
        if max == 0 {
            return vec![UNTRACKED_DISABLED_NOTE.to_string()];
        }

        let mut parts = Vec::new();
        if total > max {
            parts.push(format!(
                "# Note: Showing first {max} untracked files (total: {total})"
            ));
        }

        let patches: Vec<String> = stream::iter(files.into_iter().take(max))
            .map(|file| {
                let spec = CommandSpec::git(["diff", "--no-index", "--no-color", "--", "/dev/null"])
                    .args([file])
                    .accept(&[0, 1]);
                self.run_raw(spec, worktree)
            })
            .buffered(UNTRACKED_DIFF_CONCURRENCY)
            .collect()
            .await;
        parts.extend(patches.into_iter().filter(|p| !p.is_empty()));
        parts
    }

    async fn run_raw(&self, spec: CommandSpec, worktree: &Path) -> String {
        self.git.run(spec.cwd(worktree).raw()).await.into_text()
    }

    /// Pipes `text` through the configured formatter; any failure falls back
    /// to the raw text.
    pub async fn highlight(&self, text: String) -> DiffText {
        let Some((program, args)) = self.options.highlighter.split_first() else {
            return DiffText {
                text,
                highlighted: false,
            };
        };
        let spec = CommandSpec::new(program.as_str())
            .args(args.iter().cloned())
            .stdin(text.as_str())
            .raw();
        let out = self.git.runner().run(&spec).await;
        match out.text() {
            Some(formatted) if !formatted.is_empty() => DiffText {
                text: formatted.to_string(),
                highlighted: true,
            },
            _ => {
                tracing::debug!("diff highlighter unavailable: {}", out.failure_reason());
                DiffText {
                    text,
                    highlighted: false,
                }
            }
        }
    }
}
