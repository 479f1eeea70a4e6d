use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};

use crate::utils::fingerprint;

pub const HOOK_FILE_NAME: &str = ".wt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    /// Runs in a freshly created worktree.
    Init,
    /// Runs in the primary worktree before a worktree is removed.
    Terminate,
}

impl HookKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookKind::Init => "init_commands",
            HookKind::Terminate => "terminate_commands",
        }
    }
}

/// Accepts a single command string, a list of commands, or nothing.
/// Blank entries are dropped.
pub fn deserialize_command_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Commands {
        One(String),
        Many(Vec<String>),
    }

    let commands = match Option::<Commands>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(Commands::One(cmd)) => vec![cmd],
        Some(Commands::Many(cmds)) => cmds,
    };
    Ok(commands
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect())
}

#[derive(Debug, Default, Deserialize)]
struct HookDeclarations {
    #[serde(default, deserialize_with = "deserialize_command_list")]
    init_commands: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_command_list")]
    terminate_commands: Vec<String>,
}

/// A repository-local hook declaration file, parsed from the exact bytes
/// that were fingerprinted so trust always covers what will run.
#[derive(Debug, Clone)]
pub struct HookFile {
    pub path: PathBuf,
    pub fingerprint: String,
    init_commands: Vec<String>,
    terminate_commands: Vec<String>,
}

impl HookFile {
    pub fn path_in(root: &Path) -> PathBuf {
        root.join(HOOK_FILE_NAME)
    }

    /// `Ok(None)` when the file does not exist.
    pub async fn read(path: &Path) -> std::io::Result<Option<Self>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(Self::from_bytes(path, &bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn from_bytes(path: &Path, bytes: &[u8]) -> Self {
        let declarations = if bytes.iter().all(u8::is_ascii_whitespace) {
            HookDeclarations::default()
        } else {
            serde_yaml::from_slice(bytes).unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed hook file {:?}: {}", path, e);
                HookDeclarations::default()
            })
        };
        Self {
            path: path.to_path_buf(),
            fingerprint: fingerprint(bytes),
            init_commands: declarations.init_commands,
            terminate_commands: declarations.terminate_commands,
        }
    }

    pub fn commands(&self, kind: HookKind) -> &[String] {
        match kind {
            HookKind::Init => &self.init_commands,
            HookKind::Terminate => &self.terminate_commands,
        }
    }
}
