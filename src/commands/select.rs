use anyhow::{bail, Result};
use clap::Args as ClapArgs;

use crate::commands::common;
use crate::config::Config;
use crate::models::find_record;

#[derive(ClapArgs)]
pub struct Args {
    /// Worktree path, branch or directory name
    pub worktree: String,
}

/// Prints the selected path so shells can `cd "$(wtdeck select x)"`.
pub async fn execute(args: Args, config: Config) -> Result<()> {
    let (engine, state) = common::open_with_state(&config).await?;
    let path = common::resolve_worktree(&state, &args.worktree);
    if find_record(&state.records, &path).is_none() {
        bail!("No worktree matches {}", args.worktree);
    }
    engine.remember_selection(&path).await?;
    println!("{}", path.display());
    Ok(())
}
