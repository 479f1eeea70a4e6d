use anyhow::Result;
use clap::Args as ClapArgs;

use crate::commands::common;
use crate::config::Config;

#[derive(ClapArgs)]
pub struct Args {
    /// Worktree path, branch or directory name
    pub worktree: String,

    /// New directory and branch name
    pub new_name: String,
}

pub async fn execute(args: Args, config: Config) -> Result<()> {
    let (engine, state) = common::open_with_state(&config).await?;
    let path = common::resolve_worktree(&state, &args.worktree);
    let renamed = engine.rename(&path, &args.new_name).await?;
    println!("{}", renamed.display());
    Ok(())
}
