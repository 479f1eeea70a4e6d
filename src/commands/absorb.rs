use anyhow::Result;
use clap::Args as ClapArgs;

use crate::commands::common;
use crate::config::Config;

#[derive(ClapArgs)]
pub struct Args {
    /// Worktree path, branch or directory name
    pub worktree: String,
}

pub async fn execute(args: Args, config: Config) -> Result<()> {
    let (engine, state) = common::open_with_state(&config).await?;
    let path = common::resolve_worktree(&state, &args.worktree);
    engine.absorb(&path).await?;
    println!("Merged and removed {}", path.display());
    Ok(())
}
