use anyhow::Result;
use clap::Args as ClapArgs;

use crate::commands::common;
use crate::config::Config;

#[derive(ClapArgs)]
pub struct Args {
    /// Worktree directory and branch name
    pub name: String,
}

pub async fn execute(args: Args, config: Config) -> Result<()> {
    let (engine, _) = common::open_with_state(&config).await?;
    let path = engine.create(&args.name).await?;
    println!("{}", path.display());
    Ok(())
}
