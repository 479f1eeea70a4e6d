use anyhow::Result;
use clap::Args as ClapArgs;

use crate::commands::common;
use crate::config::Config;

#[derive(ClapArgs)]
pub struct Args {
    /// Worktree path, branch or directory name
    pub worktree: String,

    /// Skip the external highlighter
    #[arg(long)]
    pub raw: bool,
}

pub async fn execute(args: Args, config: Config) -> Result<()> {
    let (engine, state) = common::open_with_state(&config).await?;
    let path = common::resolve_worktree(&state, &args.worktree);

    let text = if args.raw {
        engine.raw_diff(&path).await
    } else {
        engine.diff(&path).await.text
    };
    if text.is_empty() {
        eprintln!("No changes in {}", path.display());
    } else {
        println!("{}", text);
    }
    Ok(())
}
