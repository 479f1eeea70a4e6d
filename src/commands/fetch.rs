use anyhow::Result;

use crate::commands::common;
use crate::config::Config;
use crate::engine::{RefreshOutcome, ReviewStatus};

pub async fn execute(config: Config) -> Result<()> {
    let engine = common::open_engine(&config).await;
    match engine.fetch().await? {
        RefreshOutcome::Published(state) => {
            let dirty = state.records.iter().filter(|r| r.dirty()).count();
            println!("{} worktrees ({} dirty)", state.records.len(), dirty);
            if let ReviewStatus::Failed { reason } = &state.reviews {
                eprintln!("Review fetch failed: {}", reason);
            }
        }
        RefreshOutcome::Superseded => {}
        RefreshOutcome::Unavailable => {
            anyhow::bail!("Could not list worktrees; is this a git repository?")
        }
    }
    Ok(())
}
