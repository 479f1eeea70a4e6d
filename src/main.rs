use anyhow::Result;
use clap::Parser;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

mod cache;
mod cli;
mod commands;
mod config;
mod engine;
mod exec;
mod git;
mod models;
mod review;
mod trust;
mod utils;

use cli::{Cli, Commands};
use config::Config;

fn init_logging(debug_log: Option<&Path>) -> Option<WorkerGuard> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")));

    let (file_layer, guard) = match debug_log.map(open_log_file) {
        Some(Ok(file)) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(LevelFilter::DEBUG);
            (Some(layer), Some(guard))
        }
        Some(Err(e)) => {
            eprintln!("Failed to open debug log: {}", e);
            (None, None)
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    guard
}

fn open_log_file(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::OpenOptions::new().create(true).append(true).open(path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config)?
        .with_worktree_dir(cli.worktree_dir)
        .with_debug_log(cli.debug_log);
    let _log_guard = init_logging(config.debug_log.as_deref());

    match cli.command {
        Commands::List(args) => commands::list::execute(args, config).await,
        Commands::Create(args) => commands::create::execute(args, config).await,
        Commands::Rename(args) => commands::rename::execute(args, config).await,
        Commands::Delete(args) => commands::delete::execute(args, config).await,
        Commands::Absorb(args) => commands::absorb::execute(args, config).await,
        Commands::Diff(args) => commands::diff::execute(args, config).await,
        Commands::Show(args) => commands::show::execute(args, config).await,
        Commands::Fetch => commands::fetch::execute(config).await,
        Commands::Select(args) => commands::select::execute(args, config).await,
    }
}
