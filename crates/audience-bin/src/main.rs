//! audience-segments: run the audience extension over stdin/stdout, or
//! inspect its persisted hit queue.

mod app;
mod host;

use std::path::PathBuf;

use audience_config_and_utils::{init_logging, Config, Paths};
use clap::{Parser, Subcommand};

/// Audience segmentation command-line interface.
#[derive(Parser)]
#[command(name = "audience-segments")]
#[command(about = "Privacy-gated audience segmentation hit queue")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long, env = "AUDIENCE_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Base directory for runtime files (database, logs, config). Defaults to ~/.audience
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read JSONL events from stdin and write responses and shared state to stdout
    Run {
        /// Stop once stdin closes instead of draining until Ctrl-C
        #[arg(long)]
        exit_on_eof: bool,
    },
    /// Inspect or clear the persisted hit queue
    Queue {
        #[command(subcommand)]
        command: QueueCommand,
    },
}

#[derive(Subcommand)]
enum QueueCommand {
    /// Show pending hits
    Status,
    /// Drop every pending hit
    Purge,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;
    let config = Config::load(&paths)?;

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    init_logging(level, Some(&paths));

    match cli.command {
        Some(Commands::Run { exit_on_eof }) => app::run(config, paths, exit_on_eof).await?,
        None => app::run(config, paths, false).await?,
        Some(Commands::Queue { command }) => match command {
            QueueCommand::Status => app::queue_status(&paths)?,
            QueueCommand::Purge => app::queue_purge(&paths)?,
        },
    }

    Ok(())
}
