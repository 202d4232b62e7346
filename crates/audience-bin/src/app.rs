//! Command implementations.

use crate::host::JsonLinesHost;
use audience_config_and_utils::{Config, Paths};
use audience_database::{AudienceDatabase, DurableQueue};
use audience_engine::{
    AudienceExtension, Event, ExtensionConfig, ExtensionParts, ReqwestTransport,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Run the extension, feeding it one JSON event per stdin line.
pub async fn run(config: Config, paths: Paths, exit_on_eof: bool) -> anyhow::Result<()> {
    let db = AudienceDatabase::open(&paths.database_file())?;
    let queue = db.hit_queue();
    info!(
        database = %paths.database_file().display(),
        pending = queue.len()?,
        "Starting audience extension"
    );

    let extension = AudienceExtension::start(
        ExtensionConfig::from(&config),
        ExtensionParts {
            queue: Arc::new(queue),
            profiles: Arc::new(db.profile_store()),
            transport: Arc::new(ReqwestTransport::new()?),
            host: Arc::new(JsonLinesHost::new(std::io::stdout())),
        },
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Event>(line) {
                        Ok(event) => extension.handle(event).await?,
                        Err(e) => warn!(error = %e, "Skipping unreadable event line"),
                    }
                }
                None => {
                    if exit_on_eof {
                        info!("Input closed");
                        break;
                    }
                    info!("Input closed, draining until Ctrl-C");
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C");
                break;
            }
        }
    }

    extension.shutdown().await;
    Ok(())
}

pub fn queue_status(paths: &Paths) -> anyhow::Result<()> {
    let db = AudienceDatabase::open(&paths.database_file())?;
    let queue = db.hit_queue();

    let pending = queue.len()?;
    println!("Pending hits: {pending}");
    if let Some(oldest) = queue.peek_oldest()? {
        println!("Oldest:       #{} queued {}", oldest.id, oldest.enqueued_at.to_rfc3339());
    }
    Ok(())
}

pub fn queue_purge(paths: &Paths) -> anyhow::Result<()> {
    let db = AudienceDatabase::open(&paths.database_file())?;
    let purged = db.hit_queue().purge()?;
    info!(purged, "Queue purged");
    println!("Purged {purged} pending hit(s)");
    Ok(())
}
