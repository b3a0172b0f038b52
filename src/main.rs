use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use talkdrawer_backup::client::{DrawerApi, DrawerClient};
use talkdrawer_backup::model::BackupKind;
use talkdrawer_backup::{config, cookies, crawler, export};

#[derive(Debug, Parser)]
#[command(author, version, about = "Resumable backup of the talk drawer: media, files and links")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Back up photos and videos, one zip archive per listing page
    Media,
    /// Back up shared files, one zip archive per listing page
    File,
    /// Collect shared links and export a deduplicated CSV
    Link,
}

impl Command {
    fn kind(&self) -> BackupKind {
        match self {
            Command::Media => BackupKind::Media,
            Command::File => BackupKind::File,
            Command::Link => BackupKind::Link,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let cookie_map = cookies::load_cookies(Path::new(&cfg.app.cookie_dir))?;
    info!(cookies = cookie_map.len(), "cookies loaded");

    let kind = args.command.kind();
    let target = kind.target(&cfg.api.base_url, cfg.api.fetch_count);
    let dest_dir = Path::new(&cfg.app.backup_dir).join(target.folder_name);
    std::fs::create_dir_all(&dest_dir)
        .with_context(|| format!("failed to create backup folder {}", dest_dir.display()))?;

    let client: Arc<dyn DrawerApi> = Arc::new(DrawerClient::new(&cookie_map));
    let page_delay = Duration::from_millis(cfg.app.page_delay_ms);

    // Ctrl-C requests a cooperative stop: the current page finishes, the
    // next one never starts.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("stop requested; finishing the current page before halting");
                cancel.cancel();
            }
        });
    }

    info!(kind = kind.as_str(), dest = %dest_dir.display(), "starting backup");
    match kind {
        BackupKind::Media | BackupKind::File => {
            match crawler::run_media_backup(
                client,
                &target,
                &dest_dir,
                cfg.app.workers,
                page_delay,
                &cancel,
            )
            .await
            {
                Ok(summary) => info!(
                    pages = summary.pages,
                    items = summary.items,
                    stop = ?summary.stop,
                    "backup finished"
                ),
                Err(err) => error!(?err, "backup aborted"),
            }
        }
        BackupKind::Link => {
            match crawler::run_link_backup(client, &target, &dest_dir, page_delay, &cancel).await {
                Ok((summary, collected)) => {
                    info!(
                        pages = summary.pages,
                        collected = collected.len(),
                        stop = ?summary.stop,
                        "link collection finished"
                    );
                    if collected.is_empty() {
                        info!("no links collected");
                    } else {
                        let total = collected.len();
                        let unique = export::dedup_by_identity(collected);
                        info!(total, unique = unique.len(), "removed duplicate links");
                        match export::write_links_csv(&dest_dir, &unique) {
                            Ok(path) => info!(path = %path.display(), "links exported"),
                            // The export is the run's terminal outcome; a
                            // write failure is reported, not propagated.
                            Err(err) => error!(?err, "failed to write links CSV"),
                        }
                    }
                }
                Err(err) => error!(?err, "backup aborted"),
            }
        }
    }

    Ok(())
}
