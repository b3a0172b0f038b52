//! The page-by-page crawl loop.
//!
//! One crawl task drives sequential listing fetches; each media/file page
//! fans out to the download pool and is archived before the next page is
//! requested. The cursor for page N+1 is the last `drawerId` of page N,
//! and it only ever advances past a page whose log (and, for media/file,
//! archive) is durably on disk, so after a crash the resume cursor always
//! points at a real, previously-seen page boundary.
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::archive::archive_workspace;
use crate::checkpoint::resolve_resume_cursor;
use crate::client::DrawerApi;
use crate::download::download_page;
use crate::model::{BackupTarget, Item, ListingPage};

/// Why a run left the crawl loop. Every variant is logged exactly once at
/// the point it occurs; none of them is a panic or an escaped error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The listing returned no items: the crawl is complete.
    NoMoreItems,
    /// External cancellation observed before starting a new page.
    Cancelled,
    /// A listing fetch failed or returned a malformed response.
    ListingFailed,
    /// The download pool reported a failure; the workspace is kept on disk.
    DownloadFailed,
    /// Archiving the completed page failed; the workspace is kept on disk.
    ArchiveFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Pages fully completed (archived, or accumulated for links).
    pub pages: u32,
    /// Items across completed pages.
    pub items: usize,
    pub stop: StopReason,
}

/// Back up the media or file vertical: fetch pages, download payloads into
/// a per-page workspace, archive each completed page.
///
/// Returns `Err` only for filesystem faults that make continuing unsafe
/// (log write, workspace creation); everything else becomes a `StopReason`.
pub async fn run_media_backup(
    client: Arc<dyn DrawerApi>,
    target: &BackupTarget,
    dest_dir: &Path,
    workers: usize,
    page_delay: Duration,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    let mut cursor = resolve_resume_cursor(dest_dir, target.log_suffix, true);
    if cursor.is_none() {
        info!(kind = target.kind.as_str(), "starting a fresh backup");
    }

    let mut pages = 0u32;
    let mut items = 0usize;
    let stop = loop {
        if cancel.is_cancelled() {
            info!("stop requested, halting before the next page");
            break StopReason::Cancelled;
        }

        info!(page = pages + 1, "fetching listing page");
        let page = match fetch_page(client.as_ref(), target, cursor.as_deref()).await {
            Ok(page) => page,
            Err(reason) => break reason,
        };

        let timestamp = Utc::now().timestamp();
        let workspace = dest_dir.join(timestamp.to_string());
        tokio::fs::create_dir(&workspace)
            .await
            .with_context(|| format!("failed to create workspace {}", workspace.display()))?;
        write_page_log(dest_dir, timestamp, target.log_suffix, &page).await?;

        if !download_page(Arc::clone(&client), &page.items, &workspace, workers, cancel).await {
            error!(
                workspace = %workspace.display(),
                "downloads failed; workspace kept for manual inspection"
            );
            break StopReason::DownloadFailed;
        }

        let blocking_workspace = workspace.clone();
        match tokio::task::spawn_blocking(move || archive_workspace(&blocking_workspace)).await {
            Ok(Ok(archive_path)) => {
                info!(archive = %archive_path.display(), "page archived");
            }
            Ok(Err(err)) => {
                error!(%err, workspace = %workspace.display(), "archiving failed; workspace kept");
                break StopReason::ArchiveFailed;
            }
            Err(err) => {
                error!(%err, workspace = %workspace.display(), "archive task aborted; workspace kept");
                break StopReason::ArchiveFailed;
            }
        }

        cursor = page.last_drawer_id().map(str::to_owned);
        pages += 1;
        items += page.items.len();
        tokio::time::sleep(page_delay).await;
    };

    Ok(RunSummary { pages, items, stop })
}

/// Collect the link vertical across all pages. Each page's raw response is
/// still logged before accumulation so an interrupted collection resumes
/// from its last logged page; duplicates from re-fetched pages are removed
/// by the exporter afterwards.
pub async fn run_link_backup(
    client: Arc<dyn DrawerApi>,
    target: &BackupTarget,
    dest_dir: &Path,
    page_delay: Duration,
    cancel: &CancellationToken,
) -> Result<(RunSummary, Vec<Item>)> {
    let mut cursor = resolve_resume_cursor(dest_dir, target.log_suffix, false);
    if cursor.is_none() {
        info!(kind = target.kind.as_str(), "starting a fresh link backup");
    }

    let mut collected: Vec<Item> = Vec::new();
    let mut pages = 0u32;
    let stop = loop {
        if cancel.is_cancelled() {
            info!("stop requested, halting before the next page");
            break StopReason::Cancelled;
        }

        info!(page = pages + 1, "collecting link page");
        let page = match fetch_page(client.as_ref(), target, cursor.as_deref()).await {
            Ok(page) => page,
            Err(reason) => break reason,
        };

        // A log write failure only costs resumability here, not data: the
        // collected items are still exported at the end of the run.
        let timestamp = Utc::now().timestamp();
        if let Err(err) = write_page_log(dest_dir, timestamp, target.log_suffix, &page).await {
            warn!(%err, "failed to write link listing log");
        }

        cursor = page.last_drawer_id().map(str::to_owned);
        collected.extend(page.items);
        pages += 1;
        info!(collected = collected.len(), "links collected so far");
        tokio::time::sleep(page_delay).await;
    };

    let items = collected.len();
    Ok((RunSummary { pages, items, stop }, collected))
}

/// Fetch and parse one listing page, mapping every halt condition to its
/// `StopReason`. An empty page means the listing is exhausted.
async fn fetch_page(
    client: &dyn DrawerApi,
    target: &BackupTarget,
    cursor: Option<&str>,
) -> std::result::Result<ListingPage, StopReason> {
    let url = target.page_url(cursor);
    let page = match client.fetch_listing(&url).await {
        Ok(page) => page,
        Err(err) => {
            error!(%err, "listing request failed, halting");
            return Err(StopReason::ListingFailed);
        }
    };
    if page.is_empty() {
        info!("no more items to back up");
        return Err(StopReason::NoMoreItems);
    }
    Ok(page)
}

/// Persist the raw listing response as `{dir}/{timestamp}{suffix}`: the
/// page's checkpoint, written before any of its items are processed.
async fn write_page_log(
    dest_dir: &Path,
    timestamp: i64,
    log_suffix: &str,
    page: &ListingPage,
) -> Result<PathBuf> {
    let path = dest_dir.join(format!("{}{}", timestamp, log_suffix));
    let body = serde_json::to_string(&page.raw).context("failed to serialize listing log")?;
    tokio::fs::write(&path, body)
        .await
        .with_context(|| format!("failed to write listing log {}", path.display()))?;
    Ok(path)
}
