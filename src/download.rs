//! Concurrent download pool for one listing page.
//!
//! Items are split into contiguous chunks of `ceil(N / workers)` and each
//! chunk runs on its own task. Workers share exactly two pieces of mutable
//! state: an atomic failure flag and the run's cancellation token, both
//! polled before every download. An in-flight download is never interrupted.
use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::DrawerApi;
use crate::model::{format_timestamp_file, Item};

const DEFAULT_EXTENSION: &str = "jpg";
const NO_CHATROOM: &str = "NoChatroom";

static FORBIDDEN_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[\\/*?:"<>|]"#).expect("valid regex"));

/// Download every item of a page into `workspace`.
///
/// Returns `true` iff no worker ever set the failure flag. A cancelled run
/// stops starting new downloads but still counts as success; the page's
/// archive step decides what to do with whatever was written.
pub async fn download_page(
    client: Arc<dyn DrawerApi>,
    items: &[Item],
    workspace: &Path,
    workers: usize,
    cancel: &CancellationToken,
) -> bool {
    if items.is_empty() {
        return true;
    }

    let failed = Arc::new(AtomicBool::new(false));
    let per_worker = chunk_len(items.len(), workers);

    let mut tasks = Vec::new();
    for chunk in items.chunks(per_worker) {
        let chunk = chunk.to_vec();
        let client = Arc::clone(&client);
        let failed = Arc::clone(&failed);
        let cancel = cancel.clone();
        let workspace = workspace.to_path_buf();
        tasks.push(tokio::spawn(async move {
            download_chunk(client, chunk, workspace, failed, cancel).await;
        }));
    }

    for result in futures::future::join_all(tasks).await {
        if let Err(err) = result {
            warn!(%err, "download worker aborted");
            failed.store(true, Ordering::SeqCst);
        }
    }

    !failed.load(Ordering::SeqCst)
}

/// Contiguous chunk length for `n` items across `workers` workers:
/// `ceil(n / workers)`, so at most `workers` non-empty chunks exist.
pub fn chunk_len(n: usize, workers: usize) -> usize {
    n.div_ceil(workers.max(1)).max(1)
}

async fn download_chunk(
    client: Arc<dyn DrawerApi>,
    items: Vec<Item>,
    workspace: PathBuf,
    failed: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    for item in items {
        if failed.load(Ordering::SeqCst) || cancel.is_cancelled() {
            break;
        }
        match download_item(client.as_ref(), &item, &workspace).await {
            Ok(path) => {
                info!(file = %path.display(), "downloaded");
            }
            Err(err) => {
                warn!(item = item_label(&item), %err, "item download failed");
                failed.store(true, Ordering::SeqCst);
            }
        }
    }
}

async fn download_item(client: &dyn DrawerApi, item: &Item, workspace: &Path) -> Result<PathBuf> {
    let url = item
        .url
        .as_deref()
        .ok_or_else(|| anyhow!("item has no payload URL"))?;
    let bytes = client.fetch_payload(url).await?;

    let filename = destination_name(item);
    let path = pick_free_path(workspace, &filename).await;
    tokio::fs::write(&path, &bytes)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

fn item_label(item: &Item) -> &str {
    item.id.as_deref().unwrap_or(&item.drawer_id)
}

/// Strip characters that are invalid in filenames.
pub fn sanitize_filename(name: &str) -> String {
    FORBIDDEN_CHARS.replace_all(name, "_").trim().to_string()
}

/// Synthesize the destination filename for an item:
/// `{created date}_{chat room}_{base name}.{extension}`.
///
/// The base name comes from the item's display name, or `file_{drawerId}`
/// when absent. The extension is taken from the payload URL's trailing path
/// segment, falling back to the display name's extension, then to `.jpg`.
pub fn destination_name(item: &Item) -> String {
    let date = format_timestamp_file(item.created_at);
    let chat = sanitize_filename(
        item.chat_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(NO_CHATROOM),
    );

    let default_name = format!("file_{}", item.drawer_id);
    let raw_name = item
        .name
        .as_deref()
        .filter(|name| !name.is_empty())
        .unwrap_or(&default_name);
    let (base, name_ext) = split_extension(raw_name);
    let base = sanitize_filename(base);

    let url_ext = item
        .url
        .as_deref()
        .and_then(trailing_segment_extension);
    let ext = url_ext
        .or(name_ext)
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());

    format!("{}_{}_{}.{}", date, chat, base, ext)
}

fn split_extension(name: &str) -> (&str, Option<String>) {
    let path = Path::new(name);
    match (path.file_stem().and_then(|s| s.to_str()), path.extension()) {
        (Some(stem), Some(ext)) => (stem, ext.to_str().map(str::to_owned)),
        _ => (name, None),
    }
}

/// Extension of a URL's last path segment, ignoring query and fragment.
fn trailing_segment_extension(url: &str) -> Option<String> {
    let segment = url.rsplit('/').next()?;
    let segment = segment
        .split(['?', '#'])
        .next()
        .unwrap_or(segment);
    let ext = Path::new(segment).extension()?.to_str()?;
    Some(ext.to_string())
}

/// First free path for `filename` under `dir`, appending `_1`, `_2` before
/// the extension on collisions. Two workers can race this existence check and
/// compute the same free name; names derive from per-item data, so the window
/// only matters for items with identical dates, rooms, and names.
pub async fn pick_free_path(dir: &Path, filename: &str) -> PathBuf {
    let first = dir.join(filename);
    if !tokio::fs::try_exists(&first).await.unwrap_or(false) {
        return first;
    }

    let (base, ext) = split_extension(filename);
    let mut counter = 1u32;
    loop {
        let candidate = match &ext {
            Some(ext) => dir.join(format!("{}_{}.{}", base, counter, ext)),
            None => dir.join(format!("{}_{}", base, counter)),
        };
        if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return candidate;
        }
        counter += 1;
    }
}
