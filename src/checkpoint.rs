//! Resume-point discovery from previously written listing logs.
//!
//! A page is fully archived when `{timestamp}{log_suffix}` and (for the
//! media/file verticals) `{timestamp}_photo.zip` both exist. The resume
//! cursor is the last item's `drawerId` from the newest such log; at worst
//! a crashed run re-downloads the one page it never finished archiving.
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::archive::ARCHIVE_SUFFIX;
use crate::model::ListingPage;

/// Scan `dir` for `*{log_suffix}` files and return the resume cursor, or
/// `None` when no usable checkpoint exists. Malformed files are skipped
/// with a warning, never fatal.
pub fn resolve_resume_cursor(
    dir: &Path,
    log_suffix: &str,
    require_archive: bool,
) -> Option<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = %dir.display(), %err, "cannot scan backup directory for logs");
            return None;
        }
    };

    let mut candidates: Vec<(u64, PathBuf)> = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(prefix) = name.strip_suffix(log_suffix) else {
            continue;
        };
        let Ok(timestamp) = prefix.parse::<u64>() else {
            warn!(file = name, "skipping log with non-numeric timestamp prefix");
            continue;
        };
        if require_archive {
            let archive = dir.join(format!("{}{}", prefix, ARCHIVE_SUFFIX));
            if !archive.exists() {
                warn!(file = name, "skipping log without matching archive");
                continue;
            }
        }
        candidates.push((timestamp, entry.path()));
    }

    if candidates.is_empty() {
        info!("no previous backup logs found");
        return None;
    }

    // Newest fully-archived page wins; fall back to older ones on parse
    // failures or empty item lists.
    candidates.sort_by(|a, b| b.0.cmp(&a.0));
    for (timestamp, path) in candidates {
        match read_last_drawer_id(&path) {
            Ok(Some(cursor)) => {
                info!(timestamp, cursor = %cursor, "resuming from last archived page");
                return Some(cursor);
            }
            Ok(None) => {
                warn!(file = %path.display(), "skipping log with no items");
            }
            Err(err) => {
                warn!(file = %path.display(), %err, "skipping unreadable log");
            }
        }
    }

    info!("no usable resume cursor in previous logs");
    None
}

fn read_last_drawer_id(path: &Path) -> anyhow::Result<Option<String>> {
    let content = fs::read_to_string(path)?;
    let raw = serde_json::from_str(&content)?;
    let page = ListingPage::from_value(raw)?;
    Ok(page.last_drawer_id().map(str::to_owned))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    const SUFFIX: &str = "_list.json";

    fn write_log(dir: &Path, timestamp: u64, drawer_ids: &[&str]) {
        let items: Vec<_> = drawer_ids.iter().map(|id| json!({"drawerId": id})).collect();
        let body = json!({ "items": items });
        fs::write(
            dir.join(format!("{}{}", timestamp, SUFFIX)),
            serde_json::to_string(&body).unwrap(),
        )
        .unwrap();
    }

    fn write_archive(dir: &Path, timestamp: u64) {
        fs::write(dir.join(format!("{}_photo.zip", timestamp)), b"zip").unwrap();
    }

    #[test]
    fn empty_dir_has_no_checkpoint() {
        let td = tempdir().unwrap();
        assert_eq!(resolve_resume_cursor(td.path(), SUFFIX, true), None);
    }

    #[test]
    fn newest_archived_log_wins() {
        let td = tempdir().unwrap();
        write_log(td.path(), 1700000100, &["a1", "a2"]);
        write_archive(td.path(), 1700000100);
        write_log(td.path(), 1700000200, &["b1", "b2"]);
        write_archive(td.path(), 1700000200);

        let cursor = resolve_resume_cursor(td.path(), SUFFIX, true);
        assert_eq!(cursor.as_deref(), Some("b2"));
    }

    #[test]
    fn logs_without_archive_are_skipped_when_required() {
        let td = tempdir().unwrap();
        write_log(td.path(), 1700000100, &["a1", "a2"]);
        write_archive(td.path(), 1700000100);
        // Newer log, but the run died before its zip was written.
        write_log(td.path(), 1700000200, &["b1", "b2"]);

        let cursor = resolve_resume_cursor(td.path(), SUFFIX, true);
        assert_eq!(cursor.as_deref(), Some("a2"));

        // The link vertical has no archives and trusts the log alone.
        let cursor = resolve_resume_cursor(td.path(), SUFFIX, false);
        assert_eq!(cursor.as_deref(), Some("b2"));
    }

    #[test]
    fn malformed_logs_fall_back_to_older_candidates() {
        let td = tempdir().unwrap();
        write_log(td.path(), 1700000100, &["a1"]);
        write_archive(td.path(), 1700000100);
        fs::write(td.path().join(format!("1700000200{}", SUFFIX)), "not json").unwrap();
        write_archive(td.path(), 1700000200);

        let cursor = resolve_resume_cursor(td.path(), SUFFIX, true);
        assert_eq!(cursor.as_deref(), Some("a1"));
    }

    #[test]
    fn empty_item_lists_are_skipped() {
        let td = tempdir().unwrap();
        write_log(td.path(), 1700000100, &["a1"]);
        write_archive(td.path(), 1700000100);
        write_log(td.path(), 1700000200, &[]);
        write_archive(td.path(), 1700000200);

        let cursor = resolve_resume_cursor(td.path(), SUFFIX, true);
        assert_eq!(cursor.as_deref(), Some("a1"));
    }

    #[test]
    fn non_numeric_prefixes_are_ignored() {
        let td = tempdir().unwrap();
        fs::write(
            td.path().join(format!("latest{}", SUFFIX)),
            serde_json::to_string(&json!({"items": [{"drawerId": "x"}]})).unwrap(),
        )
        .unwrap();
        assert_eq!(resolve_resume_cursor(td.path(), SUFFIX, false), None);
    }

    #[test]
    fn resolution_is_idempotent() {
        let td = tempdir().unwrap();
        write_log(td.path(), 1700000100, &["a1", "a2"]);
        write_archive(td.path(), 1700000100);

        let first = resolve_resume_cursor(td.path(), SUFFIX, true);
        let second = resolve_resume_cursor(td.path(), SUFFIX, true);
        assert_eq!(first, second);
        assert_eq!(first.as_deref(), Some("a2"));
    }
}
