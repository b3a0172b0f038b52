//! Link-run finalization: dedup collected records and export them as CSV.
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::model::{format_timestamp_csv, Item};

/// Fixed export filename, overwritten on every run.
pub const LINKS_CSV: &str = "talkcloud_links_backup.csv";

const NO_TITLE: &str = "no title";
const NO_URL: &str = "#";

/// Keep the first occurrence of every dedup identity, preserving order.
/// Pages arrive newest-first, so first-seen means most recent.
pub fn dedup_by_identity(items: Vec<Item>) -> Vec<Item> {
    let mut seen: HashSet<Option<String>> = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.id.clone()))
        .collect()
}

/// Write the deduplicated records to `{dir}/talkcloud_links_backup.csv`:
/// UTF-8 with a byte-order mark so spreadsheet apps detect the encoding,
/// a fixed `Date,Title,URL` header, whitespace-collapsed fields.
pub fn write_links_csv(dir: &Path, items: &[Item]) -> Result<PathBuf> {
    let path = dir.join(LINKS_CSV);
    let mut file =
        File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
    file.write_all(b"\xef\xbb\xbf")
        .context("failed to write byte-order mark")?;

    let mut writer = csv::Writer::from_writer(file);
    writer
        .write_record(["Date", "Title", "URL"])
        .context("failed to write CSV header")?;

    for item in items {
        let date = format_timestamp_csv(item.created_at);
        let title = collapse_or(item.title.as_deref(), NO_TITLE);
        let url = collapse_or(item.url.as_deref(), NO_URL);
        writer
            .write_record([date, title, url])
            .context("failed to write CSV row")?;
    }
    writer.flush().context("failed to flush CSV")?;

    Ok(path)
}

fn collapse_or(value: Option<&str>, placeholder: &str) -> String {
    match value {
        None => placeholder.to_string(),
        Some(raw) if raw.is_empty() => placeholder.to_string(),
        Some(raw) => raw.split_whitespace().collect::<Vec<_>>().join(" "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn link(id: Option<&str>, title: Option<&str>, url: Option<&str>) -> Item {
        Item {
            drawer_id: "d".to_string(),
            id: id.map(str::to_owned),
            url: url.map(str::to_owned),
            name: None,
            title: title.map(str::to_owned),
            chat_name: None,
            created_at: Some(1700000000000),
        }
    }

    #[test]
    fn dedup_keeps_first_occurrence_in_order() {
        let items = vec![
            link(Some("a"), Some("first a"), None),
            link(Some("b"), Some("first b"), None),
            link(Some("a"), Some("second a"), None),
            link(Some("c"), Some("first c"), None),
            link(Some("b"), Some("second b"), None),
        ];
        let unique = dedup_by_identity(items);
        let titles: Vec<_> = unique.iter().map(|i| i.title.clone().unwrap()).collect();
        assert_eq!(titles, vec!["first a", "first b", "first c"]);
    }

    #[test]
    fn dedup_collapses_identityless_records() {
        // Records without an id share one identity slot; only the first survives.
        let items = vec![
            link(None, Some("one"), None),
            link(None, Some("two"), None),
            link(Some("a"), Some("three"), None),
        ];
        let unique = dedup_by_identity(items);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].title.as_deref(), Some("one"));
    }

    #[test]
    fn csv_has_bom_header_and_placeholders() {
        let td = tempdir().unwrap();
        let items = vec![
            link(Some("a"), Some("  spaced \n title "), Some("https://example.com/x")),
            link(Some("b"), None, None),
        ];
        let path = write_links_csv(td.path(), &items).unwrap();
        assert_eq!(path, td.path().join(LINKS_CSV));

        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[..3], b"\xef\xbb\xbf");

        let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "Date,Title,URL");
        assert!(lines[1].ends_with(",spaced title,https://example.com/x"));
        assert!(lines[2].ends_with(",no title,#"));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn export_overwrites_previous_run() {
        let td = tempdir().unwrap();
        write_links_csv(td.path(), &[link(Some("a"), Some("old"), None)]).unwrap();
        write_links_csv(td.path(), &[link(Some("b"), Some("new"), None)]).unwrap();

        let bytes = fs::read(td.path().join(LINKS_CSV)).unwrap();
        let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
        assert!(text.contains("new"));
        assert!(!text.contains("old"));
    }
}
