//! Core data types shared across the backup pipeline.
use chrono::{Local, LocalResult, TimeZone};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Which drawer vertical a run backs up.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BackupKind {
    Media,
    File,
    Link,
}

impl BackupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupKind::Media => "media",
            BackupKind::File => "file",
            BackupKind::Link => "link",
        }
    }

    /// Media and file pages are only complete once their zip exists; link
    /// pages are complete as soon as their listing log is written.
    pub fn requires_archive(&self) -> bool {
        matches!(self, BackupKind::Media | BackupKind::File)
    }

    /// Build the endpoint/suffix/folder triple for this vertical.
    pub fn target(&self, api_base: &str, fetch_count: u32) -> BackupTarget {
        let base = api_base.trim_end_matches('/');
        let (path, vertical) = match self {
            BackupKind::Media => ("mediaFile/list", "MEDIA"),
            BackupKind::File => ("mediaFile/list", "FILE"),
            BackupKind::Link => ("link/list", "LINK"),
        };
        let list_url = format!(
            "{}/{}?verticalType={}&fetchCount={}&joined=true&direction=DESC",
            base, path, vertical, fetch_count
        );
        let (log_suffix, folder_name) = match self {
            BackupKind::Media => ("_list.json", "Photo_Backup"),
            BackupKind::File => ("_list.json", "File_Backup"),
            BackupKind::Link => ("_link_list.json", "Link_Backup"),
        };
        BackupTarget {
            kind: *self,
            list_url,
            log_suffix,
            folder_name,
        }
    }
}

/// Immutable description of one backup vertical: where to list items, how
/// to name per-page logs, and which subfolder receives the artifacts.
#[derive(Debug, Clone)]
pub struct BackupTarget {
    pub kind: BackupKind,
    pub list_url: String,
    pub log_suffix: &'static str,
    pub folder_name: &'static str,
}

impl BackupTarget {
    /// Listing URL for one page. The cursor is the previous page's last
    /// `drawerId`; absent on the very first request of a fresh run.
    pub fn page_url(&self, cursor: Option<&str>) -> String {
        match cursor {
            Some(offset) => format!("{}&offset={}", self.list_url, offset),
            None => self.list_url.clone(),
        }
    }
}

/// One unit of work from the listing API.
///
/// `drawer_id` is the pagination cursor; `id` is a second identifier used
/// only for link deduplication. Everything else is optional display data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub drawer_id: String,
    #[serde(default, deserialize_with = "opt_id_from_string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub chat_name: Option<String>,
    /// Epoch milliseconds.
    #[serde(default)]
    pub created_at: Option<i64>,
}

/// One fetched listing page: the typed items plus the raw response body,
/// which is persisted verbatim as the page's checkpoint log.
#[derive(Debug, Clone)]
pub struct ListingPage {
    pub raw: Value,
    pub items: Vec<Item>,
}

impl ListingPage {
    /// Parse a listing response. A missing or null `items` key means the
    /// listing is exhausted and yields an empty page; an `items` array
    /// whose entries lack `drawerId` fails the whole page here, at the
    /// parse boundary.
    pub fn from_value(raw: Value) -> Result<Self, serde_json::Error> {
        let items = match raw.get("items") {
            Some(v) if !v.is_null() => serde_json::from_value(v.clone())?,
            _ => Vec::new(),
        };
        Ok(Self { raw, items })
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn last_drawer_id(&self) -> Option<&str> {
        self.items.last().map(|item| item.drawer_id.as_str())
    }
}

/// Filename form of a creation timestamp: `YYYY-MM-DD_HH-MM-SS`.
pub fn format_timestamp_file(ts_millis: Option<i64>) -> String {
    format_timestamp(ts_millis, "%Y-%m-%d_%H-%M-%S")
}

/// CSV form of a creation timestamp: `YYYY-MM-DD HH:MM:SS`.
pub fn format_timestamp_csv(ts_millis: Option<i64>) -> String {
    format_timestamp(ts_millis, "%Y-%m-%d %H:%M:%S")
}

fn format_timestamp(ts_millis: Option<i64>, fmt: &str) -> String {
    let millis = match ts_millis {
        None | Some(0) => return "UnknownDate".to_string(),
        Some(ms) => ms,
    };
    match Local.timestamp_millis_opt(millis) {
        LocalResult::Single(dt) => dt.format(fmt).to_string(),
        _ => "InvalidDate".to_string(),
    }
}

/// The API is loose about identifier types (numeric vs string); accept
/// both and normalize to a string cursor.
fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number identifier, got {}",
            other
        ))),
    }
}

fn opt_id_from_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number identifier, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn target_urls_per_kind() {
        let media = BackupKind::Media.target("https://drawer-api.kakao.com", 100);
        assert_eq!(
            media.list_url,
            "https://drawer-api.kakao.com/mediaFile/list?verticalType=MEDIA&fetchCount=100&joined=true&direction=DESC"
        );
        assert_eq!(media.log_suffix, "_list.json");
        assert_eq!(media.folder_name, "Photo_Backup");

        let link = BackupKind::Link.target("https://drawer-api.kakao.com/", 50);
        assert_eq!(
            link.list_url,
            "https://drawer-api.kakao.com/link/list?verticalType=LINK&fetchCount=50&joined=true&direction=DESC"
        );
        assert_eq!(link.log_suffix, "_link_list.json");
        assert_eq!(link.folder_name, "Link_Backup");
    }

    #[test]
    fn page_url_appends_offset() {
        let target = BackupKind::File.target("http://localhost:1", 100);
        assert_eq!(target.page_url(None), target.list_url);
        assert_eq!(
            target.page_url(Some("abc123")),
            format!("{}&offset=abc123", target.list_url)
        );
    }

    #[test]
    fn listing_page_parses_items() {
        let raw = json!({
            "items": [
                {"drawerId": "d1", "id": "a", "url": "http://x/1.jpg", "createdAt": 1700000000000i64},
                {"drawerId": 42, "name": "doc.pdf"}
            ]
        });
        let page = ListingPage::from_value(raw).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].drawer_id, "d1");
        assert_eq!(page.items[1].drawer_id, "42");
        assert_eq!(page.last_drawer_id(), Some("42"));
    }

    #[test]
    fn listing_page_without_items_is_empty() {
        let page = ListingPage::from_value(json!({})).unwrap();
        assert!(page.is_empty());
        assert_eq!(page.last_drawer_id(), None);

        let page = ListingPage::from_value(json!({"items": null})).unwrap();
        assert!(page.is_empty());
    }

    #[test]
    fn listing_page_rejects_items_without_cursor() {
        let raw = json!({"items": [{"id": "a", "url": "http://x"}]});
        assert!(ListingPage::from_value(raw).is_err());
    }

    #[test]
    fn timestamp_placeholders() {
        assert_eq!(format_timestamp_file(None), "UnknownDate");
        assert_eq!(format_timestamp_file(Some(0)), "UnknownDate");
        assert_eq!(format_timestamp_csv(None), "UnknownDate");
        // A real timestamp renders in the file format without spaces or colons.
        let rendered = format_timestamp_file(Some(1700000000000));
        assert!(!rendered.contains(' ') && !rendered.contains(':'), "{rendered}");
    }
}
