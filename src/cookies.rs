//! Credential store: parses a tab-separated cookie export into the
//! name/value map attached to every drawer request.
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Primary cookie export filename, with the legacy name as fallback.
pub const COOKIE_FILE: &str = "talkcloud.kakao.com_cookies.txt";
pub const LEGACY_COOKIE_FILE: &str = "drive.kakao.com_cookies.txt";

#[derive(Debug, Error)]
pub enum CookieError {
    #[error("cookie file not found: neither {0} nor {1} exists")]
    NotFound(PathBuf, PathBuf),
    #[error("no valid kakao cookies found in {0}")]
    Empty(PathBuf),
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Only cookies scoped to these domains are attached to requests.
fn is_kakao_domain(line: &str) -> bool {
    line.starts_with("talkcloud.kakao.com")
        || line.starts_with(".kakao.com")
        || line.starts_with("drawer-api.kakao.com")
}

/// Load the cookie map from `cookie_dir`.
///
/// Both the missing-file and the empty-map cases are hard failures: every
/// drawer request is authenticated solely by these cookies, so there is
/// nothing useful a run could do without them.
pub fn load_cookies(cookie_dir: &Path) -> Result<HashMap<String, String>, CookieError> {
    let primary = cookie_dir.join(COOKIE_FILE);
    let path = if primary.exists() {
        primary
    } else {
        let legacy = cookie_dir.join(LEGACY_COOKIE_FILE);
        if legacy.exists() {
            warn!(path = %legacy.display(), "primary cookie file missing, using legacy export");
            legacy
        } else {
            return Err(CookieError::NotFound(primary, legacy));
        }
    };

    let content = fs::read_to_string(&path).map_err(|source| CookieError::Io {
        path: path.clone(),
        source,
    })?;

    let mut cookies = HashMap::new();
    for line in content.lines().filter(|line| is_kakao_domain(line)) {
        let parts: Vec<&str> = line.trim_end().split('\t').collect();
        if parts.len() < 7 {
            warn!(line, "skipping malformed cookie line");
            continue;
        }
        let name = parts[5].replace(' ', "");
        let value = parts[6].to_string();
        cookies.insert(name, value);
    }

    if cookies.is_empty() {
        return Err(CookieError::Empty(path));
    }
    Ok(cookies)
}

/// Render the map as a single `Cookie` request header value.
pub fn cookie_header(cookies: &HashMap<String, String>) -> String {
    let mut pairs: Vec<String> = cookies
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect();
    pairs.sort();
    pairs.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_cookie_file(dir: &Path, name: &str, lines: &[&str]) {
        fs::write(dir.join(name), lines.join("\n")).unwrap();
    }

    #[test]
    fn parses_kakao_lines_only() {
        let td = tempdir().unwrap();
        write_cookie_file(
            td.path(),
            COOKIE_FILE,
            &[
                "talkcloud.kakao.com\tFALSE\t/\tTRUE\t0\tsession\tabc123",
                ".kakao.com\tTRUE\t/\tTRUE\t0\tauth token\txyz",
                "evil.example.com\tFALSE\t/\tTRUE\t0\tstolen\tvalue",
                "drawer-api.kakao.com\tFALSE\t/\tTRUE\t0\tapi\tv",
            ],
        );
        let cookies = load_cookies(td.path()).unwrap();
        assert_eq!(cookies.len(), 3);
        assert_eq!(cookies["session"], "abc123");
        // Spaces are stripped from cookie names.
        assert_eq!(cookies["authtoken"], "xyz");
        assert!(!cookies.contains_key("stolen"));
    }

    #[test]
    fn skips_short_lines() {
        let td = tempdir().unwrap();
        write_cookie_file(
            td.path(),
            COOKIE_FILE,
            &[
                "talkcloud.kakao.com\tincomplete",
                "talkcloud.kakao.com\tFALSE\t/\tTRUE\t0\tok\tyes",
            ],
        );
        let cookies = load_cookies(td.path()).unwrap();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies["ok"], "yes");
    }

    #[test]
    fn missing_file_is_fatal() {
        let td = tempdir().unwrap();
        assert!(matches!(
            load_cookies(td.path()),
            Err(CookieError::NotFound(_, _))
        ));
    }

    #[test]
    fn empty_map_is_fatal() {
        let td = tempdir().unwrap();
        write_cookie_file(
            td.path(),
            COOKIE_FILE,
            &["other.example.com\tFALSE\t/\tTRUE\t0\tname\tvalue"],
        );
        assert!(matches!(load_cookies(td.path()), Err(CookieError::Empty(_))));
    }

    #[test]
    fn falls_back_to_legacy_file() {
        let td = tempdir().unwrap();
        write_cookie_file(
            td.path(),
            LEGACY_COOKIE_FILE,
            &["talkcloud.kakao.com\tFALSE\t/\tTRUE\t0\told\tcookie"],
        );
        let cookies = load_cookies(td.path()).unwrap();
        assert_eq!(cookies["old"], "cookie");
    }

    #[test]
    fn header_is_deterministic() {
        let mut cookies = HashMap::new();
        cookies.insert("b".to_string(), "2".to_string());
        cookies.insert("a".to_string(), "1".to_string());
        assert_eq!(cookie_header(&cookies), "a=1; b=2");
    }
}
