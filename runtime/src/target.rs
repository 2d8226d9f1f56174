//! Start-target normalization: web addresses pass through, local paths
//! become `file://` URLs.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use url::Url;

/// Schemes accepted verbatim.
const PASSTHROUGH_SCHEMES: [&str; 5] = ["http", "https", "file", "about", "data"];

/// A start target ready for navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTarget {
    /// What to hand to the browser.
    pub url: String,
    /// Set when the target was a local path.
    pub local_path: Option<PathBuf>,
    /// False only for local paths that do not exist.
    pub exists: bool,
}

/// Normalize a raw command-line target.
///
/// A missing local file is not an error; the caller warns and still
/// navigates, so the browser reports the failure in its own terms.
pub fn normalize_target(raw: &str) -> Result<NormalizedTarget> {
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    normalize_target_in(raw, &cwd)
}

/// Same as [`normalize_target`], resolving relative paths against `base`.
pub fn normalize_target_in(raw: &str, base: &Path) -> Result<NormalizedTarget> {
    let trimmed = raw.trim();

    if let Ok(url) = Url::parse(trimmed) {
        if PASSTHROUGH_SCHEMES.contains(&url.scheme()) {
            let local_path = if url.scheme() == "file" {
                url.to_file_path().ok()
            } else {
                None
            };
            let exists = local_path.as_deref().map_or(true, Path::exists);
            return Ok(NormalizedTarget {
                url: url.to_string(),
                local_path,
                exists,
            });
        }
    }

    let path = Path::new(trimmed);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    let exists = absolute.exists();
    let absolute = if exists {
        absolute.canonicalize().unwrap_or(absolute)
    } else {
        absolute
    };

    let url = Url::from_file_path(&absolute)
        .map_err(|()| anyhow::anyhow!("cannot express {} as a file URL", absolute.display()))?;

    Ok(NormalizedTarget {
        url: url.to_string(),
        local_path: Some(absolute),
        exists,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_web_address_passes_through() {
        let t = normalize_target_in("https://example.com/player", Path::new("/")).unwrap();
        assert_eq!(t.url, "https://example.com/player");
        assert!(t.local_path.is_none());
        assert!(t.exists);
    }

    #[test]
    fn test_about_blank_passes_through() {
        let t = normalize_target_in("about:blank", Path::new("/")).unwrap();
        assert_eq!(t.url, "about:blank");
    }

    #[test]
    fn test_existing_local_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page.html"), "<html></html>").unwrap();

        let t = normalize_target_in("page.html", dir.path()).unwrap();
        assert!(t.exists);
        assert!(t.url.starts_with("file://"));
        assert!(t.url.ends_with("/page.html"));
    }

    #[test]
    fn test_missing_local_file_still_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let t = normalize_target_in("nope/missing.html", dir.path()).unwrap();
        assert!(!t.exists);
        assert!(t.url.starts_with("file://"));
        assert!(t.url.ends_with("/nope/missing.html"));
    }

    #[test]
    fn test_relative_path_with_colon_is_not_a_url() {
        // "c:" style and bare host:port strings are not in the passthrough list.
        let dir = tempfile::tempdir().unwrap();
        let t = normalize_target_in("localhost:8080", dir.path()).unwrap();
        assert!(t.url.starts_with("file://"));
        assert!(!t.exists);
    }
}
