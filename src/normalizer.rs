//! URL set normalization
//!
//! Purge targets arrive from several sources and routinely contain
//! duplicates. Everything here is pure and performs no I/O.

use std::collections::HashSet;

/// Deduplicate a list of URLs
///
/// Entries are trimmed and blank entries dropped. Exact duplicates are
/// removed, keeping the first occurrence, so the output order is
/// deterministic for a given input.
pub fn normalize<I, S>(urls: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for url in urls {
        let url = url.as_ref().trim();
        if url.is_empty() {
            continue;
        }
        if seen.insert(url.to_string()) {
            out.push(url.to_string());
        }
    }

    out
}

/// Rewrite a URL to use `https`
///
/// Protocol-relative URLs (`//host/path`) gain an explicit scheme and plain
/// `http://` URLs are upgraded. Anything else is returned unchanged.
pub fn https_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("//") {
        return format!("https://{}", rest);
    }
    match url.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("http://") => format!("https://{}", &url[7..]),
        _ => url.to_string(),
    }
}

/// Resolve a path against the wiki's canonical server
///
/// Absolute URLs (with a scheme, or protocol-relative) are left alone.
pub fn absolutize(server: &str, url: &str) -> String {
    if url.starts_with("//") || url.contains("://") {
        return url.to_string();
    }
    format!(
        "{}/{}",
        server.trim_end_matches('/'),
        url.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_removes_duplicates() {
        let urls = normalize(["http://x/a", "http://x/b", "http://x/a"]);
        assert_eq!(urls, vec!["http://x/a", "http://x/b"]);
    }

    #[test]
    fn test_normalize_drops_blank_entries() {
        let urls = normalize(["", "  ", " http://x/a "]);
        assert_eq!(urls, vec!["http://x/a"]);
    }

    #[test]
    fn test_normalize_empty() {
        let urls = normalize(Vec::<String>::new());
        assert!(urls.is_empty());
    }

    #[test]
    fn test_normalize_idempotent() {
        let once = normalize(["http://x/b", "http://x/a", "http://x/b"]);
        let twice = normalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_https_url() {
        assert_eq!(https_url("//x/a"), "https://x/a");
        assert_eq!(https_url("http://x/a?b=c"), "https://x/a?b=c");
        assert_eq!(https_url("HTTP://x/a"), "https://x/a");
        assert_eq!(https_url("https://x/a"), "https://x/a");
    }

    #[test]
    fn test_absolutize() {
        assert_eq!(
            absolutize("https://wiki.example.org", "/load.php?modules=site.styles"),
            "https://wiki.example.org/load.php?modules=site.styles"
        );
        assert_eq!(absolutize("https://wiki.example.org/", "favicon.ico"), "https://wiki.example.org/favicon.ico");
        assert_eq!(absolutize("https://wiki.example.org", "http://cdn/x"), "http://cdn/x");
        assert_eq!(absolutize("https://wiki.example.org", "//cdn/x"), "//cdn/x");
    }
}
