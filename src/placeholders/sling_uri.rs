//! Decomposition of Sling-style resource paths:
//! `/content/page.selector1.selector2.extension/suffix`.

use once_cell::sync::Lazy;
use regex::Regex;

static SLING_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^.]*)(?:\.([^/]*))?(/.*)?$").expect("sling path pattern is valid")
});

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlingUri {
    path: String,
    path_parts: Vec<String>,
    selectors: Vec<String>,
    extension: Option<String>,
    suffix: Option<String>,
}

impl SlingUri {
    pub fn parse(uri: &str) -> Self {
        let uri = strip_query_and_fragment(uri);

        let Some(caps) = SLING_PATH.captures(uri) else {
            return Self {
                path: uri.to_string(),
                path_parts: split_path_parts(uri),
                ..Default::default()
            };
        };

        let path = caps.get(1).map(|m| m.as_str()).unwrap_or_default().to_string();
        let (selectors, extension) = match caps.get(2).map(|m| m.as_str()) {
            Some(dotted) if !dotted.is_empty() => {
                let mut parts: Vec<String> = dotted.split('.').map(str::to_string).collect();
                let extension = parts.pop();
                (parts, extension)
            }
            _ => (Vec::new(), None),
        };
        let suffix = caps.get(3).map(|m| m.as_str().to_string());

        Self {
            path_parts: split_path_parts(&path),
            path,
            selectors,
            extension,
            suffix,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Non-empty path segments, so `/a/b` yields `a` at index 0.
    pub fn path_part(&self, idx: usize) -> Option<&str> {
        self.path_parts.get(idx).map(String::as_str)
    }

    pub fn selector(&self, idx: usize) -> Option<&str> {
        self.selectors.get(idx).map(String::as_str)
    }

    pub fn selector_string(&self) -> String {
        self.selectors.join(".")
    }

    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }
}

/// Drops `?query` and `#fragment` from a request path.
pub fn strip_query_and_fragment(uri: &str) -> &str {
    let end = uri.find(['?', '#']).unwrap_or(uri.len());
    &uri[..end]
}

fn split_path_parts(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_decomposition() {
        let uri = SlingUri::parse("/a/b/c/d.s1.s2.html/c/d.s.txt#f");
        assert_eq!(uri.path(), "/a/b/c/d");
        assert_eq!(uri.path_part(0), Some("a"));
        assert_eq!(uri.path_part(3), Some("d"));
        assert_eq!(uri.path_part(4), None);
        assert_eq!(uri.selector_string(), "s1.s2");
        assert_eq!(uri.selector(1), Some("s2"));
        assert_eq!(uri.extension(), Some("html"));
        assert_eq!(uri.suffix(), Some("/c/d.s.txt"));
    }

    #[test]
    fn test_without_selectors_or_suffix() {
        let uri = SlingUri::parse("/content/page.html?x=1");
        assert_eq!(uri.path(), "/content/page");
        assert_eq!(uri.selector_string(), "");
        assert_eq!(uri.extension(), Some("html"));
        assert_eq!(uri.suffix(), None);
    }

    #[test]
    fn test_plain_path() {
        let uri = SlingUri::parse("/a/b");
        assert_eq!(uri.path(), "/a/b");
        assert_eq!(uri.extension(), None);
        assert_eq!(uri.selector(0), None);
    }

    #[test]
    fn test_strip_query_and_fragment() {
        assert_eq!(strip_query_and_fragment("/a?b#c"), "/a");
        assert_eq!(strip_query_and_fragment("/a#c?b"), "/a");
        assert_eq!(strip_query_and_fragment("/a"), "/a");
    }
}
