//! Base-path resolution for deployments behind a path-rewriting proxy.
//!
//! The service may be served from the site root, from a Workbench-style
//! session proxy (`/s/<session>/p/<port>/...`), or from a hosted-app proxy
//! (`/connect/<app>/...`). A configured value always wins; otherwise the
//! prefix is detected from the current location path. Every API and stream
//! URL is built as `<base_path>/api/v1/...`.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

/// Workbench session proxy: `/s/<session>/p/<port>`.
fn workbench_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(/s/[^/]+/p/[^/]+)").unwrap())
}

/// Hosted-app proxy: `/connect/<app>`.
fn connect_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(/connect/[^/]+)").unwrap())
}

/// URI scheme prefix (RFC 3986), e.g. `mailto:` or `data:`.
fn scheme_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*:").unwrap())
}

/// Resolve the URL path prefix for all API calls.
///
/// Order: configured value (normalized), then proxy-path detection from
/// `location_path`, then the site root (`""`). A malformed configured
/// value is swallowed and resolves to the site root — resolution never
/// fails.
pub fn resolve_base_path(configured: Option<&str>, location_path: &str) -> String {
    if let Some(raw) = configured {
        return match normalize_configured(raw) {
            Some(path) => path,
            None => {
                log::warn!("Ignoring malformed base path {raw:?}, using site root");
                String::new()
            }
        };
    }

    for pattern in [workbench_pattern(), connect_pattern()] {
        if let Some(captures) = pattern.captures(location_path) {
            let prefix = captures[1].to_string();
            log::debug!("Detected proxy base path {prefix:?} from {location_path:?}");
            return prefix;
        }
    }

    String::new()
}

/// Normalize a configured base-path value.
///
/// Full URLs keep only their path component. The result always has a
/// leading `/` and no trailing `/`; `""` and `"/"` mean the site root.
/// Returns `None` for values that cannot be made into a path.
fn normalize_configured(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(String::new());
    }

    let path = match Url::parse(raw) {
        Ok(url) => {
            // Scheme without a host (e.g. "mailto:") has no usable path.
            if !url.has_host() {
                return None;
            }
            url.path().to_string()
        }
        // Looks like a URL but does not parse as one.
        Err(_) if scheme_pattern().is_match(raw) || raw.contains("://") => return None,
        Err(_) => raw.to_string(),
    };

    let mut path = path.trim().to_string();
    if !path.starts_with('/') {
        path.insert(0, '/');
    }
    while path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    if path == "/" {
        path.clear();
    }
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_plain_path() {
        assert_eq!(resolve_base_path(Some("/tlf"), "/"), "/tlf");
        assert_eq!(resolve_base_path(Some("tlf/app"), "/"), "/tlf/app");
    }

    #[test]
    fn test_configured_full_url_keeps_path_only() {
        assert_eq!(
            resolve_base_path(Some("https://reports.example.com/s/abc/p/8000/"), "/"),
            "/s/abc/p/8000"
        );
        assert_eq!(
            resolve_base_path(Some("http://example.com"), "/"),
            ""
        );
    }

    #[test]
    fn test_configured_trailing_slash_stripped() {
        assert_eq!(resolve_base_path(Some("/connect/app-42/"), "/"), "/connect/app-42");
        assert_eq!(resolve_base_path(Some("/"), "/anything"), "");
        assert_eq!(resolve_base_path(Some(""), "/s/x/p/1/ui"), "");
    }

    #[test]
    fn test_configured_malformed_falls_back_to_root() {
        assert_eq!(resolve_base_path(Some("mailto:someone"), "/s/x/p/1/ui"), "");
        assert_eq!(resolve_base_path(Some("http://"), "/"), "");
        assert_eq!(resolve_base_path(Some("data:text/plain,x"), "/"), "");
        assert_eq!(resolve_base_path(Some("://broken"), "/"), "");
    }

    #[rstest::rstest]
    #[case("/s/4f9a/p/8787/documents", "/s/4f9a/p/8787")]
    #[case("/connect/tlf-assistant/chat", "/connect/tlf-assistant")]
    // Both conventions present: the session proxy prefix wins.
    #[case("/s/a/p/1/connect/x", "/s/a/p/1")]
    #[case("/documents/browse", "")]
    #[case("/", "")]
    fn test_proxy_detection(#[case] location: &str, #[case] expected: &str) {
        assert_eq!(resolve_base_path(None, location), expected);
    }
}
