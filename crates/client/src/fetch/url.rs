//! URL normalization for cache keys and origin identifiers.

/// Error type for URL normalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid origin: {0}")]
    InvalidOrigin(String),
}

/// Query parameters that identify a visit rather than a resource.
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "dclid", "msclkid", "mc_cid", "mc_eid", "_ga", "_gl", "yclid"];

fn is_tracking_param(segment: &str) -> bool {
    let key = segment.split('=').next().unwrap_or_default().to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Normalize a request URL into its cache key.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Require an http or https scheme
/// 3. Lowercase the host, drop credentials and the default port
/// 4. Remove fragment (#...)
/// 5. Drop tracking parameters from the query, keeping the rest in order
pub fn normalize(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = url::Url::parse(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(UrlError::InvalidUrl(format!("missing host: {trimmed}")));
    }

    // The url crate already lowercases registrable hosts; credentials are
    // never part of a cache key. Both setters only fail for URLs that cannot
    // be a base, which the host check above rules out.
    parsed.set_username("").ok();
    parsed.set_password(None).ok();
    parsed.set_fragment(None);

    let kept = parsed.query().map(|q| {
        q.split('&')
            .filter(|segment| !segment.is_empty() && !is_tracking_param(segment))
            .collect::<Vec<_>>()
            .join("&")
    });
    match kept {
        Some(q) if !q.is_empty() => parsed.set_query(Some(&q)),
        _ => parsed.set_query(None),
    }

    Ok(parsed)
}

/// Normalize the origin identifier attached to an event.
///
/// Accepts a bare hostname or a full page URL and returns the lowercased
/// hostname.
pub fn origin_host(input: &str) -> Result<String, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::InvalidOrigin("empty origin".into()));
    }

    if trimmed.contains("://") {
        let parsed = url::Url::parse(trimmed).map_err(|e| UrlError::InvalidOrigin(e.to_string()))?;
        return parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .map(str::to_lowercase)
            .ok_or_else(|| UrlError::InvalidOrigin(trimmed.to_string()));
    }

    let host = url::Host::parse(&trimmed.to_lowercase()).map_err(|e| UrlError::InvalidOrigin(e.to_string()))?;
    Ok(host.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_basic() {
        let url = normalize("https://cdn.example/app.js").unwrap();
        assert_eq!(url.as_str(), "https://cdn.example/app.js");
    }

    #[test]
    fn test_normalize_lowercase_host() {
        let url = normalize("https://CDN.Example/App.js").unwrap();
        assert_eq!(url.host_str(), Some("cdn.example"));
        assert_eq!(url.path(), "/App.js");
    }

    #[test]
    fn test_normalize_remove_fragment() {
        let url = normalize("https://cdn.example/app.js#L10").unwrap();
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_normalize_filters_tracking_params() {
        let url = normalize("https://cdn.example/app.js?v=3&utm_source=mail&fbclid=abc&lang=en").unwrap();
        assert_eq!(url.query(), Some("v=3&lang=en"));
    }

    #[test]
    fn test_normalize_drops_empty_query() {
        let url = normalize("https://cdn.example/app.js?utm_campaign=x").unwrap();
        assert_eq!(url.as_str(), "https://cdn.example/app.js");
    }

    #[test]
    fn test_normalize_drops_credentials_and_default_port() {
        let url = normalize("https://user:pw@cdn.example:443/a.css").unwrap();
        assert_eq!(url.as_str(), "https://cdn.example/a.css");
    }

    #[test]
    fn test_normalize_keeps_custom_port() {
        let url = normalize("http://cdn.example:8080/a.css").unwrap();
        assert_eq!(url.port(), Some(8080));
    }

    #[test]
    fn test_normalize_trim_whitespace() {
        let url = normalize("  https://cdn.example/a.css  ").unwrap();
        assert_eq!(url.as_str(), "https://cdn.example/a.css");
    }

    #[test]
    fn test_normalize_unsupported_scheme() {
        assert!(matches!(normalize("file:///etc/passwd"), Err(UrlError::UnsupportedScheme(_))));
        assert!(matches!(normalize("data:text/plain,hi"), Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_normalize_empty() {
        assert!(matches!(normalize(""), Err(UrlError::Empty)));
        assert!(matches!(normalize("   "), Err(UrlError::Empty)));
    }

    #[test]
    fn test_normalize_garbage() {
        assert!(matches!(normalize("not a url"), Err(UrlError::InvalidUrl(_))));
    }

    #[test]
    fn test_origin_host_forms() {
        assert_eq!(origin_host("Example.COM").unwrap(), "example.com");
        assert_eq!(origin_host("https://www.example.com/page?x=1").unwrap(), "www.example.com");
        assert_eq!(origin_host("example").unwrap(), "example");
    }

    #[test]
    fn test_origin_host_invalid() {
        assert!(origin_host("").is_err());
        assert!(origin_host("bad host name").is_err());
        assert!(origin_host("about:blank").is_err());
    }
}
