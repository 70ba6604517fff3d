use thiserror::Error;
use url::Url;

/// Errors that can occur while normalizing a feed URL.
#[derive(Error, Debug)]
pub enum UrlNormError {
    /// Nothing left after trimming.
    #[error("Empty URL")]
    Empty,
    /// The URL string could not be parsed, even after adding a scheme.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
}

/// Normalizes a feed or site URL into the canonical form used as a lookup key.
///
/// Two addresses that differ only in formatting resolve to the same string, so
/// the same canonical feed record is found for both. The rules:
///
/// - surrounding whitespace is trimmed
/// - `feed://host/...` and `feed:http://host/...` become plain `http(s)` URLs
/// - a missing scheme defaults to `http://`
/// - scheme and host are lowercased, default ports dropped, an empty path
///   becomes `/` and percent-encoding is canonicalized (all via [`Url`])
/// - the fragment is removed
///
/// Normalization is idempotent: feeding the output back in returns it unchanged.
///
/// # Examples
///
/// ```
/// use feedport::util::normalize_url;
///
/// assert_eq!(
///     normalize_url("HTTP://Example.COM:80/feed#top").unwrap(),
///     "http://example.com/feed"
/// );
/// assert_eq!(normalize_url("example.com/rss").unwrap(), "http://example.com/rss");
/// ```
pub fn normalize_url(raw: &str) -> Result<String, UrlNormError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(UrlNormError::Empty);
    }

    let candidate = strip_feed_scheme(trimmed);
    let candidate = if has_scheme(&candidate) {
        candidate
    } else {
        format!("http://{}", candidate.trim_start_matches('/'))
    };

    let mut url = Url::parse(&candidate)?;
    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlNormError::UnsupportedScheme(scheme.to_owned())),
    }
    url.set_fragment(None);

    Ok(url.into())
}

/// Normalizes an optional URL, treating blank input as absent.
pub fn normalize_optional_url(raw: Option<&str>) -> Result<Option<String>, UrlNormError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => normalize_url(value).map(Some),
    }
}

/// Rewrites the pseudo `feed:` scheme some readers emit.
fn strip_feed_scheme(s: &str) -> String {
    let lower = s.to_ascii_lowercase();
    if lower.starts_with("feed://") {
        format!("http://{}", &s["feed://".len()..])
    } else if lower.starts_with("feed:http://") || lower.starts_with("feed:https://") {
        s["feed:".len()..].to_owned()
    } else {
        s.to_owned()
    }
}

fn has_scheme(s: &str) -> bool {
    match s.find("://") {
        Some(idx) => {
            idx > 0
                && s[..idx]
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_lowercases_scheme_and_host() {
        assert_eq!(
            normalize_url("HTTPS://Example.COM/Feed.xml").unwrap(),
            "https://example.com/Feed.xml"
        );
    }

    #[test]
    fn test_drops_default_port_and_fragment() {
        assert_eq!(
            normalize_url("http://example.com:80/rss#latest").unwrap(),
            "http://example.com/rss"
        );
        assert_eq!(
            normalize_url("https://example.com:443/").unwrap(),
            "https://example.com/"
        );
    }

    #[test]
    fn test_keeps_non_default_port_and_query() {
        assert_eq!(
            normalize_url("http://example.com:8080/feed?format=rss").unwrap(),
            "http://example.com:8080/feed?format=rss"
        );
    }

    #[test]
    fn test_adds_missing_scheme() {
        assert_eq!(
            normalize_url("  example.com/feed  ").unwrap(),
            "http://example.com/feed"
        );
    }

    #[test]
    fn test_empty_path_becomes_slash() {
        assert_eq!(
            normalize_url("http://example.com").unwrap(),
            "http://example.com/"
        );
    }

    #[test]
    fn test_feed_pseudo_scheme() {
        assert_eq!(
            normalize_url("feed://example.com/rss").unwrap(),
            "http://example.com/rss"
        );
        assert_eq!(
            normalize_url("feed:https://example.com/rss").unwrap(),
            "https://example.com/rss"
        );
    }

    #[test]
    fn test_rejects_other_schemes() {
        assert!(matches!(
            normalize_url("ftp://example.com/feed"),
            Err(UrlNormError::UnsupportedScheme(_))
        ));
        assert!(normalize_url("file:///etc/passwd").is_err());
    }

    #[test]
    fn test_rejects_empty() {
        assert!(matches!(normalize_url("   "), Err(UrlNormError::Empty)));
    }

    #[test]
    fn test_optional_blank_is_none() {
        assert_eq!(normalize_optional_url(None).unwrap(), None);
        assert_eq!(normalize_optional_url(Some("  ")).unwrap(), None);
        assert_eq!(
            normalize_optional_url(Some("example.com")).unwrap(),
            Some("http://example.com/".to_string())
        );
    }

    #[test]
    fn test_differently_formatted_urls_match() {
        let a = normalize_url("HTTP://WWW.Example.com:80/feed/").unwrap();
        let b = normalize_url("www.example.com/feed/#x").unwrap();
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(
            scheme in prop::sample::select(vec!["", "http://", "HTTPS://", "feed://"]),
            host in "[a-zA-Z]{1,12}\\.(com|org|net)",
            path in "(/[a-zA-Z0-9_-]{0,8}){0,3}",
        ) {
            let raw = format!("{}{}{}", scheme, host, path);
            let once = normalize_url(&raw).unwrap();
            let twice = normalize_url(&once).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
