use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
}

/// Validates an absolute feed endpoint URL.
///
/// Publishers and consumers commonly run on the same machine, so unlike a
/// general-purpose fetcher this does not reject loopback or private hosts.
/// Only the shape is checked: parseable, `http`/`https`, with a host.
///
/// # Examples
///
/// ```
/// use gbfs_sync::util::validate_feed_url;
///
/// let url = validate_feed_url("https://example.com/gbfs.json").unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_feed_url("http://127.0.0.1:8080/gbfs.json").is_ok());
/// assert!(validate_feed_url("file:///srv/gbfs.json").is_err());
/// ```
pub fn validate_feed_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlValidationError::MissingHost);
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_urls() {
        assert!(validate_feed_url("https://example.com/gbfs.json").is_ok());
        assert!(validate_feed_url("http://gbfs.example.org").is_ok());
        assert!(validate_feed_url("https://example.com:443/v1/gbfs.json").is_ok());
    }

    #[test]
    fn test_local_hosts_accepted() {
        assert!(validate_feed_url("http://localhost:8080/gbfs.json").is_ok());
        assert!(validate_feed_url("http://127.0.0.1/gbfs.json").is_ok());
        assert!(validate_feed_url("http://[::1]/gbfs.json").is_ok());
    }

    #[test]
    fn test_invalid_schemes() {
        assert!(matches!(
            validate_feed_url("file:///etc/passwd"),
            Err(UrlValidationError::UnsupportedScheme(_))
        ));
        assert!(validate_feed_url("ftp://example.com").is_err());
    }

    #[test]
    fn test_relative_url_rejected() {
        assert!(matches!(
            validate_feed_url("/v1/gbfs.json"),
            Err(UrlValidationError::InvalidUrl(_))
        ));
    }
}
