use thiserror::Error;
use url::Url;

/// Errors that can occur during feed URL validation.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed as an absolute URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host to connect to.
    #[error("URL has no host")]
    MissingHost,
}

/// Validates a feed source URL before any request is built.
///
/// Accepts absolute `http`/`https` URLs with a host. Surrounding whitespace
/// is ignored.
///
/// # Examples
///
/// ```
/// use feedworker::util::validate_feed_url;
///
/// let url = validate_feed_url("https://example.com/feed.xml").unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_feed_url("/relative/feed.xml").is_err());
/// assert!(validate_feed_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_feed_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(UrlValidationError::MissingHost),
    }
}
